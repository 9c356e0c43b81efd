use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use compliance_policy_engine::catalog::{load_catalog, register_builtin};
use compliance_policy_engine::host::Resource;
use compliance_policy_engine::pack::PolicyPack;
use compliance_policy_engine::policy::{
    PolicyDescriptor, PolicyRegistry, RawPolicyConfig, SelectionQuery, Severity,
};

const CATALOG: &str = r#"
version: "1.0"
policies:
  - name: "aws-s3-bucket-enable-server-side-encryption"
    severity: "high"
    vendors: ["aws"]
    services: ["s3"]
    topics: ["encryption"]
    resourceTypes: ["aws:s3/bucket:Bucket"]
    checks:
      - field: "serverSideEncryptionConfiguration"
        operator: "required"
        message: "Bucket must have server-side encryption enabled"
  - name: "aws-s3-bucket-name-convention"
    severity: "low"
    vendors: ["aws"]
    services: ["s3"]
    topics: ["governance"]
    resourceTypes: ["aws:s3/bucket:Bucket"]
    checks:
      - field: "bucket"
        operator: "matches"
        value: "^[a-z0-9-]+-(dev|prod)$"
        message: "Bucket name must end with the environment"
"#;

const VENDORS: [&str; 4] = ["aws", "azure", "google", "kubernetes"];
const SERVICES: [&str; 5] = ["s3", "ec2", "storage", "apps", "iam"];

/// A registry large enough for the tag index to matter
fn synthetic_registry(size: usize) -> PolicyRegistry {
    let mut registry = PolicyRegistry::new();
    for i in 0..size {
        let descriptor = PolicyDescriptor::builder(format!("policy-{i}"))
            .severity(Severity::ALL[i % Severity::ALL.len()])
            .vendors([VENDORS[i % VENDORS.len()]])
            .services([SERVICES[i % SERVICES.len()]])
            .topics([if i % 2 == 0 { "security" } else { "cost" }])
            .validate_fn(|_, _, _| Ok(()))
            .build()
            .unwrap();
        registry.register(descriptor).unwrap();
    }
    registry
}

fn bench_registry_build(c: &mut Criterion) {
    c.bench_function("registry_build_1000", |b| {
        b.iter(|| synthetic_registry(black_box(1000)))
    });
}

fn bench_filter_policies(c: &mut Criterion) {
    let registry = synthetic_registry(1000);
    let query = SelectionQuery::new()
        .vendors(["aws", "azure"])
        .severities(["high", "critical"])
        .topics(["security"]);

    c.bench_function("filter_policies_1000", |b| {
        b.iter(|| registry.filter_policies(black_box(&query)).unwrap())
    });
}

fn bench_catalog_load(c: &mut Criterion) {
    c.bench_function("catalog_from_yaml", |b| {
        b.iter(|| {
            let mut registry = PolicyRegistry::new();
            load_catalog(&mut registry, black_box(CATALOG)).unwrap()
        })
    });
}

fn bench_config_resolution(c: &mut Criterion) {
    let mut registry = PolicyRegistry::new();
    register_builtin(&mut registry).unwrap();
    let config = RawPolicyConfig::new()
        .with_policy(
            "aws-s3-bucket-enforce-tags",
            json!({"requiredTags": ["owner", "env"]}),
        )
        .unwrap()
        .with_policy(
            "kubernetes-apps-deployment-min-replicas",
            json!({"minReplicas": 3, "severity": "high"}),
        )
        .unwrap();

    c.bench_function("pack_build_builtin", |b| {
        b.iter(|| {
            PolicyPack::builder("bench", &registry)
                .config(black_box(config.clone()))
                .build()
                .unwrap()
        })
    });
}

fn bench_analyze(c: &mut Criterion) {
    let mut registry = PolicyRegistry::new();
    register_builtin(&mut registry).unwrap();
    load_catalog(&mut registry, CATALOG).unwrap();
    let pack = PolicyPack::builder("bench", &registry).build().unwrap();

    let resources = vec![
        Resource::new(
            "urn:bucket",
            "aws:s3/bucket:Bucket",
            json!({"bucket": "logs-prod", "acl": "private", "tags": {"owner": "platform"}}),
        ),
        Resource::new(
            "urn:deployment",
            "kubernetes:apps/v1:Deployment",
            json!({"spec": {"replicas": 1}}),
        ),
        Resource::new("urn:other", "random:module:Thing", json!({})),
    ];

    c.bench_function("analyze_mixed_resources", |b| {
        b.iter(|| pack.analyze(black_box(&resources)).unwrap())
    });

    c.bench_function("evaluate_single_bucket", |b| {
        b.iter(|| pack.dispatcher().evaluate(black_box(&resources[0])).unwrap())
    });
}

criterion_group!(
    benches,
    bench_registry_build,
    bench_filter_policies,
    bench_catalog_load,
    bench_config_resolution,
    bench_analyze,
);
criterion_main!(benches);
