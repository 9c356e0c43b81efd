use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use compliance_policy_engine::catalog::{load_catalog, register_builtin};
use compliance_policy_engine::error::{ConfigError, EngineError, QueryError};
use compliance_policy_engine::host::{AnalyzeRequest, Resource};
use compliance_policy_engine::pack::PolicyPack;
use compliance_policy_engine::policy::{
    ConfigSchema, EnforcementLevel, FindingKind, ParamKind, ParamSpec, PolicyDescriptor,
    PolicyRegistry, RawPolicyConfig, SelectionQuery, Severity,
};

const TEST_CATALOG: &str = r#"
version: "1.0"
policies:
  - name: "aws-s3-bucket-enable-server-side-encryption"
    severity: "high"
    enforcementLevel: "mandatory"
    vendors: ["aws"]
    services: ["s3"]
    topics: ["encryption"]
    frameworks: ["pcidss"]
    resourceTypes: ["aws:s3/bucket:Bucket"]
    checks:
      - field: "serverSideEncryptionConfiguration"
        operator: "required"
        message: "Bucket must have server-side encryption enabled"
  - name: "aws-ec2-security-group-restrict-ssh"
    severity: "critical"
    vendors: ["aws"]
    services: ["ec2"]
    topics: ["network"]
    resourceTypes: ["aws:ec2/securityGroup:SecurityGroup"]
    checks:
      - field: "ingress[].cidrBlocks[]"
        operator: "neq"
        value: "0.0.0.0/0"
        message: "{field} opens the group to the internet"
"#;

fn registry() -> PolicyRegistry {
    let mut registry = PolicyRegistry::new();
    register_builtin(&mut registry).unwrap();
    load_catalog(&mut registry, TEST_CATALOG).unwrap();
    registry
}

fn open_bucket() -> Resource {
    Resource::new(
        "urn:pulumi:dev::app::aws:s3/bucket:Bucket::logs",
        "aws:s3/bucket:Bucket",
        json!({"acl": "public-read", "tags": {"owner": "platform"}}),
    )
}

#[test]
fn test_catalog_and_builtin_share_registry() {
    let registry = registry();
    let stats = registry.stats();

    assert_eq!(stats.total, registry.len());
    assert_eq!(stats.vendors.get("aws"), Some(&6));
    assert_eq!(stats.severities.get(&Severity::Critical), Some(&3));
}

#[test]
fn test_framework_query_selects_across_sources() {
    let registry = registry();
    let selected = registry
        .filter_policies(&SelectionQuery::new().frameworks(["PCIDSS"]).services(["s3"]))
        .unwrap();

    let names: Vec<&str> = selected.iter().map(|h| h.name()).collect();
    assert_eq!(
        names,
        vec![
            "aws-s3-bucket-disallow-public-read",
            "aws-s3-bucket-enable-server-side-encryption"
        ]
    );
}

#[test]
fn test_unknown_severity_is_rejected() {
    let registry = registry();
    let err = registry
        .filter_policies(&SelectionQuery::new().severities(["urgent"]))
        .unwrap_err();
    assert_eq!(
        err,
        QueryError::InvalidQuery {
            dimension: "severity".to_string(),
            value: "urgent".to_string()
        }
    );
}

#[test]
fn test_mandatory_catalog_policy_blocks() {
    let registry = registry();
    let mut builder = PolicyPack::builder("s3", &registry);
    builder
        .select(&SelectionQuery::new().services(["s3"]), None)
        .unwrap();
    let pack = builder.build().unwrap();

    let response = pack.analyze(&[open_bucket()]).unwrap();
    assert_eq!(response.summary.violations, 2);
    assert_eq!(response.summary.mandatory_violations, 1);
    assert!(response.is_blocking());

    // findings follow registration order
    assert_eq!(
        response.diagnostics[0].policy_name,
        "aws-s3-bucket-disallow-public-read"
    );
    assert_eq!(
        response.diagnostics[1].policy_name,
        "aws-s3-bucket-enable-server-side-encryption"
    );
}

#[test]
fn test_config_disables_policy() {
    let registry = registry();
    let config = RawPolicyConfig::from_yaml(
        r#"
policies:
  aws-s3-bucket-enable-server-side-encryption:
    enabled: false
  aws-s3-bucket-disallow-public-read:
    severity: low
"#,
    )
    .unwrap();
    let pack = PolicyPack::builder("s3", &registry)
        .config(config)
        .build()
        .unwrap();

    let response = pack.analyze(&[open_bucket()]).unwrap();
    assert_eq!(response.diagnostics.len(), 1);
    assert_eq!(response.diagnostics[0].severity, Severity::Low);
    assert!(!response.is_blocking());
}

#[test]
fn test_array_paths_report_each_offender() {
    let registry = registry();
    let mut builder = PolicyPack::builder("network", &registry);
    builder
        .select(
            &SelectionQuery::new()
                .topics(["network"])
                .include(["aws-ec2-security-group-restrict-ssh"]),
            None,
        )
        .unwrap();
    let pack = builder.build().unwrap();

    let group = Resource::new(
        "urn:sg",
        "aws:ec2/securityGroup:SecurityGroup",
        json!({"ingress": [
            {"cidrBlocks": ["10.0.0.0/8", "0.0.0.0/0"]},
            {"cidrBlocks": ["0.0.0.0/0"]}
        ]}),
    );
    let response = pack.analyze(&[group]).unwrap();
    let messages: Vec<&str> = response.diagnostics.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "ingress[0].cidrBlocks[1] opens the group to the internet",
            "ingress[1].cidrBlocks[0] opens the group to the internet"
        ]
    );
}

#[test]
fn test_invalid_parameter_fails_before_analysis() {
    let registry = registry();
    let config = RawPolicyConfig::new()
        .with_policy(
            "kubernetes-apps-deployment-min-replicas",
            json!({"minReplicas": "three"}),
        )
        .unwrap();
    let err = PolicyPack::builder("k8s", &registry)
        .config(config)
        .build()
        .err()
        .unwrap();
    assert!(matches!(
        err,
        EngineError::Config(ConfigError::InvalidConfig { .. })
    ));
}

#[test]
fn test_failing_rule_does_not_stop_others() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let mut registry = PolicyRegistry::new();
    registry
        .register(
            PolicyDescriptor::builder("always-panics")
                .vendors(["aws"])
                .services(["s3"])
                .validate_fn(|_, _, _| panic!("boom"))
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
        .register(
            PolicyDescriptor::builder("counts-calls")
                .vendors(["aws"])
                .services(["s3"])
                .validate_fn(move |_, _, sink| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    sink.report("seen");
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .unwrap();

    let pack = PolicyPack::builder("mixed", &registry).build().unwrap();
    let response = pack.analyze(&[open_bucket()]).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.summary.rule_errors, 1);
    assert_eq!(response.diagnostics[0].kind, FindingKind::RuleEvaluationError);
    assert_eq!(response.diagnostics[1].message, "seen");
}

#[test]
fn test_selection_time_override_and_schema_defaults() {
    let mut registry = PolicyRegistry::new();
    registry
        .register(
            PolicyDescriptor::builder("max-size")
                .severity(Severity::Medium)
                .vendors(["aws"])
                .services(["s3"])
                .config_schema(
                    ConfigSchema::new().param("limit", ParamSpec::optional(ParamKind::Integer, 10)),
                )
                .validate_fn(|resource, args, sink| {
                    let limit: i64 = args.param_as("limit")?;
                    let size = resource.property("size").and_then(|v| v.as_i64()).unwrap_or(0);
                    if size > limit {
                        sink.report(format!("size {size} exceeds {limit}"));
                    }
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .unwrap();

    let mut builder = PolicyPack::builder("sizes", &registry);
    builder
        .select(&SelectionQuery::new(), Some(EnforcementLevel::Mandatory))
        .unwrap();
    let pack = builder.build().unwrap();

    let resource = Resource::new("urn:big", "aws:s3/bucket:Bucket", json!({"size": 11}));
    let response = pack.analyze(&[resource]).unwrap();
    assert_eq!(response.diagnostics[0].message, "size 11 exceeds 10");
    assert_eq!(
        response.diagnostics[0].enforcement_level,
        EnforcementLevel::Mandatory
    );
}

#[test]
fn test_analyze_request_json() {
    let request: AnalyzeRequest = serde_json::from_value(json!({
        "resources": [
            {"urn": "urn:a", "type": "aws:s3/bucket:Bucket", "properties": {"acl": "private"}},
            {"urn": "urn:b", "type": "kubernetes:apps/v1:Deployment", "properties": {"spec": {"replicas": 1}}}
        ]
    }))
    .unwrap();

    let registry = registry();
    let pack = PolicyPack::builder("all", &registry).build().unwrap();
    let response = pack.analyze(&request.resources).unwrap();

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["summary"]["resources"], 2);
    assert!(json["diagnostics"]
        .as_array()
        .unwrap()
        .iter()
        .any(|d| d["policyName"] == "kubernetes-apps-deployment-min-replicas"));
}

#[test]
fn test_demo_files_end_to_end() {
    let mut registry = PolicyRegistry::new();
    register_builtin(&mut registry).unwrap();
    load_catalog(&mut registry, include_str!("../../demos/catalog.yaml")).unwrap();
    let config = RawPolicyConfig::from_yaml(include_str!("../../demos/policy-config.yaml")).unwrap();
    let request: AnalyzeRequest =
        serde_json::from_str(include_str!("../../demos/resources.json")).unwrap();

    let pack = PolicyPack::builder("demo", &registry)
        .config(config)
        .build()
        .unwrap();
    let response = pack.analyze(&request.resources).unwrap();

    assert_eq!(response.summary.resources, 3);
    assert_eq!(response.summary.violations, 7);
    assert_eq!(response.summary.mandatory_violations, 2);
    assert_eq!(response.summary.rule_errors, 0);
    assert!(response
        .diagnostics
        .iter()
        .any(|d| d.message == "spec.template.spec.containers[1].image is not pulled from an approved registry"));
}
