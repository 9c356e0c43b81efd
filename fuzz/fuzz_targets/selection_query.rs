#![no_main]

use arbitrary::Arbitrary;
use compliance_policy_engine::catalog::register_builtin;
use compliance_policy_engine::host::Resource;
use compliance_policy_engine::pack::PolicyPack;
use compliance_policy_engine::policy::{PolicyRegistry, SelectionQuery};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    vendors: Option<Vec<String>>,
    services: Option<Vec<String>>,
    severities: Option<Vec<String>>,
    topics: Option<Vec<String>>,
    frameworks: Option<Vec<String>>,
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
    resource_type: String,
    acl: Option<String>,
    replicas: Option<i64>,
}

fuzz_target!(|input: FuzzInput| {
    let mut registry = PolicyRegistry::new();
    register_builtin(&mut registry).expect("built-in rules register");

    let query = SelectionQuery {
        vendors: input.vendors,
        services: input.services,
        severities: input.severities,
        topics: input.topics,
        frameworks: input.frameworks,
        include: input.include,
        exclude: input.exclude,
    };

    // The index-backed and linear selections must always agree
    let Ok(selection) = query.validate(&registry) else {
        return;
    };
    let indexed = selection.apply(&registry);
    let linear: Vec<_> = registry
        .all()
        .into_iter()
        .filter(|h| selection.matches(h.descriptor()))
        .collect();
    assert_eq!(indexed, linear);

    let mut builder = PolicyPack::builder("fuzz", &registry);
    builder.select(&query, None).expect("query already validated");
    let pack = builder.build().expect("built-in defaults are valid");

    let mut properties = serde_json::Map::new();
    if let Some(acl) = input.acl {
        properties.insert("acl".to_string(), serde_json::json!(acl));
    }
    if let Some(replicas) = input.replicas {
        properties.insert("spec".to_string(), serde_json::json!({"replicas": replicas}));
    }
    let resource = Resource::new(
        "urn:fuzz",
        input.resource_type,
        serde_json::Value::Object(properties),
    );
    let _ = pack.analyze(&[resource]);
});
