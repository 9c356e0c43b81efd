#![no_main]

use compliance_policy_engine::catalog::register_builtin;
use compliance_policy_engine::pack::PolicyPack;
use compliance_policy_engine::policy::{PolicyRegistry, RawPolicyConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse arbitrary text as per-policy overrides, then resolve it
    // against the built-in rules. Errors are fine, panics are not.
    let Ok(config) = RawPolicyConfig::from_yaml(data) else {
        return;
    };

    let mut registry = PolicyRegistry::new();
    register_builtin(&mut registry).expect("built-in rules register");
    let _ = PolicyPack::builder("fuzz", &registry).config(config).build();
});
