#![no_main]

use compliance_policy_engine::catalog::load_catalog;
use compliance_policy_engine::policy::PolicyRegistry;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Arbitrary catalog text should only ever produce errors, never panics
    let mut registry = PolicyRegistry::new();
    let _ = load_catalog(&mut registry, data);
});
