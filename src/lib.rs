//! Compliance Policy Engine - policy registration, selection and evaluation
//!
//! Policies are registered once with their metadata (vendors, services,
//! severity, topics, frameworks) and a validation callback. A policy pack
//! selects a subset of them with tag queries, resolves per-policy
//! configuration, and then validates cloud resources against the selection.
//!
//! # Example
//!
//! ```rust
//! use compliance_policy_engine::catalog::register_builtin;
//! use compliance_policy_engine::host::Resource;
//! use compliance_policy_engine::pack::PolicyPack;
//! use compliance_policy_engine::policy::{PolicyRegistry, SelectionQuery};
//! use serde_json::json;
//!
//! let mut registry = PolicyRegistry::new();
//! register_builtin(&mut registry).unwrap();
//!
//! let mut builder = PolicyPack::builder("aws-storage", &registry);
//! builder
//!     .select(&SelectionQuery::new().vendors(["aws"]).services(["s3"]), None)
//!     .unwrap();
//! let pack = builder.build().unwrap();
//!
//! let bucket = Resource::new(
//!     "urn:pulumi:dev::app::aws:s3/bucket:Bucket::logs",
//!     "aws:s3/bucket:Bucket",
//!     json!({"acl": "public-read", "tags": {"owner": "platform"}}),
//! );
//! let response = pack.analyze(&[bucket]).unwrap();
//!
//! assert_eq!(response.summary.violations, 1);
//! assert_eq!(
//!     response.diagnostics[0].policy_name,
//!     "aws-s3-bucket-disallow-public-read"
//! );
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod host;
pub mod pack;
pub mod policy;

// Re-export commonly used types at the crate root
pub use error::EngineError;
pub use host::{AnalyzeResponse, Resource};
pub use pack::PolicyPack;
pub use policy::{PolicyDescriptor, PolicyRegistry, SelectionQuery};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Evaluate resources against every policy of a YAML catalog
///
/// This is a convenience function for simple use cases.
///
/// # Example
///
/// ```rust
/// use compliance_policy_engine::{evaluate_resources, Resource};
/// use serde_json::json;
///
/// let catalog = r#"
/// version: "1.0"
/// policies:
///   - name: "aws-s3-bucket-enable-versioning"
///     severity: "medium"
///     vendors: ["aws"]
///     services: ["s3"]
///     resourceTypes: ["aws:s3/bucket:Bucket"]
///     checks:
///       - field: "versioning.enabled"
///         operator: "eq"
///         value: true
///         message: "Bucket versioning must be enabled"
/// "#;
///
/// let bucket = Resource::new("urn:bucket", "aws:s3/bucket:Bucket", json!({}));
/// let response = evaluate_resources(catalog, &[bucket]).unwrap();
/// assert_eq!(response.summary.violations, 1);
/// ```
pub fn evaluate_resources(
    catalog_yaml: &str,
    resources: &[Resource],
) -> Result<AnalyzeResponse, EngineError> {
    let mut registry = PolicyRegistry::new();
    catalog::load_catalog(&mut registry, catalog_yaml)?;
    let pack = PolicyPack::builder("catalog", &registry).build()?;
    Ok(pack.analyze(resources)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_evaluate_resources_bad_catalog() {
        let result = evaluate_resources("policies: 3", &[]);
        assert!(matches!(result, Err(EngineError::Catalog(_))));
    }

    #[test]
    fn test_evaluate_resources_empty_catalog() {
        let resource = Resource::new("urn:x", "aws:s3/bucket:Bucket", json!({}));
        let response = evaluate_resources("version: \"1.0\"\npolicies: []\n", &[resource]).unwrap();
        assert_eq!(response.summary.resources, 1);
        assert!(response.diagnostics.is_empty());
    }
}
