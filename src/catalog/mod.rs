// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 CAB Ingénierie / Christophe ABOULICAM
//! Rule catalog
//!
//! Declarative policies defined in YAML, plus a set of built-in rules
//! written in code. Both end up as ordinary descriptors in the registry.

pub mod builtin;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CatalogError;
use crate::host::Resource;
use crate::policy::descriptor::{PolicyDescriptor, ResourceFilter, ResourceValidator};
use crate::policy::metadata::{EnforcementLevel, Severity};
use crate::policy::registry::{PolicyHandle, PolicyRegistry};
use crate::policy::resolver::PolicyArgs;
use crate::policy::rule::{FieldCheck, Operator};
use crate::policy::schema::{ConfigSchema, ParamFormat};
use crate::policy::violation::{RuleError, ViolationSink};

pub use builtin::register_builtin;

/// Root structure of a catalog YAML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    pub version: String,
    pub policies: Vec<PolicyDefinition>,
}

/// Definition of a single declarative policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enforcement_level: EnforcementLevel,
    pub severity: Severity,
    pub vendors: Vec<String>,
    pub services: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    /// Resource type tokens inspected; empty means every resource
    #[serde(default)]
    pub resource_types: Vec<String>,
    #[serde(default)]
    pub config_schema: Option<ConfigSchema>,
    pub checks: Vec<FieldCheck>,
}

impl CatalogFile {
    /// Parse a CatalogFile from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize the CatalogFile to YAML string
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Validator running a list of field checks against resource properties
#[derive(Debug, Clone)]
pub struct DeclarativeValidator {
    checks: Vec<FieldCheck>,
}

impl ResourceValidator for DeclarativeValidator {
    fn validate(
        &self,
        resource: &Resource,
        args: &PolicyArgs,
        sink: &mut ViolationSink,
    ) -> Result<(), RuleError> {
        for check in &self.checks {
            for message in check.check(&resource.properties, args)? {
                sink.report(message);
            }
        }
        Ok(())
    }
}

impl PolicyDefinition {
    /// Compile the definition into a descriptor, validating every check.
    ///
    /// A parameter feeding a `matches` check is marked as a regex, so
    /// overrides with a malformed pattern fail when configuration resolves.
    pub fn into_descriptor(self) -> Result<PolicyDescriptor, CatalogError> {
        let invalid = |reason: String| CatalogError::InvalidCheck {
            policy: self.name.clone(),
            reason,
        };

        if self.checks.is_empty() {
            return Err(invalid("at least one check is required".to_string()));
        }
        let mut schema = self.config_schema;
        let mut checks = Vec::with_capacity(self.checks.len());
        for check in self.checks {
            let check = check.compile().map_err(&invalid)?;
            if let Some(param) = check.param() {
                let spec = schema
                    .as_mut()
                    .and_then(|schema| schema.params.get_mut(param))
                    .ok_or_else(|| {
                        invalid(format!(
                            "check on '{}' references undeclared parameter '{param}'",
                            check.field
                        ))
                    })?;
                if !check.operator.accepts(spec.kind) {
                    return Err(invalid(format!(
                        "operator {:?} on '{}' cannot take {} parameter '{param}'",
                        check.operator,
                        check.field,
                        spec.kind.as_str()
                    )));
                }
                if check.operator == Operator::Matches {
                    spec.format = Some(ParamFormat::Regex);
                }
            }
            checks.push(check);
        }

        let filter = if self.resource_types.is_empty() {
            ResourceFilter::Any
        } else {
            ResourceFilter::any_of(self.resource_types)
        };
        let mut builder = PolicyDescriptor::builder(self.name)
            .description(self.description.unwrap_or_default())
            .enforcement_level(self.enforcement_level)
            .severity(self.severity)
            .vendors(self.vendors)
            .services(self.services)
            .topics(self.topics)
            .frameworks(self.frameworks)
            .resource_filter(filter)
            .validate_with(DeclarativeValidator { checks });
        if let Some(schema) = schema {
            builder = builder.config_schema(schema);
        }
        Ok(builder.build()?)
    }
}

/// Register every policy of a catalog YAML document, in file order
pub fn load_catalog(
    registry: &mut PolicyRegistry,
    yaml: &str,
) -> Result<Vec<PolicyHandle>, CatalogError> {
    let catalog = CatalogFile::from_yaml(yaml)?;
    let mut handles = Vec::with_capacity(catalog.policies.len());
    for definition in catalog.policies {
        handles.push(registry.register(definition.into_descriptor()?)?);
    }
    info!(
        version = %catalog.version,
        policies = handles.len(),
        "loaded policy catalog"
    );
    Ok(handles)
}
