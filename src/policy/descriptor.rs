// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 CAB Ingénierie / Christophe ABOULICAM
//! Policy descriptors
//!
//! A descriptor binds identity and classification metadata to the callback
//! that inspects one kind of resource. Descriptors are immutable once built.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::host::Resource;
use crate::policy::metadata::{normalize_tag, EnforcementLevel, PolicyTags, Severity};
use crate::policy::resolver::PolicyArgs;
use crate::policy::schema::ConfigSchema;
use crate::policy::violation::{RuleError, ViolationSink};

// =============================================================================
// Validator Trait
// =============================================================================

/// Callback that inspects one resource and reports violations.
///
/// Implementations must be thread-safe (Send + Sync) so the dispatcher can
/// evaluate policies concurrently.
pub trait ResourceValidator: Send + Sync {
    /// Inspect `resource`, calling `sink.report` once per violation.
    fn validate(
        &self,
        resource: &Resource,
        args: &PolicyArgs,
        sink: &mut ViolationSink,
    ) -> Result<(), RuleError>;
}

impl<F> ResourceValidator for F
where
    F: Fn(&Resource, &PolicyArgs, &mut ViolationSink) -> Result<(), RuleError> + Send + Sync,
{
    fn validate(
        &self,
        resource: &Resource,
        args: &PolicyArgs,
        sink: &mut ViolationSink,
    ) -> Result<(), RuleError> {
        self(resource, args, sink)
    }
}

// =============================================================================
// Resource Filter
// =============================================================================

/// Which resource kinds a policy inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "match", content = "types")]
pub enum ResourceFilter {
    /// Every resource
    Any,
    /// Resources whose type token is in the set
    Types(BTreeSet<String>),
}

impl ResourceFilter {
    pub fn of_type(resource_type: impl Into<String>) -> Self {
        ResourceFilter::Types(BTreeSet::from([resource_type.into()]))
    }

    pub fn any_of<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ResourceFilter::Types(types.into_iter().map(Into::into).collect())
    }

    /// Check if this filter applies to the given resource type
    pub fn matches(&self, resource_type: &str) -> bool {
        match self {
            ResourceFilter::Any => true,
            ResourceFilter::Types(types) => types.contains(resource_type),
        }
    }
}

// =============================================================================
// Descriptor
// =============================================================================

/// One registered compliance policy.
#[derive(Clone)]
pub struct PolicyDescriptor {
    pub name: String,
    pub description: String,
    pub enforcement_level: EnforcementLevel,
    pub severity: Severity,
    pub tags: PolicyTags,
    pub config_schema: Option<ConfigSchema>,
    pub resource_filter: ResourceFilter,
    validator: Arc<dyn ResourceValidator>,
}

impl std::fmt::Debug for PolicyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyDescriptor")
            .field("name", &self.name)
            .field("enforcement_level", &self.enforcement_level)
            .field("severity", &self.severity)
            .field("tags", &self.tags)
            .field("resource_filter", &self.resource_filter)
            .finish_non_exhaustive()
    }
}

impl PolicyDescriptor {
    pub fn builder(name: impl Into<String>) -> PolicyBuilder {
        PolicyBuilder::new(name)
    }

    /// Check if this policy inspects resources of the given type
    pub fn applies_to(&self, resource: &Resource) -> bool {
        self.resource_filter.matches(&resource.resource_type)
    }

    pub(crate) fn validator(&self) -> &Arc<dyn ResourceValidator> {
        &self.validator
    }

    /// Serializable metadata view, used for listings and reports
    pub fn info(&self) -> PolicyInfo {
        PolicyInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            enforcement_level: self.enforcement_level,
            severity: self.severity,
            vendors: self.tags.vendors.iter().cloned().collect(),
            services: self.tags.services.iter().cloned().collect(),
            topics: self.tags.topics.iter().cloned().collect(),
            frameworks: self.tags.frameworks.iter().cloned().collect(),
            resource_filter: self.resource_filter.clone(),
            config_schema: self.config_schema.as_ref().map(ConfigSchema::to_json_schema),
        }
    }
}

/// Metadata of a policy without its callback
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyInfo {
    pub name: String,
    pub description: String,
    pub enforcement_level: EnforcementLevel,
    pub severity: Severity,
    pub vendors: Vec<String>,
    pub services: Vec<String>,
    pub topics: Vec<String>,
    pub frameworks: Vec<String>,
    pub resource_filter: ResourceFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<serde_json::Value>,
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`PolicyDescriptor`].
pub struct PolicyBuilder {
    name: String,
    description: String,
    enforcement_level: EnforcementLevel,
    severity: Severity,
    vendors: Vec<String>,
    services: Vec<String>,
    topics: Vec<String>,
    frameworks: Vec<String>,
    config_schema: Option<ConfigSchema>,
    resource_filter: ResourceFilter,
    validator: Option<Arc<dyn ResourceValidator>>,
}

impl PolicyBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            enforcement_level: EnforcementLevel::default(),
            severity: Severity::default(),
            vendors: Vec::new(),
            services: Vec::new(),
            topics: Vec::new(),
            frameworks: Vec::new(),
            config_schema: None,
            resource_filter: ResourceFilter::Any,
            validator: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn enforcement_level(mut self, level: EnforcementLevel) -> Self {
        self.enforcement_level = level;
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn vendors<I, S>(mut self, vendors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vendors = vendors.into_iter().map(Into::into).collect();
        self
    }

    pub fn services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services = services.into_iter().map(Into::into).collect();
        self
    }

    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn frameworks<I, S>(mut self, frameworks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.frameworks = frameworks.into_iter().map(Into::into).collect();
        self
    }

    pub fn config_schema(mut self, schema: ConfigSchema) -> Self {
        self.config_schema = Some(schema);
        self
    }

    pub fn resource_filter(mut self, filter: ResourceFilter) -> Self {
        self.resource_filter = filter;
        self
    }

    /// Restrict the policy to a single resource type
    pub fn resource_type(self, resource_type: impl Into<String>) -> Self {
        self.resource_filter(ResourceFilter::of_type(resource_type))
    }

    pub fn validate_with<V: ResourceValidator + 'static>(mut self, validator: V) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Use a closure as the validation callback
    pub fn validate_fn<F>(self, f: F) -> Self
    where
        F: Fn(&Resource, &PolicyArgs, &mut ViolationSink) -> Result<(), RuleError>
            + Send
            + Sync
            + 'static,
    {
        self.validate_with(f)
    }

    /// Validate the collected fields and produce an immutable descriptor.
    pub fn build(self) -> Result<PolicyDescriptor, RegistryError> {
        let name = self.name.trim().to_string();
        let invalid = |reason: &str| RegistryError::InvalidDescriptor {
            name: name.clone(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.vendors.is_empty() {
            return Err(invalid("at least one vendor is required"));
        }
        if self.services.is_empty() {
            return Err(invalid("at least one service is required"));
        }
        let all_tags = self
            .vendors
            .iter()
            .chain(&self.services)
            .chain(&self.topics)
            .chain(&self.frameworks);
        for tag in all_tags {
            if normalize_tag(tag).is_empty() {
                return Err(invalid("tags must not be empty strings"));
            }
        }
        if let ResourceFilter::Types(types) = &self.resource_filter {
            if types.is_empty() {
                return Err(invalid("resource type filter must name at least one type"));
            }
        }
        if let Some(schema) = &self.config_schema {
            schema.validate().map_err(|reason| invalid(&reason))?;
        }
        let validator = self
            .validator
            .ok_or_else(|| invalid("a validation callback is required"))?;

        Ok(PolicyDescriptor {
            name,
            description: self.description,
            enforcement_level: self.enforcement_level,
            severity: self.severity,
            tags: PolicyTags {
                vendors: PolicyTags::collect(&self.vendors),
                services: PolicyTags::collect(&self.services),
                topics: PolicyTags::collect(&self.topics),
                frameworks: PolicyTags::collect(&self.frameworks),
            },
            config_schema: self.config_schema,
            resource_filter: self.resource_filter,
            validator,
        })
    }
}
