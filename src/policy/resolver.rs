// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 CAB Ingénierie / Christophe ABOULICAM
//! Configuration Resolver
//!
//! Turns descriptor defaults plus a caller-supplied configuration block into
//! the effective settings of each policy.
//!
//! Precedence (highest first):
//! 1. `policies.<name>` override block (enabled, severity, enforcementLevel, params)
//! 2. Enforcement level imposed when the policy was selected into a pack
//! 3. Descriptor defaults (enforcement level, severity, schema defaults)
//! 4. Engine defaults (enabled, no severity override)
//!
//! Everything is validated up front by [`ConfigResolver::prepare`], so a bad
//! override surfaces before the first resource is scanned.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::policy::descriptor::PolicyDescriptor;
use crate::policy::metadata::{EnforcementLevel, Severity};
use crate::policy::registry::PolicyRegistry;
use crate::policy::selection::SelectedPolicy;
use crate::policy::violation::RuleError;

const KEY_ENABLED: &str = "enabled";
const KEY_SEVERITY: &str = "severity";
const KEY_ENFORCEMENT_LEVEL: &str = "enforcementLevel";

// =============================================================================
// Raw Configuration
// =============================================================================

/// Per-policy override blocks, keyed by policy name.
///
/// Accepted shapes (YAML or JSON):
///
/// ```yaml
/// policies:
///   aws-s3-bucket-versioning:
///     enabled: false
///   kubernetes-apps-deployment-min-replicas:
///     severity: critical
///     minReplicas: 3
/// ```
///
/// The top-level `policies` key may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPolicyConfig {
    policies: BTreeMap<String, BTreeMap<String, Value>>,
}

impl RawPolicyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a RawPolicyConfig from a YAML (or JSON) string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Build from an already-parsed JSON value
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let root = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(mut map) => match map.remove("policies") {
                Some(Value::Object(policies)) if map.is_empty() => policies,
                Some(Value::Null) if map.is_empty() => return Ok(Self::default()),
                Some(other) => {
                    map.insert("policies".to_string(), other);
                    map
                }
                None => map,
            },
            _ => {
                return Err(ConfigError::invalid(
                    "*",
                    "policies",
                    "expected a mapping of policy names to settings",
                ))
            }
        };

        let mut policies = BTreeMap::new();
        for (name, block) in root {
            let settings = settings_block(&name, block)?;
            policies.insert(name, settings);
        }
        Ok(Self { policies })
    }

    /// Set one override block, replacing any previous one for `name`.
    ///
    /// `settings` must be a mapping, or null for an empty block.
    pub fn with_policy(
        mut self,
        name: impl Into<String>,
        settings: Value,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let settings = settings_block(&name, settings)?;
        self.policies.insert(name, settings);
        Ok(self)
    }

    /// Layer `other` on top of this config; keys in `other` win.
    pub fn merge(&mut self, other: RawPolicyConfig) {
        for (name, settings) in other.policies {
            self.policies.entry(name).or_default().extend(settings);
        }
    }

    pub fn get(&self, name: &str) -> Option<&BTreeMap<String, Value>> {
        self.policies.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

fn settings_block(name: &str, block: Value) -> Result<BTreeMap<String, Value>, ConfigError> {
    match block {
        Value::Object(settings) => Ok(settings.into_iter().collect()),
        Value::Null => Ok(BTreeMap::new()),
        _ => Err(ConfigError::invalid(
            name,
            "*",
            "expected a mapping of settings",
        )),
    }
}

// =============================================================================
// Effective Configuration
// =============================================================================

/// Resolved settings of one policy for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectivePolicyConfig {
    pub enabled: bool,
    pub enforcement_level: EnforcementLevel,
    /// Severity findings are reported with
    pub severity: Severity,
    /// Set when configuration replaced the descriptor's severity
    pub severity_override: Option<Severity>,
    pub parameters: BTreeMap<String, Value>,
}

/// Arguments handed to a validation callback.
#[derive(Debug, Clone)]
pub struct PolicyArgs {
    pub policy_name: String,
    pub config: Arc<EffectivePolicyConfig>,
}

impl PolicyArgs {
    pub fn new(policy_name: impl Into<String>, config: Arc<EffectivePolicyConfig>) -> Self {
        Self {
            policy_name: policy_name.into(),
            config,
        }
    }

    /// Get a raw parameter value
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.config.parameters.get(key)
    }

    /// Get a parameter deserialized into `T`
    pub fn param_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, RuleError> {
        let value = self
            .param(key)
            .ok_or_else(|| RuleError::new(format!("parameter '{key}' is not set")))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn severity(&self) -> Severity {
        self.config.severity
    }

    pub fn enforcement_level(&self) -> EnforcementLevel {
        self.config.enforcement_level
    }

    pub fn should_eval(&self) -> bool {
        should_eval_policy(self)
    }
}

/// The single gate consulted before any rule logic runs.
///
/// Returns false for a policy whose effective configuration is disabled.
pub fn should_eval_policy(args: &PolicyArgs) -> bool {
    args.config.enabled
}

/// Resolve the effective configuration of one policy.
pub fn resolve(
    descriptor: &PolicyDescriptor,
    raw: &RawPolicyConfig,
    selection_override: Option<EnforcementLevel>,
) -> Result<EffectivePolicyConfig, ConfigError> {
    let name = descriptor.name.as_str();
    let empty = BTreeMap::new();
    let block = raw.get(name).unwrap_or(&empty);

    let mut enabled_override = None;
    let mut severity_override = None;
    let mut level_override = None;
    let mut supplied = BTreeMap::new();

    for (key, value) in block {
        match key.as_str() {
            KEY_ENABLED => {
                enabled_override = Some(
                    value
                        .as_bool()
                        .ok_or_else(|| ConfigError::invalid(name, key, "expected boolean"))?,
                );
            }
            KEY_SEVERITY => {
                severity_override = Some(
                    value
                        .as_str()
                        .and_then(Severity::parse)
                        .ok_or_else(|| {
                            ConfigError::invalid(
                                name,
                                key,
                                "expected one of low, medium, high, critical",
                            )
                        })?,
                );
            }
            KEY_ENFORCEMENT_LEVEL => {
                level_override = Some(
                    value
                        .as_str()
                        .and_then(EnforcementLevel::parse)
                        .ok_or_else(|| {
                            ConfigError::invalid(
                                name,
                                key,
                                "expected one of advisory, mandatory, disabled",
                            )
                        })?,
                );
            }
            _ => {
                supplied.insert(key.clone(), value.clone());
            }
        }
    }

    let parameters = match &descriptor.config_schema {
        Some(schema) => schema.apply(name, &supplied)?,
        None => {
            if let Some(key) = supplied.keys().next() {
                return Err(ConfigError::invalid(
                    name,
                    key,
                    "policy does not accept parameters",
                ));
            }
            BTreeMap::new()
        }
    };

    let mut enforcement_level = level_override
        .or(selection_override)
        .unwrap_or(descriptor.enforcement_level);
    let enabled = enabled_override.unwrap_or(!enforcement_level.is_disabled());
    if enabled && enforcement_level.is_disabled() {
        enforcement_level = EnforcementLevel::Advisory;
    } else if !enabled {
        enforcement_level = EnforcementLevel::Disabled;
    }

    Ok(EffectivePolicyConfig {
        enabled,
        enforcement_level,
        severity: severity_override.unwrap_or(descriptor.severity),
        severity_override,
        parameters,
    })
}

// =============================================================================
// Resolver
// =============================================================================

/// Resolves and caches effective configuration for a run.
///
/// The cache is shared read-only once filled; resolution is idempotent, so
/// concurrent misses only duplicate work.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    raw: RawPolicyConfig,
    cache: RwLock<HashMap<String, Arc<EffectivePolicyConfig>>>,
}

impl ConfigResolver {
    pub fn new(raw: RawPolicyConfig) -> Self {
        Self {
            raw,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn raw(&self) -> &RawPolicyConfig {
        &self.raw
    }

    /// Resolve every selected policy and reject overrides naming policies the
    /// registry does not know.
    pub fn prepare(
        &self,
        registry: &PolicyRegistry,
        selected: &[SelectedPolicy],
    ) -> Result<(), ConfigError> {
        if let Some(unknown) = self.raw.names().find(|name| !registry.contains(name)) {
            return Err(ConfigError::UnknownPolicy(unknown.to_string()));
        }

        let mut disabled = 0;
        for policy in selected {
            let config = self.resolve_selected(policy)?;
            if !config.enabled {
                disabled += 1;
            }
        }
        info!(
            policies = selected.len(),
            disabled,
            overrides = self.raw.policies.len(),
            "policy configuration resolved"
        );
        Ok(())
    }

    /// Resolve one selected policy, consulting the cache first
    pub fn resolve_selected(
        &self,
        policy: &SelectedPolicy,
    ) -> Result<Arc<EffectivePolicyConfig>, ConfigError> {
        let name = policy.handle.name();
        if let Some(config) = self.cached(name) {
            return Ok(config);
        }

        let config = Arc::new(resolve(
            &policy.handle,
            &self.raw,
            policy.enforcement_override,
        )?);
        debug!(
            policy = %name,
            enabled = config.enabled,
            severity = %config.severity,
            enforcement = %config.enforcement_level,
            "resolved policy config"
        );
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::clone(&config));
        Ok(config)
    }

    /// Previously resolved configuration, if any
    pub fn cached(&self, name: &str) -> Option<Arc<EffectivePolicyConfig>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}
