// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 CAB Ingénierie / Christophe ABOULICAM
//! Error taxonomy
//!
//! Startup-phase errors (registration, query validation, configuration) are
//! fail-fast and returned to the caller. Per-resource rule failures never show
//! up here: the dispatcher turns them into findings.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while building the policy registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("policy '{0}' is already registered")]
    DuplicateName(String),
    #[error("policy '{0}' not found")]
    NotFound(String),
    #[error("invalid policy descriptor '{name}': {reason}")]
    InvalidDescriptor { name: String, reason: String },
}

/// Errors raised while validating a selection query.
#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("invalid query: unknown {dimension} value '{value}'")]
    InvalidQuery { dimension: String, value: String },
}

impl QueryError {
    pub(crate) fn invalid(dimension: &str, value: &str) -> Self {
        QueryError::InvalidQuery {
            dimension: dimension.to_string(),
            value: value.to_string(),
        }
    }
}

/// Errors raised while resolving per-policy configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config for policy '{policy}', key '{key}': {reason}")]
    InvalidConfig {
        policy: String,
        key: String,
        reason: String,
    },
    #[error("config references unknown policy '{0}'")]
    UnknownPolicy(String),
    #[error("failed to parse policy config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("failed to read policy config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(policy: &str, key: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidConfig {
            policy: policy.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Fatal errors raised by the validation dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("policy '{policy}' exceeded its {deadline:?} deadline on resource '{resource}' (took {elapsed:?})")]
    CallbackDeadlineExceeded {
        policy: String,
        resource: String,
        deadline: Duration,
        elapsed: Duration,
    },
    #[error("policy '{policy}' has no resolved configuration; call prepare() before evaluating")]
    Unprepared { policy: String },
}

/// Errors raised while loading a declarative rule catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse catalog YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid check in policy '{policy}': {reason}")]
    InvalidCheck { policy: String, reason: String },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Umbrella error for callers that drive the whole engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
