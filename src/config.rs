// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 CAB Ingénierie / Christophe ABOULICAM
use serde::{Deserialize, Deserializer};
use std::time::Duration;

use crate::error::ConfigError;
use crate::policy::resolver::RawPolicyConfig;

/// Prefix shared by every environment variable the engine reads
pub const ENV_PREFIX: &str = "COMPLIANCE_";

/// Settings loaded from environment variables.
///
/// Every variable carries the `COMPLIANCE_` prefix, for example
/// `COMPLIANCE_LOG_LEVEL` or `COMPLIANCE_CALLBACK_DEADLINE_MS`.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Log level (default: info)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: "json" or "pretty" (default: pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Per-callback deadline in milliseconds (default: 5000, must be positive)
    #[serde(
        default = "default_callback_deadline_ms",
        deserialize_with = "deserialize_nonzero_millis"
    )]
    pub callback_deadline_ms: u64,

    /// YAML or JSON file holding per-policy overrides
    #[serde(default)]
    pub policy_config_file: Option<String>,

    /// Inline YAML or JSON overrides, layered on top of the file
    #[serde(default)]
    pub policy_config: Option<String>,

    /// Declarative rule catalog registered next to the built-in rules
    #[serde(default)]
    pub catalog_file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_callback_deadline_ms() -> u64 {
    5000
}

fn deserialize_nonzero_millis<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    if millis == 0 {
        return Err(serde::de::Error::custom(
            "callback deadline must be at least 1 millisecond",
        ));
    }
    Ok(millis)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            callback_deadline_ms: default_callback_deadline_ms(),
            policy_config_file: None,
            policy_config: None,
            catalog_file: None,
        }
    }
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed(ENV_PREFIX).from_env()
    }

    /// Load settings from an explicit set of variables.
    pub fn from_vars<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX).from_iter(vars)
    }

    pub fn callback_deadline(&self) -> Duration {
        Duration::from_millis(self.callback_deadline_ms)
    }

    /// Per-policy overrides: the config file first, then the inline config.
    pub fn policy_overrides(&self) -> Result<RawPolicyConfig, ConfigError> {
        let mut raw = match &self.policy_config_file {
            Some(path) => {
                let contents =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                        path: path.clone(),
                        source,
                    })?;
                RawPolicyConfig::from_yaml(&contents)?
            }
            None => RawPolicyConfig::default(),
        };
        if let Some(inline) = &self.policy_config {
            raw.merge(RawPolicyConfig::from_yaml(inline)?);
        }
        Ok(raw)
    }
}
