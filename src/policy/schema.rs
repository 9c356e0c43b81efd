// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 CAB Ingénierie / Christophe ABOULICAM
//! Rule-specific tunables
//!
//! A policy may declare the parameters it accepts. Caller-supplied values are
//! checked against this schema before any resource is evaluated.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::ConfigError;

/// Value type accepted by a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamKind {
    Boolean,
    Integer,
    Number,
    String,
    StringArray,
    Array,
    Object,
}

impl ParamKind {
    /// Check if a JSON value has this kind
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Number => value.is_number(),
            ParamKind::String => value.is_string(),
            ParamKind::StringArray => value
                .as_array()
                .map(|items| items.iter().all(Value::is_string))
                .unwrap_or(false),
            ParamKind::Array => value.is_array(),
            ParamKind::Object => value.is_object(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Boolean => "boolean",
            ParamKind::Integer => "integer",
            ParamKind::Number => "number",
            ParamKind::String => "string",
            ParamKind::StringArray => "string array",
            ParamKind::Array => "array",
            ParamKind::Object => "object",
        }
    }

    fn json_schema(&self) -> Value {
        match self {
            ParamKind::StringArray => serde_json::json!({
                "type": "array",
                "items": { "type": "string" }
            }),
            other => serde_json::json!({ "type": other.as_str() }),
        }
    }
}

/// Extra constraint on a string parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamFormat {
    /// Value must compile as a regular expression
    Regex,
}

impl ParamFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamFormat::Regex => "regex",
        }
    }
}

/// Declaration of a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub kind: ParamKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ParamFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParamSpec {
    /// A parameter that must be supplied by configuration.
    pub fn required(kind: ParamKind) -> Self {
        Self {
            kind,
            required: true,
            format: None,
            default: None,
            description: None,
        }
    }

    /// An optional parameter falling back to `default`.
    pub fn optional(kind: ParamKind, default: impl Into<Value>) -> Self {
        Self {
            kind,
            required: false,
            format: None,
            default: Some(default.into()),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_format(mut self, format: ParamFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Check one value against the declared kind and format
    pub fn check(&self, value: &Value) -> Result<(), String> {
        if !self.kind.matches(value) {
            return Err(format!(
                "expected {}, got {}",
                self.kind.as_str(),
                describe(value)
            ));
        }
        match (self.format, value) {
            (Some(ParamFormat::Regex), Value::String(pattern)) => Regex::new(pattern)
                .map(|_| ())
                .map_err(|e| format!("invalid pattern: {e}")),
            (Some(ParamFormat::Regex), _) => Err("expected a string pattern".to_string()),
            (None, _) => Ok(()),
        }
    }
}

/// Parameters a policy accepts, keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigSchema {
    pub params: BTreeMap<String, ParamSpec>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter declaration
    pub fn param(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.params.insert(name.into(), spec);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Check the declarations themselves: formats fit their kind and every
    /// default is a valid value for its parameter.
    pub fn validate(&self) -> Result<(), String> {
        for (key, spec) in &self.params {
            if let Some(format) = spec.format {
                if spec.kind != ParamKind::String {
                    return Err(format!(
                        "parameter '{key}': {} format requires a string parameter",
                        format.as_str()
                    ));
                }
            }
            if let Some(default) = &spec.default {
                spec.check(default)
                    .map_err(|reason| format!("default of parameter '{key}': {reason}"))?;
            }
        }
        Ok(())
    }

    /// Validate supplied parameters and fill in schema defaults.
    ///
    /// Unknown keys, type mismatches, malformed patterns and missing required
    /// parameters are reported against `policy` with the offending key.
    pub fn apply(
        &self,
        policy: &str,
        supplied: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, ConfigError> {
        for (key, value) in supplied {
            let spec = self
                .params
                .get(key)
                .ok_or_else(|| ConfigError::invalid(policy, key, "unknown parameter"))?;
            spec.check(value)
                .map_err(|reason| ConfigError::invalid(policy, key, reason))?;
        }

        let mut resolved = BTreeMap::new();
        for (key, spec) in &self.params {
            match (supplied.get(key), &spec.default) {
                (Some(value), _) => {
                    resolved.insert(key.clone(), value.clone());
                }
                (None, Some(default)) => {
                    resolved.insert(key.clone(), default.clone());
                }
                (None, None) if spec.required => {
                    return Err(ConfigError::invalid(
                        policy,
                        key,
                        "required parameter is missing",
                    ));
                }
                (None, None) => {}
            }
        }
        Ok(resolved)
    }

    /// Render the schema as a JSON Schema object
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (name, spec) in &self.params {
            let mut prop = spec.kind.json_schema();
            if let Value::Object(obj) = &mut prop {
                if let Some(format) = spec.format {
                    obj.insert("format".to_string(), Value::from(format.as_str()));
                }
                if let Some(default) = &spec.default {
                    obj.insert("default".to_string(), default.clone());
                }
                if let Some(description) = &spec.description {
                    obj.insert("description".to_string(), Value::from(description.clone()));
                }
            }
            properties.insert(name.clone(), prop);
            if spec.required {
                required.push(Value::from(name.clone()));
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
