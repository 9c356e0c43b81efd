// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 CAB Ingénierie / Christophe ABOULICAM
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::metadata::{EnforcementLevel, Severity};

/// What produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FindingKind {
    /// The rule reported a non-compliance
    Violation,
    /// The rule itself failed (returned an error or panicked)
    RuleEvaluationError,
}

/// One reported non-compliance instance, tagged with the policy that raised it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub policy_name: String,
    pub severity: Severity,
    pub enforcement_level: EnforcementLevel,
    pub resource_urn: String,
    pub message: String,
    pub kind: FindingKind,
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.kind {
            FindingKind::Violation => "violation",
            FindingKind::RuleEvaluationError => "rule error",
        };
        write!(
            f,
            "[{}/{}] {} {} on '{}': {}",
            self.severity,
            self.enforcement_level,
            self.policy_name,
            label,
            self.resource_urn,
            self.message
        )
    }
}

/// Error returned by a rule callback that could not complete its check
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RuleError {
    pub message: String,
}

impl RuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for RuleError {
    fn from(err: serde_json::Error) -> Self {
        RuleError::new(err.to_string())
    }
}

/// Collects the messages a rule reports for one resource.
///
/// Reporting never stops the callback; every call records one violation, in
/// call order.
#[derive(Debug, Default)]
pub struct ViolationSink {
    messages: Vec<String>,
}

impl ViolationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report one violation
    pub fn report(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub(crate) fn into_messages(self) -> Vec<String> {
        self.messages
    }
}
