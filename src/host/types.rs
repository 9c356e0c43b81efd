use serde::{Deserialize, Serialize};

use crate::policy::metadata::Severity;
use crate::policy::violation::{Finding, FindingKind};

/// One infrastructure resource supplied by the host traversal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Unique resource identifier within the plan
    pub urn: String,
    /// Provider type token, e.g. `aws:s3/bucket:Bucket`
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl Resource {
    pub fn new(
        urn: impl Into<String>,
        resource_type: impl Into<String>,
        properties: serde_json::Value,
    ) -> Self {
        let urn = urn.into();
        let name = urn.rsplit("::").next().unwrap_or_default().to_string();
        Self {
            urn,
            resource_type: resource_type.into(),
            name,
            properties,
        }
    }

    /// Look up a property by dotted path (`a.b.c`)
    pub fn property(&self, path: &str) -> Option<&serde_json::Value> {
        path.split('.')
            .try_fold(&self.properties, |v, key| v.get(key))
    }
}

/// A batch of resources to analyze
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub resources: Vec<Resource>,
}

/// One finding as surfaced to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub policy_name: String,
    pub severity: Severity,
    pub enforcement_level: crate::policy::metadata::EnforcementLevel,
    pub message: String,
    pub urn: String,
    pub kind: FindingKind,
}

impl From<Finding> for Diagnostic {
    fn from(finding: Finding) -> Self {
        Self {
            policy_name: finding.policy_name,
            severity: finding.severity,
            enforcement_level: finding.enforcement_level,
            message: finding.message,
            urn: finding.resource_urn,
            kind: finding.kind,
        }
    }
}

/// Counts reported alongside the diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeSummary {
    pub resources: usize,
    pub policies: usize,
    pub violations: usize,
    pub mandatory_violations: usize,
    pub rule_errors: usize,
}

/// Result of analyzing a batch of resources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub diagnostics: Vec<Diagnostic>,
    pub summary: AnalyzeSummary,
}

impl AnalyzeResponse {
    /// Whether any mandatory violation was reported
    pub fn is_blocking(&self) -> bool {
        self.summary.mandatory_violations > 0
    }
}
