// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 CAB Ingénierie / Christophe ABOULICAM
//! Policy metadata model
//!
//! Identity and classification tags attached to every registered policy:
//! - Severity (low < medium < high < critical)
//! - Enforcement level (advisory / mandatory / disabled)
//! - Tag sets over vendors, services, topics and frameworks

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// Severity
// =============================================================================

/// Ordinal severity of a policy violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// Parse a severity from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Medium
    }
}

// =============================================================================
// Enforcement Level
// =============================================================================

/// Action taken when a policy reports a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementLevel {
    /// Violation is reported but does not block
    Advisory,
    /// Violation blocks the deployment
    Mandatory,
    /// Policy does not run
    Disabled,
}

impl EnforcementLevel {
    /// Parse an enforcement level from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "advisory" => Some(EnforcementLevel::Advisory),
            "mandatory" => Some(EnforcementLevel::Mandatory),
            "disabled" => Some(EnforcementLevel::Disabled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EnforcementLevel::Advisory => "advisory",
            EnforcementLevel::Mandatory => "mandatory",
            EnforcementLevel::Disabled => "disabled",
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, EnforcementLevel::Disabled)
    }
}

impl std::fmt::Display for EnforcementLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for EnforcementLevel {
    fn default() -> Self {
        EnforcementLevel::Advisory
    }
}

// =============================================================================
// Tags
// =============================================================================

/// Tag dimensions a selection query can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Vendor,
    Service,
    Severity,
    Topic,
    Framework,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Vendor => "vendor",
            Dimension::Service => "service",
            Dimension::Severity => "severity",
            Dimension::Topic => "topic",
            Dimension::Framework => "framework",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a free-form tag: trimmed and lowercased.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// Classification tags carried by a policy.
///
/// Tags are stored normalized, so `"AWS"` and `"aws"` are the same vendor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTags {
    pub vendors: BTreeSet<String>,
    pub services: BTreeSet<String>,
    #[serde(default)]
    pub topics: BTreeSet<String>,
    #[serde(default)]
    pub frameworks: BTreeSet<String>,
}

impl PolicyTags {
    /// Tag values for a free-form dimension. `Severity` has no tag set.
    pub fn values(&self, dimension: Dimension) -> Option<&BTreeSet<String>> {
        match dimension {
            Dimension::Vendor => Some(&self.vendors),
            Dimension::Service => Some(&self.services),
            Dimension::Topic => Some(&self.topics),
            Dimension::Framework => Some(&self.frameworks),
            Dimension::Severity => None,
        }
    }

    pub(crate) fn collect<I, S>(values: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        values
            .into_iter()
            .map(|v| normalize_tag(v.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parse_case_insensitive() {
        assert_eq!(Severity::parse("CRITICAL"), Some(Severity::Critical));
        assert_eq!(Severity::parse(" low "), Some(Severity::Low));
        assert_eq!(Severity::parse("urgent"), None);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::ALL.iter().max(), Some(&Severity::Critical));
    }

    #[test]
    fn test_severity_serde() {
        let json = serde_json::to_string(&Severity::High).unwrap();
        assert_eq!(json, "\"high\"");
        let parsed: Severity = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(parsed, Severity::Critical);
    }

    #[test]
    fn test_enforcement_level_parse() {
        assert_eq!(
            EnforcementLevel::parse("Mandatory"),
            Some(EnforcementLevel::Mandatory)
        );
        assert!(EnforcementLevel::parse("disabled").unwrap().is_disabled());
        assert_eq!(EnforcementLevel::parse("warn"), None);
        assert_eq!(EnforcementLevel::default(), EnforcementLevel::Advisory);
    }

    #[test]
    fn test_tags_are_normalized() {
        let set = PolicyTags::collect(["AWS", " aws", "S3"]);
        assert_eq!(set.len(), 2);
        assert!(set.contains("aws"));
        assert!(set.contains("s3"));
    }

    #[test]
    fn test_severity_dimension_has_no_tag_set() {
        let tags = PolicyTags::default();
        assert!(tags.values(Dimension::Severity).is_none());
        assert!(tags.values(Dimension::Topic).is_some());
    }
}
