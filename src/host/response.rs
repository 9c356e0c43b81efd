use super::types::{AnalyzeResponse, AnalyzeSummary, Diagnostic};
use crate::policy::metadata::EnforcementLevel;
use crate::policy::violation::{Finding, FindingKind};

/// Builder for assembling an analyzer response across resources
#[derive(Debug, Default)]
pub struct ResponseBuilder {
    diagnostics: Vec<Diagnostic>,
    summary: AnalyzeSummary,
}

impl ResponseBuilder {
    /// Create a new response builder
    pub fn new(policies: usize) -> Self {
        Self {
            diagnostics: Vec::new(),
            summary: AnalyzeSummary {
                policies,
                ..AnalyzeSummary::default()
            },
        }
    }

    /// Record that one more resource was analyzed
    pub fn resource(mut self, findings: Vec<Finding>) -> Self {
        self.summary.resources += 1;
        for finding in findings {
            match finding.kind {
                FindingKind::Violation => {
                    self.summary.violations += 1;
                    if finding.enforcement_level == EnforcementLevel::Mandatory {
                        self.summary.mandatory_violations += 1;
                    }
                }
                FindingKind::RuleEvaluationError => self.summary.rule_errors += 1,
            }
            self.diagnostics.push(finding.into());
        }
        self
    }

    /// Build the final AnalyzeResponse
    pub fn build(self) -> AnalyzeResponse {
        AnalyzeResponse {
            diagnostics: self.diagnostics,
            summary: self.summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::metadata::Severity;

    fn finding(kind: FindingKind, level: EnforcementLevel) -> Finding {
        Finding {
            policy_name: "p".to_string(),
            severity: Severity::High,
            enforcement_level: level,
            resource_urn: "r".to_string(),
            message: "m".to_string(),
            kind,
        }
    }

    #[test]
    fn test_summary_counts() {
        let response = ResponseBuilder::new(3)
            .resource(vec![
                finding(FindingKind::Violation, EnforcementLevel::Mandatory),
                finding(FindingKind::Violation, EnforcementLevel::Advisory),
            ])
            .resource(vec![finding(
                FindingKind::RuleEvaluationError,
                EnforcementLevel::Advisory,
            )])
            .build();

        assert_eq!(response.summary.resources, 2);
        assert_eq!(response.summary.policies, 3);
        assert_eq!(response.summary.violations, 2);
        assert_eq!(response.summary.mandatory_violations, 1);
        assert_eq!(response.summary.rule_errors, 1);
        assert_eq!(response.diagnostics.len(), 3);
        assert!(response.is_blocking());
    }

    #[test]
    fn test_empty_response_not_blocking() {
        let response = ResponseBuilder::new(0).build();
        assert!(!response.is_blocking());
        assert!(response.diagnostics.is_empty());
    }
}
