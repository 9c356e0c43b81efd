// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 CAB Ingénierie / Christophe ABOULICAM
//! Validation Dispatcher
//!
//! Drives the selected policies over one resource at a time:
//!
//! ```text
//! Pending -> Matching -> Evaluating -> Done
//! ```
//!
//! - Matching: policies whose resource filter does not match are skipped
//! - Evaluating: the configuration gate runs before any callback; disabled
//!   policies never reach their callback
//! - A callback that errors or panics yields one `RuleEvaluationError`
//!   finding and never stops the other policies
//! - A callback exceeding the deadline is fatal for the run; both paths stop
//!   waiting at the deadline instead of when the callback returns

use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, trace, warn};

use crate::error::{ConfigError, DispatchError};
use crate::host::Resource;
use crate::policy::descriptor::PolicyDescriptor;
use crate::policy::registry::PolicyRegistry;
use crate::policy::resolver::{should_eval_policy, ConfigResolver, EffectivePolicyConfig, PolicyArgs};
use crate::policy::selection::SelectedPolicy;
use crate::policy::violation::{Finding, FindingKind, ViolationSink};

/// Default per-callback deadline
pub const DEFAULT_CALLBACK_DEADLINE: Duration = Duration::from_secs(5);

// =============================================================================
// Reports
// =============================================================================

/// Progress of one resource through the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationState {
    Pending,
    Matching,
    Evaluating,
    Done,
}

/// What happened to one policy on one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum PolicyOutcome {
    /// Resource type not inspected by this policy
    NotApplicable,
    /// Configuration gate returned false
    Disabled,
    /// Callback ran to completion
    Evaluated { violations: usize },
    /// Callback returned an error or panicked
    Failed { error: String },
}

/// Per-policy entry in a resource report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResult {
    pub policy_name: String,
    #[serde(flatten)]
    pub outcome: PolicyOutcome,
}

/// Everything the dispatcher learned about one resource.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReport {
    pub urn: String,
    pub state: EvaluationState,
    /// Findings in selection order, then report order within a policy
    pub findings: Vec<Finding>,
    pub results: Vec<PolicyResult>,
}

impl ResourceReport {
    fn new(resource: &Resource) -> Self {
        Self {
            urn: resource.urn.clone(),
            state: EvaluationState::Pending,
            findings: Vec::new(),
            results: Vec::new(),
        }
    }

    fn advance(&mut self, state: EvaluationState) {
        trace!(resource = %self.urn, from = ?self.state, to = ?state, "evaluation state");
        self.state = state;
    }

    pub fn violations(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.kind == FindingKind::Violation)
    }
}

// =============================================================================
// Callback Execution
// =============================================================================

/// Raw result of invoking one callback.
struct CallbackRun {
    messages: Vec<String>,
    failure: Option<String>,
    elapsed: Duration,
}

impl CallbackRun {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            failure: Some(error.into()),
            elapsed: Duration::ZERO,
        }
    }
}

fn run_callback(descriptor: &PolicyDescriptor, resource: &Resource, args: &PolicyArgs) -> CallbackRun {
    let mut sink = ViolationSink::new();
    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        descriptor.validator().validate(resource, args, &mut sink)
    }));
    let elapsed = started.elapsed();

    let failure = match result {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err.message),
        Err(payload) => Some(panic_message(payload.as_ref())),
    };
    CallbackRun {
        messages: sink.into_messages(),
        failure,
        elapsed,
    }
}

/// Run one callback on its own thread and wait at most `deadline` for it.
///
/// Returns `Err(elapsed)` on overrun. The worker is detached and its result
/// is dropped once it finishes.
fn run_bounded(
    descriptor: &Arc<PolicyDescriptor>,
    resource: &Arc<Resource>,
    args: &PolicyArgs,
    deadline: Duration,
) -> Result<CallbackRun, Duration> {
    let (tx, rx) = mpsc::sync_channel(1);
    let worker = {
        let descriptor = Arc::clone(descriptor);
        let resource = Arc::clone(resource);
        let args = args.clone();
        move || {
            // receiver is gone after an overrun
            let _ = tx.send(run_callback(&descriptor, &resource, &args));
        }
    };

    let started = Instant::now();
    if let Err(err) = thread::Builder::new()
        .name(format!("policy-{}", descriptor.name))
        .spawn(worker)
    {
        return Ok(CallbackRun::failed(format!("failed to start rule worker: {err}")));
    }
    match rx.recv_timeout(deadline) {
        Ok(run) => Ok(run),
        Err(RecvTimeoutError::Timeout) => Err(started.elapsed()),
        Err(RecvTimeoutError::Disconnected) => {
            Ok(CallbackRun::failed("rule worker exited without a result"))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("rule panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("rule panicked: {message}")
    } else {
        "rule panicked".to_string()
    }
}

fn finding(
    policy: &str,
    config: &EffectivePolicyConfig,
    resource: &Resource,
    message: String,
    kind: FindingKind,
) -> Finding {
    Finding {
        policy_name: policy.to_string(),
        severity: config.severity,
        enforcement_level: config.enforcement_level,
        resource_urn: resource.urn.clone(),
        message,
        kind,
    }
}

/// Convert a callback run into findings and an outcome.
fn collect(
    policy: &str,
    config: &EffectivePolicyConfig,
    resource: &Resource,
    run: CallbackRun,
    findings: &mut Vec<Finding>,
) -> PolicyOutcome {
    let violations = run.messages.len();
    findings.extend(
        run.messages
            .into_iter()
            .map(|m| finding(policy, config, resource, m, FindingKind::Violation)),
    );
    match run.failure {
        None => PolicyOutcome::Evaluated { violations },
        Some(error) => {
            warn!(policy = %policy, resource = %resource.urn, error = %error, "policy evaluation failed");
            findings.push(finding(
                policy,
                config,
                resource,
                error.clone(),
                FindingKind::RuleEvaluationError,
            ));
            PolicyOutcome::Failed { error }
        }
    }
}

/// Run of a concurrent task whose result never came back
fn cancelled_run() -> CallbackRun {
    CallbackRun::failed("rule task was cancelled")
}

/// Per-policy state while a resource is evaluated concurrently.
enum Slot {
    Done(PolicyOutcome),
    Running(Arc<EffectivePolicyConfig>),
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Runs a fixed, configured policy set against resources.
pub struct Dispatcher {
    policies: Vec<SelectedPolicy>,
    resolver: Arc<ConfigResolver>,
    deadline: Duration,
}

impl Dispatcher {
    /// Create a dispatcher, resolving every policy's configuration up front.
    ///
    /// Configuration errors surface here, before any resource is scanned.
    pub fn new(
        registry: &PolicyRegistry,
        policies: Vec<SelectedPolicy>,
        resolver: Arc<ConfigResolver>,
    ) -> Result<Self, ConfigError> {
        resolver.prepare(registry, &policies)?;
        Ok(Self {
            policies,
            resolver,
            deadline: DEFAULT_CALLBACK_DEADLINE,
        })
    }

    /// Set the per-callback deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn policies(&self) -> &[SelectedPolicy] {
        &self.policies
    }

    fn config_for(&self, policy: &SelectedPolicy) -> Result<Arc<EffectivePolicyConfig>, DispatchError> {
        self.resolver
            .cached(policy.handle.name())
            .ok_or_else(|| DispatchError::Unprepared {
                policy: policy.handle.name().to_string(),
            })
    }

    fn deadline_exceeded(&self, policy: &str, resource: &Resource, elapsed: Duration) -> DispatchError {
        error!(
            policy = %policy,
            resource = %resource.urn,
            elapsed_ms = elapsed.as_millis() as u64,
            "policy exceeded callback deadline"
        );
        DispatchError::CallbackDeadlineExceeded {
            policy: policy.to_string(),
            resource: resource.urn.clone(),
            deadline: self.deadline,
            elapsed,
        }
    }

    /// Evaluate every selected policy against one resource, in selection order.
    ///
    /// Each callback runs on a worker thread. Waiting stops at the deadline,
    /// so a hung callback fails the run instead of blocking it.
    pub fn evaluate(&self, resource: &Resource) -> Result<ResourceReport, DispatchError> {
        let mut report = ResourceReport::new(resource);
        let shared = Arc::new(resource.clone());

        report.advance(EvaluationState::Matching);
        let mut applicable = Vec::new();
        for policy in &self.policies {
            if policy.handle.applies_to(resource) {
                applicable.push(Some(policy));
            } else {
                applicable.push(None);
            }
        }

        report.advance(EvaluationState::Evaluating);
        for (policy, slot) in self.policies.iter().zip(applicable) {
            let name = policy.handle.name();
            let outcome = match slot {
                None => PolicyOutcome::NotApplicable,
                Some(policy) => {
                    let args = PolicyArgs::new(name, self.config_for(policy)?);
                    if !should_eval_policy(&args) {
                        PolicyOutcome::Disabled
                    } else {
                        let descriptor = policy.handle.descriptor();
                        let run = run_bounded(descriptor, &shared, &args, self.deadline)
                            .map_err(|elapsed| self.deadline_exceeded(name, resource, elapsed))?;
                        if run.elapsed > self.deadline {
                            return Err(self.deadline_exceeded(name, resource, run.elapsed));
                        }
                        collect(name, &args.config, resource, run, &mut report.findings)
                    }
                }
            };
            report.results.push(PolicyResult {
                policy_name: name.to_string(),
                outcome,
            });
        }

        report.advance(EvaluationState::Done);
        debug!(
            resource = %report.urn,
            findings = report.findings.len(),
            "resource evaluated"
        );
        Ok(report)
    }

    /// Evaluate resources one at a time, in the order given.
    pub fn evaluate_all(&self, resources: &[Resource]) -> Result<Vec<ResourceReport>, DispatchError> {
        resources.iter().map(|r| self.evaluate(r)).collect()
    }

    /// Evaluate one resource with applicable policies running in parallel on
    /// the blocking pool.
    ///
    /// Each callback is bounded by the deadline; an overrun abandons the
    /// resource and fails the run. Findings are re-sorted into selection
    /// order, so output matches [`Dispatcher::evaluate`].
    pub async fn evaluate_concurrent(
        &self,
        resource: Arc<Resource>,
    ) -> Result<ResourceReport, DispatchError> {
        let mut report = ResourceReport::new(&resource);
        report.advance(EvaluationState::Matching);

        let mut slots: Vec<Slot> = Vec::with_capacity(self.policies.len());
        let mut tasks = JoinSet::new();

        report.advance(EvaluationState::Evaluating);
        for (slot, policy) in self.policies.iter().enumerate() {
            if !policy.handle.applies_to(&resource) {
                slots.push(Slot::Done(PolicyOutcome::NotApplicable));
                continue;
            }
            let args = PolicyArgs::new(policy.handle.name(), self.config_for(policy)?);
            if !should_eval_policy(&args) {
                slots.push(Slot::Done(PolicyOutcome::Disabled));
                continue;
            }
            slots.push(Slot::Running(Arc::clone(&args.config)));

            let descriptor = Arc::clone(policy.handle.descriptor());
            let resource = Arc::clone(&resource);
            let deadline = self.deadline;
            tasks.spawn(async move {
                let blocking =
                    tokio::task::spawn_blocking(move || run_callback(&descriptor, &resource, &args));
                (slot, tokio::time::timeout(deadline, blocking).await)
            });
        }

        let mut runs: Vec<Option<CallbackRun>> = (0..self.policies.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (slot, timed) = match joined {
                Ok(joined) => joined,
                Err(join_error) => {
                    // slot unknown; it is reported as cancelled below
                    warn!(resource = %resource.urn, error = %join_error, "rule task lost");
                    continue;
                }
            };
            let name = self.policies[slot].handle.name();
            match timed {
                Err(_) => {
                    tasks.abort_all();
                    return Err(self.deadline_exceeded(name, &resource, self.deadline));
                }
                Ok(Err(join_error)) => {
                    runs[slot] = Some(CallbackRun::failed(format!("rule task failed: {join_error}")));
                }
                Ok(Ok(run)) => {
                    if run.elapsed > self.deadline {
                        tasks.abort_all();
                        return Err(self.deadline_exceeded(name, &resource, run.elapsed));
                    }
                    runs[slot] = Some(run);
                }
            }
        }

        for ((policy, slot), run) in self.policies.iter().zip(slots).zip(runs) {
            let name = policy.handle.name();
            let outcome = match slot {
                Slot::Done(outcome) => outcome,
                Slot::Running(config) => {
                    let run = run.unwrap_or_else(cancelled_run);
                    collect(name, &config, &resource, run, &mut report.findings)
                }
            };
            report.results.push(PolicyResult {
                policy_name: name.to_string(),
                outcome,
            });
        }

        report.advance(EvaluationState::Done);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::metadata::{EnforcementLevel, Severity};
    use crate::policy::resolver::RawPolicyConfig;
    use crate::policy::selection::SelectionQuery;
    use crate::policy::violation::RuleError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BUCKET: &str = "aws:s3/bucket:Bucket";

    fn bucket(acl: &str) -> Resource {
        Resource::new("urn:bucket", BUCKET, json!({"acl": acl, "tags": ["a", "b", "c"]}))
    }

    fn registry(calls: Arc<AtomicUsize>) -> PolicyRegistry {
        let mut registry = PolicyRegistry::new();
        registry
            .register(
                PolicyDescriptor::builder("public-read")
                    .vendors(["aws"])
                    .services(["s3"])
                    .severity(Severity::Critical)
                    .enforcement_level(EnforcementLevel::Mandatory)
                    .resource_type(BUCKET)
                    .validate_fn(move |resource, _args, sink| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        if resource.property("acl") == Some(&json!("public-read")) {
                            sink.report("Bucket must not be publicly readable");
                        }
                        Ok(())
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                PolicyDescriptor::builder("every-tag")
                    .vendors(["aws"])
                    .services(["s3"])
                    .resource_type(BUCKET)
                    .validate_fn(|resource, _args, sink| {
                        for tag in resource.properties["tags"].as_array().into_iter().flatten() {
                            sink.report(format!("tag {tag} is not allowed"));
                        }
                        Ok(())
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                PolicyDescriptor::builder("panics")
                    .vendors(["aws"])
                    .services(["s3"])
                    .validate_fn(|_, _, _| panic!("boom"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                PolicyDescriptor::builder("errors")
                    .vendors(["aws"])
                    .services(["s3"])
                    .validate_fn(|_, _, sink| {
                        sink.report("partial");
                        Err(RuleError::new("property schema changed"))
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                PolicyDescriptor::builder("ec2-only")
                    .vendors(["aws"])
                    .services(["ec2"])
                    .resource_type("aws:ec2/instance:Instance")
                    .validate_fn(|_, _, sink| {
                        sink.report("never on buckets");
                        Ok(())
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
    }

    fn dispatcher(registry: &PolicyRegistry, raw: RawPolicyConfig) -> Dispatcher {
        let selected = registry
            .filter_policies(&SelectionQuery::new())
            .unwrap()
            .into_iter()
            .map(|handle| SelectedPolicy {
                handle,
                enforcement_override: None,
            })
            .collect();
        Dispatcher::new(registry, selected, Arc::new(ConfigResolver::new(raw))).unwrap()
    }

    #[test]
    fn test_violation_tagged_with_policy_and_severity() {
        let registry = registry(Arc::new(AtomicUsize::new(0)));
        let dispatcher = dispatcher(&registry, RawPolicyConfig::new());
        let report = dispatcher.evaluate(&bucket("public-read")).unwrap();

        let first = &report.findings[0];
        assert_eq!(first.policy_name, "public-read");
        assert_eq!(first.severity, Severity::Critical);
        assert_eq!(first.enforcement_level, EnforcementLevel::Mandatory);
        assert_eq!(first.kind, FindingKind::Violation);
        assert_eq!(report.state, EvaluationState::Done);
    }

    #[test]
    fn test_multi_report_preserves_order() {
        let registry = registry(Arc::new(AtomicUsize::new(0)));
        let dispatcher = dispatcher(&registry, RawPolicyConfig::new());
        let report = dispatcher.evaluate(&bucket("private")).unwrap();

        let tags: Vec<_> = report
            .findings
            .iter()
            .filter(|f| f.policy_name == "every-tag")
            .map(|f| f.message.clone())
            .collect();
        assert_eq!(
            tags,
            vec![
                "tag \"a\" is not allowed",
                "tag \"b\" is not allowed",
                "tag \"c\" is not allowed"
            ]
        );
    }

    #[test]
    fn test_failures_isolated() {
        let registry = registry(Arc::new(AtomicUsize::new(0)));
        let dispatcher = dispatcher(&registry, RawPolicyConfig::new());
        let report = dispatcher.evaluate(&bucket("public-read")).unwrap();

        let errors: Vec<_> = report
            .findings
            .iter()
            .filter(|f| f.kind == FindingKind::RuleEvaluationError)
            .collect();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].policy_name, "panics");
        assert!(errors[0].message.contains("boom"));
        assert_eq!(errors[1].policy_name, "errors");
        assert!(report.violations().any(|f| f.policy_name == "public-read"));

        // the same panicking policy keeps being isolated on the next resource
        let again = dispatcher.evaluate(&bucket("private")).unwrap();
        assert!(again.findings.iter().any(|f| f.policy_name == "panics"));
    }

    #[test]
    fn test_non_matching_resource_type_skipped() {
        let registry = registry(Arc::new(AtomicUsize::new(0)));
        let dispatcher = dispatcher(&registry, RawPolicyConfig::new());
        let report = dispatcher.evaluate(&bucket("private")).unwrap();

        assert!(report.findings.iter().all(|f| f.policy_name != "ec2-only"));
        let ec2 = report
            .results
            .iter()
            .find(|r| r.policy_name == "ec2-only")
            .unwrap();
        assert_eq!(ec2.outcome, PolicyOutcome::NotApplicable);
    }

    #[test]
    fn test_disabled_policy_never_invoked() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = registry(Arc::clone(&calls));
        let raw = RawPolicyConfig::new().with_policy("public-read", json!({"enabled": false})).unwrap();
        let dispatcher = dispatcher(&registry, raw);
        let report = dispatcher.evaluate(&bucket("public-read")).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(report.findings.iter().all(|f| f.policy_name != "public-read"));
        assert_eq!(report.results[0].outcome, PolicyOutcome::Disabled);
    }

    #[test]
    fn test_severity_override_applied_to_findings() {
        let registry = registry(Arc::new(AtomicUsize::new(0)));
        let raw = RawPolicyConfig::new().with_policy("every-tag", json!({"severity": "low"})).unwrap();
        let dispatcher = dispatcher(&registry, raw);
        let report = dispatcher.evaluate(&bucket("private")).unwrap();
        assert!(report
            .findings
            .iter()
            .filter(|f| f.policy_name == "every-tag")
            .all(|f| f.severity == Severity::Low));
    }

    #[test]
    fn test_config_errors_surface_at_construction() {
        let registry = registry(Arc::new(AtomicUsize::new(0)));
        let selected = vec![SelectedPolicy {
            handle: registry.by_name("public-read").unwrap(),
            enforcement_override: None,
        }];
        let raw = RawPolicyConfig::new().with_policy("public-read", json!({"threshold": 1})).unwrap();
        let result = Dispatcher::new(&registry, selected, Arc::new(ConfigResolver::new(raw)));
        assert!(matches!(result, Err(ConfigError::InvalidConfig { .. })));
    }

    #[test]
    fn test_deadline_exceeded_is_fatal() {
        let mut registry = PolicyRegistry::new();
        let handle = registry
            .register(
                PolicyDescriptor::builder("slow")
                    .vendors(["aws"])
                    .services(["s3"])
                    .validate_fn(|_, _, _| {
                        std::thread::sleep(Duration::from_millis(30));
                        Ok(())
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(
            &registry,
            vec![SelectedPolicy {
                handle,
                enforcement_override: None,
            }],
            Arc::new(ConfigResolver::default()),
        )
        .unwrap()
        .with_deadline(Duration::from_millis(5));

        let err = dispatcher.evaluate(&bucket("private")).unwrap_err();
        assert!(matches!(err, DispatchError::CallbackDeadlineExceeded { ref policy, .. } if policy == "slow"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_matches_sequential() {
        let registry = registry(Arc::new(AtomicUsize::new(0)));
        let dispatcher = dispatcher(&registry, RawPolicyConfig::new());
        let resource = bucket("public-read");

        let sequential = dispatcher.evaluate(&resource).unwrap();
        let concurrent = dispatcher
            .evaluate_concurrent(Arc::new(resource))
            .await
            .unwrap();

        assert_eq!(sequential.findings, concurrent.findings);
        assert_eq!(sequential.results, concurrent.results);
        assert_eq!(concurrent.state, EvaluationState::Done);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_deadline_abandons_hung_callback() {
        let mut registry = PolicyRegistry::new();
        let handle = registry
            .register(
                PolicyDescriptor::builder("hangs")
                    .vendors(["aws"])
                    .services(["s3"])
                    .validate_fn(|_, _, _| {
                        std::thread::sleep(Duration::from_millis(500));
                        Ok(())
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(
            &registry,
            vec![SelectedPolicy {
                handle,
                enforcement_override: None,
            }],
            Arc::new(ConfigResolver::default()),
        )
        .unwrap()
        .with_deadline(Duration::from_millis(20));

        let started = Instant::now();
        let err = dispatcher
            .evaluate_concurrent(Arc::new(bucket("private")))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::CallbackDeadlineExceeded { .. }));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_deadline_abandons_hung_callback() {
        let mut registry = PolicyRegistry::new();
        let handle = registry
            .register(
                PolicyDescriptor::builder("hangs")
                    .vendors(["aws"])
                    .services(["s3"])
                    .validate_fn(|_, _, _| {
                        std::thread::sleep(Duration::from_millis(1500));
                        Ok(())
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(
            &registry,
            vec![SelectedPolicy {
                handle,
                enforcement_override: None,
            }],
            Arc::new(ConfigResolver::default()),
        )
        .unwrap()
        .with_deadline(Duration::from_millis(20));

        let started = Instant::now();
        let err = dispatcher.evaluate(&bucket("private")).unwrap_err();
        assert!(matches!(err, DispatchError::CallbackDeadlineExceeded { ref policy, .. } if policy == "hangs"));
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    #[test]
    fn test_cancelled_task_yields_rule_error() {
        let config = EffectivePolicyConfig {
            enabled: true,
            enforcement_level: EnforcementLevel::Mandatory,
            severity: Severity::High,
            severity_override: None,
            parameters: Default::default(),
        };
        let resource = bucket("private");
        let mut findings = Vec::new();

        let outcome = collect("lost", &config, &resource, cancelled_run(), &mut findings);
        assert_eq!(
            outcome,
            PolicyOutcome::Failed {
                error: "rule task was cancelled".to_string()
            }
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::RuleEvaluationError);
        assert_eq!(findings[0].policy_name, "lost");
        assert_eq!(findings[0].severity, Severity::High);
    }
}
