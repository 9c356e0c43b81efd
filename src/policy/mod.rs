// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 CAB Ingénierie / Christophe ABOULICAM
pub mod descriptor;
pub mod dispatcher;
pub mod metadata;
pub mod registry;
pub mod resolver;
pub mod rule;
pub mod schema;
pub mod selection;
pub mod violation;

pub use descriptor::{PolicyBuilder, PolicyDescriptor, PolicyInfo, ResourceFilter, ResourceValidator};
pub use dispatcher::{Dispatcher, EvaluationState, PolicyOutcome, PolicyResult, ResourceReport};
pub use metadata::{Dimension, EnforcementLevel, PolicyTags, Severity};
pub use registry::{PolicyHandle, PolicyRegistry, RegistryStats};
pub use resolver::{
    resolve, should_eval_policy, ConfigResolver, EffectivePolicyConfig, PolicyArgs, RawPolicyConfig,
};
pub use rule::{CheckValue, FieldCheck, Operator};
pub use schema::{ConfigSchema, ParamFormat, ParamKind, ParamSpec};
pub use selection::{PolicySelector, SelectedPolicy, Selection, SelectionQuery, SelectionStats};
pub use violation::{Finding, FindingKind, RuleError, ViolationSink};
