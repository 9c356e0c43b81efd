// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 CAB Ingénierie / Christophe ABOULICAM
//! Policy Packs
//!
//! A pack is a named bundle of selected, configured policies for one
//! compliance run. Building a pack validates queries and configuration, so
//! analysis only starts once the whole setup is known to be sound.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::{DispatchError, EngineError, QueryError};
use crate::host::{AnalyzeResponse, Resource, ResponseBuilder};
use crate::policy::dispatcher::{Dispatcher, DEFAULT_CALLBACK_DEADLINE};
use crate::policy::metadata::EnforcementLevel;
use crate::policy::registry::{PolicyHandle, PolicyRegistry};
use crate::policy::resolver::{ConfigResolver, RawPolicyConfig};
use crate::policy::selection::{PolicySelector, SelectionQuery, SelectionStats};

/// Builder for [`PolicyPack`].
pub struct PolicyPackBuilder<'r> {
    name: String,
    registry: &'r PolicyRegistry,
    selector: PolicySelector<'r>,
    queried: bool,
    config: RawPolicyConfig,
    deadline: Duration,
}

impl<'r> PolicyPackBuilder<'r> {
    /// Add the policies matching `query`, optionally forcing their
    /// enforcement level. Policies already in the pack are not added twice.
    pub fn select(
        &mut self,
        query: &SelectionQuery,
        enforcement_level: Option<EnforcementLevel>,
    ) -> Result<Vec<PolicyHandle>, QueryError> {
        self.queried = true;
        self.selector.select(query, enforcement_level)
    }

    /// Per-policy configuration overrides
    pub fn config(mut self, config: RawPolicyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Resolve configuration for every selected policy and build the pack.
    ///
    /// A pack with no explicit query selects every registered policy.
    pub fn build(mut self) -> Result<PolicyPack, EngineError> {
        if !self.queried {
            self.selector.select(&SelectionQuery::new(), None)?;
        }
        let stats = self.selector.selection_stats();
        let resolver = Arc::new(ConfigResolver::new(self.config));
        let dispatcher = Dispatcher::new(self.registry, self.selector.finish(), resolver)?
            .with_deadline(self.deadline);

        info!(
            pack = %self.name,
            selected = stats.selected,
            registered = stats.registered,
            "policy pack ready"
        );
        Ok(PolicyPack {
            name: self.name,
            dispatcher,
            stats,
        })
    }
}

/// A selected, configured set of policies ready to analyze resources.
pub struct PolicyPack {
    name: String,
    dispatcher: Dispatcher,
    stats: SelectionStats,
}

impl PolicyPack {
    pub fn builder(name: impl Into<String>, registry: &PolicyRegistry) -> PolicyPackBuilder<'_> {
        PolicyPackBuilder {
            name: name.into(),
            registry,
            selector: PolicySelector::new(registry),
            queried: false,
            config: RawPolicyConfig::default(),
            deadline: DEFAULT_CALLBACK_DEADLINE,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &SelectionStats {
        &self.stats
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Analyze resources one at a time, in the order given
    pub fn analyze(&self, resources: &[Resource]) -> Result<AnalyzeResponse, DispatchError> {
        let reports = self.dispatcher.evaluate_all(resources)?;
        let response = reports
            .into_iter()
            .fold(ResponseBuilder::new(self.stats.selected), |response, report| {
                response.resource(report.findings)
            });
        Ok(response.build())
    }

    /// Analyze resources one at a time, running each resource's policies in
    /// parallel
    pub async fn analyze_concurrent(
        &self,
        resources: Vec<Resource>,
    ) -> Result<AnalyzeResponse, DispatchError> {
        let mut response = ResponseBuilder::new(self.stats.selected);
        for resource in resources {
            let report = self.dispatcher.evaluate_concurrent(Arc::new(resource)).await?;
            response = response.resource(report.findings);
        }
        Ok(response.build())
    }
}
