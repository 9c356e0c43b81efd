// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 CAB Ingénierie / Christophe ABOULICAM
//! Selection Engine
//!
//! Picks the subset of registered policies matching a query:
//! 1. Every tag dimension present in the query must overlap the policy's tags
//!    (OR within a dimension, AND across dimensions)
//! 2. An include list keeps only the named policies
//! 3. An exclude list removes names last
//!
//! Output always follows registration order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::info;

use crate::error::QueryError;
use crate::policy::descriptor::PolicyDescriptor;
use crate::policy::metadata::{normalize_tag, Dimension, EnforcementLevel, Severity};
use crate::policy::registry::{PolicyHandle, PolicyRegistry};

// =============================================================================
// Raw Query
// =============================================================================

/// A selection query as supplied by a consumer.
///
/// Absent (or empty) dimensions place no constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SelectionQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frameworks: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,
}

fn owned<I, S>(values: I) -> Option<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Some(values.into_iter().map(Into::into).collect())
}

impl SelectionQuery {
    /// An empty query, selecting every policy
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vendors<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.vendors = owned(values);
        self
    }

    pub fn services<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.services = owned(values);
        self
    }

    pub fn severities<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.severities = owned(values);
        self
    }

    pub fn topics<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.topics = owned(values);
        self
    }

    pub fn frameworks<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.frameworks = owned(values);
        self
    }

    pub fn include<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
        self.include = owned(names);
        self
    }

    pub fn exclude<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
        self.exclude = owned(names);
        self
    }

    /// Validate the query against a registry.
    ///
    /// Unknown severities, empty values and include/exclude names that are
    /// not registered fail with `InvalidQuery`. Unknown free-form tags are
    /// accepted and simply match nothing.
    pub fn validate(&self, registry: &PolicyRegistry) -> Result<Selection, QueryError> {
        let mut tags = BTreeMap::new();
        for (dimension, values) in [
            (Dimension::Vendor, &self.vendors),
            (Dimension::Service, &self.services),
            (Dimension::Topic, &self.topics),
            (Dimension::Framework, &self.frameworks),
        ] {
            if let Some(set) = tag_set(dimension, values)? {
                tags.insert(dimension, set);
            }
        }

        let severities = match non_empty(&self.severities) {
            Some(values) => Some(
                values
                    .iter()
                    .map(|v| {
                        Severity::parse(v)
                            .ok_or_else(|| QueryError::invalid(Dimension::Severity.as_str(), v))
                    })
                    .collect::<Result<BTreeSet<_>, _>>()?,
            ),
            None => None,
        };

        let include = name_set("include", &self.include, registry)?;
        let exclude = name_set("exclude", &self.exclude, registry)?.unwrap_or_default();

        Ok(Selection {
            tags,
            severities,
            include,
            exclude,
        })
    }
}

fn non_empty(values: &Option<Vec<String>>) -> Option<&Vec<String>> {
    values.as_ref().filter(|v| !v.is_empty())
}

fn tag_set(
    dimension: Dimension,
    values: &Option<Vec<String>>,
) -> Result<Option<BTreeSet<String>>, QueryError> {
    let Some(values) = non_empty(values) else {
        return Ok(None);
    };
    values
        .iter()
        .map(|v| {
            let tag = normalize_tag(v);
            if tag.is_empty() {
                Err(QueryError::invalid(dimension.as_str(), v))
            } else {
                Ok(tag)
            }
        })
        .collect::<Result<BTreeSet<_>, _>>()
        .map(Some)
}

fn name_set(
    label: &str,
    names: &Option<Vec<String>>,
    registry: &PolicyRegistry,
) -> Result<Option<HashSet<String>>, QueryError> {
    let Some(names) = names.as_ref() else {
        return Ok(None);
    };
    names
        .iter()
        .map(|name| {
            if registry.contains(name) {
                Ok(name.clone())
            } else {
                Err(QueryError::invalid(label, name))
            }
        })
        .collect::<Result<HashSet<_>, _>>()
        .map(Some)
}

// =============================================================================
// Validated Selection
// =============================================================================

/// A validated query, ready to run against the registry it was checked with.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    tags: BTreeMap<Dimension, BTreeSet<String>>,
    severities: Option<BTreeSet<Severity>>,
    include: Option<HashSet<String>>,
    exclude: HashSet<String>,
}

impl Selection {
    /// Check a single descriptor against every predicate
    pub fn matches(&self, descriptor: &PolicyDescriptor) -> bool {
        let tags_match = self.tags.iter().all(|(dimension, wanted)| {
            descriptor
                .tags
                .values(*dimension)
                .map(|have| !have.is_disjoint(wanted))
                .unwrap_or(false)
        });
        let severity_match = self
            .severities
            .as_ref()
            .map(|s| s.contains(&descriptor.severity))
            .unwrap_or(true);
        let included = self
            .include
            .as_ref()
            .map(|names| names.contains(&descriptor.name))
            .unwrap_or(true);

        tags_match && severity_match && included && !self.exclude.contains(&descriptor.name)
    }

    /// Run the selection over the registry's tag index.
    pub fn apply(&self, registry: &PolicyRegistry) -> Vec<PolicyHandle> {
        let mut candidates: Option<BTreeSet<usize>> = None;

        let mut narrow = |hits: BTreeSet<usize>| {
            candidates = Some(match candidates.take() {
                Some(current) => current.intersection(&hits).copied().collect(),
                None => hits,
            });
        };

        for (dimension, wanted) in &self.tags {
            narrow(
                wanted
                    .iter()
                    .flat_map(|tag| registry.postings(*dimension, tag).iter().copied())
                    .collect(),
            );
        }
        if let Some(severities) = &self.severities {
            narrow(
                severities
                    .iter()
                    .flat_map(|s| registry.postings(Dimension::Severity, s.as_str()).iter().copied())
                    .collect(),
            );
        }

        let candidates = candidates.unwrap_or_else(|| (0..registry.len()).collect());
        candidates
            .into_iter()
            .map(|index| registry.handle(index))
            .filter(|handle| {
                let included = self
                    .include
                    .as_ref()
                    .map(|names| names.contains(handle.name()))
                    .unwrap_or(true);
                included && !self.exclude.contains(handle.name())
            })
            .collect()
    }
}

impl PolicyRegistry {
    /// Select the policies matching `query`, in registration order.
    ///
    /// An empty result is not an error.
    pub fn filter_policies(&self, query: &SelectionQuery) -> Result<Vec<PolicyHandle>, QueryError> {
        Ok(query.validate(self)?.apply(self))
    }
}

// =============================================================================
// Policy Selector
// =============================================================================

/// A policy chosen for a pack, with an optional enforcement level imposed at
/// selection time.
#[derive(Debug, Clone)]
pub struct SelectedPolicy {
    pub handle: PolicyHandle,
    pub enforcement_override: Option<EnforcementLevel>,
}

/// Assembles a pack from one or more successive queries.
///
/// Each policy is handed out at most once over the selector's lifetime, so
/// overlapping queries never duplicate a policy in the pack.
pub struct PolicySelector<'r> {
    registry: &'r PolicyRegistry,
    selected: BTreeMap<usize, SelectedPolicy>,
}

impl<'r> PolicySelector<'r> {
    pub fn new(registry: &'r PolicyRegistry) -> Self {
        Self {
            registry,
            selected: BTreeMap::new(),
        }
    }

    /// Select policies matching `query` that were not selected before.
    ///
    /// Returns only the newly selected policies, in registration order.
    pub fn select(
        &mut self,
        query: &SelectionQuery,
        enforcement_override: Option<EnforcementLevel>,
    ) -> Result<Vec<PolicyHandle>, QueryError> {
        let matched = self.registry.filter_policies(query)?;
        let mut added = Vec::new();
        for handle in matched {
            if self.selected.contains_key(&handle.index()) {
                continue;
            }
            self.selected.insert(
                handle.index(),
                SelectedPolicy {
                    handle: handle.clone(),
                    enforcement_override,
                },
            );
            added.push(handle);
        }
        info!(
            matched = added.len(),
            total_selected = self.selected.len(),
            "selected policies"
        );
        Ok(added)
    }

    /// Number of policies selected so far
    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn selection_stats(&self) -> SelectionStats {
        let mut by_severity = BTreeMap::new();
        let mut by_vendor = BTreeMap::new();
        for policy in self.selected.values() {
            *by_severity.entry(policy.handle.severity).or_insert(0) += 1;
            for vendor in &policy.handle.tags.vendors {
                *by_vendor.entry(vendor.clone()).or_insert(0) += 1;
            }
        }
        SelectionStats {
            registered: self.registry.len(),
            selected: self.selected.len(),
            by_severity,
            by_vendor,
            names: self
                .selected
                .values()
                .map(|p| p.handle.name().to_string())
                .collect(),
        }
    }

    /// Finish assembly, returning the selected policies in registration order
    pub fn finish(self) -> Vec<SelectedPolicy> {
        self.selected.into_values().collect()
    }
}

/// Summary of a pack selection
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionStats {
    pub registered: usize,
    pub selected: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_vendor: BTreeMap<String, usize>,
    pub names: Vec<String>,
}
