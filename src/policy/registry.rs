// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 CAB Ingénierie / Christophe ABOULICAM
//! Policy Registry
//!
//! Append-only collection of policy descriptors keyed by unique name.
//!
//! The registry keeps registration order for deterministic output and an
//! inverted tag index (dimension, tag) -> registration indices used by the
//! selection engine. Registration is the only mutation; it happens once at
//! startup, before any evaluation.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;
use std::sync::Arc;
use tracing::debug;

use crate::error::RegistryError;
use crate::policy::descriptor::PolicyDescriptor;
use crate::policy::metadata::{Dimension, Severity};

// =============================================================================
// Policy Handle
// =============================================================================

/// Shared reference to a registered policy, remembering its registration slot.
#[derive(Debug, Clone)]
pub struct PolicyHandle {
    index: usize,
    descriptor: Arc<PolicyDescriptor>,
}

impl PolicyHandle {
    /// Position in registration order
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &Arc<PolicyDescriptor> {
        &self.descriptor
    }
}

impl Deref for PolicyHandle {
    type Target = PolicyDescriptor;

    fn deref(&self) -> &Self::Target {
        &self.descriptor
    }
}

impl PartialEq for PolicyHandle {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && Arc::ptr_eq(&self.descriptor, &other.descriptor)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Registry of every policy known to this process.
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    policies: Vec<Arc<PolicyDescriptor>>,
    by_name: HashMap<String, usize>,
    tag_index: HashMap<(Dimension, String), Vec<usize>>,
}

impl PolicyRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a policy.
    ///
    /// Fails with `DuplicateName` if a policy with the same name exists.
    pub fn register(&mut self, descriptor: PolicyDescriptor) -> Result<PolicyHandle, RegistryError> {
        if self.by_name.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateName(descriptor.name));
        }

        let index = self.policies.len();
        let descriptor = Arc::new(descriptor);

        // indices are appended in increasing order, so postings stay sorted
        for dimension in [
            Dimension::Vendor,
            Dimension::Service,
            Dimension::Topic,
            Dimension::Framework,
        ] {
            if let Some(values) = descriptor.tags.values(dimension) {
                for value in values {
                    self.tag_index
                        .entry((dimension, value.clone()))
                        .or_default()
                        .push(index);
                }
            }
        }
        self.tag_index
            .entry((Dimension::Severity, descriptor.severity.as_str().to_string()))
            .or_default()
            .push(index);

        self.by_name.insert(descriptor.name.clone(), index);
        self.policies.push(Arc::clone(&descriptor));

        debug!(
            policy = %descriptor.name,
            index,
            severity = %descriptor.severity,
            "registered policy"
        );

        Ok(PolicyHandle { index, descriptor })
    }

    /// Register several policies, stopping at the first failure.
    pub fn register_all<I>(&mut self, descriptors: I) -> Result<Vec<PolicyHandle>, RegistryError>
    where
        I: IntoIterator<Item = PolicyDescriptor>,
    {
        descriptors
            .into_iter()
            .map(|descriptor| self.register(descriptor))
            .collect()
    }

    /// All policies in registration order.
    pub fn all(&self) -> Vec<PolicyHandle> {
        self.policies
            .iter()
            .enumerate()
            .map(|(index, descriptor)| PolicyHandle {
                index,
                descriptor: Arc::clone(descriptor),
            })
            .collect()
    }

    /// Get a policy by name.
    pub fn get(&self, name: &str) -> Option<PolicyHandle> {
        self.by_name.get(name).map(|&index| self.handle(index))
    }

    /// Get a policy by name, failing with `NotFound`.
    pub fn by_name(&self, name: &str) -> Result<PolicyHandle, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.iter().map(|p| p.name.as_str())
    }

    /// Get the number of registered policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub(crate) fn handle(&self, index: usize) -> PolicyHandle {
        PolicyHandle {
            index,
            descriptor: Arc::clone(&self.policies[index]),
        }
    }

    /// Registration indices carrying `value` on `dimension`, ascending.
    pub(crate) fn postings(&self, dimension: Dimension, value: &str) -> &[usize] {
        self.tag_index
            .get(&(dimension, value.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Per-dimension policy counts.
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.policies.len(),
            ..RegistryStats::default()
        };
        for ((dimension, value), postings) in &self.tag_index {
            let target = match dimension {
                Dimension::Vendor => &mut stats.vendors,
                Dimension::Service => &mut stats.services,
                Dimension::Topic => &mut stats.topics,
                Dimension::Framework => &mut stats.frameworks,
                Dimension::Severity => {
                    if let Some(severity) = Severity::parse(value) {
                        stats.severities.insert(severity, postings.len());
                    }
                    continue;
                }
            };
            target.insert(value.clone(), postings.len());
        }
        stats
    }
}

/// Policy counts per tag, sorted for stable output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub vendors: BTreeMap<String, usize>,
    pub services: BTreeMap<String, usize>,
    pub severities: BTreeMap<Severity, usize>,
    pub topics: BTreeMap<String, usize>,
    pub frameworks: BTreeMap<String, usize>,
}
