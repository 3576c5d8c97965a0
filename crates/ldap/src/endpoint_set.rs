//! Active/inactive partition of the configured endpoints
//!
//! Entries live in an arena indexed by their configured (or DNS priority)
//! position. The active and inactive lists hold arena indices; every index is
//! in exactly one of them. All partition moves happen under one write lock so
//! a snapshot never observes an endpoint in both lists or in neither.

use crate::endpoint::Endpoint;
use crate::error::{LdapError, Result};
use crate::retry::RetryMetadata;
use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::debug;

/// One endpoint together with its failure history
#[derive(Debug)]
pub struct EndpointEntry {
    endpoint: Endpoint,
    retry: RetryMetadata,
}

impl EndpointEntry {
    fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            retry: RetryMetadata::new(),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn retry(&self) -> &RetryMetadata {
        &self.retry
    }
}

/// Where a recovered endpoint re-enters the active list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    /// Back at its configured position relative to the other active entries
    Restore,
    /// At the end of the active list
    Append,
}

/// Consistent view of both partitions
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub active: Vec<Arc<EndpointEntry>>,
    pub inactive: Vec<Arc<EndpointEntry>>,
}

#[derive(Debug, Default)]
struct Partitions {
    entries: Vec<Arc<EndpointEntry>>,
    active: Vec<usize>,
    inactive: Vec<usize>,
}

impl Partitions {
    fn position(&self, endpoint: &Endpoint) -> Option<usize> {
        self.entries.iter().position(|e| e.endpoint == *endpoint)
    }
}

#[derive(Debug, Default)]
pub struct EndpointSet {
    partitions: RwLock<Partitions>,
}

impl EndpointSet {
    /// Build a set with every endpoint active, in the given order
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self> {
        check_unique(&endpoints)?;
        let entries: Vec<_> = endpoints
            .into_iter()
            .map(|e| Arc::new(EndpointEntry::new(e)))
            .collect();
        let active = (0..entries.len()).collect();
        Ok(Self {
            partitions: RwLock::new(Partitions {
                entries,
                active,
                inactive: Vec::new(),
            }),
        })
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.read().position(endpoint).is_some()
    }

    pub fn snapshot(&self) -> Snapshot {
        let partitions = self.read();
        Snapshot {
            active: partitions
                .active
                .iter()
                .map(|&i| partitions.entries[i].clone())
                .collect(),
            inactive: partitions
                .inactive
                .iter()
                .map(|&i| partitions.entries[i].clone())
                .collect(),
        }
    }

    pub fn active(&self) -> Vec<Endpoint> {
        let partitions = self.read();
        partitions
            .active
            .iter()
            .map(|&i| partitions.entries[i].endpoint.clone())
            .collect()
    }

    pub fn inactive(&self) -> Vec<Endpoint> {
        let partitions = self.read();
        partitions
            .inactive
            .iter()
            .map(|&i| partitions.entries[i].endpoint.clone())
            .collect()
    }

    /// Entry for an endpoint, if it belongs to the set
    pub fn entry(&self, endpoint: &Endpoint) -> Option<Arc<EndpointEntry>> {
        let partitions = self.read();
        partitions
            .position(endpoint)
            .map(|i| partitions.entries[i].clone())
    }

    /// Clear the endpoint's failure history and make it active.
    ///
    /// Returns false if the endpoint is not part of the set.
    pub fn record_success(&self, endpoint: &Endpoint, promotion: Promotion) -> bool {
        let mut partitions = self.write();
        let Some(index) = partitions.position(endpoint) else {
            return false;
        };
        if let Some(pos) = partitions.inactive.iter().position(|&i| i == index) {
            partitions.inactive.remove(pos);
            let at = match promotion {
                Promotion::Restore => partitions
                    .active
                    .iter()
                    .position(|&i| i > index)
                    .unwrap_or(partitions.active.len()),
                Promotion::Append => partitions.active.len(),
            };
            partitions.active.insert(at, index);
            debug!(endpoint = %endpoint, position = at, "endpoint reactivated");
        }
        partitions.entries[index].retry.reset();
        true
    }

    /// Record a failure; an active endpoint moves to the end of the inactive
    /// list, an inactive one keeps its place.
    ///
    /// Returns false if the endpoint is not part of the set.
    pub fn record_failure(&self, endpoint: &Endpoint, time: Instant) -> bool {
        let mut partitions = self.write();
        let Some(index) = partitions.position(endpoint) else {
            return false;
        };
        partitions.entries[index].retry.record_failure(time);
        if let Some(pos) = partitions.active.iter().position(|&i| i == index) {
            partitions.active.remove(pos);
            partitions.inactive.push(index);
            debug!(
                endpoint = %endpoint,
                attempts = partitions.entries[index].retry.attempts(),
                "endpoint deactivated"
            );
        }
        true
    }

    /// Replace the membership with a new ordered list.
    ///
    /// Endpoints present before and after keep their partition and failure
    /// history; new endpoints start active. The active list follows the new
    /// order, the inactive list keeps its failure order.
    pub fn replace(&self, endpoints: Vec<Endpoint>) -> Result<()> {
        check_unique(&endpoints)?;
        let mut partitions = self.write();

        let entries: Vec<Arc<EndpointEntry>> = endpoints
            .into_iter()
            .map(|endpoint| match partitions.position(&endpoint) {
                Some(i) => partitions.entries[i].clone(),
                None => Arc::new(EndpointEntry::new(endpoint)),
            })
            .collect();

        let new_index = |entry: &Arc<EndpointEntry>| entries.iter().position(|e| Arc::ptr_eq(e, entry));
        let inactive: Vec<usize> = partitions
            .inactive
            .iter()
            .filter_map(|&i| new_index(&partitions.entries[i]))
            .collect();
        let active: Vec<usize> = (0..entries.len())
            .filter(|i| !inactive.contains(i))
            .collect();

        *partitions = Partitions {
            entries,
            active,
            inactive,
        };
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Partitions> {
        self.partitions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Partitions> {
        self.partitions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn check_unique(endpoints: &[Endpoint]) -> Result<()> {
    let mut seen = HashSet::with_capacity(endpoints.len());
    for endpoint in endpoints {
        if !seen.insert(endpoint) {
            return Err(LdapError::Configuration(format!(
                "duplicate endpoint {endpoint}"
            )));
        }
    }
    Ok(())
}
