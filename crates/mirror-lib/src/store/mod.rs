//! Entity store: the single source of truth for snapshots
//!
//! Holds the current node and workload records behind one reader/writer
//! lock. Writers classify each mutation through the change detector so
//! redundant updates never trigger downstream work.

mod change;

pub use change::Observed;

use crate::models::{
    ClusterSnapshot, EntityKind, NodeRecord, Record, RecordKey, UsageSample, WorkloadKey,
    WorkloadRecord,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct StoreState {
    nodes: BTreeMap<String, NodeRecord>,
    workloads: BTreeMap<WorkloadKey, WorkloadRecord>,
}

/// Concurrency-safe cache of mirrored records.
///
/// Cloning is cheap; clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    state: Arc<RwLock<StoreState>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record.
    ///
    /// A replacement without a usage sample inherits the prior sample.
    /// Returns true when the mutation is observable: the record is new, or
    /// differs from the prior version in an inspected field.
    pub fn upsert(&self, record: Record) -> bool {
        let mut state = self.state.write();
        match record {
            Record::Node(node) => upsert_entry(&mut state.nodes, node.name.clone(), node),
            Record::Workload(workload) => {
                upsert_entry(&mut state.workloads, workload.workload_key(), workload)
            }
        }
    }

    /// Delete a record. Removing an absent key is a no-op.
    ///
    /// Returns whether the key was present.
    pub fn remove(&self, key: &RecordKey) -> bool {
        let mut state = self.state.write();
        let removed = match key {
            RecordKey::Node(name) => state.nodes.remove(name).is_some(),
            RecordKey::Workload(key) => state.workloads.remove(key).is_some(),
        };
        if !removed {
            debug!(key = %key, "Remove of absent record");
        }
        removed
    }

    /// Replace the usage sample of an existing record.
    ///
    /// Never creates a record; returns whether the key matched.
    pub fn merge_usage(&self, key: &RecordKey, sample: UsageSample) -> bool {
        let mut state = self.state.write();
        let slot = match key {
            RecordKey::Node(name) => state.nodes.get_mut(name).map(|n| &mut n.usage),
            RecordKey::Workload(key) => state.workloads.get_mut(key).map(|w| &mut w.usage),
        };
        match slot {
            Some(usage) => {
                *usage = Some(sample);
                true
            }
            None => false,
        }
    }

    /// Replace every record of `kind` with `records`, as after a re-list.
    ///
    /// Records missing from the new set are dropped and surviving records
    /// keep their usage samples. Records of another kind are ignored.
    /// Returns true when anything was added, removed or observably changed.
    pub fn replace_kind(&self, kind: EntityKind, records: Vec<Record>) -> bool {
        let mut state = self.state.write();
        match kind {
            EntityKind::Node => {
                let entries = records.into_iter().filter_map(|r| match r {
                    Record::Node(node) => Some((node.name.clone(), node)),
                    Record::Workload(_) => None,
                });
                replace_entries(&mut state.nodes, entries)
            }
            EntityKind::Workload => {
                let entries = records.into_iter().filter_map(|r| match r {
                    Record::Workload(workload) => Some((workload.workload_key(), workload)),
                    Record::Node(_) => None,
                });
                replace_entries(&mut state.workloads, entries)
            }
        }
    }

    /// Look up a single record
    pub fn get(&self, key: &RecordKey) -> Option<Record> {
        let state = self.state.read();
        match key {
            RecordKey::Node(name) => state.nodes.get(name).cloned().map(Record::Node),
            RecordKey::Workload(key) => state.workloads.get(key).cloned().map(Record::Workload),
        }
    }

    /// Number of stored records of `kind`
    pub fn len(&self, kind: EntityKind) -> usize {
        let state = self.state.read();
        match kind {
            EntityKind::Node => state.nodes.len(),
            EntityKind::Workload => state.workloads.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state.read();
        state.nodes.is_empty() && state.workloads.is_empty()
    }

    /// Deep, name-sorted copy of the current state taken under the read lock
    pub fn snapshot(&self) -> ClusterSnapshot {
        let state = self.state.read();
        ClusterSnapshot {
            nodes: state.nodes.values().cloned().collect(),
            workloads: state.workloads.values().cloned().collect(),
        }
    }
}

fn upsert_entry<K: Ord, R: Observed>(map: &mut BTreeMap<K, R>, key: K, mut record: R) -> bool {
    match map.get_mut(&key) {
        Some(prior) => {
            if record.usage().is_none() {
                *record.usage_mut() = prior.usage().cloned();
            }
            let changed = record.observably_differs(prior);
            *prior = record;
            changed
        }
        None => {
            map.insert(key, record);
            true
        }
    }
}

fn replace_entries<K, R, I>(map: &mut BTreeMap<K, R>, entries: I) -> bool
where
    K: Ord,
    R: Observed,
    I: IntoIterator<Item = (K, R)>,
{
    let mut previous = std::mem::take(map);
    let mut changed = false;

    for (key, mut record) in entries {
        match previous.remove(&key) {
            Some(prior) => {
                if record.usage().is_none() {
                    *record.usage_mut() = prior.usage().cloned();
                }
                changed |= record.observably_differs(&prior);
            }
            None => changed = true,
        }
        map.insert(key, record);
    }

    changed || !previous.is_empty()
}
