//! Event source boundary
//!
//! Watched objects arrive as [`ResourceEvent`]s and are applied to the
//! mirror through [`ClusterMirror`], which converts them into records,
//! updates the store and requests a broadcast for every observable change.

mod watch;


pub use watch::WatchDriver;

use crate::broadcast::{BroadcastConfig, Coalescer, SubscriberRegistry, Subscription};
use crate::convert;
use crate::error::ConvertError;
use crate::models::{ClusterSnapshot, EntityKind, Record, RecordKey, UsageSample};
use crate::observability::{MirrorMetrics, StructuredLogger};
use crate::store::EntityStore;
use k8s_openapi::api::core::v1::{Node, Pod};
use tokio::time::Instant;
use tracing::debug;

/// A change to one watched object, or to a whole kind after a re-list
#[derive(Debug, Clone)]
pub enum Change<K> {
    /// Object created or updated
    Applied(K),
    /// Object deleted
    Deleted(Deleted<K>),
    /// Full current list after the watch (re)started
    Relisted(Vec<K>),
}

/// Payload of a delete notification
#[derive(Debug, Clone)]
pub enum Deleted<K> {
    /// Final state of the deleted object
    Object(K),
    /// Object already gone from the source's cache; only its identity is known
    FinalStateUnknown(RecordKey),
}

/// Event from the cluster, tagged by entity kind
#[derive(Debug, Clone)]
pub enum ResourceEvent {
    Node(Change<Node>),
    Workload(Change<Pod>),
}

/// Kubernetes objects the mirror knows how to convert
pub trait MirroredResource: Sized {
    const KIND: EntityKind;

    fn record_key(&self) -> Option<RecordKey>;

    fn to_record(&self) -> Result<Record, ConvertError>;

    fn into_event(change: Change<Self>) -> ResourceEvent;

    fn display_name(&self) -> &str;
}

impl MirroredResource for Node {
    const KIND: EntityKind = EntityKind::Node;

    fn record_key(&self) -> Option<RecordKey> {
        convert::node_key(self)
    }

    fn to_record(&self) -> Result<Record, ConvertError> {
        convert::node_record(self).map(Record::Node)
    }

    fn into_event(change: Change<Self>) -> ResourceEvent {
        ResourceEvent::Node(change)
    }

    fn display_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or("<unnamed>")
    }
}

impl MirroredResource for Pod {
    const KIND: EntityKind = EntityKind::Workload;

    fn record_key(&self) -> Option<RecordKey> {
        convert::workload_key(self)
    }

    fn to_record(&self) -> Result<Record, ConvertError> {
        convert::workload_record(self).map(Record::Workload)
    }

    fn into_event(change: Change<Self>) -> ResourceEvent {
        ResourceEvent::Workload(change)
    }

    fn display_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or("<unnamed>")
    }
}

/// The mirror: store, coalescer and subscribers wired together.
///
/// Cloning is cheap; clones share all state.
#[derive(Debug, Clone)]
pub struct ClusterMirror {
    store: EntityStore,
    registry: SubscriberRegistry,
    coalescer: Coalescer,
    logger: StructuredLogger,
    metrics: MirrorMetrics,
}

impl ClusterMirror {
    pub fn new(config: &BroadcastConfig, logger: StructuredLogger) -> Self {
        let store = EntityStore::new();
        let registry = SubscriberRegistry::new(config.queue_capacity);
        let coalescer = Coalescer::new(store.clone(), registry.clone(), config);

        Self {
            store,
            registry,
            coalescer,
            logger,
            metrics: MirrorMetrics::new(),
        }
    }

    /// Apply one event. Returns whether a broadcast was requested.
    ///
    /// Objects that fail conversion are logged and skipped.
    pub fn apply(&self, event: ResourceEvent) -> bool {
        match event {
            ResourceEvent::Node(change) => self.apply_change(change),
            ResourceEvent::Workload(change) => self.apply_change(change),
        }
    }

    fn apply_change<K: MirroredResource>(&self, change: Change<K>) -> bool {
        let changed = match change {
            Change::Applied(object) => match self.convert(&object) {
                Some(record) => self.store.upsert(record),
                None => false,
            },
            Change::Deleted(Deleted::Object(object)) => match object.record_key() {
                Some(key) => {
                    self.store.remove(&key);
                    true
                }
                None => {
                    let error = ConvertError::MissingName(K::KIND);
                    self.skip(K::KIND, object.display_name(), &error);
                    false
                }
            },
            Change::Deleted(Deleted::FinalStateUnknown(key)) => {
                self.store.remove(&key);
                true
            }
            Change::Relisted(objects) => {
                let records = objects.iter().filter_map(|o| self.convert(o)).collect();
                self.store.replace_kind(K::KIND, records)
            }
        };

        self.metrics
            .set_records(K::KIND, self.store.len(K::KIND) as i64);

        if changed {
            self.coalescer.request_broadcast();
        } else {
            debug!(kind = %K::KIND, "Redundant event suppressed");
        }
        changed
    }

    fn convert<K: MirroredResource>(&self, object: &K) -> Option<Record> {
        match object.to_record() {
            Ok(record) => Some(record),
            Err(e) => {
                self.skip(K::KIND, object.display_name(), &e);
                None
            }
        }
    }

    fn skip(&self, kind: EntityKind, name: &str, error: &ConvertError) {
        self.metrics.inc_conversion_errors(kind);
        self.logger.log_event_skipped(kind, name, error);
    }

    /// Attach a usage sample to an existing record without broadcasting
    pub fn merge_usage(&self, key: &RecordKey, sample: UsageSample) -> bool {
        self.store.merge_usage(key, sample)
    }

    pub fn request_broadcast(&self) {
        self.coalescer.request_broadcast();
    }

    pub fn snapshot(&self) -> ClusterSnapshot {
        self.store.snapshot()
    }

    /// Register a live feed subscriber
    pub fn subscribe(&self) -> Subscription {
        self.registry.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Instant of the most recent delivery, for readiness
    pub fn last_delivery(&self) -> Option<Instant> {
        self.coalescer.last_delivery()
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn coalescer(&self) -> &Coalescer {
        &self.coalescer
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }
}
