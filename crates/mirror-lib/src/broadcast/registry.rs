//! Subscriber registry with non-blocking fan-out
//!
//! Each subscriber owns a bounded queue. Publishing never waits: a full
//! queue drops that one snapshot for that one subscriber, and the next
//! delivery is still a complete current view.

use crate::models::ClusterSnapshot;
use crate::observability::MirrorMetrics;
use dashmap::DashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio_stream::Stream;
use tracing::debug;

type Frame = Arc<ClusterSnapshot>;

struct RegistryInner {
    subscribers: DashMap<u64, mpsc::Sender<Frame>>,
    next_id: AtomicU64,
    capacity: usize,
    metrics: MirrorMetrics,
}

impl RegistryInner {
    fn remove(&self, id: u64) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            self.metrics.set_subscribers(self.subscribers.len() as i64);
        }
        removed
    }
}

/// Result of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Subscribers the snapshot was enqueued for
    pub delivered: usize,
    /// Subscribers whose queue was full
    pub dropped: usize,
    /// Subscribers found closed and pruned
    pub closed: usize,
}

/// Open set of live subscribers.
///
/// Cloning is cheap; clones share the same set.
#[derive(Clone)]
pub struct SubscriberRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.inner.subscribers.len())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

impl SubscriberRegistry {
    /// Create a registry whose subscribers each get a queue of `capacity` (at least 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
                metrics: MirrorMetrics::new(),
            }),
        }
    }

    /// Register a new subscriber with an empty bounded queue
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.inner.capacity);
        self.inner.subscribers.insert(id, sender);
        self.inner
            .metrics
            .set_subscribers(self.inner.subscribers.len() as i64);
        debug!(subscriber_id = id, "Subscriber registered");

        Subscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscriber and close its queue.
    ///
    /// Returns false when the subscriber was already gone.
    pub fn unsubscribe(&self, id: u64) -> bool {
        self.inner.remove(id)
    }

    /// Enqueue `snapshot` for every subscriber without waiting
    pub fn publish(&self, snapshot: Arc<ClusterSnapshot>) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();
        let mut closed = Vec::new();

        for entry in self.inner.subscribers.iter() {
            match entry.value().try_send(Arc::clone(&snapshot)) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    outcome.dropped += 1;
                    debug!(subscriber_id = *entry.key(), "Subscriber queue full, dropping snapshot");
                }
                Err(TrySendError::Closed(_)) => closed.push(*entry.key()),
            }
        }

        // Pruned outside the iteration so no shard lock is held twice
        for id in closed {
            if self.inner.remove(id) {
                outcome.closed += 1;
            }
        }

        outcome
    }

    /// Number of registered subscribers
    pub fn len(&self) -> usize {
        self.inner.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.subscribers.is_empty()
    }

    /// Queue capacity given to each subscriber
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

/// Handle to one subscriber's queue.
///
/// Yields snapshots in publish order and ends once unsubscribed. Dropping the
/// handle unsubscribes.
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<Frame>,
    registry: Weak<RegistryInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next snapshot; `None` once the queue is closed and drained
    pub async fn recv(&mut self) -> Option<Arc<ClusterSnapshot>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Arc<ClusterSnapshot>, TryRecvError> {
        self.receiver.try_recv()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Stream for Subscription {
    type Item = Arc<ClusterSnapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}
