//! Broadcast coalescer
//!
//! Batches observable changes into at most two deliveries per cooldown
//! window: an optional leading delivery after the settle delay, and a
//! trailing delivery when the window closes with changes still pending.
//! Every snapshot is taken at delivery time, so coalescing only collapses
//! intermediate states and never loses the latest one.

use super::{BroadcastConfig, SubscriberRegistry};
use crate::observability::MirrorMetrics;
use crate::store::EntityStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Which timer produced a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    Leading,
    Trailing,
}

impl DeliveryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryKind::Leading => "leading",
            DeliveryKind::Trailing => "trailing",
        }
    }
}

#[derive(Debug, Default)]
struct WindowState {
    open: bool,
    pending: bool,
    last_delivered_at: Option<Instant>,
}

struct CoalescerInner {
    store: EntityStore,
    registry: SubscriberRegistry,
    settle_delay: Duration,
    cooldown: Duration,
    window: Mutex<WindowState>,
    // Serializes snapshot + publish so all subscribers see one content order
    publish_lock: Mutex<()>,
    last_delivery: Mutex<Option<Instant>>,
    deliveries: AtomicU64,
    metrics: MirrorMetrics,
}

/// Timer-driven scheduler of snapshot deliveries.
///
/// Cloning is cheap; clones drive the same window.
#[derive(Clone)]
pub struct Coalescer {
    inner: Arc<CoalescerInner>,
}

impl std::fmt::Debug for Coalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coalescer")
            .field("settle_delay", &self.inner.settle_delay)
            .field("cooldown", &self.inner.cooldown)
            .field("deliveries", &self.deliveries())
            .finish()
    }
}

impl Coalescer {
    pub fn new(store: EntityStore, registry: SubscriberRegistry, config: &BroadcastConfig) -> Self {
        Self {
            inner: Arc::new(CoalescerInner {
                store,
                registry,
                settle_delay: config.settle_delay,
                cooldown: config.cooldown,
                window: Mutex::new(WindowState::default()),
                publish_lock: Mutex::new(()),
                last_delivery: Mutex::new(None),
                deliveries: AtomicU64::new(0),
                metrics: MirrorMetrics::new(),
            }),
        }
    }

    /// Note an observable change.
    ///
    /// Opens a coalescing window if none is open, scheduling its timers on
    /// the current Tokio runtime. Never blocks on delivery.
    pub fn request_broadcast(&self) {
        let inner = &self.inner;
        inner.metrics.inc_broadcast_requests();

        let mut window = inner.window.lock();
        if window.open {
            window.pending = true;
            inner.metrics.inc_broadcasts_coalesced();
            return;
        }

        window.open = true;
        let now = Instant::now();
        let quiet = window
            .last_delivered_at
            .map_or(true, |at| now.duration_since(at) > inner.cooldown);

        if quiet {
            window.last_delivered_at = Some(now);
            window.pending = false;
            let leading = Arc::clone(inner);
            tokio::spawn(async move {
                tokio::time::sleep(leading.settle_delay).await;
                leading.fire_leading();
            });
        } else {
            // No leading delivery covers this change, the close must
            window.pending = true;
        }

        let closing = Arc::clone(inner);
        tokio::spawn(async move {
            tokio::time::sleep(closing.cooldown).await;
            closing.fire_close();
        });
    }

    /// Instant of the most recent delivery of either kind
    pub fn last_delivery(&self) -> Option<Instant> {
        *self.inner.last_delivery.lock()
    }

    /// Total deliveries since creation
    pub fn deliveries(&self) -> u64 {
        self.inner.deliveries.load(Ordering::Relaxed)
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.inner.registry
    }
}

impl CoalescerInner {
    fn fire_leading(&self) {
        self.window.lock().pending = false;
        self.deliver(DeliveryKind::Leading);
    }

    fn fire_close(&self) {
        let deliver = {
            let mut window = self.window.lock();
            let pending = window.pending;
            if pending {
                window.last_delivered_at = Some(Instant::now());
                window.pending = false;
            }
            // Closed before delivering so a change racing the delivery opens a new window
            window.open = false;
            pending
        };

        if deliver {
            self.deliver(DeliveryKind::Trailing);
        }
    }

    fn deliver(&self, kind: DeliveryKind) {
        let _publishing = self.publish_lock.lock();

        let started = std::time::Instant::now();
        let snapshot = Arc::new(self.store.snapshot());
        self.metrics
            .observe_snapshot_latency(started.elapsed().as_secs_f64());

        let outcome = self.registry.publish(snapshot);
        *self.last_delivery.lock() = Some(Instant::now());
        self.deliveries.fetch_add(1, Ordering::Relaxed);

        self.metrics.inc_deliveries(kind.as_str());
        if outcome.dropped > 0 {
            self.metrics.inc_subscriber_drops(outcome.dropped as u64);
        }

        debug!(
            kind = kind.as_str(),
            delivered = outcome.delivered,
            dropped = outcome.dropped,
            closed = outcome.closed,
            "Published snapshot"
        );
    }
}
