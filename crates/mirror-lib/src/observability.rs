//! Observability infrastructure for the cluster mirror
//!
//! Provides:
//! - Prometheus metrics (broadcast activity, subscriber fan-out, mirrored record counts)
//! - Structured JSON logging with tracing

use crate::models::EntityKind;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for snapshot build latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MirrorMetricsInner> = OnceLock::new();

struct MirrorMetricsInner {
    broadcast_requests: IntCounter,
    broadcasts_coalesced: IntCounter,
    deliveries: IntCounterVec,
    subscriber_drops: IntCounter,
    subscribers: IntGauge,
    records: IntGaugeVec,
    usage_fetch_errors: IntCounterVec,
    conversion_errors: IntCounterVec,
    snapshot_latency_seconds: Histogram,
}

impl MirrorMetricsInner {
    fn new() -> Self {
        Self {
            broadcast_requests: register_int_counter!(
                "opsview_broadcast_requests_total",
                "Observable changes that requested a broadcast"
            )
            .expect("Failed to register broadcast_requests"),

            broadcasts_coalesced: register_int_counter!(
                "opsview_broadcasts_coalesced_total",
                "Broadcast requests absorbed by an already open window"
            )
            .expect("Failed to register broadcasts_coalesced"),

            deliveries: register_int_counter_vec!(
                "opsview_deliveries_total",
                "Snapshots published to subscribers",
                &["kind"]
            )
            .expect("Failed to register deliveries"),

            subscriber_drops: register_int_counter!(
                "opsview_subscriber_drops_total",
                "Snapshots dropped because a subscriber queue was full"
            )
            .expect("Failed to register subscriber_drops"),

            subscribers: register_int_gauge!(
                "opsview_subscribers",
                "Currently connected live feed subscribers"
            )
            .expect("Failed to register subscribers"),

            records: register_int_gauge_vec!(
                "opsview_records",
                "Records currently held in the mirror",
                &["kind"]
            )
            .expect("Failed to register records"),

            usage_fetch_errors: register_int_counter_vec!(
                "opsview_usage_fetch_errors_total",
                "Failed resource usage fetches",
                &["kind"]
            )
            .expect("Failed to register usage_fetch_errors"),

            conversion_errors: register_int_counter_vec!(
                "opsview_conversion_errors_total",
                "Watched objects skipped because they could not be converted",
                &["kind"]
            )
            .expect("Failed to register conversion_errors"),

            snapshot_latency_seconds: register_histogram!(
                "opsview_snapshot_latency_seconds",
                "Time spent copying the store into a snapshot",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register snapshot_latency_seconds"),
        }
    }
}

/// Mirror metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct MirrorMetrics {
    _private: (),
}

impl Default for MirrorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MirrorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MirrorMetrics")
    }
}

impl MirrorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MirrorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MirrorMetricsInner {
        GLOBAL_METRICS.get_or_init(MirrorMetricsInner::new)
    }

    pub fn inc_broadcast_requests(&self) {
        self.inner().broadcast_requests.inc();
    }

    pub fn inc_broadcasts_coalesced(&self) {
        self.inner().broadcasts_coalesced.inc();
    }

    /// Count a published snapshot of the given delivery kind
    pub fn inc_deliveries(&self, kind: &str) {
        self.inner().deliveries.with_label_values(&[kind]).inc();
    }

    pub fn inc_subscriber_drops(&self, dropped: u64) {
        self.inner().subscriber_drops.inc_by(dropped);
    }

    pub fn set_subscribers(&self, count: i64) {
        self.inner().subscribers.set(count);
    }

    pub fn set_records(&self, kind: EntityKind, count: i64) {
        self.inner()
            .records
            .with_label_values(&[kind.as_str()])
            .set(count);
    }

    pub fn inc_usage_fetch_errors(&self, kind: EntityKind) {
        self.inner()
            .usage_fetch_errors
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    pub fn inc_conversion_errors(&self, kind: EntityKind) {
        self.inner()
            .conversion_errors
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    /// Record a snapshot build latency observation
    pub fn observe_snapshot_latency(&self, duration_secs: f64) {
        self.inner().snapshot_latency_seconds.observe(duration_secs);
    }
}

/// Structured logger for mirror events
///
/// Provides consistent JSON-formatted logging for lifecycle,
/// subscriber and event source activity.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log server startup
    pub fn log_startup(&self, version: &str, port: u16) {
        info!(
            event = "server_started",
            instance = %self.instance,
            version = %version,
            port = port,
            "Cluster ops view started"
        );
    }

    /// Log server shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Cluster ops view shutting down"
        );
    }

    pub fn log_subscriber_connected(&self, subscriber_id: u64, subscribers: usize) {
        info!(
            event = "subscriber_connected",
            instance = %self.instance,
            subscriber_id = subscriber_id,
            subscribers = subscribers,
            "Live feed subscriber connected"
        );
    }

    pub fn log_subscriber_disconnected(&self, subscriber_id: u64, subscribers: usize) {
        info!(
            event = "subscriber_disconnected",
            instance = %self.instance,
            subscriber_id = subscriber_id,
            subscribers = subscribers,
            "Live feed subscriber disconnected"
        );
    }

    /// Log a watched object that could not be converted into a record
    pub fn log_event_skipped(&self, kind: EntityKind, name: &str, error: &dyn std::fmt::Display) {
        warn!(
            event = "event_skipped",
            instance = %self.instance,
            kind = %kind,
            name = %name,
            error = %error,
            "Skipping object that could not be converted"
        );
    }

    pub fn log_usage_fetch_failed(&self, kind: EntityKind, error: &dyn std::fmt::Display) {
        warn!(
            event = "usage_fetch_failed",
            instance = %self.instance,
            kind = %kind,
            error = %error,
            "Failed to fetch resource usage, retrying next tick"
        );
    }

    pub fn log_usage_merged(&self, kind: EntityKind, samples: usize, matched: usize) {
        debug!(
            event = "usage_merged",
            instance = %self.instance,
            kind = %kind,
            samples = samples,
            matched = matched,
            "Merged resource usage samples"
        );
    }

    /// Log a resource watch (re)connecting
    pub fn log_watch_started(&self, kind: EntityKind) {
        info!(
            event = "watch_status",
            instance = %self.instance,
            kind = %kind,
            connected = true,
            "Watching cluster resources"
        );
    }

    pub fn log_watch_error(&self, kind: EntityKind, error: &dyn std::fmt::Display) {
        warn!(
            event = "watch_status",
            instance = %self.instance,
            kind = %kind,
            connected = false,
            error = %error,
            "Resource watch failed, retrying with backoff"
        );
    }
}
