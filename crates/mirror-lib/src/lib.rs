//! Cluster state mirror
//!
//! This crate provides the core functionality for:
//! - Converting watched nodes and pods into simplified records
//! - A concurrency-safe entity store with change detection
//! - Coalesced, rate-limited snapshot broadcasting to live subscribers
//! - Merging resource usage samples from the metrics API
//! - Health checks and observability

pub mod broadcast;
pub mod convert;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod overlay;
pub mod quantity;
pub mod source;
pub mod store;

pub use broadcast::{BroadcastConfig, Coalescer, DeliveryKind, SubscriberRegistry, Subscription};
pub use error::{ConvertError, MirrorError, MirrorResult, QuantityError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{MirrorMetrics, StructuredLogger};
pub use overlay::{KubeUsageSource, MetricsOverlay, OverlayConfig, UsageSource};
pub use source::{Change, ClusterMirror, Deleted, ResourceEvent, WatchDriver};
pub use store::EntityStore;
