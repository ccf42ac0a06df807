//! Snapshot broadcasting
//!
//! The [`Coalescer`] turns a stream of observable changes into rate-limited
//! full-snapshot deliveries, and the [`SubscriberRegistry`] fans each
//! delivery out to live subscribers without ever blocking the publisher.

mod coalescer;
mod registry;


pub use coalescer::{Coalescer, DeliveryKind};
pub use registry::{PublishOutcome, SubscriberRegistry, Subscription};

use std::time::Duration;

/// Timing and queueing knobs for snapshot delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Pause before a leading delivery, absorbing near-simultaneous changes (default: 50ms)
    pub settle_delay: Duration,
    /// Length of a coalescing window and minimum spacing of deliveries (default: 200ms)
    pub cooldown: Duration,
    /// Per-subscriber queue capacity (default: 10)
    pub queue_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(50),
            cooldown: Duration::from_millis(200),
            queue_capacity: 10,
        }
    }
}
