//! Resource usage overlay
//!
//! A secondary writer that periodically fetches usage samples from the
//! metrics API and merges them into records already in the mirror. It
//! never creates records and never replaces identity or spec fields.

mod metrics_api;

#[cfg(test)]
mod tests;

pub use metrics_api::{ContainerMetrics, KubeUsageSource, NodeMetrics, PodMetrics};

use crate::error::QuantityError;
use crate::health::{components, HealthRegistry};
use crate::models::{EntityKind, RecordKey, UsageSample, WorkloadKey};
use crate::observability::MirrorMetrics;
use crate::quantity::{self, QuantityFormat};
use crate::source::ClusterMirror;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

pub use async_trait::async_trait;

/// Usage of one node as reported by the metrics API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeUsage {
    pub name: String,
    pub cpu: String,
    pub memory: String,
}

/// Usage of one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerUsage {
    pub name: String,
    pub cpu: String,
    pub memory: String,
}

/// Usage of one workload, per container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadUsage {
    pub namespace: String,
    pub name: String,
    pub containers: Vec<ContainerUsage>,
}

impl NodeUsage {
    /// Sample with canonical quantity strings
    pub fn sample(&self) -> UsageSample {
        UsageSample {
            cpu: quantity::canonical(&self.cpu),
            memory: quantity::canonical(&self.memory),
        }
    }
}

impl WorkloadUsage {
    /// Sum CPU and memory across containers
    pub fn sample(&self) -> Result<UsageSample, QuantityError> {
        let cpu = quantity::sum(
            QuantityFormat::DecimalSi,
            self.containers.iter().map(|c| c.cpu.as_str()),
        )?;
        let memory = quantity::sum(
            QuantityFormat::BinarySi,
            self.containers.iter().map(|c| c.memory.as_str()),
        )?;

        Ok(UsageSample {
            cpu: cpu.to_string(),
            memory: memory.to_string(),
        })
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::Workload(WorkloadKey::new(&self.namespace, &self.name))
    }
}

/// Source of resource usage samples
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Current usage of every node
    async fn node_usage(&self) -> Result<Vec<NodeUsage>>;

    /// Current usage of every workload, across all namespaces
    async fn workload_usage(&self) -> Result<Vec<WorkloadUsage>>;
}

/// Configuration for the usage overlay
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Poll interval (default: 10 seconds)
    pub interval: Duration,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

/// Result of one refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Node samples merged into existing records, if the fetch succeeded
    pub nodes_matched: Option<usize>,
    /// Workload samples merged into existing records, if the fetch succeeded
    pub workloads_matched: Option<usize>,
}

impl RefreshOutcome {
    pub fn is_complete(&self) -> bool {
        self.nodes_matched.is_some() && self.workloads_matched.is_some()
    }
}

/// Periodic merge of usage samples into the mirror
pub struct MetricsOverlay {
    source: Arc<dyn UsageSource>,
    mirror: ClusterMirror,
    health: HealthRegistry,
    config: OverlayConfig,
    metrics: MirrorMetrics,
}

impl MetricsOverlay {
    pub fn new(
        source: Arc<dyn UsageSource>,
        mirror: ClusterMirror,
        health: HealthRegistry,
        config: OverlayConfig,
    ) -> Self {
        Self {
            source,
            mirror,
            health,
            config,
            metrics: MirrorMetrics::new(),
        }
    }

    /// Refresh on every tick until shutdown. The first refresh is immediate.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting usage overlay"
        );
        self.health.register(components::METRICS_OVERLAY).await;

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down usage overlay");
                    break;
                }
            }
        }
    }

    /// Fetch both batches once and merge them.
    ///
    /// The node and workload batches are independent: each successful batch
    /// requests one broadcast, and a failed batch is skipped until the next
    /// tick.
    pub async fn refresh(&self) -> RefreshOutcome {
        let outcome = RefreshOutcome {
            nodes_matched: self.refresh_nodes().await,
            workloads_matched: self.refresh_workloads().await,
        };

        if outcome.is_complete() {
            self.health.set_healthy(components::METRICS_OVERLAY).await;
        } else {
            self.health
                .set_degraded(components::METRICS_OVERLAY, "usage fetch failed")
                .await;
        }
        outcome
    }

    async fn refresh_nodes(&self) -> Option<usize> {
        let logger = self.mirror.logger();
        let usage = match self.source.node_usage().await {
            Ok(usage) => usage,
            Err(e) => {
                self.metrics.inc_usage_fetch_errors(EntityKind::Node);
                logger.log_usage_fetch_failed(EntityKind::Node, &e);
                return None;
            }
        };

        let matched = usage
            .iter()
            .filter(|u| {
                self.mirror
                    .merge_usage(&RecordKey::Node(u.name.clone()), u.sample())
            })
            .count();

        logger.log_usage_merged(EntityKind::Node, usage.len(), matched);
        self.mirror.request_broadcast();
        Some(matched)
    }

    async fn refresh_workloads(&self) -> Option<usize> {
        let logger = self.mirror.logger();
        let usage = match self.source.workload_usage().await {
            Ok(usage) => usage,
            Err(e) => {
                self.metrics.inc_usage_fetch_errors(EntityKind::Workload);
                logger.log_usage_fetch_failed(EntityKind::Workload, &e);
                return None;
            }
        };

        let mut matched = 0;
        for workload in &usage {
            let sample = match workload.sample() {
                Ok(sample) => sample,
                Err(e) => {
                    debug!(
                        namespace = %workload.namespace,
                        name = %workload.name,
                        error = %e,
                        "Skipping unparseable workload usage"
                    );
                    continue;
                }
            };
            if self.mirror.merge_usage(&workload.key(), sample) {
                matched += 1;
            }
        }

        logger.log_usage_merged(EntityKind::Workload, usage.len(), matched);
        self.mirror.request_broadcast();
        Some(matched)
    }
}
