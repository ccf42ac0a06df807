use super::*;
use crate::broadcast::BroadcastConfig;
use crate::health::ComponentStatus;
use crate::models::{Record, ResourceAggregate, WorkloadRecord};
use crate::observability::StructuredLogger;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Mock usage source for testing
struct MockUsageSource {
    calls: AtomicUsize,
    fail_nodes: AtomicBool,
    nodes: Vec<NodeUsage>,
    workloads: Vec<WorkloadUsage>,
}

impl MockUsageSource {
    fn new(nodes: Vec<NodeUsage>, workloads: Vec<WorkloadUsage>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_nodes: AtomicBool::new(false),
            nodes,
            workloads,
        }
    }
}

#[async_trait]
impl UsageSource for MockUsageSource {
    async fn node_usage(&self) -> Result<Vec<NodeUsage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_nodes.load(Ordering::SeqCst) {
            anyhow::bail!("the server is currently unable to handle the request");
        }
        Ok(self.nodes.clone())
    }

    async fn workload_usage(&self) -> Result<Vec<WorkloadUsage>> {
        Ok(self.workloads.clone())
    }
}

fn container(name: &str, cpu: &str, memory: &str) -> ContainerUsage {
    ContainerUsage {
        name: name.to_string(),
        cpu: cpu.to_string(),
        memory: memory.to_string(),
    }
}

fn workload_record(namespace: &str, name: &str) -> WorkloadRecord {
    WorkloadRecord {
        name: name.to_string(),
        namespace: namespace.to_string(),
        status: "Running".to_string(),
        node_name: "worker-1".to_string(),
        labels: BTreeMap::new(),
        usage: None,
        ip: String::new(),
        start_time: String::new(),
        restarts: 0,
        containers: Vec::new(),
        resources: ResourceAggregate::default(),
        controller_type: "Deployment".to_string(),
    }
}

fn setup(source: Arc<MockUsageSource>) -> (ClusterMirror, HealthRegistry, MetricsOverlay) {
    let mirror = ClusterMirror::new(&BroadcastConfig::default(), StructuredLogger::new("test"));
    let health = HealthRegistry::new();
    let overlay = MetricsOverlay::new(
        source,
        mirror.clone(),
        health.clone(),
        OverlayConfig::default(),
    );
    (mirror, health, overlay)
}

fn sample_source() -> MockUsageSource {
    MockUsageSource::new(
        vec![NodeUsage {
            name: "unknown-node".to_string(),
            cpu: "1".to_string(),
            memory: "1Gi".to_string(),
        }],
        vec![
            WorkloadUsage {
                namespace: "default".to_string(),
                name: "web-0".to_string(),
                containers: vec![
                    container("app", "100m", "64Mi"),
                    container("proxy", "250m", "64Mi"),
                ],
            },
            WorkloadUsage {
                namespace: "default".to_string(),
                name: "not-mirrored".to_string(),
                containers: vec![container("app", "1m", "1Mi")],
            },
        ],
    )
}

#[test]
fn test_workload_sample_sums_containers() {
    let usage = WorkloadUsage {
        namespace: "default".to_string(),
        name: "web-0".to_string(),
        containers: vec![
            container("app", "100m", "64Mi"),
            container("proxy", "250m", "64Mi"),
        ],
    };

    let sample = usage.sample().unwrap();
    assert_eq!(sample.cpu, "350m");
    assert_eq!(sample.memory, "128Mi");
}

#[test]
fn test_workload_without_containers_is_zero() {
    let usage = WorkloadUsage {
        namespace: "default".to_string(),
        name: "idle".to_string(),
        containers: Vec::new(),
    };

    let sample = usage.sample().unwrap();
    assert_eq!(sample.cpu, "0");
    assert_eq!(sample.memory, "0");
}

#[test]
fn test_unparseable_workload_sample() {
    let usage = WorkloadUsage {
        namespace: "default".to_string(),
        name: "broken".to_string(),
        containers: vec![container("app", "lots", "1Mi")],
    };

    assert!(usage.sample().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_merges_only_existing_records() {
    let (mirror, _health, overlay) = setup(Arc::new(sample_source()));
    mirror
        .store()
        .upsert(Record::Workload(workload_record("default", "web-0")));

    let outcome = overlay.refresh().await;
    assert_eq!(outcome.nodes_matched, Some(0));
    assert_eq!(outcome.workloads_matched, Some(1));

    let snapshot = mirror.snapshot();
    assert!(snapshot.nodes.is_empty());
    assert_eq!(snapshot.workloads.len(), 1);
    let usage = snapshot.workloads[0].usage.as_ref().expect("merged");
    assert_eq!(usage.cpu, "350m");
    assert_eq!(usage.memory, "128Mi");
}

#[tokio::test(start_paused = true)]
async fn test_refresh_requests_broadcast() {
    let (mirror, _health, overlay) = setup(Arc::new(sample_source()));
    mirror
        .store()
        .upsert(Record::Workload(workload_record("default", "web-0")));
    let mut sub = mirror.subscribe();

    overlay.refresh().await;

    let snapshot = sub.recv().await.expect("delivery after refresh");
    assert!(snapshot.workloads[0].usage.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_failed_batch_does_not_block_the_other() {
    let source = Arc::new(sample_source());
    source.fail_nodes.store(true, Ordering::SeqCst);
    let (mirror, health, overlay) = setup(Arc::clone(&source));
    mirror
        .store()
        .upsert(Record::Workload(workload_record("default", "web-0")));

    let outcome = overlay.refresh().await;
    assert_eq!(outcome.nodes_matched, None);
    assert_eq!(outcome.workloads_matched, Some(1));
    assert_eq!(
        health.status(components::METRICS_OVERLAY).await,
        Some(ComponentStatus::Degraded)
    );

    source.fail_nodes.store(false, Ordering::SeqCst);
    assert!(overlay.refresh().await.is_complete());
    assert_eq!(
        health.status(components::METRICS_OVERLAY).await,
        Some(ComponentStatus::Healthy)
    );
}

#[tokio::test(start_paused = true)]
async fn test_run_refreshes_every_interval_until_shutdown() {
    let source = Arc::new(sample_source());
    let (_mirror, _health, overlay) = setup(Arc::clone(&source));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let handle = tokio::spawn(overlay.run(shutdown_rx));

    // Ticks at 0s, 10s and 20s
    tokio::time::sleep(Duration::from_secs(25)).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
}
