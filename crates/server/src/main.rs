//! Cluster ops view server
//!
//! Mirrors the nodes and pods of the cluster it runs in and pushes
//! snapshots to connected viewers.

use anyhow::{Context, Result};
use mirror_lib::{
    health::{components, HealthRegistry},
    ClusterMirror, KubeUsageSource, MetricsOverlay, StructuredLogger, WatchDriver,
};
use opsview_server::{api, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Time allowed for background tasks to stop after shutdown is signalled
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting opsview-server");

    let config = ServerConfig::load()?;
    info!(
        port = config.port,
        settle_delay_ms = config.settle_delay_ms,
        cooldown_ms = config.cooldown_ms,
        metrics_enabled = config.metrics_enabled,
        "Server configured"
    );

    let instance = std::env::var("HOSTNAME").unwrap_or_else(|_| "opsview".to_string());
    let logger = StructuredLogger::new(instance);

    let health_registry = HealthRegistry::with_readiness_window(config.readiness_window());
    health_registry.register(components::BROADCASTER).await;

    let mirror = ClusterMirror::new(&config.broadcast(), logger.clone());

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut tasks = Vec::new();

    let driver = WatchDriver::new(client.clone(), mirror.clone(), health_registry.clone());
    tasks.push(tokio::spawn(driver.run(shutdown_tx.subscribe())));

    if config.metrics_enabled {
        let overlay = MetricsOverlay::new(
            Arc::new(KubeUsageSource::new(client)),
            mirror.clone(),
            health_registry.clone(),
            config.overlay(),
        );
        tasks.push(tokio::spawn(overlay.run(shutdown_tx.subscribe())));
    } else {
        info!("Usage overlay disabled");
    }

    let state = Arc::new(api::AppState::new(
        mirror,
        health_registry,
        logger.clone(),
        config.static_dir.clone(),
    ));

    let mut api_shutdown = shutdown_tx.subscribe();
    let mut api_handle = tokio::spawn(api::serve(config.port, state, async move {
        let _ = api_shutdown.recv().await;
    }));

    logger.log_startup(SERVER_VERSION, config.port);

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        result = &mut api_handle => {
            logger.log_shutdown("API server stopped");
            return result.context("API server task panicked")?;
        }
    }

    let _ = shutdown_tx.send(());
    // Open live feeds never finish on their own, so the wait is bounded
    if tokio::time::timeout(SHUTDOWN_GRACE, api_handle).await.is_err() {
        warn!("API server did not stop in time");
    }
    for task in tasks {
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, task).await;
    }

    info!("Shutdown complete");
    Ok(())
}
