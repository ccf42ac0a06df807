//! Kubernetes watch driver
//!
//! Runs one `kube` runtime watcher per mirrored kind and feeds every event
//! into the [`ClusterMirror`]. Watch errors are retried with backoff and
//! reported through the health registry.

use super::{Change, ClusterMirror, Deleted, MirroredResource};
use crate::health::{components, HealthRegistry};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::pin::pin;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tracing::{info, warn};

/// Drives node and pod watches into the mirror
pub struct WatchDriver {
    client: Client,
    mirror: ClusterMirror,
    health: HealthRegistry,
}

impl WatchDriver {
    pub fn new(client: Client, mirror: ClusterMirror, health: HealthRegistry) -> Self {
        Self {
            client,
            mirror,
            health,
        }
    }

    /// Watch until shutdown is signalled
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting cluster watches");
        self.health.register(components::WATCHER).await;

        let nodes = Api::<Node>::all(self.client.clone());
        let pods = Api::<Pod>::all(self.client.clone());

        tokio::select! {
            _ = watch_kind(nodes, &self.mirror, &self.health) => {}
            _ = watch_kind(pods, &self.mirror, &self.health) => {}
            _ = shutdown.recv() => {
                info!("Shutting down cluster watches");
            }
        }
    }
}

async fn watch_kind<K>(api: Api<K>, mirror: &ClusterMirror, health: &HealthRegistry)
where
    K: MirroredResource + Resource + Clone + DeserializeOwned + Debug + Send + 'static,
{
    let logger = mirror.logger();
    let mut stream = pin!(watcher(api, watcher::Config::default()).default_backoff());
    let mut failing = false;

    logger.log_watch_started(K::KIND);

    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => {
                if failing {
                    failing = false;
                    logger.log_watch_started(K::KIND);
                    health.set_healthy(components::WATCHER).await;
                }
                mirror.apply(K::into_event(to_change(event)));
            }
            Err(e) => {
                logger.log_watch_error(K::KIND, &e);
                if !failing {
                    failing = true;
                    health
                        .set_degraded(components::WATCHER, format!("{} watch: {}", K::KIND, e))
                        .await;
                }
            }
        }
    }

    warn!(kind = %K::KIND, "Watch stream ended");
    health
        .set_unhealthy(components::WATCHER, format!("{} watch ended", K::KIND))
        .await;
}

pub(super) fn to_change<K>(event: watcher::Event<K>) -> Change<K> {
    match event {
        watcher::Event::Applied(object) => Change::Applied(object),
        watcher::Event::Deleted(object) => Change::Deleted(Deleted::Object(object)),
        watcher::Event::Restarted(objects) => Change::Relisted(objects),
    }
}
