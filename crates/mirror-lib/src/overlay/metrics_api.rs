//! Client for the `metrics.k8s.io/v1beta1` API served by metrics-server

use super::{async_trait, ContainerUsage, NodeUsage, UsageSource, WorkloadUsage};
use anyhow::{Context, Result};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::ListParams;
use kube::{Api, Client};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const GROUP: &str = "metrics.k8s.io";
const VERSION: &str = "v1beta1";
const API_VERSION: &str = "metrics.k8s.io/v1beta1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub window: Option<String>,
    #[serde(default)]
    pub usage: BTreeMap<String, Quantity>,
}

impl k8s_openapi::Resource for NodeMetrics {
    type Scope = k8s_openapi::ClusterResourceScope;

    const API_VERSION: &'static str = API_VERSION;
    const GROUP: &'static str = GROUP;
    const KIND: &'static str = "NodeMetrics";
    const URL_PATH_SEGMENT: &'static str = "nodes";
    const VERSION: &'static str = VERSION;
}

impl k8s_openapi::Metadata for NodeMetrics {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &Self::Ty {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Self::Ty {
        &mut self.metadata
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerMetrics {
    pub name: String,
    #[serde(default)]
    pub usage: BTreeMap<String, Quantity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodMetrics {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub window: Option<String>,
    #[serde(default)]
    pub containers: Vec<ContainerMetrics>,
}

impl k8s_openapi::Resource for PodMetrics {
    type Scope = k8s_openapi::NamespaceResourceScope;

    const API_VERSION: &'static str = API_VERSION;
    const GROUP: &'static str = GROUP;
    const KIND: &'static str = "PodMetrics";
    const URL_PATH_SEGMENT: &'static str = "pods";
    const VERSION: &'static str = VERSION;
}

impl k8s_openapi::Metadata for PodMetrics {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &Self::Ty {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Self::Ty {
        &mut self.metadata
    }
}

// A missing resource reads as zero
fn usage_of(usage: &BTreeMap<String, Quantity>, resource: &str) -> String {
    usage
        .get(resource)
        .map(|q| q.0.clone())
        .unwrap_or_else(|| "0".to_string())
}

impl NodeMetrics {
    /// Usage of the named node; `None` for a nameless item
    pub fn to_usage(&self) -> Option<NodeUsage> {
        Some(NodeUsage {
            name: self.metadata.name.clone()?,
            cpu: usage_of(&self.usage, "cpu"),
            memory: usage_of(&self.usage, "memory"),
        })
    }
}

impl PodMetrics {
    pub fn to_usage(&self) -> Option<WorkloadUsage> {
        Some(WorkloadUsage {
            name: self.metadata.name.clone()?,
            namespace: self.metadata.namespace.clone().unwrap_or_default(),
            containers: self
                .containers
                .iter()
                .map(|c| ContainerUsage {
                    name: c.name.clone(),
                    cpu: usage_of(&c.usage, "cpu"),
                    memory: usage_of(&c.usage, "memory"),
                })
                .collect(),
        })
    }
}

/// [`UsageSource`] backed by metrics-server
#[derive(Clone)]
pub struct KubeUsageSource {
    client: Client,
}

impl KubeUsageSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UsageSource for KubeUsageSource {
    async fn node_usage(&self) -> Result<Vec<NodeUsage>> {
        let api = Api::<NodeMetrics>::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .context("Failed to list node metrics")?;

        Ok(list.items.iter().filter_map(NodeMetrics::to_usage).collect())
    }

    async fn workload_usage(&self) -> Result<Vec<WorkloadUsage>> {
        let api = Api::<PodMetrics>::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .context("Failed to list pod metrics")?;

        Ok(list.items.iter().filter_map(PodMetrics::to_usage).collect())
    }
}
