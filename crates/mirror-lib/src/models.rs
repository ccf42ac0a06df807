//! Core data models for the cluster mirror
//!
//! Field names follow the JSON contract consumed by the viewers, so the
//! serialized snapshot is wire compatible with existing dashboards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Entity kinds held by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Node,
    Workload,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::Workload => "workload",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a workload.
///
/// Workloads are keyed by `(namespace, name)` rather than by name alone, so
/// identically named pods in different namespaces never collide. Ordering is
/// by name first, which keeps snapshots sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkloadKey {
    pub name: String,
    pub namespace: String,
}

impl WorkloadKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for WorkloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Identity of any stored record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Node(String),
    Workload(WorkloadKey),
}

impl RecordKey {
    pub fn kind(&self) -> EntityKind {
        match self {
            RecordKey::Node(_) => EntityKind::Node,
            RecordKey::Workload(_) => EntityKind::Workload,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Node(name) => write!(f, "node/{}", name),
            RecordKey::Workload(key) => write!(f, "workload/{}", key),
        }
    }
}

/// Point-in-time resource usage reading.
///
/// Both values are opaque, already formatted quantity strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSample {
    pub cpu: String,
    pub memory: String,
}

/// Node readiness as shown to viewers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Ready,
    NotReady,
    Cordoned,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Ready => "Ready",
            NodeStatus::NotReady => "NotReady",
            NodeStatus::Cordoned => "Cordoned",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mirrored node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    pub status: NodeStatus,
    pub roles: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub capacity: BTreeMap<String, String>,
    #[serde(default)]
    pub allocatable: BTreeMap<String, String>,
    #[serde(rename = "metrics", default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSample>,
    /// Kubelet version
    #[serde(rename = "version", default)]
    pub kubelet_version: String,
    #[serde(default)]
    pub kernel_version: String,
    #[serde(default)]
    pub os_image: String,
    #[serde(default)]
    pub container_runtime_version: String,
}

impl NodeRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::Node(self.name.clone())
    }
}

/// Run state of a single container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Waiting,
    Terminated,
    Unknown,
}

/// Per-container summary inside a workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub name: String,
    pub state: ContainerState,
    pub ready: bool,
    pub restarts: u32,
}

/// Requests and limits summed across a workload's containers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceAggregate {
    pub cpu_requested: String,
    pub cpu_limit: String,
    pub memory_requested: String,
    pub memory_limit: String,
}

/// Mirrored workload (pod)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadRecord {
    pub name: String,
    pub namespace: String,
    pub status: String,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(rename = "metrics", default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSample>,
    #[serde(default)]
    pub ip: String,
    /// RFC 3339 start time, empty when not yet started
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub restarts: u32,
    #[serde(default)]
    pub containers: Vec<ContainerSummary>,
    #[serde(default)]
    pub resources: ResourceAggregate,
    pub controller_type: String,
}

impl WorkloadRecord {
    pub fn workload_key(&self) -> WorkloadKey {
        WorkloadKey::new(self.namespace.clone(), self.name.clone())
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::Workload(self.workload_key())
    }
}

/// A record of either kind, as handed to the store
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Node(NodeRecord),
    Workload(WorkloadRecord),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Node(_) => EntityKind::Node,
            Record::Workload(_) => EntityKind::Workload,
        }
    }

    pub fn key(&self) -> RecordKey {
        match self {
            Record::Node(node) => node.key(),
            Record::Workload(workload) => workload.key(),
        }
    }
}

/// Immutable, name-sorted copy of the whole mirrored state
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub nodes: Vec<NodeRecord>,
    #[serde(rename = "pods")]
    pub workloads: Vec<WorkloadRecord>,
}

impl ClusterSnapshot {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.workloads.is_empty()
    }
}
