//! Node and pod listings

use anyhow::Result;
use chrono::Utc;
use mirror_lib::{NodeRecord, WorkloadRecord};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, format_age, or_dash, print_table, OutputFormat};

/// Row for nodes table
#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Roles")]
    roles: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "CPU Used")]
    cpu_used: String,
    #[tabled(rename = "Mem Used")]
    memory_used: String,
    #[tabled(rename = "Version")]
    version: String,
}

impl From<&NodeRecord> for NodeRow {
    fn from(node: &NodeRecord) -> Self {
        Self {
            name: node.name.clone(),
            status: color_status(node.status.as_str()),
            roles: node.roles.join(","),
            cpu: or_dash(node.allocatable.get("cpu").map(String::as_str)),
            memory: or_dash(node.allocatable.get("memory").map(String::as_str)),
            cpu_used: or_dash(node.usage.as_ref().map(|u| u.cpu.as_str())),
            memory_used: or_dash(node.usage.as_ref().map(|u| u.memory.as_str())),
            version: or_dash(Some(&node.kubelet_version)),
        }
    }
}

/// Row for pods table
#[derive(Tabled)]
struct PodRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Restarts")]
    restarts: u32,
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Age")]
    age: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
}

/// Pod listing filters; every set field must match
#[derive(Debug, Default)]
pub struct PodFilter {
    pub namespace: Option<String>,
    pub node: Option<String>,
    pub status: Option<String>,
}

impl PodFilter {
    fn matches(&self, pod: &WorkloadRecord) -> bool {
        self.namespace.as_ref().map_or(true, |ns| &pod.namespace == ns)
            && self.node.as_ref().map_or(true, |node| &pod.node_name == node)
            && self
                .status
                .as_ref()
                .map_or(true, |status| pod.status.eq_ignore_ascii_case(status))
    }

    fn apply<'a>(&self, pods: &'a [WorkloadRecord]) -> Vec<&'a WorkloadRecord> {
        pods.iter().filter(|pod| self.matches(pod)).collect()
    }
}

/// List nodes
pub async fn list_nodes(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let snapshot = client.snapshot().await?;

    let rows: Vec<NodeRow> = snapshot.nodes.iter().map(NodeRow::from).collect();
    print_table(rows, &snapshot.nodes, format);

    Ok(())
}

/// List pods matching `filter`
pub async fn list_pods(client: &ApiClient, filter: &PodFilter, format: OutputFormat) -> Result<()> {
    let snapshot = client.snapshot().await?;
    let pods = filter.apply(&snapshot.workloads);
    let now = Utc::now();

    let rows: Vec<PodRow> = pods
        .iter()
        .map(|pod| PodRow {
            namespace: pod.namespace.clone(),
            name: pod.name.clone(),
            status: color_status(&pod.status),
            restarts: pod.restarts,
            node: or_dash(Some(&pod.node_name)),
            age: format_age(&pod.start_time, now),
            cpu: or_dash(pod.usage.as_ref().map(|u| u.cpu.as_str())),
            memory: or_dash(pod.usage.as_ref().map(|u| u.memory.as_str())),
        })
        .collect();

    print_table(rows, &pods, format);

    Ok(())
}
