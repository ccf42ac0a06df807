//! Follow mode on the live feed

use anyhow::Result;
use chrono::Local;
use colored::Colorize;
use mirror_lib::{ClusterSnapshot, NodeStatus};

use crate::client::{ApiClient, FeedUpdate};
use crate::output::{print_info, print_warning, OutputFormat};

/// Counts shown for one snapshot
#[derive(Debug, PartialEq, Eq)]
struct Summary {
    nodes: usize,
    nodes_ready: usize,
    pods: usize,
    pods_running: usize,
    restarts: u64,
}

impl Summary {
    fn of(snapshot: &ClusterSnapshot) -> Self {
        Self {
            nodes: snapshot.nodes.len(),
            nodes_ready: snapshot
                .nodes
                .iter()
                .filter(|n| n.status == NodeStatus::Ready)
                .count(),
            pods: snapshot.workloads.len(),
            pods_running: snapshot
                .workloads
                .iter()
                .filter(|p| p.status == "Running")
                .count(),
            restarts: snapshot.workloads.iter().map(|p| u64::from(p.restarts)).sum(),
        }
    }
}

fn summary_line(update: &FeedUpdate) -> String {
    let summary = Summary::of(&update.snapshot);
    format!(
        "[{}] {}/{} nodes ready, {}/{} pods running, {} restarts",
        update.id.as_deref().unwrap_or("initial"),
        summary.nodes_ready,
        summary.nodes,
        summary.pods_running,
        summary.pods,
        summary.restarts
    )
}

/// Print one line per snapshot until `count` snapshots were seen or the
/// server closes the feed
pub async fn follow(client: &ApiClient, count: Option<usize>, format: OutputFormat) -> Result<()> {
    let mut feed = client.stream().await?;
    if let OutputFormat::Table = format {
        print_info("Following live feed (Ctrl-C to stop)");
    }

    let mut seen = 0usize;
    while count.map_or(true, |limit| seen < limit) {
        let Some(update) = feed.next().await? else {
            if let OutputFormat::Table = format {
                print_warning("Feed closed by server");
            }
            break;
        };
        seen += 1;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(&update.snapshot)?);
            }
            OutputFormat::Table => {
                let time = Local::now().format("%H:%M:%S").to_string();
                println!("{} {}", time.dimmed(), summary_line(&update));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ClusterSnapshot {
        serde_json::from_value(serde_json::json!({
            "nodes": [
                { "name": "cp-1", "status": "Ready", "roles": ["control-plane"] },
                { "name": "worker-1", "status": "Cordoned", "roles": ["worker"] }
            ],
            "pods": [
                { "name": "api", "namespace": "default", "status": "Running",
                  "restarts": 2, "controller_type": "ReplicaSet" },
                { "name": "job", "namespace": "default", "status": "Pending",
                  "controller_type": "Job" }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_summary_counts() {
        assert_eq!(
            Summary::of(&snapshot()),
            Summary {
                nodes: 2,
                nodes_ready: 1,
                pods: 2,
                pods_running: 1,
                restarts: 2,
            }
        );
    }

    #[test]
    fn test_summary_line_labels_initial_snapshot() {
        let initial = FeedUpdate {
            id: None,
            snapshot: snapshot(),
        };
        assert_eq!(
            summary_line(&initial),
            "[initial] 1/2 nodes ready, 1/2 pods running, 2 restarts"
        );

        let update = FeedUpdate {
            id: Some("update-3".to_string()),
            snapshot: ClusterSnapshot::default(),
        };
        assert!(summary_line(&update).starts_with("[update-3] 0/0 nodes ready"));
    }
}
