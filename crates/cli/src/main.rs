//! Cluster ops view CLI
//!
//! A terminal viewer for the mirrored cluster state: node and pod
//! listings, a follow mode on the live feed, and server health.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{health, inventory, watch};

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Cluster ops view CLI
#[derive(Parser)]
#[command(name = "opsview")]
#[command(author, version, about = "Terminal viewer for the cluster ops view", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via OPSVIEW_API_URL env var)
    #[arg(long, env = "OPSVIEW_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List mirrored nodes
    Nodes,

    /// List mirrored pods
    Pods {
        /// Filter by namespace
        #[arg(long, short)]
        namespace: Option<String>,

        /// Filter by node name
        #[arg(long)]
        node: Option<String>,

        /// Filter by status (e.g. Running, Pending, CrashLoopBackOff)
        #[arg(long)]
        status: Option<String>,
    },

    /// Follow the live feed, one line per snapshot
    Watch {
        /// Stop after this many snapshots
        #[arg(long, short)]
        count: Option<usize>,
    },

    /// Show server health and readiness
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()?;
    let api_url = cli
        .api_url
        .or_else(|| config.api_url.clone())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    let client = client::ApiClient::new(&api_url)?;

    match cli.command {
        Commands::Nodes => {
            inventory::list_nodes(&client, cli.format).await?;
        }
        Commands::Pods {
            namespace,
            node,
            status,
        } => {
            let filter = inventory::PodFilter {
                namespace: namespace.or(config.default_namespace),
                node,
                status,
            };
            inventory::list_pods(&client, &filter, cli.format).await?;
        }
        Commands::Watch { count } => {
            watch::follow(&client, count, cli.format).await?;
        }
        Commands::Health => {
            health::show_health(&client, cli.format).await?;
        }
    }

    Ok(())
}
