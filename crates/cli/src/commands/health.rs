//! Server health and readiness

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, or_dash, print_success, print_table, print_warning, OutputFormat};
use mirror_lib::health::{ComponentStatus, HealthResponse, ReadinessResponse};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Serialize)]
struct HealthReport<'a> {
    health: &'a HealthResponse,
    readiness: &'a ReadinessResponse,
}

fn status_name(status: ComponentStatus) -> &'static str {
    match status {
        ComponentStatus::Healthy => "healthy",
        ComponentStatus::Degraded => "degraded",
        ComponentStatus::Unhealthy => "unhealthy",
    }
}

/// Show health and readiness
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;
    let readiness = client.readiness().await?;

    if let OutputFormat::Json = format {
        let report = HealthReport {
            health: &health,
            readiness: &readiness,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "Server Health".bold());
    println!("{}", "=".repeat(50));
    println!("Status:                 {}", color_status(status_name(health.status)));
    println!();

    let mut names: Vec<&String> = health.components.keys().collect();
    names.sort();
    let rows: Vec<ComponentRow> = names
        .into_iter()
        .map(|name| {
            let component = &health.components[name];
            ComponentRow {
                name: name.clone(),
                status: color_status(status_name(component.status)),
                message: or_dash(component.message.as_deref()),
            }
        })
        .collect();
    print_table(rows, &health.components, format);
    println!();

    match (readiness.ready, readiness.last_delivery_secs) {
        (true, Some(secs)) => print_success(&format!("Ready (last update {}s ago)", secs)),
        (true, None) => print_success("Ready"),
        (false, _) => print_warning(&format!(
            "Not ready: {}",
            readiness.reason.as_deref().unwrap_or("unknown")
        )),
    }

    Ok(())
}
