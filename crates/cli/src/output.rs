//! Output formatting utilities

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print rows as a table, or `items` as JSON
pub fn print_table<T: Tabled, S: Serialize + ?Sized>(rows: Vec<T>, items: &S, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(rows).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(items) {
                println!("{}", json);
            }
        }
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color a node, pod or component status
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "ready" | "running" | "succeeded" | "completed" | "healthy" => {
            status.green().to_string()
        }
        "cordoned" | "pending" | "containercreating" | "podinitializing" | "terminating"
        | "degraded" => status.yellow().to_string(),
        "notready" | "failed" | "error" | "crashloopbackoff" | "imagepullbackoff"
        | "errimagepull" | "oomkilled" | "unhealthy" => status.red().to_string(),
        s if s.starts_with("init:") => status.yellow().to_string(),
        _ => status.to_string(),
    }
}

/// Value or a dash when empty
pub fn or_dash(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => "-".to_string(),
    }
}

/// Age of an RFC 3339 timestamp relative to `now`, e.g. `42s`, `7m`, `3h`, `12d`
pub fn format_age(timestamp: &str, now: DateTime<Utc>) -> String {
    let Ok(start) = DateTime::parse_from_rfc3339(timestamp) else {
        return "-".to_string();
    };

    let secs = (now - start.with_timezone(&Utc)).num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86400),
    }
}
