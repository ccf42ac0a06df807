//! Server configuration

use anyhow::{ensure, Context, Result};
use mirror_lib::{BroadcastConfig, OverlayConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Pause before a leading delivery, in milliseconds
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Coalescing window length, in milliseconds
    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,

    /// Snapshots queued per live feed subscriber
    #[serde(default = "default_queue_capacity")]
    pub subscriber_queue_capacity: usize,

    /// Poll metrics-server for usage samples
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,

    /// Usage poll interval in seconds
    #[serde(default = "default_metrics_poll")]
    pub metrics_poll_secs: u64,

    /// Not ready once the last delivery is older than this, in seconds
    #[serde(default = "default_readiness_window")]
    pub readiness_window_secs: u64,

    /// Directory of viewer assets served for unmatched paths
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

fn default_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_settle_delay() -> u64 {
    50
}

fn default_cooldown() -> u64 {
    200
}

fn default_queue_capacity() -> usize {
    10
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_poll() -> u64 {
    10
}

fn default_readiness_window() -> u64 {
    30
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("web/dist")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            settle_delay_ms: default_settle_delay(),
            cooldown_ms: default_cooldown(),
            subscriber_queue_capacity: default_queue_capacity(),
            metrics_enabled: default_metrics_enabled(),
            metrics_poll_secs: default_metrics_poll(),
            readiness_window_secs: default_readiness_window(),
            static_dir: default_static_dir(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from an optional `opsview` config file and
    /// `OPSVIEW_*` environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("opsview").required(false))
            .add_source(config::Environment::with_prefix("OPSVIEW").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        let config: ServerConfig = config
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.settle_delay_ms < self.cooldown_ms,
            "settle_delay_ms ({}) must be shorter than cooldown_ms ({})",
            self.settle_delay_ms,
            self.cooldown_ms
        );
        ensure!(
            self.subscriber_queue_capacity >= 1,
            "subscriber_queue_capacity must be at least 1"
        );
        ensure!(
            self.metrics_poll_secs >= 1,
            "metrics_poll_secs must be at least 1"
        );
        ensure!(
            self.readiness_window_secs >= 1,
            "readiness_window_secs must be at least 1"
        );
        Ok(())
    }

    pub fn broadcast(&self) -> BroadcastConfig {
        BroadcastConfig {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            cooldown: Duration::from_millis(self.cooldown_ms),
            queue_capacity: self.subscriber_queue_capacity,
        }
    }

    pub fn overlay(&self) -> OverlayConfig {
        OverlayConfig {
            interval: Duration::from_secs(self.metrics_poll_secs),
        }
    }

    pub fn readiness_window(&self) -> Duration {
        Duration::from_secs(self.readiness_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_core_defaults() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.broadcast(), BroadcastConfig::default());
        assert_eq!(config.overlay().interval, OverlayConfig::default().interval);
        assert_eq!(config.readiness_window(), Duration::from_secs(30));
    }

    #[test]
    fn test_settle_delay_must_be_shorter_than_cooldown() {
        let config = ServerConfig {
            settle_delay_ms: 200,
            cooldown_ms: 200,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = ServerConfig {
            subscriber_queue_capacity: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_source_uses_defaults() {
        let config: ServerConfig = config::Config::builder()
            .set_override("cooldown_ms", 500)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.cooldown_ms, 500);
        assert_eq!(config.settle_delay_ms, 50);
        assert!(config.metrics_enabled);
    }
}
