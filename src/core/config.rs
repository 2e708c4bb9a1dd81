//! Configuration parsing and validation.
//!
//! Mediator configuration is loaded from TOML files with CLI overrides.
//! Every section has defaults, so an empty file is a valid configuration.

use crate::messaging::udp::Route;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Top-level mediator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Handler transport.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Background work loop.
    #[serde(default)]
    pub work_loop: WorkLoopConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// "udp" or "loopback".
    #[serde(default = "default_transport_kind")]
    pub kind: String,

    /// UDP bind address.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Most datagrams drained per receive call.
    #[serde(default = "default_max_receive_batch")]
    pub max_receive_batch: usize,

    /// Static routes for outbound messages.
    #[serde(default)]
    pub routes: Vec<Route>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: default_transport_kind(),
            bind: default_bind(),
            max_receive_batch: default_max_receive_batch(),
            routes: Vec::new(),
        }
    }
}

impl TransportConfig {
    /// Parsed bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .with_context(|| format!("transport.bind is not a socket address: {}", self.bind))
    }
}

/// Work loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkLoopConfig {
    /// Sleep between iterations.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Send attempts per notification.
    #[serde(default = "default_send_retries")]
    pub send_retries: u32,

    /// Pause between failed send attempts.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Health window: the loop is unhealthy if it has not iterated within it.
    #[serde(default = "default_health_window_seconds")]
    pub health_window_seconds: u64,
}

impl Default for WorkLoopConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            send_retries: default_send_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            health_window_seconds: default_health_window_seconds(),
        }
    }
}

impl WorkLoopConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn health_window(&self) -> Duration {
        Duration::from_secs(self.health_window_seconds)
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_transport_kind() -> String {
    "udp".to_string()
}

fn default_bind() -> String {
    "0.0.0.0:4562".to_string()
}

fn default_max_receive_batch() -> usize {
    2048
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_send_retries() -> u32 {
    4
}

fn default_retry_backoff_ms() -> u64 {
    10
}

fn default_health_window_seconds() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

const TRANSPORT_KINDS: [&str; 2] = ["udp", "loopback"];
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref bind) = overrides.bind {
            self.transport.bind = bind.clone();
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_transport()?;
        self.validate_work_loop()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_transport(&self) -> Result<()> {
        let transport = &self.transport;
        if !TRANSPORT_KINDS.contains(&transport.kind.as_str()) {
            anyhow::bail!(
                "transport.kind must be one of {:?}, got: {}",
                TRANSPORT_KINDS,
                transport.kind
            );
        }
        if transport.kind == "udp" {
            transport.bind_addr()?;
        }
        if transport.max_receive_batch == 0 {
            anyhow::bail!("transport.max_receive_batch must be > 0");
        }
        for (i, route) in transport.routes.iter().enumerate() {
            if route.endpoints.is_empty() {
                anyhow::bail!(
                    "transport.routes[{}] (message_type {}) has no endpoints",
                    i,
                    route.message_type
                );
            }
        }
        Ok(())
    }

    fn validate_work_loop(&self) -> Result<()> {
        let work_loop = &self.work_loop;
        if work_loop.interval_ms == 0 {
            anyhow::bail!("work_loop.interval_ms must be > 0");
        }
        if work_loop.send_retries == 0 {
            anyhow::bail!("work_loop.send_retries must be >= 1");
        }
        if work_loop.health_window_seconds == 0 {
            anyhow::bail!("work_loop.health_window_seconds must be > 0");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                LOG_LEVELS,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override transport bind address.
    pub bind: Option<String>,
}
