//! Start command implementation.

use crate::core::config::{Config, ConfigOverrides};
use crate::core::runtime::Runtime;
use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;

/// Start the mediator.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Run with defaults when the config file does not exist.
    #[arg(long)]
    pub allow_missing_config: bool,
}

/// Initialize tracing subscriber if the telemetry feature is enabled.
///
/// `RUST_LOG` wins over the configured level.
#[cfg(feature = "telemetry")]
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init();
}

#[cfg(not(feature = "telemetry"))]
pub fn init_tracing(_level: &str) {}

/// Load config, apply overrides and validate the result.
pub fn load_config(
    config_path: &Path,
    overrides: &ConfigOverrides,
    allow_missing: bool,
) -> Result<Config> {
    let mut config = if allow_missing && !config_path.exists() {
        Config::default()
    } else {
        Config::from_file(config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    };
    config.apply_overrides(overrides);
    config.validate().context("invalid configuration after overrides")?;
    Ok(config)
}

/// Run the start command.
pub async fn run_start(args: StartArgs, config_path: &Path, overrides: &ConfigOverrides) -> Result<()> {
    let config = load_config(config_path, overrides, args.allow_missing_config)?;
    init_tracing(&config.telemetry.log_level);
    tracing::info!(config = %config_path.display(), "configuration loaded");

    let mut runtime = Runtime::new(config)?;
    runtime.run().await
}
