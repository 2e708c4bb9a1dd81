//! Config command implementation.

use super::start::load_config;
use crate::core::config::{Config, ConfigOverrides};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate the configuration file.
    Validate,
    /// Print the effective configuration with defaults and overrides applied.
    Show {
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Generate a configuration template.
    Generate {
        /// Output file path.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Template flavor (udp, loopback).
        #[arg(long, default_value = "udp")]
        transport: String,
    },
}

/// Run the config command.
pub fn run_config(args: ConfigArgs, config_path: &Path, overrides: &ConfigOverrides) -> Result<()> {
    match args.command {
        ConfigCommand::Validate => {
            load_config(config_path, overrides, false)?;
            println!("{}: configuration is valid", config_path.display());
            Ok(())
        }
        ConfigCommand::Show { format } => {
            let config = load_config(config_path, overrides, false)?;
            println!("{}", render(&config, &format)?);
            Ok(())
        }
        ConfigCommand::Generate { output, transport } => {
            let template = generate_template(&transport)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &template)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("generated {} config template: {}", transport, path.display());
                }
                None => println!("{template}"),
            }
            Ok(())
        }
    }
}

fn render(config: &Config, format: &str) -> Result<String> {
    match format {
        "json" => Ok(serde_json::to_string_pretty(config)?),
        "toml" => config.to_toml(),
        other => anyhow::bail!("unsupported format: {other} (expected toml or json)"),
    }
}

fn generate_template(transport: &str) -> Result<String> {
    let template = match transport {
        "udp" => UDP_TEMPLATE,
        "loopback" => LOOPBACK_TEMPLATE,
        other => anyhow::bail!("unknown transport flavor: {other} (expected udp or loopback)"),
    };
    Ok(template.to_string())
}

const UDP_TEMPLATE: &str = r#"# A1 mediator configuration

[transport]
kind = "udp"
bind = "0.0.0.0:4562"
max_receive_batch = 2048

# Handler requests for policy type 20000 go to two handlers.
[[transport.routes]]
message_type = 20010
routing_key = 20000
endpoints = ["127.0.0.1:4560", "127.0.0.1:4561"]

# Everything else with message type 20010.
[[transport.routes]]
message_type = 20010
endpoints = ["127.0.0.1:4560"]

[work_loop]
interval_ms = 1000
send_retries = 4
retry_backoff_ms = 10
health_window_seconds = 30

[telemetry]
log_level = "info"
"#;

const LOOPBACK_TEMPLATE: &str = r#"# A1 mediator configuration (in-process transport, development only)

[transport]
kind = "loopback"

[work_loop]
interval_ms = 1000
send_retries = 4
retry_backoff_ms = 10
health_window_seconds = 30

[telemetry]
log_level = "debug"
"#;
