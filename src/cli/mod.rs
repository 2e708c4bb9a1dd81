//! Command-line interface.

pub mod commands;

use crate::core::config::ConfigOverrides;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/a1-mediator.toml";

/// A1 policy mediator.
#[derive(Parser, Debug)]
#[command(name = "a1-mediator")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Transport bind address.
    #[arg(long, global = true)]
    pub bind: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            log_level: self.log_level.clone(),
            bind: self.bind.clone(),
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the mediator.
    Start(commands::StartArgs),
    /// Configuration operations.
    Config(commands::ConfigArgs),
}
