//! a1-mediator - unified CLI entrypoint.
//!
//! Usage:
//!   a1-mediator start --config config/a1-mediator.toml
//!   a1-mediator config validate --config config/a1-mediator.toml
//!   a1-mediator config show [--format json]
//!   a1-mediator config generate [--transport loopback] [--output FILE]

use a1_mediator::cli::commands::{run_config, run_start};
use a1_mediator::cli::{Cli, Commands};
use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config_path();
    let overrides = cli.overrides();

    match cli.command {
        Commands::Start(args) => run_start(args, &config_path, &overrides).await,
        Commands::Config(args) => run_config(args, &config_path, &overrides),
    }
}
