//! CLI command implementations.

mod config;
mod start;

pub use config::{run_config, ConfigArgs, ConfigCommand};
pub use start::{init_tracing, load_config, run_start, StartArgs};
