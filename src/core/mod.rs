//! Core runtime infrastructure.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`runtime`] - Main runtime orchestration
//! - [`error`] - Error types and HTTP status mapping

pub mod config;
pub mod error;
pub mod runtime;
