//! Operations and observability.
//!
//! - [`observability`] - Metrics and health checks

pub mod observability;

pub use observability::{HealthStatus, MediatorMetrics, MetricsRegistry};
