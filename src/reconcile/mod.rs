//! Reconciliation of handler-reported state.

pub mod engine;

pub use engine::{ReconciliationEngine, SweepReport};
