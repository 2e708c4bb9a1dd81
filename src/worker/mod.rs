//! Background work loop driving notification delivery and reconciliation.

pub mod work_loop;

pub use work_loop::{IterationReport, Liveness, WorkLoop, WorkLoopHandle};
