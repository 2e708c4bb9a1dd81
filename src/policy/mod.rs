//! Policy types, instances and the typed State Store.
//!
//! - [`model`] - Data model and status aggregation rules
//! - [`schema`] - JSON-schema validation of instance payloads
//! - [`data`] - [`PolicyStore`], the typed State Store

pub mod data;
pub mod model;
pub mod schema;

pub use data::PolicyStore;
pub use model::{AggregateStatus, InstanceStatusReport, PolicyTypeId};
