//! Lifecycle control.
//!
//! - [`controller`] - [`LifecycleController`], the entry point for type and
//!   instance operations
//! - [`queue`] - Outbound notification queue drained by the work loop
//!
//! Writes are synchronous against the State Store; handler notification is
//! asynchronous and best effort.

pub mod controller;
pub mod queue;

pub use controller::{validate_instance_id, LifecycleController};
pub use queue::{notification_queue, Notification, NotificationReceiver, NotificationSender};
