//! A1 policy mediator.
//!
//! The mediator sits between a control-plane API and a set of downstream
//! policy handlers. It stores policy types and instances, notifies handlers
//! of every instance change over a best-effort transport, folds the status
//! reports handlers send back into an aggregate per-instance status, and
//! purges deleted instances once every handler has confirmed the deletion.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Lifecycle Controller                        │
//! │   types: create/get/list/delete   instances: put/get/del/status │
//! └─────────────────────────────────────────────────────────────────┘
//!          │ writes                          │ enqueue CREATE/DELETE
//! ┌──────────────────────┐        ┌──────────────────────────────────┐
//! │     State Store      │◄───────│            Work Loop             │
//! │  types │ instances   │ status │  deliver (retry) → sweep → tick  │
//! │  metadata │ handlers │        └──────────────────────────────────┘
//! └──────────────────────┘                   │
//!          ▲                      ┌──────────────────────────────────┐
//!          └──────────────────────│      Reconciliation Engine       │
//!                                 │   statuses │ queries │ purges    │
//!                                 └──────────────────────────────────┘
//!                                            │
//!                                 ┌──────────────────────────────────┐
//!                                 │    Transport (udp │ loopback)    │
//!                                 └──────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Runtime orchestration
//! - [`core::error`] - Error types and HTTP status mapping
//!
//! ## State
//! - [`storage`] - Key-value backend contract and key layout
//! - [`policy`] - Data model, schema validation, typed State Store
//!
//! ## Lifecycle
//! - [`control`] - Lifecycle Controller and notification queue
//! - [`reconcile`] - Reconciliation Engine
//! - [`worker`] - Background work loop
//! - [`messaging`] - Wire bodies and transports
//!
//! ## Operations
//! - [`ops::observability`] - Metrics and health checks
//! - [`cli`] - CLI command implementations
//!
//! # Key Invariants
//!
//! - An instance never exists without its type.
//! - A type is only removed once it owns no instances.
//! - Replacing an instance clears every handler status.
//! - An instance is purged only when it has at least one status and every
//!   status is `DELETED`.

// Core infrastructure
pub mod core;

// State
pub mod policy;
pub mod storage;

// Lifecycle
pub mod control;
pub mod messaging;
pub mod reconcile;
pub mod worker;

// Operations and observability
pub mod ops;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, runtime};
pub use control::LifecycleController;
pub use policy::PolicyStore;
pub use reconcile::ReconciliationEngine;
