//! Storage layer.
//!
//! - [`backend`] - Byte-valued key-value backend with prefix scans
//! - [`keys`] - Key namespace for types, instances, metadata and handler statuses

pub mod backend;
pub mod keys;

pub use backend::{KvBackend, MemoryBackend};
