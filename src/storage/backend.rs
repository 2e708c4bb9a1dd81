//! Key-value backend for the State Store.
//!
//! A backend stores opaque byte values under string keys and supports
//! prefix enumeration. Each operation is atomic on its own; there are no
//! multi-key transactions.

use crate::core::error::StoreError;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Byte-valued key-value backend.
///
/// Implementations must be safe to call concurrently from request handlers
/// and the background loop, and no call may observe a partial write.
pub trait KvBackend: Send + Sync {
    /// Store a value, replacing any previous one.
    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Fetch a value.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove a key. Returns whether it existed.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Return every key/value pair whose key starts with `prefix`.
    fn scan_prefix(&self, prefix: &str) -> Result<HashMap<String, Vec<u8>>, StoreError>;
}

/// In-memory backend guarded by a single lock.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the backend holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of all keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

impl KvBackend for MemoryBackend {
    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        let entries = self.entries.read();
        // BTreeMap ordering lets the scan stop at the first non-matching key.
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
