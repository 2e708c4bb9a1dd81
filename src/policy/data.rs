//! Typed State Store for policy types, instances and handler statuses.
//!
//! Values are JSON-encoded into the backend. Multi-key updates (replace,
//! purge, type delete) run as scan-then-write sequences; they are serialized
//! against each other by a mutation lock but are not atomic with respect to
//! backend failures.

use crate::core::error::{MediatorError, MediatorResult};
use crate::policy::model::{
    all_deleted, InstanceMetadata, InstanceStatusReport, PolicyInstance, PolicyType, PolicyTypeId,
};
use crate::storage::backend::KvBackend;
use crate::storage::keys;
use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// State Store over a key-value backend.
pub struct PolicyStore {
    backend: Arc<dyn KvBackend>,
    /// Serializes multi-key mutation sequences.
    mutation: Mutex<()>,
}

impl PolicyStore {
    /// Create a store over the given backend.
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            mutation: Mutex::new(()),
        }
    }

    /// The underlying backend.
    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    // ------------------------------------------------------------------
    // Encoding helpers
    // ------------------------------------------------------------------

    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> MediatorResult<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| MediatorError::internal(format!("failed to encode {key}: {e}")))?;
        self.backend.put(key, bytes)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> MediatorResult<Option<T>> {
        match self.backend.get(key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| MediatorError::internal(format!("failed to decode {key}: {e}"))),
            None => Ok(None),
        }
    }

    fn exists(&self, key: &str) -> MediatorResult<bool> {
        Ok(self.backend.get(key)?.is_some())
    }

    // ------------------------------------------------------------------
    // Validity checks
    // ------------------------------------------------------------------

    /// Fail with TypeNotFound unless the type exists.
    pub fn ensure_type(&self, type_id: PolicyTypeId) -> MediatorResult<()> {
        if self.exists(&keys::type_key(type_id))? {
            Ok(())
        } else {
            Err(MediatorError::type_not_found(type_id))
        }
    }

    /// Fail with TypeNotFound or InstanceNotFound unless the instance exists.
    pub fn ensure_instance(&self, type_id: PolicyTypeId, instance_id: &str) -> MediatorResult<()> {
        self.ensure_type(type_id)?;
        if self.exists(&keys::instance_key(type_id, instance_id))? {
            Ok(())
        } else {
            Err(MediatorError::instance_not_found(type_id, instance_id))
        }
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    /// Register a type. Fails if the id is taken.
    pub fn store_type(&self, type_id: PolicyTypeId, body: &Value) -> MediatorResult<()> {
        let _guard = self.mutation.lock();
        let key = keys::type_key(type_id);
        if self.exists(&key)? {
            return Err(MediatorError::TypeAlreadyExists { type_id });
        }
        self.put_json(&key, body)
    }

    /// Fetch a type.
    pub fn get_type(&self, type_id: PolicyTypeId) -> MediatorResult<PolicyType> {
        let body: Value = self
            .get_json(&keys::type_key(type_id))?
            .ok_or_else(|| MediatorError::type_not_found(type_id))?;
        Ok(PolicyType { id: type_id, body })
    }

    /// All registered type ids, ascending.
    pub fn list_types(&self) -> MediatorResult<Vec<PolicyTypeId>> {
        let entries = self.backend.scan_prefix(keys::TYPE_PREFIX)?;
        let mut ids: Vec<PolicyTypeId> = entries
            .keys()
            .filter_map(|k| {
                let parsed = keys::parse_type_key(k);
                if parsed.is_none() {
                    tracing::warn!(key = %k, "skipping unparseable policy type key");
                }
                parsed
            })
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Remove a type that owns no instances.
    pub fn delete_type(&self, type_id: PolicyTypeId) -> MediatorResult<()> {
        let _guard = self.mutation.lock();
        let instances = self.list_instances(type_id)?;
        if !instances.is_empty() {
            return Err(MediatorError::TypeNotEmpty {
                type_id,
                instance_count: instances.len(),
            });
        }
        self.backend.delete(&keys::type_key(type_id))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------

    /// Create or replace an instance.
    ///
    /// Replacing clears every handler status: the new payload starts a new
    /// delivery round.
    pub fn store_instance(
        &self,
        type_id: PolicyTypeId,
        instance_id: &str,
        payload: &Value,
    ) -> MediatorResult<()> {
        let _guard = self.mutation.lock();
        self.ensure_type(type_id)?;

        let key = keys::instance_key(type_id, instance_id);
        if self.exists(&key)? {
            self.clear_handlers(type_id, instance_id)?;
        }
        self.put_json(&key, payload)?;
        self.put_json(
            &keys::metadata_key(type_id, instance_id),
            &InstanceMetadata::created(Utc::now()),
        )
    }

    /// Fetch an instance payload.
    pub fn get_instance(&self, type_id: PolicyTypeId, instance_id: &str) -> MediatorResult<Value> {
        self.ensure_type(type_id)?;
        self.get_json(&keys::instance_key(type_id, instance_id))?
            .ok_or_else(|| MediatorError::instance_not_found(type_id, instance_id))
    }

    /// Load an instance with metadata and statuses.
    pub fn load_instance(
        &self,
        type_id: PolicyTypeId,
        instance_id: &str,
    ) -> MediatorResult<PolicyInstance> {
        let payload = self.get_instance(type_id, instance_id)?;
        let metadata = self.get_metadata(type_id, instance_id)?;
        let statuses = self.get_statuses(type_id, instance_id)?;
        Ok(PolicyInstance {
            type_id,
            instance_id: instance_id.to_string(),
            payload,
            metadata,
            statuses,
        })
    }

    /// All instance ids of a type, ascending.
    pub fn list_instances(&self, type_id: PolicyTypeId) -> MediatorResult<Vec<String>> {
        self.ensure_type(type_id)?;
        let prefix = keys::instance_prefix(type_id);
        let mut ids: Vec<String> = self
            .backend
            .scan_prefix(&prefix)?
            .keys()
            .filter_map(|k| keys::strip_scan_prefix(k, &prefix).map(str::to_string))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Fetch instance metadata.
    pub fn get_metadata(
        &self,
        type_id: PolicyTypeId,
        instance_id: &str,
    ) -> MediatorResult<InstanceMetadata> {
        self.ensure_instance(type_id, instance_id)?;
        self.get_json(&keys::metadata_key(type_id, instance_id))?
            .ok_or_else(|| {
                MediatorError::internal(format!(
                    "policy instance {type_id}/{instance_id} has no metadata"
                ))
            })
    }

    /// Record a deletion request. Repeated calls keep the first timestamp.
    pub fn mark_instance_deleted(
        &self,
        type_id: PolicyTypeId,
        instance_id: &str,
    ) -> MediatorResult<InstanceMetadata> {
        let _guard = self.mutation.lock();
        let mut metadata = self.get_metadata(type_id, instance_id)?;
        metadata.mark_deleted(Utc::now());
        self.put_json(&keys::metadata_key(type_id, instance_id), &metadata)?;
        Ok(metadata)
    }

    // ------------------------------------------------------------------
    // Handler statuses
    // ------------------------------------------------------------------

    /// Upsert one handler's status for an existing instance.
    pub fn set_handler_status(
        &self,
        type_id: PolicyTypeId,
        instance_id: &str,
        handler_id: &str,
        status: &str,
    ) -> MediatorResult<()> {
        let _guard = self.mutation.lock();
        self.ensure_instance(type_id, instance_id)?;
        self.put_json(&keys::handler_key(type_id, instance_id, handler_id), &status)
    }

    /// handler id -> status for an instance.
    pub fn get_statuses(
        &self,
        type_id: PolicyTypeId,
        instance_id: &str,
    ) -> MediatorResult<HashMap<String, String>> {
        self.ensure_instance(type_id, instance_id)?;
        let prefix = keys::handler_prefix(type_id, instance_id);
        let mut statuses = HashMap::new();
        for (key, bytes) in self.backend.scan_prefix(&prefix)? {
            let Some(handler_id) = keys::strip_scan_prefix(&key, &prefix) else {
                continue;
            };
            let status: String = serde_json::from_slice(&bytes)
                .map_err(|e| MediatorError::internal(format!("failed to decode {key}: {e}")))?;
            statuses.insert(handler_id.to_string(), status);
        }
        Ok(statuses)
    }

    /// Aggregate status plus metadata for an instance.
    pub fn instance_status(
        &self,
        type_id: PolicyTypeId,
        instance_id: &str,
    ) -> MediatorResult<InstanceStatusReport> {
        let metadata = self.get_metadata(type_id, instance_id)?;
        let statuses = self.get_statuses(type_id, instance_id)?;
        Ok(InstanceStatusReport::new(
            &metadata,
            statuses.values().map(String::as_str),
        ))
    }

    /// Purge the instance if every recorded status is DELETED.
    ///
    /// Returns whether the instance was removed. An empty status set never
    /// qualifies.
    pub fn purge_if_all_deleted(
        &self,
        type_id: PolicyTypeId,
        instance_id: &str,
    ) -> MediatorResult<bool> {
        let _guard = self.mutation.lock();
        let statuses = self.get_statuses(type_id, instance_id)?;
        if !all_deleted(statuses.values().map(String::as_str)) {
            return Ok(false);
        }

        self.clear_handlers(type_id, instance_id)?;
        self.backend
            .delete(&keys::instance_key(type_id, instance_id))?;
        self.backend
            .delete(&keys::metadata_key(type_id, instance_id))?;
        tracing::info!(type_id, instance_id, "policy instance purged");
        Ok(true)
    }

    /// Delete every handler status of an instance. Caller holds the mutation lock.
    fn clear_handlers(&self, type_id: PolicyTypeId, instance_id: &str) -> MediatorResult<()> {
        let prefix = keys::handler_prefix(type_id, instance_id);
        for key in self.backend.scan_prefix(&prefix)?.keys() {
            self.backend.delete(key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::storage::backend::MemoryBackend;
    use serde_json::json;

    fn store() -> PolicyStore {
        PolicyStore::new(Arc::new(MemoryBackend::new()))
    }

    fn type_body() -> Value {
        json!({"name": "t", "create_schema": {"type": "object"}})
    }

    #[test]
    fn test_type_roundtrip_and_listing() {
        let s = store();
        s.store_type(20001, &type_body()).unwrap();
        s.store_type(3, &type_body()).unwrap();
        assert_eq!(s.get_type(20001).unwrap().body, type_body());
        assert_eq!(s.list_types().unwrap(), vec![3, 20001]);

        let err = s.store_type(3, &type_body()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_replace_resets_statuses() {
        let s = store();
        s.store_type(1, &type_body()).unwrap();
        s.store_instance(1, "p", &json!({"v": 1})).unwrap();
        s.set_handler_status(1, "p", "h1", "OK").unwrap();
        assert_eq!(s.get_statuses(1, "p").unwrap().len(), 1);

        s.store_instance(1, "p", &json!({"v": 2})).unwrap();
        assert!(s.get_statuses(1, "p").unwrap().is_empty());
        assert_eq!(s.get_instance(1, "p").unwrap(), json!({"v": 2}));
    }

    #[test]
    fn test_handler_prefix_isolated_between_instances() {
        let s = store();
        s.store_type(1, &type_body()).unwrap();
        s.store_instance(1, "a", &json!({})).unwrap();
        s.store_instance(1, "ab", &json!({})).unwrap();
        s.set_handler_status(1, "a", "h", "OK").unwrap();
        s.set_handler_status(1, "ab", "h", "DELETED").unwrap();

        let a = s.get_statuses(1, "a").unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a.get("h").map(String::as_str), Some("OK"));
    }

    #[test]
    fn test_status_for_missing_instance_is_not_found() {
        let s = store();
        s.store_type(1, &type_body()).unwrap();
        let err = s.set_handler_status(1, "missing", "h", "OK").unwrap_err();
        assert!(err.is_not_found());
        let err = s.set_handler_status(2, "missing", "h", "OK").unwrap_err();
        assert!(matches!(err, MediatorError::TypeNotFound { type_id: 2 }));
    }

    #[test]
    fn test_purge_requires_non_empty_all_deleted() {
        let s = store();
        s.store_type(1, &type_body()).unwrap();
        s.store_instance(1, "p", &json!({})).unwrap();

        assert!(!s.purge_if_all_deleted(1, "p").unwrap());

        s.set_handler_status(1, "p", "h1", "DELETED").unwrap();
        s.set_handler_status(1, "p", "h2", "OK").unwrap();
        assert!(!s.purge_if_all_deleted(1, "p").unwrap());

        s.set_handler_status(1, "p", "h2", "DELETED").unwrap();
        assert!(s.purge_if_all_deleted(1, "p").unwrap());
        assert!(s.get_instance(1, "p").unwrap_err().is_not_found());

        // Nothing under the instance survives.
        let backend = s.backend();
        assert!(backend
            .scan_prefix(&keys::handler_prefix(1, "p"))
            .unwrap()
            .is_empty());
        assert!(backend.get(&keys::metadata_key(1, "p")).unwrap().is_none());
    }

    #[test]
    fn test_delete_type_gated_on_instances() {
        let s = store();
        s.store_type(1, &type_body()).unwrap();
        s.store_instance(1, "p", &json!({})).unwrap();
        let err = s.delete_type(1).unwrap_err();
        assert!(matches!(
            err,
            MediatorError::TypeNotEmpty {
                instance_count: 1,
                ..
            }
        ));

        s.set_handler_status(1, "p", "h", "DELETED").unwrap();
        s.purge_if_all_deleted(1, "p").unwrap();
        s.delete_type(1).unwrap();
        assert!(s.get_type(1).unwrap_err().is_not_found());
    }
}
