//! Lifecycle Controller.
//!
//! Validates and persists policy types and instances, enqueues handler
//! notifications, and exposes read paths. Reads of instance state run an
//! on-demand reconciliation sweep first so callers see every status report
//! received so far.

use super::queue::{Notification, NotificationSender};
use crate::core::error::{MediatorError, MediatorResult};
use crate::messaging::message::HandlerRequest;
use crate::ops::observability::MediatorMetrics;
use crate::policy::data::PolicyStore;
use crate::policy::model::{InstanceStatusReport, PolicyType, PolicyTypeId};
use crate::policy::schema::{check_type_definition, PayloadValidator};
use crate::reconcile::engine::ReconciliationEngine;
use crate::storage::keys::SEPARATOR;
use serde_json::Value;
use std::sync::Arc;

/// Entry point for lifecycle operations.
pub struct LifecycleController {
    store: Arc<PolicyStore>,
    engine: Arc<ReconciliationEngine>,
    notifications: NotificationSender,
    metrics: Arc<MediatorMetrics>,
}

impl LifecycleController {
    pub fn new(
        store: Arc<PolicyStore>,
        engine: Arc<ReconciliationEngine>,
        notifications: NotificationSender,
        metrics: Arc<MediatorMetrics>,
    ) -> Self {
        Self {
            store,
            engine,
            notifications,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<MediatorMetrics> {
        &self.metrics
    }

    // ==================================================================
    // Types
    // ==================================================================

    /// Register a new policy type.
    pub fn create_type(&self, type_id: PolicyTypeId, body: &Value) -> MediatorResult<()> {
        check_type_definition(type_id, body)?;
        self.store.store_type(type_id, body)?;
        tracing::info!(type_id, "policy type created");
        Ok(())
    }

    pub fn get_type(&self, type_id: PolicyTypeId) -> MediatorResult<PolicyType> {
        self.store.get_type(type_id)
    }

    pub fn list_types(&self) -> MediatorResult<Vec<PolicyTypeId>> {
        self.store.list_types()
    }

    /// Remove a type with no remaining instances.
    ///
    /// Pending status reports are applied first, so instances whose handlers
    /// have all confirmed deletion no longer block the removal.
    pub fn delete_type(&self, type_id: PolicyTypeId) -> MediatorResult<()> {
        self.store.ensure_type(type_id)?;
        self.engine.sweep();
        self.engine.evaluate_type(type_id);
        self.store.delete_type(type_id)?;
        tracing::info!(type_id, "policy type deleted");
        Ok(())
    }

    // ==================================================================
    // Instances
    // ==================================================================

    /// Create or replace an instance and notify handlers.
    ///
    /// Returns once the instance is stored; delivery is asynchronous.
    pub fn create_or_replace_instance(
        &self,
        type_id: PolicyTypeId,
        instance_id: &str,
        payload: &Value,
    ) -> MediatorResult<()> {
        validate_instance_id(instance_id)?;
        let policy_type = self.store.get_type(type_id)?;
        PayloadValidator::for_type(&policy_type)?.validate(payload)?;

        self.store.store_instance(type_id, instance_id, payload)?;
        tracing::info!(type_id, instance_id, "policy instance stored");

        self.notify(&HandlerRequest::create(type_id, instance_id, payload.clone()));
        Ok(())
    }

    /// Request deletion of an instance and notify handlers.
    ///
    /// Repeated calls are accepted and re-send DELETE. The instance is purged
    /// later, once every handler reports DELETED.
    pub fn delete_instance(&self, type_id: PolicyTypeId, instance_id: &str) -> MediatorResult<()> {
        let metadata = self.store.mark_instance_deleted(type_id, instance_id)?;
        tracing::info!(
            type_id,
            instance_id,
            deleted_at = ?metadata.deleted_at,
            "policy instance deletion requested"
        );
        self.notify(&HandlerRequest::delete(type_id, instance_id));
        Ok(())
    }

    /// Fetch an instance payload.
    pub fn get_instance(&self, type_id: PolicyTypeId, instance_id: &str) -> MediatorResult<Value> {
        self.reconcile_instance(type_id, instance_id);
        self.store.get_instance(type_id, instance_id)
    }

    /// Instance ids of a type.
    pub fn list_instances(&self, type_id: PolicyTypeId) -> MediatorResult<Vec<String>> {
        self.store.ensure_type(type_id)?;
        self.engine.sweep();
        self.engine.evaluate_type(type_id);
        self.store.list_instances(type_id)
    }

    /// Aggregate status and metadata of an instance.
    pub fn get_instance_status(
        &self,
        type_id: PolicyTypeId,
        instance_id: &str,
    ) -> MediatorResult<InstanceStatusReport> {
        self.reconcile_instance(type_id, instance_id);
        self.store.instance_status(type_id, instance_id)
    }

    fn reconcile_instance(&self, type_id: PolicyTypeId, instance_id: &str) {
        self.engine.sweep();
        self.engine.evaluate_deletion(type_id, instance_id);
    }

    fn notify(&self, request: &HandlerRequest) {
        match Notification::from_request(request) {
            Ok(notification) => {
                if self.notifications.enqueue(notification) {
                    self.metrics.record_enqueued();
                } else {
                    self.metrics.record_notification_dropped();
                }
            }
            Err(e) => {
                tracing::error!(
                    type_id = request.policy_type_id,
                    instance_id = %request.policy_instance_id,
                    error = %e,
                    "failed to build notification"
                );
                self.metrics.record_notification_dropped();
            }
        }
    }
}

/// Instance ids become key segments, so they must be non-empty and free of
/// the key separator.
pub fn validate_instance_id(instance_id: &str) -> MediatorResult<()> {
    let reason = if instance_id.is_empty() {
        "must not be empty"
    } else if instance_id.contains(SEPARATOR) {
        "must not contain '.'"
    } else if instance_id.chars().any(char::is_control) {
        "must not contain control characters"
    } else {
        return Ok(());
    };
    Err(MediatorError::InvalidIdentifier {
        value: instance_id.to_string(),
        reason: reason.to_string(),
    })
}
