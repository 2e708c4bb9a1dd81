//! Reconciliation Engine.
//!
//! Folds handler status reports into the State Store, answers handler
//! queries, and purges instances whose handlers have all confirmed deletion.
//! Nothing here returns an error to the caller: a message that cannot be
//! applied is logged and dropped. A panic while handling one message drops
//! that message only; the rest of the batch is still applied.

use crate::core::error::{MediatorError, MediatorResult};
use crate::messaging::message::{
    parse_inbound, HandlerRequest, Inbound, PolicyQuery, StatusReport, A1_POLICY_REQUEST,
};
use crate::messaging::transport::{InboundMessage, ReplyHandle, Transport};
use crate::ops::observability::MediatorMetrics;
use crate::policy::data::PolicyStore;
use crate::policy::model::PolicyTypeId;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Inbound messages drained from the transport.
    pub received: usize,
    /// Status reports written to the store.
    pub statuses_applied: usize,
    /// Inbound messages discarded.
    pub dropped: usize,
    /// CREATE replies sent in answer to queries.
    pub query_replies: usize,
    /// Instances purged during deletion evaluation.
    pub purged: Vec<(PolicyTypeId, String)>,
}

/// Reconciliation Engine over a store and transport.
pub struct ReconciliationEngine {
    store: Arc<PolicyStore>,
    transport: Arc<dyn Transport>,
    metrics: Arc<MediatorMetrics>,
    /// Serializes sweeps from the work loop and on-demand reads.
    sweep_lock: Mutex<()>,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<PolicyStore>,
        transport: Arc<dyn Transport>,
        metrics: Arc<MediatorMetrics>,
    ) -> Self {
        Self {
            store,
            transport,
            metrics,
            sweep_lock: Mutex::new(()),
        }
    }

    /// Drain every pending inbound message and apply it, then evaluate
    /// deletion for each instance a status report touched.
    pub fn sweep(&self) -> SweepReport {
        let _guard = self.sweep_lock.lock();
        let mut report = SweepReport::default();
        let mut touched = BTreeSet::new();

        let messages = self.transport.receive_all();
        report.received = messages.len();
        for message in &messages {
            let handled = catch_unwind(AssertUnwindSafe(|| {
                self.handle_message(message, &mut report, &mut touched)
            }));
            if handled.is_err() {
                tracing::error!(
                    message_type = message.message_type,
                    sender = %message.reply,
                    "panic while handling inbound message; dropped"
                );
                self.drop_inbound(&mut report);
            }
        }

        for (type_id, instance_id) in touched {
            let purged = catch_unwind(AssertUnwindSafe(|| {
                self.evaluate_deletion(type_id, &instance_id)
            }));
            match purged {
                Ok(true) => report.purged.push((type_id, instance_id)),
                Ok(false) => {}
                Err(_) => tracing::error!(
                    type_id,
                    instance_id = %instance_id,
                    "panic during deletion evaluation"
                ),
            }
        }

        if report.received > 0 {
            tracing::debug!(
                received = report.received,
                applied = report.statuses_applied,
                dropped = report.dropped,
                purged = report.purged.len(),
                "reconciliation sweep complete"
            );
        }
        report
    }

    fn handle_message(
        &self,
        message: &InboundMessage,
        report: &mut SweepReport,
        touched: &mut BTreeSet<(PolicyTypeId, String)>,
    ) {
        let inbound = match parse_inbound(message.message_type, &message.payload) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(
                    message_type = message.message_type,
                    sender = %message.reply,
                    error = %e,
                    "dropping inbound message"
                );
                self.drop_inbound(report);
                return;
            }
        };

        match inbound {
            Inbound::Status(status) => match self.apply_status(&status) {
                Ok(()) => {
                    report.statuses_applied += 1;
                    self.metrics.record_status_applied();
                    touched.insert((status.policy_type_id, status.policy_instance_id));
                }
                Err(e) if e.is_not_found() => {
                    // Late report for an instance that is already gone.
                    tracing::debug!(
                        type_id = status.policy_type_id,
                        instance_id = %status.policy_instance_id,
                        handler_id = %status.handler_id,
                        "ignoring status for unknown policy instance"
                    );
                    self.drop_inbound(report);
                }
                Err(e) => {
                    tracing::warn!(
                        type_id = status.policy_type_id,
                        instance_id = %status.policy_instance_id,
                        handler_id = %status.handler_id,
                        error = %e,
                        "failed to record handler status"
                    );
                    self.drop_inbound(report);
                }
            },
            Inbound::Query(query) => match self.answer_query(&query, &message.reply) {
                Ok(sent) => {
                    report.query_replies += sent;
                    self.metrics.record_query_replies(sent as u64);
                }
                Err(e) => {
                    tracing::warn!(
                        type_id = query.policy_type_id,
                        sender = %message.reply,
                        error = %e,
                        "dropping policy query"
                    );
                    self.drop_inbound(report);
                }
            },
        }
    }

    fn drop_inbound(&self, report: &mut SweepReport) {
        report.dropped += 1;
        self.metrics.record_inbound_dropped();
    }

    fn apply_status(&self, status: &StatusReport) -> MediatorResult<()> {
        self.store.set_handler_status(
            status.policy_type_id,
            &status.policy_instance_id,
            &status.handler_id,
            &status.status,
        )
    }

    /// Reply with one CREATE per live instance of the queried type.
    ///
    /// Instances with a pending deletion are skipped rather than replayed,
    /// so a restarted handler is never told to re-create them. A reply that
    /// fails to send is logged and does not stop the rest.
    fn answer_query(&self, query: &PolicyQuery, reply: &ReplyHandle) -> MediatorResult<usize> {
        let type_id = query.policy_type_id;
        let mut sent = 0;
        for instance_id in self.store.list_instances(type_id)? {
            let instance = match self.store.load_instance(type_id, &instance_id) {
                Ok(instance) => instance,
                // Purged between listing and loading.
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            if instance.metadata.has_been_deleted {
                continue;
            }

            let body = HandlerRequest::create(type_id, &instance_id, instance.payload)
                .to_bytes()
                .map_err(|e| MediatorError::internal(format!("failed to encode reply: {e}")))?;
            match self
                .transport
                .reply(reply, A1_POLICY_REQUEST, Bytes::from(body))
            {
                Ok(()) => sent += 1,
                Err(e) => tracing::warn!(
                    type_id,
                    instance_id = %instance_id,
                    sender = %reply,
                    error = %e,
                    "failed to send query reply"
                ),
            }
        }
        tracing::info!(type_id, sender = %reply, replies = sent, "answered policy query");
        Ok(sent)
    }

    /// Purge the instance if it qualifies. Returns whether it was removed.
    pub fn evaluate_deletion(&self, type_id: PolicyTypeId, instance_id: &str) -> bool {
        match self.store.purge_if_all_deleted(type_id, instance_id) {
            Ok(true) => {
                self.metrics.record_purged();
                true
            }
            Ok(false) => false,
            Err(e) if e.is_not_found() => false,
            Err(e) => {
                tracing::warn!(
                    type_id,
                    instance_id,
                    error = %e,
                    "deletion evaluation failed"
                );
                false
            }
        }
    }

    /// Evaluate deletion for every instance of a type. Returns the number purged.
    pub fn evaluate_type(&self, type_id: PolicyTypeId) -> usize {
        let instances = match self.store.list_instances(type_id) {
            Ok(ids) => ids,
            Err(e) => {
                if !e.is_not_found() {
                    tracing::warn!(type_id, error = %e, "failed to list instances for deletion");
                }
                return 0;
            }
        };
        instances
            .iter()
            .filter(|id| self.evaluate_deletion(type_id, id))
            .count()
    }
}
