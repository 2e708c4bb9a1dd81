//! Outbound notification queue.
//!
//! Lifecycle operations enqueue; only the work loop dequeues and talks to the
//! transport. Enqueue never blocks and never fails the caller.

use crate::core::error::{MediatorError, MediatorResult};
use crate::messaging::message::{HandlerRequest, Operation, A1_POLICY_REQUEST};
use crate::messaging::transport::OutboundMessage;
use crate::policy::model::PolicyTypeId;
use tokio::sync::mpsc;

/// A handler request ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub operation: Operation,
    pub type_id: PolicyTypeId,
    pub instance_id: String,
    pub message: OutboundMessage,
}

impl Notification {
    /// Encode a request, routed by its policy type id.
    pub fn from_request(request: &HandlerRequest) -> MediatorResult<Self> {
        let body = request.to_bytes().map_err(|e| {
            MediatorError::internal(format!("failed to encode handler request: {e}"))
        })?;
        Ok(Self {
            operation: request.operation,
            type_id: request.policy_type_id,
            instance_id: request.policy_instance_id.clone(),
            message: OutboundMessage::new(A1_POLICY_REQUEST, request.policy_type_id, body),
        })
    }
}

/// Create a connected sender/receiver pair.
pub fn notification_queue() -> (NotificationSender, NotificationReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (NotificationSender { tx }, NotificationReceiver { rx })
}

/// Producer side, cloned into lifecycle callers.
#[derive(Debug, Clone)]
pub struct NotificationSender {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationSender {
    /// Enqueue a notification. Returns false if the work loop is gone.
    pub fn enqueue(&self, notification: Notification) -> bool {
        match self.tx.send(notification) {
            Ok(()) => true,
            Err(mpsc::error::SendError(n)) => {
                tracing::warn!(
                    operation = n.operation.as_str(),
                    type_id = n.type_id,
                    instance_id = %n.instance_id,
                    "work loop stopped; notification discarded"
                );
                false
            }
        }
    }
}

/// Consumer side, owned by the work loop.
#[derive(Debug)]
pub struct NotificationReceiver {
    rx: mpsc::UnboundedReceiver<Notification>,
}

impl NotificationReceiver {
    /// Take everything currently queued, in enqueue order.
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut drained = Vec::new();
        while let Ok(n) = self.rx.try_recv() {
            drained.push(n);
        }
        drained
    }
}
