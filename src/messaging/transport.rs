//! Transport Adapter contract.
//!
//! The transport is at-most-once and unordered across handlers. `send` may
//! fail; callers decide how often to retry. `receive_all` never blocks.

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// A message addressed by type and routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub message_type: i32,
    /// Routing key; the policy type id for handler requests.
    pub routing_key: i64,
    pub payload: Bytes,
}

impl OutboundMessage {
    pub fn new(message_type: i32, routing_key: i64, payload: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            routing_key,
            payload: payload.into(),
        }
    }
}

/// Opaque handle for replying to the sender of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplyHandle(String);

impl ReplyHandle {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self(endpoint.into())
    }

    /// Transport-specific endpoint description.
    pub fn endpoint(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub message_type: i32,
    pub payload: Bytes,
    pub reply: ReplyHandle,
}

/// Transport failures. Never surfaced to lifecycle callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("no route for message type {message_type} routing key {routing_key}")]
    NoRoute { message_type: i32, routing_key: i64 },

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("invalid reply handle: {0}")]
    InvalidReplyHandle(String),
}

/// Best-effort messaging primitive.
pub trait Transport: Send + Sync {
    /// Attempt one delivery.
    fn send(&self, message: &OutboundMessage) -> Result<(), TransportError>;

    /// Drain every message currently waiting. Never blocks.
    fn receive_all(&self) -> Vec<InboundMessage>;

    /// Send a message back to the originator of an inbound message.
    fn reply(
        &self,
        handle: &ReplyHandle,
        message_type: i32,
        payload: Bytes,
    ) -> Result<(), TransportError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}
