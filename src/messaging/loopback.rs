//! In-process transport.
//!
//! Inbound messages are injected by the caller; sends and replies are
//! recorded. Used by tests and by `transport.kind = "loopback"` dev runs.
//! Each log keeps only the most recent entries.

use super::transport::{InboundMessage, OutboundMessage, ReplyHandle, Transport, TransportError};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Entries kept per log unless overridden.
pub const DEFAULT_RECORD_LIMIT: usize = 1024;

/// A reply recorded by the loopback transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedReply {
    pub handle: ReplyHandle,
    pub message_type: i32,
    pub payload: Bytes,
}

/// Loopback transport.
#[derive(Debug)]
pub struct LoopbackTransport {
    inbound: Mutex<VecDeque<InboundMessage>>,
    sent: Mutex<VecDeque<OutboundMessage>>,
    replies: Mutex<VecDeque<RecordedReply>>,
    record_limit: usize,
    /// Number of upcoming send attempts that fail.
    failures_remaining: AtomicUsize,
    /// When set, every send attempt fails.
    fail_all: AtomicBool,
    attempts: AtomicUsize,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::with_record_limit(DEFAULT_RECORD_LIMIT)
    }
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` sends and `limit` replies; older entries are evicted.
    pub fn with_record_limit(limit: usize) -> Self {
        Self {
            inbound: Mutex::default(),
            sent: Mutex::default(),
            replies: Mutex::default(),
            record_limit: limit.max(1),
            failures_remaining: AtomicUsize::new(0),
            fail_all: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Queue a message for the next `receive_all`.
    pub fn inject(&self, message_type: i32, payload: impl Into<Bytes>, sender: &str) {
        self.inbound.lock().push_back(InboundMessage {
            message_type,
            payload: payload.into(),
            reply: ReplyHandle::new(sender),
        });
    }

    /// Number of messages waiting to be received.
    pub fn pending_inbound(&self) -> usize {
        self.inbound.lock().len()
    }

    /// Successfully sent messages, in order.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().iter().cloned().collect()
    }

    /// Take and clear the sent log.
    pub fn take_sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().drain(..).collect()
    }

    /// Replies, in order.
    pub fn replies(&self) -> Vec<RecordedReply> {
        self.replies.lock().iter().cloned().collect()
    }

    /// Fail the next `count` send attempts.
    pub fn fail_next_sends(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Fail every send attempt until cleared.
    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Total send attempts, successful or not.
    pub fn send_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("loopback send disabled".into()));
        }
        let injected_failure = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected_failure {
            return Err(TransportError::SendFailed("injected failure".into()));
        }
        record(&self.sent, message.clone(), self.record_limit);
        Ok(())
    }

    fn receive_all(&self) -> Vec<InboundMessage> {
        self.inbound.lock().drain(..).collect()
    }

    fn reply(
        &self,
        handle: &ReplyHandle,
        message_type: i32,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let reply = RecordedReply {
            handle: handle.clone(),
            message_type,
            payload,
        };
        record(&self.replies, reply, self.record_limit);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "loopback"
    }
}

fn record<T>(log: &Mutex<VecDeque<T>>, entry: T, limit: usize) {
    let mut log = log.lock();
    while log.len() >= limit {
        log.pop_front();
    }
    log.push_back(entry);
}
