//! Background work loop.
//!
//! Each iteration delivers queued handler notifications with bounded retry,
//! runs one reconciliation sweep, and records a liveness timestamp. The loop
//! sleeps for the configured interval between iterations and exits when its
//! stop signal fires.

use crate::control::queue::{Notification, NotificationReceiver};
use crate::core::config::WorkLoopConfig;
use crate::messaging::transport::Transport;
use crate::ops::observability::{HealthStatus, MediatorMetrics};
use crate::reconcile::engine::{ReconciliationEngine, SweepReport};
use chrono::Utc;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Timestamp of the last completed iteration.
#[derive(Debug, Default)]
pub struct Liveness {
    /// Unix millis; 0 until the first iteration completes.
    last_iteration_ms: AtomicI64,
}

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an iteration at the current time. Returns the timestamp.
    pub fn touch(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        self.last_iteration_ms.store(now, Ordering::Release);
        now
    }

    /// Unix millis of the last iteration, if any.
    pub fn last_iteration_ms(&self) -> Option<i64> {
        match self.last_iteration_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(ms),
        }
    }

    /// Whether the last iteration happened within `window`.
    pub fn is_fresh(&self, window: Duration) -> bool {
        let Some(last) = self.last_iteration_ms() else {
            return false;
        };
        let age_ms = Utc::now().timestamp_millis().saturating_sub(last);
        age_ms <= window.as_millis() as i64
    }
}

/// What one iteration did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationReport {
    /// Notifications delivered.
    pub sent: usize,
    /// Notifications abandoned after exhausting retries.
    pub dropped: usize,
    pub sweep: SweepReport,
}

/// The work loop. Owns the consumer side of the notification queue.
pub struct WorkLoop {
    transport: Arc<dyn Transport>,
    engine: Arc<ReconciliationEngine>,
    notifications: NotificationReceiver,
    metrics: Arc<MediatorMetrics>,
    config: WorkLoopConfig,
    liveness: Arc<Liveness>,
}

impl WorkLoop {
    pub fn new(
        transport: Arc<dyn Transport>,
        engine: Arc<ReconciliationEngine>,
        notifications: NotificationReceiver,
        metrics: Arc<MediatorMetrics>,
        config: WorkLoopConfig,
    ) -> Self {
        Self {
            transport,
            engine,
            notifications,
            metrics,
            config,
            liveness: Arc::new(Liveness::new()),
        }
    }

    pub fn liveness(&self) -> &Arc<Liveness> {
        &self.liveness
    }

    /// Run a single iteration.
    pub async fn run_once(&mut self) -> IterationReport {
        let mut report = IterationReport::default();

        for notification in self.notifications.drain() {
            if self.deliver(&notification).await {
                report.sent += 1;
            } else {
                report.dropped += 1;
            }
        }

        report.sweep = self.engine.sweep();

        let now = self.liveness.touch();
        self.metrics.record_iteration(now.max(0) as u64);
        report
    }

    /// Attempt delivery up to `send_retries` times. Returns whether it was sent.
    ///
    /// A panicking transport drops the notification without retrying.
    async fn deliver(&self, notification: &Notification) -> bool {
        let attempts = self.config.send_retries.max(1);
        for attempt in 1..=attempts {
            let sent = catch_unwind(AssertUnwindSafe(|| {
                self.transport.send(&notification.message)
            }));
            let Ok(result) = sent else {
                self.metrics.record_notification_dropped();
                tracing::error!(
                    operation = notification.operation.as_str(),
                    type_id = notification.type_id,
                    instance_id = %notification.instance_id,
                    "panic while sending notification; dropped"
                );
                return false;
            };
            match result {
                Ok(()) => {
                    self.metrics.record_sent();
                    tracing::debug!(
                        operation = notification.operation.as_str(),
                        type_id = notification.type_id,
                        instance_id = %notification.instance_id,
                        attempt,
                        "notification sent"
                    );
                    return true;
                }
                Err(e) => {
                    self.metrics.record_send_attempt_failure();
                    tracing::debug!(
                        type_id = notification.type_id,
                        instance_id = %notification.instance_id,
                        attempt,
                        error = %e,
                        "send attempt failed"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_backoff()).await;
                    }
                }
            }
        }

        self.metrics.record_notification_dropped();
        tracing::warn!(
            operation = notification.operation.as_str(),
            type_id = notification.type_id,
            instance_id = %notification.instance_id,
            attempts,
            "notification dropped after exhausting retries"
        );
        false
    }

    /// Run until `shutdown` becomes true or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_ms = self.config.interval_ms,
            transport = self.transport.name(),
            "work loop started"
        );
        while !*shutdown.borrow() {
            self.run_once().await;
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("work loop stopped");
    }

    /// Spawn the loop on the current tokio runtime.
    pub fn spawn(self) -> WorkLoopHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let liveness = self.liveness.clone();
        let health_window = self.config.health_window();
        let task = tokio::spawn(self.run(stop_rx));
        WorkLoopHandle {
            stop_tx,
            liveness,
            health_window,
            task,
        }
    }
}

/// Handle to a spawned work loop.
pub struct WorkLoopHandle {
    stop_tx: watch::Sender<bool>,
    liveness: Arc<Liveness>,
    health_window: Duration,
    task: JoinHandle<()>,
}

impl WorkLoopHandle {
    /// Healthy iff the task is running and iterated within the health window.
    pub fn is_healthy(&self) -> bool {
        !self.task.is_finished() && self.liveness.is_fresh(self.health_window)
    }

    pub fn health(&self) -> HealthStatus {
        if self.task.is_finished() {
            HealthStatus::unhealthy("work loop is not running")
        } else if !self.liveness.is_fresh(self.health_window) {
            HealthStatus::unhealthy(format!(
                "no work loop iteration within {}s",
                self.health_window.as_secs()
            ))
        } else {
            HealthStatus::healthy()
        }
    }

    pub fn liveness(&self) -> &Arc<Liveness> {
        &self.liveness
    }

    /// Signal the loop to stop after its current iteration.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stop and wait up to `timeout` for the task to exit.
    pub async fn shutdown(self, timeout: Duration) {
        self.stop();
        match tokio::time::timeout(timeout, self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "work loop task failed"),
            Err(_) => tracing::warn!("work loop stop timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::queue::notification_queue;
    use crate::messaging::loopback::LoopbackTransport;
    use crate::messaging::message::HandlerRequest;
    use crate::messaging::transport::{InboundMessage, OutboundMessage, ReplyHandle, TransportError};
    use crate::ops::observability::metrics::NOTIFY_DROPPED_TOTAL;
    use crate::policy::data::PolicyStore;
    use crate::storage::backend::MemoryBackend;
    use bytes::Bytes;
    use serde_json::json;

    /// Panics on sends routed to `poison`, otherwise behaves like loopback.
    struct PoisonedTransport {
        inner: LoopbackTransport,
        poison: i64,
    }

    impl Transport for PoisonedTransport {
        fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
            if message.routing_key == self.poison {
                panic!("transport crashed on routing key {}", self.poison);
            }
            self.inner.send(message)
        }

        fn receive_all(&self) -> Vec<InboundMessage> {
            self.inner.receive_all()
        }

        fn reply(
            &self,
            handle: &ReplyHandle,
            message_type: i32,
            payload: Bytes,
        ) -> Result<(), TransportError> {
            self.inner.reply(handle, message_type, payload)
        }

        fn name(&self) -> &'static str {
            "poisoned"
        }
    }

    #[tokio::test]
    async fn test_panicking_send_drops_only_that_notification() {
        let transport = Arc::new(PoisonedTransport {
            inner: LoopbackTransport::new(),
            poison: 13,
        });
        let metrics = Arc::new(MediatorMetrics::new());
        let store = Arc::new(PolicyStore::new(Arc::new(MemoryBackend::new())));
        let engine = Arc::new(ReconciliationEngine::new(
            store,
            transport.clone(),
            metrics.clone(),
        ));
        let (tx, rx) = notification_queue();
        for (type_id, instance_id) in [(13, "a"), (7, "b"), (7, "c")] {
            let request = HandlerRequest::create(type_id, instance_id, json!({}));
            assert!(tx.enqueue(Notification::from_request(&request).unwrap()));
        }

        let config = WorkLoopConfig {
            interval_ms: 10,
            send_retries: 4,
            retry_backoff_ms: 1,
            health_window_seconds: 30,
        };
        let mut work_loop = WorkLoop::new(transport.clone(), engine, rx, metrics.clone(), config);
        let report = work_loop.run_once().await;

        assert_eq!(report.sent, 2);
        assert_eq!(report.dropped, 1);
        assert_eq!(transport.inner.sent().len(), 2);
        assert_eq!(metrics.registry().counter_get(NOTIFY_DROPPED_TOTAL), 1);
        assert!(work_loop.liveness().last_iteration_ms().is_some());
    }

    #[test]
    fn test_liveness_window() {
        let liveness = Liveness::new();
        assert!(!liveness.is_fresh(Duration::from_secs(30)));
        assert!(liveness.last_iteration_ms().is_none());

        liveness.touch();
        assert!(liveness.is_fresh(Duration::from_secs(30)));

        liveness
            .last_iteration_ms
            .store(Utc::now().timestamp_millis() - 60_000, Ordering::Release);
        assert!(!liveness.is_fresh(Duration::from_secs(30)));
    }
}
