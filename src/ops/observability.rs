//! Metrics and health checks.
//!
//! Metric namespaces:
//! - a1.notify.*
//! - a1.reconcile.*
//! - a1.work_loop.*

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

/// Health check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall healthy state.
    pub healthy: bool,
    /// Status message.
    pub message: String,
}

impl HealthStatus {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            message: "OK".to_string(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: message.into(),
        }
    }
}

/// Metric names.
pub mod metrics {
    /// Notifications handed to the outbound queue.
    pub const NOTIFY_ENQUEUED_TOTAL: &str = "a1.notify.enqueued_total";
    /// Notifications delivered to the transport.
    pub const NOTIFY_SENT_TOTAL: &str = "a1.notify.sent_total";
    /// Individual failed send attempts.
    pub const NOTIFY_SEND_ATTEMPT_FAILURES_TOTAL: &str = "a1.notify.send_attempt_failures_total";
    /// Notifications abandoned after exhausting retries.
    pub const NOTIFY_DROPPED_TOTAL: &str = "a1.notify.dropped_total";
    pub const RECONCILE_STATUS_APPLIED_TOTAL: &str = "a1.reconcile.status_applied_total";
    /// Inbound messages discarded (malformed, unknown instance, unexpected type).
    pub const RECONCILE_DROPPED_TOTAL: &str = "a1.reconcile.dropped_total";
    pub const RECONCILE_PURGED_TOTAL: &str = "a1.reconcile.purged_total";
    pub const RECONCILE_QUERY_REPLIES_TOTAL: &str = "a1.reconcile.query_replies_total";
    pub const WORK_LOOP_ITERATIONS_TOTAL: &str = "a1.work_loop.iterations_total";
    /// Unix millis of the last completed iteration.
    pub const WORK_LOOP_LAST_ITERATION_MS: &str = "a1.work_loop.last_iteration_ms";
}

/// Counter and gauge registry.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: RwLock<BTreeMap<String, AtomicU64>>,
    gauges: RwLock<BTreeMap<String, AtomicU64>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter.
    pub fn counter_inc(&self, name: &str) {
        self.counter_add(name, 1);
    }

    /// Add to a counter.
    pub fn counter_add(&self, name: &str, value: u64) {
        if let Some(counter) = self.counters.read().get(name) {
            counter.fetch_add(value, Ordering::Relaxed);
            return;
        }
        self.counters
            .write()
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }

    pub fn counter_get(&self, name: &str) -> u64 {
        self.counters
            .read()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Set a gauge value.
    pub fn gauge_set(&self, name: &str, value: u64) {
        if let Some(gauge) = self.gauges.read().get(name) {
            gauge.store(value, Ordering::Relaxed);
            return;
        }
        self.gauges
            .write()
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .store(value, Ordering::Relaxed);
    }

    pub fn gauge_get(&self, name: &str) -> u64 {
        self.gauges
            .read()
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Export metrics in Prometheus text format, sorted by name.
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();
        for (kind, map) in [("counter", &self.counters), ("gauge", &self.gauges)] {
            for (name, value) in map.read().iter() {
                let prometheus_name = name.replace('.', "_");
                let _ = write!(
                    output,
                    "# TYPE {prometheus_name} {kind}\n{prometheus_name} {}\n",
                    value.load(Ordering::Relaxed)
                );
            }
        }
        output
    }
}

/// Mediator-specific metric recording.
#[derive(Debug, Default)]
pub struct MediatorMetrics {
    registry: MetricsRegistry,
}

impl MediatorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    pub fn record_enqueued(&self) {
        self.registry.counter_inc(metrics::NOTIFY_ENQUEUED_TOTAL);
    }

    pub fn record_sent(&self) {
        self.registry.counter_inc(metrics::NOTIFY_SENT_TOTAL);
    }

    pub fn record_send_attempt_failure(&self) {
        self.registry
            .counter_inc(metrics::NOTIFY_SEND_ATTEMPT_FAILURES_TOTAL);
    }

    pub fn record_notification_dropped(&self) {
        self.registry.counter_inc(metrics::NOTIFY_DROPPED_TOTAL);
    }

    pub fn record_status_applied(&self) {
        self.registry
            .counter_inc(metrics::RECONCILE_STATUS_APPLIED_TOTAL);
    }

    pub fn record_inbound_dropped(&self) {
        self.registry.counter_inc(metrics::RECONCILE_DROPPED_TOTAL);
    }

    pub fn record_purged(&self) {
        self.registry.counter_inc(metrics::RECONCILE_PURGED_TOTAL);
    }

    pub fn record_query_replies(&self, count: u64) {
        self.registry
            .counter_add(metrics::RECONCILE_QUERY_REPLIES_TOTAL, count);
    }

    /// Record a completed work loop iteration at `now_ms`.
    pub fn record_iteration(&self, now_ms: u64) {
        self.registry.counter_inc(metrics::WORK_LOOP_ITERATIONS_TOTAL);
        self.registry
            .gauge_set(metrics::WORK_LOOP_LAST_ITERATION_MS, now_ms);
    }

    pub fn export(&self) -> String {
        self.registry.export_prometheus()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registry_counters() {
        let registry = MetricsRegistry::new();

        registry.counter_inc("test.counter");
        assert_eq!(registry.counter_get("test.counter"), 1);

        registry.counter_add("test.counter", 5);
        assert_eq!(registry.counter_get("test.counter"), 6);
        assert_eq!(registry.counter_get("missing"), 0);
    }

    #[test]
    fn test_metrics_registry_gauges() {
        let registry = MetricsRegistry::new();
        registry.gauge_set("test.gauge", 100);
        registry.gauge_set("test.gauge", 7);
        assert_eq!(registry.gauge_get("test.gauge"), 7);
    }

    #[test]
    fn test_mediator_metrics_iteration() {
        let metrics = MediatorMetrics::new();
        metrics.record_iteration(1_000);
        metrics.record_iteration(2_000);

        let registry = metrics.registry();
        assert_eq!(registry.counter_get(metrics::WORK_LOOP_ITERATIONS_TOTAL), 2);
        assert_eq!(registry.gauge_get(metrics::WORK_LOOP_LAST_ITERATION_MS), 2_000);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = MediatorMetrics::new();
        metrics.record_sent();
        metrics.record_query_replies(3);

        let output = metrics.export();
        assert!(output.contains("a1_notify_sent_total 1"));
        assert!(output.contains("a1_reconcile_query_replies_total 3"));
        assert!(output.contains("# TYPE a1_notify_sent_total counter"));
    }

    #[test]
    fn test_health_status() {
        assert!(HealthStatus::healthy().healthy);
        let bad = HealthStatus::unhealthy("stalled");
        assert!(!bad.healthy);
        assert_eq!(bad.message, "stalled");
    }
}
