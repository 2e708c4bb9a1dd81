//! Work loop tests.

mod common;

use a1_mediator::core::config::WorkLoopConfig;
use a1_mediator::ops::observability::metrics;
use common::{fast_work_loop, payload, Harness, TYPE_ID};
use std::time::Duration;

// ============================================================================
// Delivery
// ============================================================================

#[tokio::test]
async fn delivers_queued_notifications_in_order() {
    let mut h = Harness::with_type();
    h.controller
        .create_or_replace_instance(TYPE_ID, "a", &payload(1))
        .unwrap();
    h.controller.delete_instance(TYPE_ID, "a").unwrap();

    let mut work_loop = h.work_loop(fast_work_loop());
    let report = work_loop.run_once().await;
    assert_eq!(report.sent, 2);
    assert_eq!(report.dropped, 0);

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|m| m.routing_key == TYPE_ID));
    assert_eq!(
        h.metrics.registry().counter_get(metrics::NOTIFY_SENT_TOTAL),
        2
    );
}

#[tokio::test]
async fn retries_transient_send_failures() {
    let mut h = Harness::with_type();
    h.controller
        .create_or_replace_instance(TYPE_ID, "a", &payload(1))
        .unwrap();
    h.transport.fail_next_sends(3);

    let mut work_loop = h.work_loop(fast_work_loop());
    let report = work_loop.run_once().await;
    assert_eq!(report.sent, 1);
    assert_eq!(h.transport.send_attempts(), 4);
    assert_eq!(
        h.metrics
            .registry()
            .counter_get(metrics::NOTIFY_SEND_ATTEMPT_FAILURES_TOTAL),
        3
    );
}

#[tokio::test]
async fn drops_after_exhausting_retries_without_failing_caller() {
    let mut h = Harness::with_type();
    h.transport.set_fail_all(true);
    let accepted = h
        .controller
        .create_or_replace_instance(TYPE_ID, "a", &payload(1));
    assert!(accepted.is_ok());

    let mut work_loop = h.work_loop(WorkLoopConfig {
        send_retries: 2,
        ..fast_work_loop()
    });
    let report = work_loop.run_once().await;
    assert_eq!(report.sent, 0);
    assert_eq!(report.dropped, 1);
    assert_eq!(h.transport.send_attempts(), 2);
    assert_eq!(
        h.metrics.registry().counter_get(metrics::NOTIFY_DROPPED_TOTAL),
        1
    );

    // The instance stays stored even though no handler heard about it.
    assert_eq!(h.controller.get_instance(TYPE_ID, "a").unwrap(), payload(1));

    // Later notifications still go out once the transport recovers.
    h.transport.set_fail_all(false);
    h.controller
        .create_or_replace_instance(TYPE_ID, "b", &payload(2))
        .unwrap();
    let report = work_loop.run_once().await;
    assert_eq!(report.sent, 1);
}

#[tokio::test]
async fn iteration_runs_sweep() {
    let mut h = Harness::with_type();
    h.controller
        .create_or_replace_instance(TYPE_ID, "a", &payload(1))
        .unwrap();
    h.report("a", "h1", "OK");
    h.transport.inject(20011, &b"junk"[..], "h1");

    let mut work_loop = h.work_loop(fast_work_loop());
    let report = work_loop.run_once().await;
    assert_eq!(report.sweep.statuses_applied, 1);
    assert_eq!(report.sweep.dropped, 1);
    assert!(work_loop.liveness().last_iteration_ms().is_some());
    assert_eq!(
        h.metrics
            .registry()
            .counter_get(metrics::WORK_LOOP_ITERATIONS_TOTAL),
        1
    );
}

// ============================================================================
// Spawned loop
// ============================================================================

#[tokio::test]
async fn spawned_loop_is_healthy_then_stops() {
    let mut h = Harness::with_type();
    let handle = h.work_loop(fast_work_loop()).spawn();

    h.controller
        .create_or_replace_instance(TYPE_ID, "a", &payload(1))
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while h.transport.sent().is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.transport.sent().len(), 1);
    assert!(handle.is_healthy());
    assert!(handle.health().healthy);

    let liveness = handle.liveness().clone();
    handle.shutdown(Duration::from_secs(2)).await;
    let last = liveness.last_iteration_ms();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(liveness.last_iteration_ms(), last);
}

#[tokio::test]
async fn stale_loop_reports_unhealthy() {
    let mut h = Harness::with_type();
    let handle = h
        .work_loop(WorkLoopConfig {
            interval_ms: 60_000,
            health_window_seconds: 1,
            ..fast_work_loop()
        })
        .spawn();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while handle.liveness().last_iteration_ms().is_none()
        && tokio::time::Instant::now() < deadline
    {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(handle.is_healthy());

    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert!(!handle.is_healthy());
    assert!(!handle.health().healthy);
    handle.shutdown(Duration::from_secs(2)).await;
}
