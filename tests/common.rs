//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use a1_mediator::control::{notification_queue, LifecycleController, NotificationReceiver};
use a1_mediator::core::config::{Config, WorkLoopConfig};
use a1_mediator::core::error::StoreError;
use a1_mediator::messaging::message::A1_POLICY_RESPONSE;
use a1_mediator::messaging::LoopbackTransport;
use a1_mediator::ops::MediatorMetrics;
use a1_mediator::policy::PolicyStore;
use a1_mediator::reconcile::ReconciliationEngine;
use a1_mediator::storage::{KvBackend, MemoryBackend};
use a1_mediator::worker::WorkLoop;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;

pub const TYPE_ID: i64 = 20000;

/// Write a config file.
pub fn create_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// A minimal loopback configuration.
pub fn create_loopback_config() -> NamedTempFile {
    create_config(
        r#"
[transport]
kind = "loopback"

[work_loop]
interval_ms = 10
send_retries = 4
retry_backoff_ms = 1
"#,
    )
}

/// Load a config from a temp file.
pub fn load_config(file: &NamedTempFile) -> Config {
    Config::from_file(file.path()).expect("Failed to load config")
}

/// A policy type body with a small schema.
pub fn type_body() -> Value {
    json!({
        "name": "admission_control",
        "description": "throttle admissions",
        "policy_type_id": TYPE_ID,
        "create_schema": {
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": {
                "enforce": {"type": "boolean"},
                "window_length": {"type": "integer", "minimum": 1, "maximum": 60},
                "blocking_rate": {"type": "number", "minimum": 0, "maximum": 100}
            },
            "required": ["enforce", "window_length", "blocking_rate"],
            "additionalProperties": false
        }
    })
}

/// A payload valid under [`type_body`].
pub fn payload(window_length: i64) -> Value {
    json!({"enforce": true, "window_length": window_length, "blocking_rate": 20})
}

/// Encoded status report.
pub fn status_report(type_id: i64, instance_id: &str, handler_id: &str, status: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "policy_type_id": type_id,
        "policy_instance_id": instance_id,
        "handler_id": handler_id,
        "status": status,
    }))
    .expect("encode status report")
}

// ============================================================================
// Faulty backend
// ============================================================================

/// Memory backend that can go offline or panic on chosen keys.
#[derive(Default)]
pub struct FaultyBackend {
    inner: MemoryBackend,
    offline: AtomicBool,
    /// Puts to keys containing this segment panic.
    panic_segment: Option<String>,
}

impl FaultyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panic on puts to keys containing `.{segment}.`.
    pub fn panicking_on(segment: &str) -> Self {
        Self {
            panic_segment: Some(format!(".{segment}.")),
            ..Self::default()
        }
    }

    /// Fail every call with `NotConnected` while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::NotConnected)
        } else {
            Ok(())
        }
    }
}

impl KvBackend for FaultyBackend {
    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.check()?;
        if let Some(segment) = &self.panic_segment {
            if key.contains(segment.as_str()) {
                panic!("backend crashed writing {key}");
            }
        }
        self.inner.put(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check()?;
        self.inner.get(key)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.delete(key)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        self.check()?;
        self.inner.scan_prefix(prefix)
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Fully wired mediator over a memory backend and loopback transport.
pub struct Harness {
    pub store: Arc<PolicyStore>,
    pub transport: Arc<LoopbackTransport>,
    pub metrics: Arc<MediatorMetrics>,
    pub engine: Arc<ReconciliationEngine>,
    pub controller: LifecycleController,
    queue: Option<NotificationReceiver>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()))
    }

    /// Harness over a caller-supplied backend.
    pub fn with_backend(backend: Arc<dyn KvBackend>) -> Self {
        let store = Arc::new(PolicyStore::new(backend));
        let transport = Arc::new(LoopbackTransport::new());
        let metrics = Arc::new(MediatorMetrics::new());
        let engine = Arc::new(ReconciliationEngine::new(
            store.clone(),
            transport.clone(),
            metrics.clone(),
        ));
        let (tx, rx) = notification_queue();
        let controller =
            LifecycleController::new(store.clone(), engine.clone(), tx, metrics.clone());
        Self {
            store,
            transport,
            metrics,
            engine,
            controller,
            queue: Some(rx),
        }
    }

    /// Harness with the standard type registered.
    pub fn with_type() -> Self {
        Self::new().register_type()
    }

    /// Register the standard type.
    pub fn register_type(self) -> Self {
        self.controller
            .create_type(TYPE_ID, &type_body())
            .expect("create type");
        self
    }

    /// Build the work loop; can be called once.
    pub fn work_loop(&mut self, config: WorkLoopConfig) -> WorkLoop {
        let queue = self.queue.take().expect("work loop already built");
        WorkLoop::new(
            self.transport.clone(),
            self.engine.clone(),
            queue,
            self.metrics.clone(),
            config,
        )
    }

    /// Inject a status report for the standard type.
    pub fn report(&self, instance_id: &str, handler_id: &str, status: &str) {
        self.transport.inject(
            A1_POLICY_RESPONSE,
            status_report(TYPE_ID, instance_id, handler_id, status),
            handler_id,
        );
    }
}

/// Fast work loop settings for tests.
pub fn fast_work_loop() -> WorkLoopConfig {
    WorkLoopConfig {
        interval_ms: 10,
        send_retries: 4,
        retry_backoff_ms: 1,
        health_window_seconds: 30,
    }
}
