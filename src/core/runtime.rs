//! Main runtime orchestration.
//!
//! The runtime coordinates component lifecycle:
//! - Start order: store → transport → controller/engine → work loop
//! - Shutdown order: work loop → transport → store

use crate::control::controller::LifecycleController;
use crate::control::queue::notification_queue;
use crate::core::config::Config;
use crate::messaging::loopback::LoopbackTransport;
use crate::messaging::transport::Transport;
use crate::messaging::udp::{RouteTable, UdpTransport};
use crate::ops::observability::{HealthStatus, MediatorMetrics};
use crate::policy::data::PolicyStore;
use crate::reconcile::engine::ReconciliationEngine;
use crate::storage::backend::MemoryBackend;
use crate::worker::work_loop::{WorkLoop, WorkLoopHandle};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// How long `stop` waits for the work loop to exit.
const WORK_LOOP_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Component health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    Starting,
    Healthy,
    /// Component has failed.
    Failed,
    Stopping,
    Stopped,
}

/// Health status aggregated from all components.
#[derive(Debug, Clone)]
pub struct RuntimeHealth {
    pub store: ComponentHealth,
    pub transport: ComponentHealth,
    pub work_loop: ComponentHealth,
}

impl Default for RuntimeHealth {
    fn default() -> Self {
        Self {
            store: ComponentHealth::Starting,
            transport: ComponentHealth::Starting,
            work_loop: ComponentHealth::Starting,
        }
    }
}

impl RuntimeHealth {
    /// Every component is up.
    pub fn is_ready(&self) -> bool {
        matches!(
            (self.store, self.transport, self.work_loop),
            (
                ComponentHealth::Healthy,
                ComponentHealth::Healthy,
                ComponentHealth::Healthy
            )
        )
    }
}

/// Mediator runtime.
pub struct Runtime {
    config: Arc<Config>,
    health: RuntimeHealth,
    metrics: Arc<MediatorMetrics>,
    store: Option<Arc<PolicyStore>>,
    transport: Option<Arc<dyn Transport>>,
    controller: Option<Arc<LifecycleController>>,
    work_loop: Option<WorkLoopHandle>,
    running: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Runtime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            health: RuntimeHealth::default(),
            metrics: Arc::new(MediatorMetrics::new()),
            store: None,
            transport: None,
            controller: None,
            work_loop: None,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn health(&self) -> &RuntimeHealth {
        &self.health
    }

    pub fn metrics(&self) -> &Arc<MediatorMetrics> {
        &self.metrics
    }

    /// The lifecycle controller, once started.
    pub fn controller(&self) -> Option<&Arc<LifecycleController>> {
        self.controller.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Work loop health check.
    pub fn work_loop_health(&self) -> HealthStatus {
        match self.work_loop {
            Some(ref handle) => handle.health(),
            None => HealthStatus::unhealthy("work loop not started"),
        }
    }

    /// Initialize and start all components.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(transport = %self.config.transport.kind, "starting a1 mediator");
        self.start_components(None)?;
        tracing::info!("a1 mediator started");
        Ok(())
    }

    /// Start with a caller-supplied transport, typically a loopback.
    pub async fn start_with_transport(&mut self, transport: Arc<dyn Transport>) -> Result<()> {
        self.start_components(Some(transport))
    }

    fn start_components(&mut self, transport: Option<Arc<dyn Transport>>) -> Result<()> {
        let store = self.init_store();
        let transport = match transport {
            Some(t) => t,
            None => self.init_transport()?,
        };
        self.health.transport = ComponentHealth::Healthy;

        let engine = Arc::new(ReconciliationEngine::new(
            store.clone(),
            transport.clone(),
            self.metrics.clone(),
        ));
        let (sender, receiver) = notification_queue();
        self.controller = Some(Arc::new(LifecycleController::new(
            store.clone(),
            engine.clone(),
            sender,
            self.metrics.clone(),
        )));

        let work_loop = WorkLoop::new(
            transport.clone(),
            engine,
            receiver,
            self.metrics.clone(),
            self.config.work_loop.clone(),
        );
        self.work_loop = Some(work_loop.spawn());
        self.health.work_loop = ComponentHealth::Healthy;

        self.store = Some(store);
        self.transport = Some(transport);
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    fn init_store(&mut self) -> Arc<PolicyStore> {
        tracing::debug!("initializing in-memory state store");
        let store = Arc::new(PolicyStore::new(Arc::new(MemoryBackend::new())));
        self.health.store = ComponentHealth::Healthy;
        store
    }

    fn init_transport(&mut self) -> Result<Arc<dyn Transport>> {
        let config = &self.config.transport;
        let transport: Arc<dyn Transport> = match config.kind.as_str() {
            "loopback" => Arc::new(LoopbackTransport::new()),
            _ => {
                let addr = config.bind_addr()?;
                let routes = RouteTable::new(config.routes.clone());
                match UdpTransport::bind(addr, routes, config.max_receive_batch) {
                    Ok(udp) => Arc::new(udp),
                    Err(e) => {
                        self.health.transport = ComponentHealth::Failed;
                        return Err(e)
                            .with_context(|| format!("failed to bind udp transport on {addr}"));
                    }
                }
            }
        };
        Ok(transport)
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Run until SIGINT or `shutdown`.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("shutdown signal received (SIGINT)");
            }
            _ = async {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            } => {
                tracing::info!("shutdown requested by component");
            }
        }

        self.stop().await
    }

    /// Stop all components in reverse start order.
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!("stopping a1 mediator");
        self.running.store(false, Ordering::Release);
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.work_loop.take() {
            self.health.work_loop = ComponentHealth::Stopping;
            handle.shutdown(WORK_LOOP_STOP_TIMEOUT).await;
        }
        self.health.work_loop = ComponentHealth::Stopped;

        self.controller = None;
        self.transport = None;
        self.health.transport = ComponentHealth::Stopped;
        self.store = None;
        self.health.store = ComponentHealth::Stopped;

        tracing::info!("a1 mediator stopped");
        Ok(())
    }
}
