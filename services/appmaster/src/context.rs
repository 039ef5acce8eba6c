//! Application-master context with an explicit lifecycle.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use yardarm_allocate::ContainerAllocator;
use yardarm_id::AppAttemptId;
use yardarm_monitor::{ContainerMonitor, MonitorState};

use crate::config::AppmasterConfig;
use crate::poller::AllocatorPoller;
use crate::rm::ResourceManager;

/// Lifecycle misuse.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("application master already started")]
    AlreadyStarted,

    #[error("application master is not running")]
    NotRunning,
}

/// Owns the allocator, monitor and heartbeat worker of one application master.
///
/// Collaborators receive `Arc` handles from [`allocator`](Self::allocator) and
/// [`monitor`](Self::monitor); nothing is looked up globally.
pub struct AppmasterContext {
    attempt_id: AppAttemptId,
    config: AppmasterConfig,
    allocator: Arc<ContainerAllocator>,
    monitor: Arc<ContainerMonitor>,
    rm: Arc<dyn ResourceManager>,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AppmasterContext {
    pub fn new(config: AppmasterConfig, rm: Arc<dyn ResourceManager>) -> Result<Self> {
        let resolver = config.rack_resolver()?;
        let allocator = Arc::new(ContainerAllocator::new(resolver, config.allocation.clone()));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            attempt_id: AppAttemptId::new(),
            config,
            allocator,
            monitor: Arc::new(ContainerMonitor::new()),
            rm,
            shutdown_tx,
            worker: Mutex::new(None),
        })
    }

    pub fn attempt_id(&self) -> &AppAttemptId {
        &self.attempt_id
    }

    pub fn config(&self) -> &AppmasterConfig {
        &self.config
    }

    pub fn allocator(&self) -> Arc<ContainerAllocator> {
        Arc::clone(&self.allocator)
    }

    pub fn monitor(&self) -> Arc<ContainerMonitor> {
        Arc::clone(&self.monitor)
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.monitor.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Spawns the heartbeat worker. Must be called within a tokio runtime.
    pub fn start(&self) -> Result<(), LifecycleError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(LifecycleError::AlreadyStarted);
        }

        self.shutdown_tx.send_replace(false);
        let poller = AllocatorPoller::new(
            Arc::clone(&self.allocator),
            Arc::clone(&self.monitor),
            Arc::clone(&self.rm),
            self.config.poll_interval,
        );
        let shutdown_rx = self.shutdown_tx.subscribe();
        *worker = Some(tokio::spawn(async move { poller.run(shutdown_rx).await }));

        info!(attempt_id = %self.attempt_id, "Application master started");
        Ok(())
    }

    /// Signals the worker to stop and waits for it to exit.
    pub async fn stop(&self) -> Result<()> {
        let Some(handle) = self.worker.lock().take() else {
            return Err(LifecycleError::NotRunning.into());
        };

        self.shutdown_tx.send_replace(true);
        handle.await?;

        info!(attempt_id = %self.attempt_id, "Application master stopped");
        Ok(())
    }
}
