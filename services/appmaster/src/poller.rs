//! Heartbeat worker.
//!
//! Runs the allocate loop against the resource manager on a periodic interval.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info, instrument};
use yardarm_allocate::ContainerAllocator;
use yardarm_monitor::ContainerMonitor;

use crate::rm::ResourceManager;

/// Outcome of one heartbeat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub asks: usize,
    pub released: usize,
    pub granted: usize,
    pub accepted: usize,
    pub completed: usize,
}

/// Worker that feeds the allocator and monitor from resource-manager heartbeats.
pub struct AllocatorPoller {
    allocator: Arc<ContainerAllocator>,
    monitor: Arc<ContainerMonitor>,
    rm: Arc<dyn ResourceManager>,
    interval: Duration,
}

impl AllocatorPoller {
    pub fn new(
        allocator: Arc<ContainerAllocator>,
        monitor: Arc<ContainerMonitor>,
        rm: Arc<dyn ResourceManager>,
        interval: Duration,
    ) -> Self {
        Self {
            allocator,
            monitor,
            rm,
            interval,
        }
    }

    /// Run the heartbeat loop until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Starting allocator poller"
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!(error = %e, "Heartbeat failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Allocator poller shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run a single heartbeat.
    pub async fn poll_once(&self) -> Result<PollStats> {
        self.allocator.set_progress(self.monitor.state().progress);
        let request = self.allocator.next_request();
        let mut stats = PollStats {
            asks: request.asks.len(),
            released: request.releases.len(),
            ..PollStats::default()
        };

        let response = self.rm.allocate(request).await?;
        self.allocator.on_response(response.response_id);

        stats.granted = response.allocated.len();
        let accepted = self
            .allocator
            .process_allocated_containers(response.allocated);
        stats.accepted = accepted.len();
        stats.completed = response.completed.len();

        self.monitor.on_container(&accepted);
        self.monitor.on_container_status(&response.completed);

        if stats.granted > 0 || stats.completed > 0 {
            let state = self.monitor.state();
            info!(
                granted = stats.granted,
                accepted = stats.accepted,
                completed = stats.completed,
                allocated = state.allocated,
                running = state.running,
                failed = state.failed,
                "Heartbeat processed"
            );
        }

        Ok(stats)
    }
}
