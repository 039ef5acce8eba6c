//! Resource-manager interface and mock implementation.
//!
//! The application master talks to the cluster resource manager through one
//! heartbeat call: it sends its outstanding asks and releases, and receives
//! newly granted containers and status reports for earlier grants.
//!
//! A mock implementation is provided for testing and development.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use yardarm_allocate::{AllocateRequest, ResourceRequestDescriptor, ANY};
use yardarm_events::{exit_status, Container, ContainerStatus, Priority};
use yardarm_id::ContainerId;

/// Answer to one heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocateResponse {
    pub response_id: i32,
    pub allocated: Vec<Container>,
    pub completed: Vec<ContainerStatus>,
}

/// Resource-manager interface.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// Send one heartbeat.
    async fn allocate(&self, request: AllocateRequest) -> Result<AllocateResponse>;
}

/// Mock resource manager for testing and development.
///
/// Grants every ask on the next heartbeat and reports each granted container
/// as finished on the heartbeat after that. Released containers are reported
/// as aborted.
pub struct MockResourceManager {
    /// Counter for generating container hosts when an ask names none.
    node_counter: AtomicU64,

    response_id: AtomicI32,

    /// Containers to report as finished on the next heartbeat.
    finishing: Mutex<Vec<ContainerStatus>>,

    /// Every request received, oldest first.
    requests: Mutex<Vec<AllocateRequest>>,

    /// Exit status reported for granted containers.
    exit_status: i32,

    /// Whether heartbeats should "fail".
    fail_heartbeats: bool,
}

impl MockResourceManager {
    /// Create a new mock resource manager.
    pub fn new() -> Self {
        Self::with_exit_status(exit_status::SUCCESS)
    }

    /// Create a mock whose containers all finish with `exit_status`.
    pub fn with_exit_status(exit_status: i32) -> Self {
        Self {
            node_counter: AtomicU64::new(0),
            response_id: AtomicI32::new(0),
            finishing: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            exit_status,
            fail_heartbeats: false,
        }
    }

    /// Create a mock that fails all heartbeats.
    pub fn failing() -> Self {
        Self {
            fail_heartbeats: true,
            ..Self::new()
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<AllocateRequest> {
        self.requests.lock().clone()
    }

    fn next_node(&self) -> String {
        let counter = self.node_counter.fetch_add(1, Ordering::SeqCst);
        format!("node-{counter}")
    }

    fn grant(&self, host: String, ask: &ResourceRequestDescriptor) -> Container {
        Container {
            id: ContainerId::new(),
            host,
            resource: ask.capability,
            priority: ask.priority,
        }
    }

    /// Grants for one heartbeat.
    ///
    /// Host asks are satisfied on their host. The `"*"` count also carries
    /// every host unit twice, once directly and once through its rack, so
    /// only what is left after that is granted on generated nodes.
    fn grants(&self, asks: &[ResourceRequestDescriptor]) -> Vec<Container> {
        let mut by_priority: BTreeMap<Priority, Vec<&ResourceRequestDescriptor>> = BTreeMap::new();
        for ask in asks.iter().filter(|ask| ask.num_containers > 0) {
            by_priority.entry(ask.priority).or_default().push(ask);
        }

        let mut grants = Vec::new();
        for asks in by_priority.values() {
            let mut on_hosts = 0u32;
            for ask in asks.iter().filter(|ask| !ask.is_any() && !is_rack(ask)) {
                on_hosts += ask.num_containers;
                grants.extend(
                    (0..ask.num_containers).map(|_| self.grant(ask.resource_name.clone(), ask)),
                );
            }
            if let Some(any) = asks.iter().find(|ask| ask.resource_name == ANY) {
                let remaining = any.num_containers.saturating_sub(2 * on_hosts);
                grants.extend((0..remaining).map(|_| self.grant(self.next_node(), any)));
            }
        }
        grants
    }
}

fn is_rack(ask: &ResourceRequestDescriptor) -> bool {
    ask.resource_name.starts_with('/')
}

impl Default for MockResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceManager for MockResourceManager {
    async fn allocate(&self, request: AllocateRequest) -> Result<AllocateResponse> {
        if self.fail_heartbeats {
            anyhow::bail!("Mock resource manager configured to fail");
        }

        debug!(
            response_id = request.response_id,
            asks = request.asks.len(),
            releases = request.releases.len(),
            progress = request.progress,
            "[MOCK] Heartbeat received"
        );

        let allocated = self.grants(&request.asks);
        let mut completed = std::mem::take(&mut *self.finishing.lock());
        completed.extend(
            request
                .releases
                .iter()
                .map(|id| ContainerStatus::complete(id.clone(), exit_status::ABORTED)),
        );
        self.finishing.lock().extend(
            allocated
                .iter()
                .map(|container| ContainerStatus::complete(container.id.clone(), self.exit_status)),
        );
        self.requests.lock().push(request);

        if !allocated.is_empty() {
            info!(count = allocated.len(), "[MOCK] Granting containers");
        }

        Ok(AllocateResponse {
            response_id: self.response_id.fetch_add(1, Ordering::SeqCst) + 1,
            allocated,
            completed,
        })
    }
}
