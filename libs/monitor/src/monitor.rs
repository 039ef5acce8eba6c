//! Shared lifecycle monitor fed by resource-manager responses.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use yardarm_events::{exit_status, Container, ContainerStatus};
use yardarm_id::ContainerId;

use crate::{ContainerPhase, ContainerSets};

/// Set sizes published after every applied batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorState {
    pub allocated: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    /// Terminal containers over tracked containers, `0.0` when nothing is tracked.
    pub progress: f32,
    pub updated_at: DateTime<Utc>,
}

impl MonitorState {
    fn from_sets(sets: &ContainerSets) -> Self {
        let tracked = sets.tracked();
        let progress = if tracked == 0 {
            0.0
        } else {
            sets.terminal() as f32 / tracked as f32
        };
        Self {
            allocated: sets.allocated.len(),
            running: sets.running.len(),
            completed: sets.completed.len(),
            failed: sets.failed.len(),
            progress,
            updated_at: Utc::now(),
        }
    }
}

/// Thread-safe wrapper applying [`ContainerSets`] transitions.
///
/// Each batch is applied under a single lock acquisition, so queries never
/// observe a batch half-applied.
#[derive(Debug)]
pub struct ContainerMonitor {
    sets: Mutex<ContainerSets>,
    state_tx: watch::Sender<MonitorState>,
}

impl Default for ContainerMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerMonitor {
    pub fn new() -> Self {
        let sets = ContainerSets::new();
        let (state_tx, _) = watch::channel(MonitorState::from_sets(&sets));
        Self {
            sets: Mutex::new(sets),
            state_tx,
        }
    }

    fn apply(&self, transition: impl FnOnce(ContainerSets) -> ContainerSets) {
        let state = {
            let mut sets = self.sets.lock();
            *sets = transition(std::mem::take(&mut *sets));
            MonitorState::from_sets(&sets)
        };
        self.state_tx.send_replace(state);
    }

    /// Records newly granted containers.
    pub fn on_container(&self, containers: &[Container]) {
        if containers.is_empty() {
            return;
        }
        debug!(count = containers.len(), "Recording granted containers");
        self.apply(|sets| containers.iter().fold(sets, ContainerSets::on_grant));
    }

    /// Applies status reports from the resource manager.
    pub fn on_container_status(&self, statuses: &[ContainerStatus]) {
        if statuses.is_empty() {
            return;
        }
        self.apply(|sets| {
            statuses.iter().fold(sets, |sets, status| {
                if status.is_complete() {
                    log_completion(&sets, status);
                }
                sets.on_status(status)
            })
        });
    }

    /// Records launch confirmations.
    pub fn on_container_running(&self, ids: &[ContainerId]) {
        if ids.is_empty() {
            return;
        }
        self.apply(|sets| ids.iter().fold(sets, ContainerSets::on_running));
    }

    pub fn allocated_count(&self) -> usize {
        self.sets.lock().allocated.len()
    }

    pub fn running_count(&self) -> usize {
        self.sets.lock().running.len()
    }

    pub fn completed_count(&self) -> usize {
        self.sets.lock().completed.len()
    }

    pub fn failed_count(&self) -> usize {
        self.sets.lock().failed.len()
    }

    /// Ids of failed containers, for the orchestrator to reschedule.
    pub fn failed_ids(&self) -> Vec<ContainerId> {
        self.sets.lock().failed.iter().cloned().collect()
    }

    pub fn phase_of(&self, id: &ContainerId) -> Option<ContainerPhase> {
        self.sets.lock().phase_of(id)
    }

    /// Owned copy of all four sets.
    pub fn snapshot(&self) -> ContainerSets {
        self.sets.lock().clone()
    }

    /// Latest published state.
    pub fn state(&self) -> MonitorState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state_tx.subscribe()
    }
}

fn log_completion(sets: &ContainerSets, status: &ContainerStatus) {
    let reason = exit_status::name(status.exit_status).unwrap_or("application");
    match sets.phase_of(&status.id) {
        None => warn!(
            container_id = %status.id,
            exit_status = status.exit_status,
            reason = reason,
            "Completion for untracked container"
        ),
        Some(phase) if phase.is_terminal() => debug!(
            container_id = %status.id,
            phase = %phase,
            "Duplicate completion ignored"
        ),
        Some(_) if status.exit_status != exit_status::SUCCESS => info!(
            container_id = %status.id,
            exit_status = status.exit_status,
            reason = reason,
            diagnostics = status.diagnostics.as_deref().unwrap_or(""),
            "Container failed"
        ),
        Some(_) => debug!(container_id = %status.id, "Container completed"),
    }
}
