//! Container lifecycle sets and their transitions.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use yardarm_events::{exit_status, Container, ContainerState, ContainerStatus};
use yardarm_id::ContainerId;

/// Lifecycle phase of a tracked container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerPhase {
    Allocated,
    Running,
    Completed,
    Failed,
}

impl ContainerPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allocated => "allocated",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ContainerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four pairwise-disjoint lifecycle sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSets {
    pub allocated: BTreeSet<ContainerId>,
    pub running: BTreeSet<ContainerId>,
    pub completed: BTreeSet<ContainerId>,
    pub failed: BTreeSet<ContainerId>,
}

impl ContainerSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase_of(&self, id: &ContainerId) -> Option<ContainerPhase> {
        if self.allocated.contains(id) {
            Some(ContainerPhase::Allocated)
        } else if self.running.contains(id) {
            Some(ContainerPhase::Running)
        } else if self.completed.contains(id) {
            Some(ContainerPhase::Completed)
        } else if self.failed.contains(id) {
            Some(ContainerPhase::Failed)
        } else {
            None
        }
    }

    /// A grant enters `Allocated` unless the id is already tracked.
    #[must_use]
    pub fn on_grant(self, container: &Container) -> Self {
        self.on_new(&container.id)
    }

    #[must_use]
    fn on_new(mut self, id: &ContainerId) -> Self {
        if self.phase_of(id).is_none() {
            self.allocated.insert(id.clone());
        }
        self
    }

    /// Launch confirmation: `Allocated -> Running`, a no-op in any other phase.
    #[must_use]
    pub fn on_running(mut self, id: &ContainerId) -> Self {
        if self.allocated.remove(id) {
            self.running.insert(id.clone());
        }
        self
    }

    /// Applies one status report.
    #[must_use]
    pub fn on_status(self, status: &ContainerStatus) -> Self {
        match status.state {
            ContainerState::New => self.on_new(&status.id),
            ContainerState::Running => self.on_running(&status.id),
            ContainerState::Complete => self.on_complete(&status.id, status.exit_status),
        }
    }

    #[must_use]
    fn on_complete(mut self, id: &ContainerId, code: i32) -> Self {
        if self.completed.contains(id) || self.failed.contains(id) {
            return self;
        }
        self.allocated.remove(id);
        self.running.remove(id);
        if code == exit_status::SUCCESS {
            self.completed.insert(id.clone());
        } else {
            self.failed.insert(id.clone());
        }
        self
    }

    /// Number of ids across all four sets.
    pub fn tracked(&self) -> usize {
        self.allocated.len() + self.running.len() + self.completed.len() + self.failed.len()
    }

    /// Number of ids in a terminal set.
    pub fn terminal(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}
