//! Grant and status record definitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use yardarm_id::ContainerId;

// =============================================================================
// Exit Status Sentinels
// =============================================================================

/// Exit statuses reported by the resource manager.
///
/// Negative values are resource-manager internal. They are listed so callers
/// can log them by name; the monitor treats every nonzero value as failure.
pub mod exit_status {
    /// The container process exited cleanly.
    pub const SUCCESS: i32 = 0;

    /// No exit status is known yet.
    pub const INVALID: i32 = -1000;

    /// Released by the framework or lost with its node.
    pub const ABORTED: i32 = -100;

    /// Local disks on the node failed.
    pub const DISKS_FAILED: i32 = -101;

    /// Preempted by the scheduler.
    pub const PREEMPTED: i32 = -102;

    /// Killed for exceeding its virtual memory limit.
    pub const KILLED_EXCEEDED_VMEM: i32 = -103;

    /// Killed for exceeding its physical memory limit.
    pub const KILLED_EXCEEDED_PMEM: i32 = -104;

    /// Returns a stable name for a known sentinel.
    pub fn name(code: i32) -> Option<&'static str> {
        match code {
            SUCCESS => Some("success"),
            INVALID => Some("invalid"),
            ABORTED => Some("aborted"),
            DISKS_FAILED => Some("disks_failed"),
            PREEMPTED => Some("preempted"),
            KILLED_EXCEEDED_VMEM => Some("killed_exceeded_vmem"),
            KILLED_EXCEEDED_PMEM => Some("killed_exceeded_pmem"),
            _ => None,
        }
    }
}

// =============================================================================
// Priority
// =============================================================================

/// Request ordering key used verbatim by the resource-manager protocol.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Priority(u32);

impl Priority {
    /// Creates a priority from its raw value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Returns the next priority, or `None` at `u32::MAX`.
    #[must_use]
    pub const fn checked_next(&self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Priority {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

// =============================================================================
// Resource
// =============================================================================

/// Resource capability of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    pub memory_mb: u64,
    pub virtual_cores: u32,
}

impl Resource {
    #[must_use]
    pub const fn new(memory_mb: u64, virtual_cores: u32) -> Self {
        Self {
            memory_mb,
            virtual_cores,
        }
    }
}

impl Default for Resource {
    fn default() -> Self {
        Self::new(64, 1)
    }
}

// =============================================================================
// Container State
// =============================================================================

/// Container state as reported by the resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerState {
    New,
    Running,
    Complete,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Running => "RUNNING",
            Self::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Records
// =============================================================================

/// A container lease granted by the resource manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    /// Host of the node the container was placed on.
    pub host: String,
    pub resource: Resource,
    /// Priority of the request this grant satisfies.
    pub priority: Priority,
}

/// A container lifecycle report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub id: ContainerId,
    pub state: ContainerState,
    pub exit_status: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

impl ContainerStatus {
    /// A `COMPLETE` report with the given exit status.
    pub fn complete(id: ContainerId, exit_status: i32) -> Self {
        Self {
            id,
            state: ContainerState::Complete,
            exit_status,
            diagnostics: None,
        }
    }

    /// A `RUNNING` report.
    pub fn running(id: ContainerId) -> Self {
        Self {
            id,
            state: ContainerState::Running,
            exit_status: exit_status::INVALID,
            diagnostics: None,
        }
    }

    /// Returns true if this report ends the container's life.
    pub fn is_complete(&self) -> bool {
        self.state == ContainerState::Complete
    }

    /// Returns true if this is a completion with a zero exit status.
    pub fn is_success(&self) -> bool {
        self.is_complete() && self.exit_status == exit_status::SUCCESS
    }
}
