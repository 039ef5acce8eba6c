//! # yardarm-monitor
//!
//! Lifecycle tracking for containers granted to the application master.
//!
//! ## State Machine
//!
//! ```text
//!   grant ──► Allocated ──RUNNING──► Running
//!                │                      │
//!                └──────COMPLETE────────┤
//!                                       ▼
//!                      exit 0 ──► Completed     nonzero ──► Failed
//! ```
//!
//! ## Invariants
//!
//! - A container id is in at most one of the four sets
//! - Every completion lands in exactly one terminal set, including
//!   completions for containers the monitor never saw granted
//! - A terminal container keeps its first classification
//!
//! Transitions are pure functions on [`ContainerSets`]; [`ContainerMonitor`]
//! applies them under a lock and publishes [`MonitorState`] to subscribers.

mod monitor;
mod sets;

pub use monitor::{ContainerMonitor, MonitorState};
pub use sets::{ContainerPhase, ContainerSets};
