//! Error types for allocation bookkeeping.

use thiserror::Error;
use yardarm_events::Priority;

/// Errors returned by allocation group and topology operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocateError {
    /// No allocation group is registered under this name.
    #[error("unknown allocation group: {0}")]
    UnknownGroup(String),

    /// The group exists with a different base priority.
    #[error("allocation group '{name}' already registered with base priority {existing}, requested {requested}")]
    ConflictingGroup {
        name: String,
        existing: Priority,
        requested: Priority,
    },

    /// Every priority at or above the group's base is already reserved.
    #[error("no free priority left for allocation group: {0}")]
    PrioritiesExhausted(String),

    /// A host to rack mapping entry could not be parsed.
    #[error("invalid rack mapping entry: '{0}'")]
    InvalidRackMapping(String),
}
