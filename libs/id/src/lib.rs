//! # yardarm-id
//!
//! Typed identifiers for resources the application master negotiates with
//! the cluster resource manager.
//!
//! ## Design Principles
//!
//! - IDs are opaque: the resource manager mints them, we only carry them
//! - All IDs have a canonical string representation with strict parsing
//! - IDs are typed to prevent mixing containers with attempts
//!
//! ## ID Format
//!
//! All IDs use a prefixed format: `{prefix}_{body}` where the body is a
//! non-empty run of ASCII alphanumerics and underscores.
//!
//! Examples:
//! - `container_1410901177871_0001_01_000005` (resource-manager issued)
//! - `container_01HV4Z4NYPLTRS0JTUA8XDME5F` (minted locally, e.g. by a mock)
//! - `appattempt_1410901177871_0001_000001`

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that mint IDs locally.
pub use ulid::Ulid;
