//! # yardarm-events
//!
//! Records exchanged with the cluster resource manager on every heartbeat.
//!
//! ## Design Principles
//!
//! - Records are plain data: they carry what the resource manager said and
//!   nothing the application master derived from it
//! - Exit statuses are kept as raw integers; only zero means success
//!
//! ## Records
//!
//! - [`Container`]: a granted container lease (`id`, `host`, `resource`, `priority`)
//! - [`ContainerStatus`]: a lifecycle report (`id`, `state`, `exit_status`)
//! - [`Priority`]: the request ordering key echoed back on grants

mod types;

pub use types::*;
