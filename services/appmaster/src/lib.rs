//! yardarm Application Master
//!
//! Negotiates containers with the cluster resource manager on behalf of one
//! application.
//!
//! ## Architecture
//!
//! - **Allocator**: Turns outstanding demand into per-group asks and routes grants back
//! - **Monitor**: Tracks granted containers through to completion or failure
//! - **Poller**: Heartbeat loop exchanging asks and grants with the resource manager
//! - **Resource manager**: Abstracts the cluster protocol (mock in dev)

pub mod config;
pub mod context;
pub mod poller;
pub mod rm;

pub use config::AppmasterConfig;
pub use context::{AppmasterContext, LifecycleError};
pub use poller::{AllocatorPoller, PollStats};
pub use rm::{AllocateResponse, MockResourceManager, ResourceManager};
