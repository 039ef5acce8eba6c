//! # yardarm-allocate
//!
//! Demand accounting and resource-request building for containers negotiated
//! from a cluster resource manager.
//!
//! ## Flow
//!
//! ```text
//! ContainerAllocateData ──► ContainerAllocator ──► AllocateCountTracker (per group)
//!                                  │                        │
//!                                  │◄── AllocateCountInfo ──┘
//!                                  ▼
//!                    Vec<ResourceRequestDescriptor>  (host, rack, "*")
//! ```
//!
//! - Callers describe wanted containers as batches of cluster-wide, per-host
//!   and per-rack counts.
//! - Each allocation group owns a tracker that folds batches into
//!   outstanding demand, resolving hosts to racks through a [`RackResolver`].
//! - Every heartbeat the allocator turns each tracker snapshot into ordered
//!   request descriptors at the group's reserved priority.
//! - Grants flow back through the allocator, which decrements the demand they
//!   satisfy and queues unmatched grants for release.
//!
//! ## Invariants
//!
//! - Priorities reserved through [`AllocationGroups`] never collide across groups
//! - Snapshots are owned copies taken under the tracker lock
//! - Every group emits at least one `"*"` descriptor per cycle

mod allocator;
mod data;
mod error;
mod groups;
mod request;
mod topology;
mod tracker;

pub use allocator::{AllocationValues, ContainerAllocator, DEFAULT_GROUP};
pub use data::ContainerAllocateData;
pub use error::AllocateError;
pub use groups::{AllocationGroup, AllocationGroups};
pub use request::{build_requests, AllocateRequest, ResourceRequestDescriptor, ANY};
pub use topology::{DefaultRackResolver, RackResolver, StaticRackResolver, DEFAULT_RACK};
pub use tracker::{AllocateCountInfo, AllocateCountTracker, AllocationMatch};

pub use yardarm_events::Priority;
