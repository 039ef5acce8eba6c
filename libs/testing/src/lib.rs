//! Fixtures shared by the yardarm test suites.
//!
//! Builders here produce resource-manager records the way a real cluster
//! would report them, so tests can focus on the state transitions.

use yardarm_events::{exit_status, Container, ContainerStatus, Priority, Resource};
use yardarm_id::ContainerId;

/// A granted container on `host` at `priority` with the default resource.
pub fn container(host: &str, priority: u32) -> Container {
    Container {
        id: ContainerId::new(),
        host: host.to_string(),
        resource: Resource::default(),
        priority: Priority::new(priority),
    }
}

/// `count` grants on `host` at `priority`.
pub fn containers(host: &str, priority: u32, count: usize) -> Vec<Container> {
    (0..count).map(|_| container(host, priority)).collect()
}

/// A completion report for `id`.
pub fn complete(id: &ContainerId, code: i32) -> ContainerStatus {
    ContainerStatus::complete(id.clone(), code)
}

/// A successful completion report for `id`.
pub fn succeeded(id: &ContainerId) -> ContainerStatus {
    complete(id, exit_status::SUCCESS)
}

/// A launch confirmation for `id`.
pub fn running(id: &ContainerId) -> ContainerStatus {
    ContainerStatus::running(id.clone())
}

/// Host to rack pairs for a small two-rack cluster.
///
/// `host1` and `host2` sit on `/rack1`, `host3` and `host4` on `/rack2`.
pub fn two_rack_topology() -> Vec<(&'static str, &'static str)> {
    vec![
        ("host1", "/rack1"),
        ("host2", "/rack1"),
        ("host3", "/rack2"),
        ("host4", "/rack2"),
    ]
}
