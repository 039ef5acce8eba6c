//! Per-group request building and grant routing.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use yardarm_events::{Container, Priority, Resource};
use yardarm_id::ContainerId;

use crate::{
    build_requests, AllocateCountInfo, AllocateCountTracker, AllocateError, AllocateRequest,
    AllocationGroup, AllocationGroups, ContainerAllocateData, RackResolver,
    ResourceRequestDescriptor,
};

/// Group that receives demand not tagged with a known group id.
pub const DEFAULT_GROUP: &str = "default";

/// Sub-key under which a group reserves the priority its containers use.
const GROUP_SUB_KEY: &str = "containers";

/// How one group's containers are requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationValues {
    /// Base priority; the reserved priority may be higher if this one is taken.
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_expression: Option<String>,
    pub virtual_cores: u32,
    pub memory_mb: u64,
    /// Prefer strict host/rack placement.
    pub locality: bool,
}

impl Default for AllocationValues {
    fn default() -> Self {
        let resource = Resource::default();
        Self {
            priority: Priority::default(),
            label_expression: None,
            virtual_cores: resource.virtual_cores,
            memory_mb: resource.memory_mb,
            locality: false,
        }
    }
}

impl AllocationValues {
    #[must_use]
    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    #[must_use]
    pub fn with_locality(mut self, locality: bool) -> Self {
        self.locality = locality;
        self
    }

    #[must_use]
    pub fn with_resource(mut self, memory_mb: u64, virtual_cores: u32) -> Self {
        self.memory_mb = memory_mb;
        self.virtual_cores = virtual_cores;
        self
    }

    #[must_use]
    pub fn with_label_expression(mut self, expression: impl Into<String>) -> Self {
        self.label_expression = Some(expression.into());
        self
    }

    pub fn capability(&self) -> Resource {
        Resource::new(self.memory_mb, self.virtual_cores)
    }
}

struct GroupAllocation {
    name: String,
    priority: Priority,
    values: RwLock<AllocationValues>,
    tracker: AllocateCountTracker,
}

/// Turns outstanding demand into resource-manager asks, one tracker per group.
///
/// The allocator is shared between request-producing application code and the
/// heartbeat worker. Every method is synchronous and takes short locks only.
pub struct ContainerAllocator {
    resolver: Arc<dyn RackResolver>,
    groups: AllocationGroups,
    allocations: RwLock<BTreeMap<String, Arc<GroupAllocation>>>,
    releases: Mutex<VecDeque<ContainerId>>,
    response_id: AtomicI32,
    progress: Mutex<f32>,
}

impl ContainerAllocator {
    /// Creates an allocator whose default group uses `defaults`.
    pub fn new(resolver: Arc<dyn RackResolver>, defaults: AllocationValues) -> Self {
        let allocator = Self {
            resolver,
            groups: AllocationGroups::new(),
            allocations: RwLock::new(BTreeMap::new()),
            releases: Mutex::new(VecDeque::new()),
            response_id: AtomicI32::new(0),
            progress: Mutex::new(0.0),
        };
        // A fresh registry always has room for the first reservation.
        let registered =
            allocator.register(&mut allocator.allocations.write(), DEFAULT_GROUP, defaults);
        if let Err(err) = registered {
            unreachable!("default allocation group could not be registered: {err}");
        }
        allocator
    }

    /// Configures a group, registering it on first use.
    ///
    /// Returns the priority the group's containers are requested at. A group
    /// keeps its outstanding demand when its values are updated, but its base
    /// priority cannot change.
    pub fn set_allocation_values(
        &self,
        name: &str,
        values: AllocationValues,
    ) -> Result<Priority, AllocateError> {
        let mut allocations = self.allocations.write();

        if let Some(existing) = allocations.get(name) {
            let mut current = existing.values.write();
            if current.priority != values.priority {
                return Err(AllocateError::ConflictingGroup {
                    name: name.to_string(),
                    existing: current.priority,
                    requested: values.priority,
                });
            }
            debug!(group = %name, "Updating allocation values");
            *current = values;
            return Ok(existing.priority);
        }

        self.register(&mut allocations, name, values)
    }

    fn register(
        &self,
        allocations: &mut BTreeMap<String, Arc<GroupAllocation>>,
        name: &str,
        values: AllocationValues,
    ) -> Result<Priority, AllocateError> {
        self.groups.add(name, values.priority);
        let priority = self.groups.reserve(name, GROUP_SUB_KEY)?;

        info!(
            group = %name,
            priority = %priority,
            memory_mb = values.memory_mb,
            virtual_cores = values.virtual_cores,
            locality = values.locality,
            "Registered allocation group"
        );

        allocations.insert(
            name.to_string(),
            Arc::new(GroupAllocation {
                name: name.to_string(),
                priority,
                values: RwLock::new(values),
                tracker: AllocateCountTracker::new(Arc::clone(&self.resolver)),
            }),
        );
        Ok(priority)
    }

    fn allocation(&self, name: Option<&str>) -> Arc<GroupAllocation> {
        let allocations = self.allocations.read();
        let found = name.and_then(|name| allocations.get(name));
        if found.is_none() {
            if let Some(name) = name {
                warn!(group = %name, "Unknown allocation group, using default");
            }
        }
        match found.or_else(|| allocations.get(DEFAULT_GROUP)) {
            Some(allocation) => Arc::clone(allocation),
            None => unreachable!("default allocation group is registered on construction"),
        }
    }

    /// Adds a demand batch to the group named by `data.id()`.
    pub fn allocate_containers(&self, data: &ContainerAllocateData) {
        if !data.has_data() {
            return;
        }
        let allocation = self.allocation(data.id());
        debug!(group = %allocation.name, data = %data, "Adding container demand");
        allocation.tracker.add_containers(data);
    }

    /// Adds cluster-wide demand to the default group.
    pub fn allocate_any(&self, count: u32) {
        if count == 0 {
            return;
        }
        self.allocation(None).tracker.add_any(count);
    }

    /// Builds this cycle's asks for every group, lowest priority first.
    pub fn create_requests(&self) -> Vec<ResourceRequestDescriptor> {
        let mut allocations: Vec<_> = self.allocations.read().values().cloned().collect();
        allocations.sort_by_key(|allocation| allocation.priority);

        allocations
            .iter()
            .flat_map(|allocation| {
                let counts = allocation.tracker.allocate_counts();
                let values = allocation.values.read();
                build_requests(&counts, allocation.priority, &values)
            })
            .collect()
    }

    /// Matches grants against outstanding demand.
    ///
    /// Returns the grants that satisfied demand. Grants at an unknown priority
    /// or with nothing outstanding are queued for release instead.
    pub fn process_allocated_containers(&self, grants: Vec<Container>) -> Vec<Container> {
        let mut accepted = Vec::with_capacity(grants.len());
        let mut rejected = Vec::new();

        for container in grants {
            let allocation = self.groups.group_for_priority(container.priority).and_then(|group| {
                let allocations = self.allocations.read();
                allocations.get(group.name()).cloned()
            });
            let matched = allocation.and_then(|allocation| {
                allocation
                    .tracker
                    .process_allocated_container(&container.host)
                    .map(|matched| (allocation, matched))
            });

            match matched {
                Some((allocation, matched)) => {
                    debug!(
                        container_id = %container.id,
                        host = %container.host,
                        group = %allocation.name,
                        matched = ?matched,
                        "Grant matched outstanding demand"
                    );
                    accepted.push(container);
                }
                None => {
                    warn!(
                        container_id = %container.id,
                        host = %container.host,
                        priority = %container.priority,
                        "Grant matched no outstanding demand, releasing"
                    );
                    rejected.push(container.id);
                }
            }
        }

        if !rejected.is_empty() {
            self.release_containers(rejected);
        }
        accepted
    }

    /// Queues a container to be handed back on the next request.
    pub fn release_container(&self, id: ContainerId) {
        self.release_containers(std::iter::once(id));
    }

    pub fn release_containers(&self, ids: impl IntoIterator<Item = ContainerId>) {
        self.releases.lock().extend(ids);
    }

    /// Containers queued for release and not yet sent.
    pub fn pending_releases(&self) -> Vec<ContainerId> {
        self.releases.lock().iter().cloned().collect()
    }

    /// Builds the next heartbeat request, draining the release queue.
    pub fn next_request(&self) -> AllocateRequest {
        let asks = self.create_requests();
        let releases: Vec<ContainerId> = self.releases.lock().drain(..).collect();
        AllocateRequest {
            response_id: self.response_id.load(Ordering::Acquire),
            asks,
            releases,
            progress: *self.progress.lock(),
        }
    }

    /// Records the response id to echo on the next request.
    pub fn on_response(&self, response_id: i32) {
        self.response_id.store(response_id, Ordering::Release);
    }

    /// Sets application progress, clamped to `0.0..=1.0`.
    pub fn set_progress(&self, progress: f32) {
        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        *self.progress.lock() = progress;
    }

    pub fn progress(&self) -> f32 {
        *self.progress.lock()
    }

    /// Snapshot of a group's outstanding demand.
    pub fn allocate_counts(&self, group: &str) -> Option<AllocateCountInfo> {
        self.allocations
            .read()
            .get(group)
            .map(|allocation| allocation.tracker.allocate_counts())
    }

    /// Priority a group's containers are requested at.
    pub fn priority(&self, group: &str) -> Option<Priority> {
        self.allocations.read().get(group).map(|a| a.priority)
    }

    pub fn allocation_values(&self, group: &str) -> Option<AllocationValues> {
        self.allocations
            .read()
            .get(group)
            .map(|allocation| allocation.values.read().clone())
    }

    pub fn groups(&self) -> Vec<AllocationGroup> {
        self.groups.groups()
    }
}

impl std::fmt::Debug for ContainerAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerAllocator")
            .field("groups", &self.allocations.read().keys().collect::<Vec<_>>())
            .field("pending_releases", &self.releases.lock().len())
            .field("response_id", &self.response_id.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DefaultRackResolver;

    fn allocator(values: AllocationValues) -> ContainerAllocator {
        ContainerAllocator::new(Arc::new(DefaultRackResolver), values)
    }

    fn summary(asks: &[ResourceRequestDescriptor]) -> Vec<(&str, u32, u32, bool)> {
        asks.iter()
            .map(|a| {
                (
                    a.resource_name.as_str(),
                    a.priority.value(),
                    a.num_containers,
                    a.relax_locality,
                )
            })
            .collect()
    }

    fn grant(host: &str, priority: u32) -> Container {
        Container {
            id: ContainerId::new(),
            host: host.to_string(),
            resource: Resource::default(),
            priority: Priority::new(priority),
        }
    }

    #[test]
    fn test_any_only_without_locality() {
        let allocator = allocator(AllocationValues::default());
        allocator.allocate_any(2);
        assert_eq!(
            summary(&allocator.create_requests()),
            vec![("*", 0, 2, true)]
        );
    }

    #[test]
    fn test_single_host_with_locality() {
        let allocator = allocator(AllocationValues::default().with_locality(true));
        let mut data = ContainerAllocateData::new();
        data.add_hosts("host1", 1);
        allocator.allocate_containers(&data);

        assert_eq!(
            summary(&allocator.create_requests()),
            vec![
                ("host1", 0, 1, true),
                ("/default-rack", 0, 1, false),
                ("*", 0, 2, false),
            ]
        );
    }

    #[test]
    fn test_no_demand_keeps_priority_alive() {
        let allocator = allocator(AllocationValues::default().with_priority(3u32));
        assert_eq!(
            summary(&allocator.create_requests()),
            vec![("*", 3, 0, true)]
        );
    }

    #[test]
    fn test_groups_are_requested_in_priority_order() {
        let allocator = allocator(AllocationValues::default().with_priority(5u32));
        let priority = allocator
            .set_allocation_values("workers", AllocationValues::default().with_priority(1u32))
            .unwrap();
        assert_eq!(priority, Priority::new(1));

        let asks = allocator.create_requests();
        assert_eq!(summary(&asks), vec![("*", 1, 0, true), ("*", 5, 0, true)]);
    }

    #[test]
    fn test_conflicting_base_priority_is_rejected() {
        let allocator = allocator(AllocationValues::default());
        allocator
            .set_allocation_values("workers", AllocationValues::default().with_priority(2u32))
            .unwrap();

        let err = allocator
            .set_allocation_values("workers", AllocationValues::default().with_priority(4u32))
            .unwrap_err();
        assert_eq!(
            err,
            AllocateError::ConflictingGroup {
                name: "workers".to_string(),
                existing: Priority::new(2),
                requested: Priority::new(4),
            }
        );
    }

    #[test]
    fn test_exhausted_priorities_are_reported() {
        let allocator = allocator(AllocationValues::default().with_priority(u32::MAX));
        let err = allocator
            .set_allocation_values("workers", AllocationValues::default().with_priority(u32::MAX))
            .unwrap_err();
        assert_eq!(err, AllocateError::PrioritiesExhausted("workers".to_string()));
        assert!(allocator.priority("workers").is_none());
    }

    #[test]
    fn test_release_queue_keeps_order() {
        let allocator = allocator(AllocationValues::default());
        let ids: Vec<ContainerId> = (0..3).map(|_| ContainerId::new()).collect();
        allocator.release_container(ids[0].clone());
        allocator.release_containers(ids[1..].to_vec());
        assert_eq!(allocator.pending_releases(), ids);
    }

    #[test]
    fn test_updating_values_keeps_demand() {
        let allocator = allocator(AllocationValues::default());
        allocator.allocate_any(3);
        allocator
            .set_allocation_values(DEFAULT_GROUP, AllocationValues::default().with_resource(512, 4))
            .unwrap();

        let asks = allocator.create_requests();
        assert_eq!(asks.len(), 1);
        assert_eq!(asks[0].num_containers, 3);
        assert_eq!(asks[0].capability, Resource::new(512, 4));
    }

    #[test]
    fn test_matched_grants_remove_demand() {
        let allocator = allocator(AllocationValues::default());
        allocator.allocate_any(1);

        let accepted = allocator.process_allocated_containers(vec![grant("host1", 0)]);
        assert_eq!(accepted.len(), 1);
        assert!(allocator.allocate_counts(DEFAULT_GROUP).unwrap().is_empty());
        assert!(allocator.pending_releases().is_empty());
    }

    #[test]
    fn test_unmatched_grants_are_released() {
        let allocator = allocator(AllocationValues::default());
        let stray = grant("host1", 0);
        let unknown_priority = grant("host1", 42);
        let expected = vec![stray.id.clone(), unknown_priority.id.clone()];

        let accepted = allocator.process_allocated_containers(vec![stray, unknown_priority]);
        assert!(accepted.is_empty());
        assert_eq!(allocator.pending_releases(), expected);
    }

    #[test]
    fn test_next_request_drains_releases() {
        let allocator = allocator(AllocationValues::default());
        let id = ContainerId::new();
        allocator.release_container(id.clone());
        allocator.on_response(7);
        allocator.set_progress(0.5);

        let request = allocator.next_request();
        assert_eq!(request.response_id, 7);
        assert_eq!(request.releases, vec![id]);
        assert_eq!(request.progress, 0.5);
        assert!(allocator.next_request().releases.is_empty());
    }

    #[test]
    fn test_progress_is_clamped() {
        let allocator = allocator(AllocationValues::default());
        allocator.set_progress(3.0);
        assert_eq!(allocator.progress(), 1.0);
        allocator.set_progress(-1.0);
        assert_eq!(allocator.progress(), 0.0);
        allocator.set_progress(f32::NAN);
        assert_eq!(allocator.progress(), 0.0);
    }
}
