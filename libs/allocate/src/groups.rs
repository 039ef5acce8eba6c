//! Priority namespaces for independent request groups.
//!
//! Every group (for example a cluster role) asks for containers at its own
//! priorities so that grants can be routed back to the group that asked for
//! them. Reservations are append-only for the lifetime of the registry.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;
use yardarm_events::Priority;

use crate::AllocateError;

/// A named request group and the priorities reserved for its sub-keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationGroup {
    name: String,
    base_priority: Priority,
    reservations: BTreeMap<String, Priority>,
}

impl AllocationGroup {
    fn new(name: &str, base_priority: Priority) -> Self {
        Self {
            name: name.to_string(),
            base_priority,
            reservations: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_priority(&self) -> Priority {
        self.base_priority
    }

    /// Returns the priority reserved for `sub_key`, if any.
    pub fn priority(&self, sub_key: &str) -> Option<Priority> {
        self.reservations.get(sub_key).copied()
    }

    pub fn reservations(&self) -> &BTreeMap<String, Priority> {
        &self.reservations
    }

    /// Returns true if `priority` is reserved by this group.
    pub fn owns(&self, priority: Priority) -> bool {
        self.reservations.values().any(|p| *p == priority)
    }
}

#[derive(Debug, Default)]
struct Registry {
    groups: BTreeMap<String, AllocationGroup>,
    reserved: BTreeSet<Priority>,
}

/// Registry of allocation groups with collision-free priority reservation.
///
/// All operations take one lock over both the groups and the global set of
/// reserved priorities, so reservations are linearized across callers.
#[derive(Debug, Default)]
pub struct AllocationGroups {
    inner: Mutex<Registry>,
}

impl AllocationGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a group, or returns the existing one with the same base priority.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty or already registered with a different base
    /// priority.
    pub fn add(&self, name: &str, base_priority: Priority) -> AllocationGroup {
        assert!(!name.is_empty(), "allocation group name must not be empty");

        let mut registry = self.inner.lock();
        if let Some(existing) = registry.groups.get(name) {
            assert_eq!(
                existing.base_priority, base_priority,
                "allocation group '{name}' re-registered with a different base priority"
            );
            return existing.clone();
        }

        debug!(group = %name, base_priority = %base_priority, "Adding allocation group");
        let group = AllocationGroup::new(name, base_priority);
        registry.groups.insert(name.to_string(), group.clone());
        group
    }

    /// Reserves a priority for `(group, sub_key)`.
    ///
    /// Returns the existing reservation if there is one. Otherwise reserves
    /// the smallest priority at or above the group's base that no group holds,
    /// failing if every such priority is taken.
    pub fn reserve(&self, group: &str, sub_key: &str) -> Result<Priority, AllocateError> {
        let mut registry = self.inner.lock();
        let Registry { groups, reserved } = &mut *registry;

        let entry = groups
            .get_mut(group)
            .ok_or_else(|| AllocateError::UnknownGroup(group.to_string()))?;

        if let Some(priority) = entry.reservations.get(sub_key) {
            return Ok(*priority);
        }

        let mut priority = entry.base_priority;
        while !reserved.insert(priority) {
            priority = priority
                .checked_next()
                .ok_or_else(|| AllocateError::PrioritiesExhausted(group.to_string()))?;
        }
        entry.reservations.insert(sub_key.to_string(), priority);

        debug!(
            group = %group,
            sub_key = %sub_key,
            priority = %priority,
            "Reserved priority"
        );
        Ok(priority)
    }

    pub fn get(&self, name: &str) -> Option<AllocationGroup> {
        self.inner.lock().groups.get(name).cloned()
    }

    /// All registered groups, ordered by name.
    pub fn groups(&self) -> Vec<AllocationGroup> {
        self.inner.lock().groups.values().cloned().collect()
    }

    /// Finds the group holding a reservation for `priority`.
    pub fn group_for_priority(&self, priority: Priority) -> Option<AllocationGroup> {
        self.inner
            .lock()
            .groups
            .values()
            .find(|group| group.owns(priority))
            .cloned()
    }
}
