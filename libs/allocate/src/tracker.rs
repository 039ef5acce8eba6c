//! Outstanding container demand per host, rack and cluster.
//!
//! The tracker folds [`ContainerAllocateData`] batches into running counts
//! and removes demand again as grants arrive. Counts are what the next
//! heartbeat asks the resource manager for.
//!
//! # Accounting
//!
//! For a batch with hosts `H`, racks `R` and any-count `a`:
//!
//! - every host `h` grows by `H[h]`
//! - every rack grows by `max(host-derived, rack-level)` for that batch, where
//!   host-derived is the sum of `H[h]` over hosts resolving to the rack
//! - `"*"` grows by `sum(H) + sum(rack growth) + a`
//!
//! A single-host batch of `n` therefore yields `host=n, rack=n, "*"=2n`.
//!
//! Internally demand is kept as logical containers tagged with the locality
//! they were asked at. A grant removes one of them together with every
//! bucket it was counted into, so host, rack and `"*"` drain together.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::request::ANY;
use crate::{ContainerAllocateData, RackResolver};

/// Point-in-time copy of a tracker's outstanding demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateCountInfo {
    /// Cluster-wide demand, keyed by `"*"`. Empty when there is none.
    pub anys: BTreeMap<String, u32>,
    pub hosts: BTreeMap<String, u32>,
    pub racks: BTreeMap<String, u32>,
}

impl AllocateCountInfo {
    /// Cluster-wide count.
    pub fn any(&self) -> u32 {
        self.anys.get(ANY).copied().unwrap_or(0)
    }

    /// Returns true if there is no outstanding demand at any level.
    pub fn is_empty(&self) -> bool {
        self.any() == 0
            && self.hosts.values().all(|n| *n == 0)
            && self.racks.values().all(|n| *n == 0)
    }
}

/// Which bucket a granted container was charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationMatch {
    /// Demand on the container's own host.
    Host,
    /// Demand on the container's rack.
    Rack,
    /// Cluster-wide demand.
    Any,
    /// Demand on some other host, flushed because nothing matched.
    OtherHost,
    /// Demand on some other rack, flushed because nothing matched.
    OtherRack,
}

/// Outstanding demand as logical containers, tagged by the locality they
/// were asked for. Bucket counts are derived from these on every snapshot.
#[derive(Debug, Default)]
struct Counts {
    /// Host units, keyed by host, with the rack the host resolved to.
    hosts: BTreeMap<String, HostUnits>,
    /// Rack units not already covered by host units of the same batch.
    racks: BTreeMap<String, u32>,
    /// Units with no locality preference.
    any: u32,
}

#[derive(Debug)]
struct HostUnits {
    rack: String,
    count: u32,
}

impl Counts {
    /// Expands units into buckets: a host unit counts once for its host,
    /// once for its rack and twice for `"*"`; a rack unit once for its rack
    /// and once for `"*"`.
    fn snapshot(&self) -> AllocateCountInfo {
        let mut hosts = BTreeMap::new();
        let mut racks = self.racks.clone();
        let mut any = self.any;

        for (host, units) in &self.hosts {
            hosts.insert(host.clone(), units.count);
            let rack = racks.entry(units.rack.clone()).or_insert(0);
            *rack = rack.saturating_add(units.count);
            any = any.saturating_add(units.count.saturating_mul(2));
        }
        for count in self.racks.values() {
            any = any.saturating_add(*count);
        }

        let mut anys = BTreeMap::new();
        if any > 0 {
            anys.insert(ANY.to_string(), any);
        }
        AllocateCountInfo { anys, hosts, racks }
    }

    fn pending(&self) -> u32 {
        self.hosts
            .values()
            .map(|units| units.count)
            .chain(self.racks.values().copied())
            .fold(self.any, u32::saturating_add)
    }

    fn take_host(&mut self, host: &str) -> bool {
        let Some(units) = self.hosts.get_mut(host) else {
            return false;
        };
        units.count -= 1;
        if units.count == 0 {
            self.hosts.remove(host);
        }
        true
    }

    /// Takes a host unit of some host on `rack`.
    fn take_host_on_rack(&mut self, rack: &str) -> bool {
        let host = self
            .hosts
            .iter()
            .find(|(_, units)| units.rack == rack)
            .map(|(host, _)| host.clone());
        match host {
            Some(host) => self.take_host(&host),
            None => false,
        }
    }

    fn take_rack(&mut self, rack: &str) -> bool {
        let Some(count) = self.racks.get_mut(rack) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            self.racks.remove(rack);
        }
        true
    }

    fn take_any(&mut self) -> bool {
        if self.any == 0 {
            return false;
        }
        self.any -= 1;
        true
    }
}

/// Running outstanding demand for one allocation group.
///
/// Every grant consumes exactly one logical container, so `n` containers of
/// demand accept at most `n` grants whatever locality they land on.
pub struct AllocateCountTracker {
    resolver: Arc<dyn RackResolver>,
    counts: Mutex<Counts>,
}

impl AllocateCountTracker {
    pub fn new(resolver: Arc<dyn RackResolver>) -> Self {
        Self {
            resolver,
            counts: Mutex::new(Counts::default()),
        }
    }

    /// Adds cluster-wide demand.
    pub fn add_any(&self, count: u32) {
        if count == 0 {
            return;
        }
        let mut counts = self.counts.lock();
        counts.any = counts.any.saturating_add(count);
        debug!(added = count, pending = counts.pending(), "Added cluster-wide demand");
    }

    /// Folds one batch into the outstanding demand.
    pub fn add_containers(&self, data: &ContainerAllocateData) {
        // Resolve before locking so the batch lands in one critical section.
        let mut host_units = Vec::with_capacity(data.hosts().len());
        let mut host_derived: BTreeMap<String, u32> = BTreeMap::new();
        for (host, count) in data.hosts().iter().filter(|(_, count)| **count > 0) {
            let rack = self.resolver.resolve(host);
            let derived = host_derived.entry(rack.clone()).or_insert(0);
            *derived = derived.saturating_add(*count);
            host_units.push((host.clone(), rack, *count));
        }

        // A rack grows by max(host-derived, rack-level): only the excess over
        // the batch's own host units becomes new rack demand.
        let rack_units: Vec<(String, u32)> = data
            .racks()
            .iter()
            .map(|(rack, count)| {
                let derived = host_derived.get(rack).copied().unwrap_or(0);
                (rack.clone(), count.saturating_sub(derived))
            })
            .filter(|(_, units)| *units > 0)
            .collect();

        let mut counts = self.counts.lock();
        for (host, rack, count) in host_units {
            let units = counts.hosts.entry(host).or_insert(HostUnits { rack, count: 0 });
            units.count = units.count.saturating_add(count);
        }
        for (rack, units) in rack_units {
            let count = counts.racks.entry(rack).or_insert(0);
            *count = count.saturating_add(units);
        }
        counts.any = counts.any.saturating_add(data.any());

        debug!(
            batch = %data,
            pending = counts.pending(),
            hosts = counts.hosts.len(),
            racks = counts.racks.len(),
            "Added container demand"
        );
    }

    /// Returns a snapshot of the outstanding demand.
    pub fn allocate_counts(&self) -> AllocateCountInfo {
        self.counts.lock().snapshot()
    }

    /// Number of containers still wanted.
    pub fn pending_containers(&self) -> u32 {
        self.counts.lock().pending()
    }

    /// Charges one granted container on `host` against outstanding demand.
    ///
    /// The grant consumes one logical container, preferring one asked for on
    /// `host`, then one on its rack, then one with no preference, then any
    /// other. Returns `None` when nothing is outstanding, in which case the
    /// grant is garbage.
    pub fn process_allocated_container(&self, host: &str) -> Option<AllocationMatch> {
        let rack = self.resolver.resolve(host);
        let mut counts = self.counts.lock();

        let matched = if counts.take_host(host) {
            AllocationMatch::Host
        } else if counts.take_rack(&rack) || counts.take_host_on_rack(&rack) {
            AllocationMatch::Rack
        } else if counts.take_any() {
            AllocationMatch::Any
        } else if let Some(other) = counts.hosts.keys().next().cloned() {
            counts.take_host(&other);
            AllocationMatch::OtherHost
        } else if let Some(other) = counts.racks.keys().next().cloned() {
            counts.take_rack(&other);
            AllocationMatch::OtherRack
        } else {
            debug!(host = %host, "No outstanding demand for allocated container");
            return None;
        };

        debug!(
            host = %host,
            rack = %rack,
            matched = ?matched,
            pending = counts.pending(),
            "Charged allocated container against demand"
        );
        Some(matched)
    }
}

impl std::fmt::Debug for AllocateCountTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocateCountTracker")
            .field("counts", &*self.counts.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DefaultRackResolver, StaticRackResolver, DEFAULT_RACK};

    fn default_tracker() -> AllocateCountTracker {
        AllocateCountTracker::new(Arc::new(DefaultRackResolver))
    }

    fn rack1_tracker() -> AllocateCountTracker {
        let resolver = StaticRackResolver::new()
            .with_host("host1", "/rack1")
            .with_host("host2", "/rack1")
            .with_host("host3", "/rack2");
        AllocateCountTracker::new(Arc::new(resolver))
    }

    fn map(entries: &[(&str, u32)]) -> BTreeMap<String, u32> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_one_any() {
        let tracker = default_tracker();
        let mut data = ContainerAllocateData::new();
        data.add_any(1);
        tracker.add_containers(&data);

        let counts = tracker.allocate_counts();
        assert_eq!(counts.anys, map(&[("*", 1)]));
        assert!(counts.hosts.is_empty());
        assert!(counts.racks.is_empty());
    }

    #[test]
    fn test_one_host() {
        let tracker = default_tracker();
        let mut data = ContainerAllocateData::new();
        data.add_hosts("host1", 1);
        tracker.add_containers(&data);

        let counts = tracker.allocate_counts();
        assert_eq!(counts.hosts, map(&[("host1", 1)]));
        assert_eq!(counts.racks, map(&[(DEFAULT_RACK, 1)]));
        assert_eq!(counts.any(), 2);
    }

    #[test]
    fn test_one_rack() {
        let tracker = default_tracker();
        let mut data = ContainerAllocateData::new();
        data.add_racks(DEFAULT_RACK, 1);
        tracker.add_containers(&data);

        let counts = tracker.allocate_counts();
        assert!(counts.hosts.is_empty());
        assert_eq!(counts.racks, map(&[(DEFAULT_RACK, 1)]));
        assert_eq!(counts.any(), 1);
    }

    #[test]
    fn test_host_and_its_rack_in_one_batch_merge() {
        let tracker = default_tracker();
        let mut data = ContainerAllocateData::new();
        data.add_hosts("host1", 1).add_racks(DEFAULT_RACK, 1);
        tracker.add_containers(&data);

        let counts = tracker.allocate_counts();
        assert_eq!(counts.hosts, map(&[("host1", 1)]));
        assert_eq!(counts.racks, map(&[(DEFAULT_RACK, 1)]));
        assert_eq!(counts.any(), 2);
    }

    #[test]
    fn test_merge_takes_larger_contribution() {
        let tracker = rack1_tracker();
        let mut data = ContainerAllocateData::new();
        data.add_hosts("host1", 1).add_hosts("host2", 1).add_racks("/rack1", 3);
        tracker.add_containers(&data);

        let counts = tracker.allocate_counts();
        assert_eq!(counts.racks, map(&[("/rack1", 3)]));
        assert_eq!(counts.any(), 2 + 3);
    }

    #[test]
    fn test_host_and_other_rack_do_not_merge() {
        let tracker = rack1_tracker();
        let mut data = ContainerAllocateData::new();
        data.add_hosts("host1", 1).add_racks("/rack2", 1);
        tracker.add_containers(&data);

        let counts = tracker.allocate_counts();
        assert_eq!(counts.racks, map(&[("/rack1", 1), ("/rack2", 1)]));
        assert_eq!(counts.any(), 3);
    }

    #[test]
    fn test_batches_accumulate() {
        let tracker = rack1_tracker();

        let mut first = ContainerAllocateData::new();
        first.add_hosts("host1", 1);
        tracker.add_containers(&first);

        let mut second = ContainerAllocateData::new();
        second.add_hosts("host1", 2);
        tracker.add_containers(&second);

        let mut third = ContainerAllocateData::new();
        third.add_racks("/rack1", 1);
        tracker.add_containers(&third);

        let counts = tracker.allocate_counts();
        assert_eq!(counts.hosts, map(&[("host1", 3)]));
        assert_eq!(counts.racks, map(&[("/rack1", 4)]));
        assert_eq!(counts.any(), 7);
    }

    #[test]
    fn test_empty_tracker_snapshot() {
        let counts = default_tracker().allocate_counts();
        assert!(counts.is_empty());
        assert!(counts.anys.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let tracker = default_tracker();
        tracker.add_any(1);
        let before = tracker.allocate_counts();
        tracker.add_any(1);
        assert_eq!(before.any(), 1);
        assert_eq!(tracker.allocate_counts().any(), 2);
    }

    #[test]
    fn test_host_grant_cascades() {
        let tracker = default_tracker();
        let mut data = ContainerAllocateData::new();
        data.add_hosts("host1", 1);
        tracker.add_containers(&data);

        assert_eq!(
            tracker.process_allocated_container("host1"),
            Some(AllocationMatch::Host)
        );
        assert!(tracker.allocate_counts().is_empty());
    }

    #[test]
    fn test_rack_grant() {
        let tracker = rack1_tracker();
        let mut data = ContainerAllocateData::new();
        data.add_racks("/rack1", 1);
        tracker.add_containers(&data);

        assert_eq!(
            tracker.process_allocated_container("host2"),
            Some(AllocationMatch::Rack)
        );
        assert!(tracker.allocate_counts().is_empty());
    }

    #[test]
    fn test_any_grant() {
        let tracker = default_tracker();
        tracker.add_any(2);

        assert_eq!(
            tracker.process_allocated_container("hostX"),
            Some(AllocationMatch::Any)
        );
        assert_eq!(tracker.allocate_counts().any(), 1);
    }

    #[test]
    fn test_mixed_host_rack_grants() {
        let tracker = rack1_tracker();
        let mut data = ContainerAllocateData::new();
        data.add_racks("/rack2", 1).add_hosts("host1", 1);
        tracker.add_containers(&data);
        assert_eq!(tracker.pending_containers(), 2);

        assert_eq!(
            tracker.process_allocated_container("host1"),
            Some(AllocationMatch::Host)
        );
        let counts = tracker.allocate_counts();
        assert!(counts.hosts.is_empty());
        assert_eq!(counts.racks, map(&[("/rack2", 1)]));
        assert_eq!(counts.any(), 1);

        // host2 sits on /rack1, which has nothing left: the /rack2 unit is flushed.
        assert_eq!(
            tracker.process_allocated_container("host2"),
            Some(AllocationMatch::OtherRack)
        );
        assert!(tracker.allocate_counts().is_empty());
        assert_eq!(tracker.process_allocated_container("host2"), None);
    }

    #[test]
    fn test_unmatched_host_flushes_other_host() {
        let tracker = rack1_tracker();
        let mut data = ContainerAllocateData::new();
        data.add_hosts("host1", 1);
        tracker.add_containers(&data);

        // One container was asked for, so only one grant is accepted.
        assert_eq!(
            tracker.process_allocated_container("host3"),
            Some(AllocationMatch::OtherHost)
        );
        assert!(tracker.allocate_counts().is_empty());
        assert_eq!(tracker.process_allocated_container("host3"), None);
    }

    #[test]
    fn test_rack_local_grant_satisfies_host_demand() {
        let tracker = default_tracker();
        let mut data = ContainerAllocateData::new();
        data.add_hosts("host1", 1);
        tracker.add_containers(&data);

        assert_eq!(
            tracker.process_allocated_container("hostX"),
            Some(AllocationMatch::Rack)
        );
        assert!(tracker.allocate_counts().is_empty());
        assert_eq!(tracker.process_allocated_container("hostY"), None);
        assert_eq!(tracker.process_allocated_container("hostZ"), None);
    }

    #[test]
    fn test_demand_accepts_exactly_as_many_grants() {
        let tracker = rack1_tracker();
        let mut data = ContainerAllocateData::new();
        data.add_hosts("host1", 2)
            .add_hosts("host3", 1)
            .add_racks("/rack1", 3)
            .add_any(2);
        tracker.add_containers(&data);
        // host units 3, one /rack1 unit beyond host1's two, two any units.
        assert_eq!(tracker.pending_containers(), 6);

        let accepted = ["host4", "host2", "host9", "host3", "host3", "host3", "host3"]
            .iter()
            .filter(|host| tracker.process_allocated_container(host).is_some())
            .count();
        assert_eq!(accepted, 6);
        assert_eq!(tracker.pending_containers(), 0);
        assert!(tracker.allocate_counts().is_empty());
    }

    #[test]
    fn test_snapshot_drains_with_pending_units() {
        let tracker = rack1_tracker();
        let mut data = ContainerAllocateData::new();
        data.add_hosts("host1", 1).add_hosts("host2", 1);
        tracker.add_containers(&data);

        tracker.process_allocated_container("host3");
        let counts = tracker.allocate_counts();
        assert_eq!(counts.hosts.values().sum::<u32>(), 1);
        assert_eq!(counts.racks, map(&[("/rack1", 1)]));
        assert_eq!(counts.any(), 2);
    }

    #[test]
    fn test_large_batches_saturate() {
        let tracker = default_tracker();
        let mut data = ContainerAllocateData::new();
        data.add_hosts("host1", u32::MAX).add_any(u32::MAX);
        tracker.add_containers(&data);
        tracker.add_any(u32::MAX);

        let counts = tracker.allocate_counts();
        assert_eq!(counts.hosts, map(&[("host1", u32::MAX)]));
        assert_eq!(counts.any(), u32::MAX);
        assert_eq!(tracker.pending_containers(), u32::MAX);
    }

    #[test]
    fn test_grant_without_demand_is_garbage() {
        let tracker = default_tracker();
        assert_eq!(tracker.process_allocated_container("host1"), None);
    }
}
