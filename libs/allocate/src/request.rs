//! Resource-request descriptors sent to the resource manager.

use serde::{Deserialize, Serialize};
use yardarm_events::{Priority, Resource};
use yardarm_id::ContainerId;

use crate::{AllocateCountInfo, AllocationValues};

/// Resource name for cluster-wide requests.
pub const ANY: &str = "*";

/// One ask of the resource-manager protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequestDescriptor {
    /// Host, rack or `"*"`.
    pub resource_name: String,
    pub priority: Priority,
    pub num_containers: u32,
    /// Whether a less specific location may satisfy this ask.
    pub relax_locality: bool,
    pub capability: Resource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_expression: Option<String>,
}

impl ResourceRequestDescriptor {
    pub fn is_any(&self) -> bool {
        self.resource_name == ANY
    }
}

/// Everything sent to the resource manager in one heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocateRequest {
    /// Echo of the last response id, used by the resource manager to detect
    /// duplicate heartbeats.
    pub response_id: i32,
    pub asks: Vec<ResourceRequestDescriptor>,
    pub releases: Vec<ContainerId>,
    pub progress: f32,
}

/// Builds the ordered asks for one group from its demand snapshot.
///
/// Hosts come first, then racks, then exactly one `"*"` entry. Host asks are
/// always relaxable; rack and `"*"` asks are relaxable only when the group
/// does not want strict locality. With no demand at all a single relaxable
/// `"*"` ask with zero containers keeps the priority alive.
pub fn build_requests(
    counts: &AllocateCountInfo,
    priority: Priority,
    values: &AllocationValues,
) -> Vec<ResourceRequestDescriptor> {
    let ask = |resource_name: &str, num_containers: u32, relax_locality: bool| {
        ResourceRequestDescriptor {
            resource_name: resource_name.to_string(),
            priority,
            num_containers,
            relax_locality,
            capability: values.capability(),
            label_expression: values.label_expression.clone(),
        }
    };

    if counts.is_empty() {
        return vec![ask(ANY, 0, true)];
    }

    let relax = !values.locality;
    let hosts = counts
        .hosts
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(host, n)| ask(host.as_str(), *n, true));
    let racks = counts
        .racks
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(rack, n)| ask(rack.as_str(), *n, relax));

    hosts
        .chain(racks)
        .chain(std::iter::once(ask(ANY, counts.any(), relax)))
        .collect()
}
