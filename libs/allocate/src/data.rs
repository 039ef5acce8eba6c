//! One batch of wanted containers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Containers wanted in one batch, at three granularities.
///
/// A host entry and a rack entry for the host's rack in the *same* batch are
/// alternative localities for the same containers, not independent demand.
/// The tracker merges them when the batch is folded in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerAllocateData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    any: u32,
    hosts: BTreeMap<String, u32>,
    racks: BTreeMap<String, u32>,
}

impl ContainerAllocateData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags the batch with the allocation group it belongs to.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.set_id(id);
        self
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Adds cluster-wide demand with no locality preference.
    pub fn add_any(&mut self, count: u32) -> &mut Self {
        self.any += count;
        self
    }

    /// Adds demand on a specific host.
    ///
    /// # Panics
    ///
    /// Panics if `host` is empty.
    pub fn add_hosts(&mut self, host: &str, count: u32) -> &mut Self {
        assert!(!host.is_empty(), "host name must not be empty");
        if count > 0 {
            *self.hosts.entry(host.to_string()).or_insert(0) += count;
        }
        self
    }

    /// Adds demand on a rack with no specific host.
    ///
    /// # Panics
    ///
    /// Panics if `rack` is empty.
    pub fn add_racks(&mut self, rack: &str, count: u32) -> &mut Self {
        assert!(!rack.is_empty(), "rack name must not be empty");
        if count > 0 {
            *self.racks.entry(rack.to_string()).or_insert(0) += count;
        }
        self
    }

    pub fn any(&self) -> u32 {
        self.any
    }

    pub fn hosts(&self) -> &BTreeMap<String, u32> {
        &self.hosts
    }

    pub fn racks(&self) -> &BTreeMap<String, u32> {
        &self.racks
    }

    /// Returns true if the batch asks for anything at all.
    pub fn has_data(&self) -> bool {
        self.any > 0 || !self.hosts.is_empty() || !self.racks.is_empty()
    }
}

impl fmt::Display for ContainerAllocateData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[id={}, any={}, hosts={{", self.id.as_deref().unwrap_or("-"), self.any)?;
        write_counts(f, &self.hosts)?;
        f.write_str("}, racks={")?;
        write_counts(f, &self.racks)?;
        f.write_str("}]")
    }
}

fn write_counts(f: &mut fmt::Formatter<'_>, counts: &BTreeMap<String, u32>) -> fmt::Result {
    for (i, (name, count)) in counts.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{name}={count}")?;
    }
    Ok(())
}
