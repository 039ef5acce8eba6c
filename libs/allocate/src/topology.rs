//! Host to rack resolution.

use std::collections::HashMap;

use crate::AllocateError;

/// Rack that hosts resolve to when no topology is configured for them.
pub const DEFAULT_RACK: &str = "/default-rack";

/// Resolves a host name to its rack.
///
/// Implementations must answer from memory: the tracker may call `resolve`
/// while holding its lock.
pub trait RackResolver: Send + Sync {
    fn resolve(&self, host: &str) -> String;
}

/// Resolver for clusters without topology: every host is on [`DEFAULT_RACK`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRackResolver;

impl RackResolver for DefaultRackResolver {
    fn resolve(&self, _host: &str) -> String {
        DEFAULT_RACK.to_string()
    }
}

/// Resolver backed by a fixed host to rack table.
#[derive(Debug, Clone, Default)]
pub struct StaticRackResolver {
    racks: HashMap<String, String>,
}

impl StaticRackResolver {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>, rack: impl Into<String>) -> Self {
        self.racks.insert(host.into(), rack.into());
        self
    }

    /// Parses a mapping of the form `host1=/rack1,host2=/rack2`.
    ///
    /// Rack names must start with `/`. Blank entries are skipped.
    pub fn parse(mapping: &str) -> Result<Self, AllocateError> {
        let mut resolver = Self::new();
        for entry in mapping.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((host, rack)) = entry.split_once('=') else {
                return Err(AllocateError::InvalidRackMapping(entry.to_string()));
            };
            let (host, rack) = (host.trim(), rack.trim());
            if host.is_empty() || !rack.starts_with('/') || rack.len() < 2 {
                return Err(AllocateError::InvalidRackMapping(entry.to_string()));
            }
            resolver.racks.insert(host.to_string(), rack.to_string());
        }
        Ok(resolver)
    }

    pub fn len(&self) -> usize {
        self.racks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.racks.is_empty()
    }
}

impl RackResolver for StaticRackResolver {
    fn resolve(&self, host: &str) -> String {
        self.racks
            .get(host)
            .cloned()
            .unwrap_or_else(|| DEFAULT_RACK.to_string())
    }
}
