//! Configuration for the application master.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use yardarm_allocate::{AllocationValues, DefaultRackResolver, RackResolver, StaticRackResolver};
use yardarm_events::Priority;

/// Application master configuration.
#[derive(Debug, Clone)]
pub struct AppmasterConfig {
    /// Time between resource-manager heartbeats.
    pub poll_interval: Duration,

    /// Request settings for the default allocation group.
    pub allocation: AllocationValues,

    /// Host to rack mapping, `host1=/rack1,host2=/rack2`.
    pub rack_map: Option<String>,

    /// Containers requested from anywhere in the cluster at startup.
    pub initial_containers: u32,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for AppmasterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            allocation: AllocationValues::default(),
            rack_map: None,
            initial_containers: 0,
            log_level: "info".to_string(),
        }
    }
}

impl AppmasterConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let poll_interval_ms: u64 = parse_var(&lookup, "YARDARM_POLL_INTERVAL_MS", 1000)?;
        if poll_interval_ms == 0 {
            anyhow::bail!("YARDARM_POLL_INTERVAL_MS must be positive");
        }

        let priority: u32 = parse_var(&lookup, "YARDARM_PRIORITY", 0)?;
        let memory_mb = parse_var(&lookup, "YARDARM_MEMORY_MB", defaults.allocation.memory_mb)?;
        let virtual_cores = parse_var(
            &lookup,
            "YARDARM_VIRTUAL_CORES",
            defaults.allocation.virtual_cores,
        )?;
        let locality = parse_var(&lookup, "YARDARM_LOCALITY", false)?;
        let label_expression = lookup("YARDARM_LABEL_EXPRESSION").filter(|s| !s.is_empty());

        let rack_map = lookup("YARDARM_RACK_MAP").filter(|s| !s.trim().is_empty());
        let initial_containers = parse_var(&lookup, "YARDARM_CONTAINERS", 0)?;
        let log_level = lookup("YARDARM_LOG_LEVEL").unwrap_or(defaults.log_level);

        Ok(Self {
            poll_interval: Duration::from_millis(poll_interval_ms),
            allocation: AllocationValues {
                priority: Priority::new(priority),
                label_expression,
                virtual_cores,
                memory_mb,
                locality,
            },
            rack_map,
            initial_containers,
            log_level,
        })
    }

    /// Builds the rack resolver for the configured topology.
    pub fn rack_resolver(&self) -> Result<Arc<dyn RackResolver>> {
        match &self.rack_map {
            Some(mapping) => {
                let resolver = StaticRackResolver::parse(mapping)
                    .context("Invalid YARDARM_RACK_MAP")?;
                Ok(Arc::new(resolver))
            }
            None => Ok(Arc::new(DefaultRackResolver)),
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {name}: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<AppmasterConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppmasterConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.allocation, AllocationValues::default());
        assert!(config.rack_map.is_none());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("YARDARM_POLL_INTERVAL_MS", "250"),
            ("YARDARM_PRIORITY", "3"),
            ("YARDARM_MEMORY_MB", "512"),
            ("YARDARM_VIRTUAL_CORES", "2"),
            ("YARDARM_LOCALITY", "true"),
            ("YARDARM_LABEL_EXPRESSION", "gpu"),
            ("YARDARM_CONTAINERS", "4"),
        ])
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.allocation.priority, Priority::new(3));
        assert_eq!(config.allocation.capability().memory_mb, 512);
        assert!(config.allocation.locality);
        assert_eq!(config.allocation.label_expression.as_deref(), Some("gpu"));
        assert_eq!(config.initial_containers, 4);
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let err = load(&[("YARDARM_MEMORY_MB", "lots")]).unwrap_err();
        assert!(err.to_string().contains("YARDARM_MEMORY_MB"));
    }

    #[rstest]
    #[case("YARDARM_LOCALITY", "yes")]
    #[case("YARDARM_PRIORITY", "-1")]
    #[case("YARDARM_VIRTUAL_CORES", "1.5")]
    #[case("YARDARM_POLL_INTERVAL_MS", "soon")]
    fn test_malformed_values(#[case] name: &str, #[case] value: &str) {
        let err = load(&[(name, value)]).unwrap_err();
        assert!(err.to_string().contains(name));
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(load(&[("YARDARM_POLL_INTERVAL_MS", "0")]).is_err());
    }

    #[test]
    fn test_rack_resolver() {
        let config = load(&[("YARDARM_RACK_MAP", "host1=/rack1")]).unwrap();
        let resolver = config.rack_resolver().unwrap();
        assert_eq!(resolver.resolve("host1"), "/rack1");
        assert_eq!(resolver.resolve("host2"), "/default-rack");

        let bad = load(&[("YARDARM_RACK_MAP", "host1=rack1")]).unwrap();
        assert!(bad.rack_resolver().is_err());
    }
}
