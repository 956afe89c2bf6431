// src/utils/config.rs
//! Aggregate configuration for the governor
//!
//! Each component defines its own config struct next to its implementation
//! ([`PoolConfig`], [`GateConfig`], [`TrackerConfig`], [`CacheConfig`]);
//! this module bundles them into one deserializable surface for hosts that
//! configure the whole subsystem at once. Environment loading is the host's
//! concern — values arrive here as plain data.

use serde::Deserialize;

use crate::cache::CacheConfig;
use crate::gate::GateConfig;
use crate::pool::PoolConfig;
use crate::tracker::TrackerConfig;
use crate::utils::errors::Result;

/// Configuration for the full governor subsystem
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Resource pool settings (caps, idle timeout, reaper)
    pub pool: PoolConfig,

    /// Concurrency gate settings (per-kind limits)
    pub gate: GateConfig,

    /// Operation tracker settings (retention, sampling, snapshots)
    pub tracker: TrackerConfig,

    /// Tiered cache settings (mode, TTL, capacity)
    pub cache: CacheConfig,
}

impl GovernorConfig {
    /// Validate every component configuration
    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        self.gate.validate()?;
        self.tracker.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GovernorConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: GovernorConfig = serde_json::from_str(
            r#"{"pool": {"max_api_clients": 2}, "gate": {"max_concurrent_browser": 1}}"#,
        )
        .unwrap();

        assert_eq!(config.pool.max_api_clients, 2);
        assert_eq!(config.gate.max_concurrent_browser, 1);
        // Untouched sections keep their defaults
        assert_eq!(config.tracker.max_operations, 100);
    }

    #[test]
    fn test_invalid_section_rejected() {
        let mut config = GovernorConfig::default();
        config.pool.max_api_clients = 0;
        assert!(config.validate().is_err());
    }
}
