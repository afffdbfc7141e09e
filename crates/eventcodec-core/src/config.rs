//! TOML-loadable configuration (SPEC_FULL.md "Configuration"), mirroring
//! `GaussConfig::load`'s "read file, `toml::from_str`, wrap parse failures
//! as a typed error" shape.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigurationError;
use crate::registry::RegistryConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub secure_by_default: bool,
    pub tier_capacity: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self { secure_by_default: true, tier_capacity: crate::pool::DEFAULT_TIER_CAPACITY }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// 0 disables TTL eviction.
    pub ttl_seconds: u64,
    /// 0 disables capacity-based eviction entirely.
    pub max_entries: usize,
    pub cleanup_interval_seconds: u64,
    /// Evict the least-recently-accessed non-default entry when registering
    /// at capacity. When false, registering at capacity fails instead.
    pub enable_lru: bool,
    pub enable_background_cleanup: bool,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            ttl_seconds: 0,
            max_entries: 0,
            cleanup_interval_seconds: 60,
            enable_lru: true,
            enable_background_cleanup: true,
        }
    }
}

impl From<RegistrySettings> for RegistryConfig {
    fn from(s: RegistrySettings) -> Self {
        RegistryConfig {
            ttl: Duration::from_secs(s.ttl_seconds),
            max_entries: s.max_entries,
            cleanup_interval: Duration::from_secs(s.cleanup_interval_seconds),
            enable_lru: s.enable_lru,
            enable_background_cleanup: s.enable_background_cleanup,
        }
    }
}

/// Root configuration document. Every field defaults, so a missing or empty
/// file parses to the same settings as [`Config::default`].
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub pool: PoolSettings,
    pub registry: RegistrySettings,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::new("config", "path", e.to_string(), path.display().to_string()))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigurationError> {
        toml::from_str(text).map_err(|e| ConfigurationError::new("config", "toml", e.to_string(), text.chars().take(64).collect::<String>()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::parse("").unwrap();
        assert!(config.pool.secure_by_default);
        assert_eq!(config.registry.ttl_seconds, 0);
    }

    #[test]
    fn partial_document_fills_remaining_defaults() {
        let config = Config::parse("[registry]\nmax_entries = 128\n").unwrap();
        assert_eq!(config.registry.max_entries, 128);
        assert_eq!(config.registry.cleanup_interval_seconds, 60);
        assert!(config.pool.secure_by_default);
    }

    #[test]
    fn malformed_toml_is_a_configuration_error() {
        let err = Config::parse("not = [valid").unwrap_err();
        assert_eq!(err.component, "config");
    }
}
