//! Cache configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CacheError, CacheResult};
use crate::registry::{AdapterOptions, AdapterRegistry};

/// Cache descriptor as it appears in the application configuration.
///
/// ```json
/// { "type": "embedded", "retention": 3600000, "options": { "path": "cache.bin" } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CacheConfig {
    /// Registry name of the adapter.
    #[serde(rename = "type", default = "default_adapter")]
    pub adapter: String,

    /// Adapter-specific options, validated by the adapter factory.
    #[serde(default)]
    pub options: AdapterOptions,

    /// Default time-to-live in milliseconds for entries stored without one.
    #[serde(default)]
    pub retention: Option<u64>,

    /// How often expired entries are swept, in milliseconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

fn default_adapter() -> String {
    "memory".to_string()
}

fn default_sweep_interval() -> u64 {
    60_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            adapter: default_adapter(),
            options: AdapterOptions::new(),
            retention: None,
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

impl CacheConfig {
    /// In-memory cache configuration.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Embedded file cache, optionally encrypted.
    pub fn embedded(path: impl Into<String>, encryption_key: Option<&str>) -> Self {
        let mut options = AdapterOptions::new();
        options.insert("path".into(), Value::String(path.into()));
        if let Some(key) = encryption_key {
            options.insert("encryptionKey".into(), key.into());
        }
        Self {
            adapter: "embedded".to_string(),
            options,
            ..Self::default()
        }
    }

    /// Redis cache configuration.
    pub fn redis(url: impl Into<String>) -> Self {
        let mut options = AdapterOptions::new();
        options.insert("url".into(), Value::String(url.into()));
        Self {
            adapter: "redis".to_string(),
            options,
            ..Self::default()
        }
    }

    /// Set the default retention.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(u64::try_from(retention.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.retention.map(Duration::from_millis)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Structural checks; adapter options are checked by the factory.
    pub fn validate(&self, registry: &AdapterRegistry) -> CacheResult<()> {
        if !registry.contains(&self.adapter) {
            return Err(CacheError::UnknownAdapter(self.adapter.clone()));
        }
        if self.retention == Some(0) {
            return Err(CacheError::Config("retention must be greater than 0".into()));
        }
        if self.sweep_interval_ms == 0 {
            return Err(CacheError::Config(
                "sweepIntervalMs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
