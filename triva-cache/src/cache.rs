//! The `Cache` facade handed to application code.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::registry::AdapterRegistry;
use crate::traits::{CacheAdapter, CacheStats};

const MAX_KEY_LEN: usize = 1024;

/// Typed front end over one adapter.
///
/// Applies the configured default retention to entries stored without a
/// TTL, validates keys, serializes values with serde, and sorts `keys`
/// output. Cloning is cheap; clones share the adapter.
///
/// ```
/// use std::time::Duration;
/// use triva_cache::Cache;
///
/// # async fn example() -> Result<(), triva_cache::CacheError> {
/// let cache = Cache::memory();
/// cache.set("user:1", &serde_json::json!({"name": "Alice"}), Some(Duration::from_secs(60))).await?;
/// let user: Option<serde_json::Value> = cache.get("user:1").await?;
/// assert!(user.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Cache {
    adapter: Arc<dyn CacheAdapter>,
    default_ttl: Option<Duration>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("adapter", &self.adapter.name())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl Cache {
    pub fn new(adapter: Arc<dyn CacheAdapter>) -> Self {
        Self {
            adapter,
            default_ttl: None,
        }
    }

    /// Cache over a fresh in-memory adapter.
    pub fn memory() -> Self {
        Self::new(Arc::new(crate::memory::MemoryAdapter::new()))
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Build from configuration using the process-wide registry.
    pub async fn from_config(config: &CacheConfig) -> CacheResult<Self> {
        Self::from_config_with(AdapterRegistry::global(), config).await
    }

    pub async fn from_config_with(
        registry: &AdapterRegistry,
        config: &CacheConfig,
    ) -> CacheResult<Self> {
        config.validate(registry)?;
        let adapter = registry
            .create(&config.adapter, config.options.clone())
            .await?;
        info!(
            adapter = %config.adapter,
            retention_ms = config.retention,
            "cache initialised"
        );
        Ok(Self {
            adapter,
            default_ttl: config.default_ttl(),
        })
    }

    pub fn adapter(&self) -> &Arc<dyn CacheAdapter> {
        &self.adapter
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Store a serializable value. Without `ttl` the default retention
    /// applies; with neither, the entry never expires.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let value =
            serde_json::to_value(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.set_value(key, value, ttl).await
    }

    pub async fn set_value(&self, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<()> {
        validate_key(key)?;
        let ttl = ttl.or(self.default_ttl);
        if ttl == Some(Duration::ZERO) {
            return Err(CacheError::Config("ttl must be greater than 0".into()));
        }
        self.adapter.set(key, value, ttl).await
    }

    /// Fetch and deserialize a value.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.get_value(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| CacheError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    pub async fn get_value(&self, key: &str) -> CacheResult<Option<Value>> {
        validate_key(key)?;
        self.adapter.get(key).await
    }

    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        validate_key(key)?;
        self.adapter.delete(key).await
    }

    pub async fn has(&self, key: &str) -> CacheResult<bool> {
        validate_key(key)?;
        self.adapter.has(key).await
    }

    pub async fn clear(&self) -> CacheResult<()> {
        self.adapter.clear().await
    }

    /// Live keys matching `pattern` (`*` = any substring), sorted.
    pub async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let mut keys = self.adapter.keys(pattern).await?;
        keys.sort();
        Ok(keys)
    }

    pub async fn stats(&self) -> CacheResult<CacheStats> {
        self.adapter.stats().await
    }

    /// Remaining lifetime of a key.
    pub async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        validate_key(key)?;
        self.adapter.ttl(key).await
    }

    pub async fn purge_expired(&self) -> CacheResult<usize> {
        self.adapter.purge_expired().await
    }

    /// Periodically purge expired entries until the handle is aborted.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let adapter = Arc::clone(&self.adapter);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match adapter.purge_expired().await {
                    Ok(0) => {}
                    Ok(removed) => debug!(adapter = adapter.name(), removed, "cache sweep"),
                    Err(e) => warn!(adapter = adapter.name(), error = %e, "cache sweep failed"),
                }
            }
        })
    }
}

/// Keys must be non-empty printable text.
fn validate_key(key: &str) -> CacheResult<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key must not be empty".into()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(CacheError::InvalidKey(format!(
            "key exceeds {} bytes",
            MAX_KEY_LEN
        )));
    }
    if key.chars().any(char::is_control) {
        return Err(CacheError::InvalidKey(
            "key contains control characters".into(),
        ));
    }
    Ok(())
}
