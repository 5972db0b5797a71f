//! Cache adapter trait definition.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CacheResult;

/// Best-effort statistics reported by an adapter.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Adapter name.
    pub adapter: String,
    /// Live (non-expired) entries.
    pub count: usize,
    /// Adapter-specific fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CacheStats {
    pub fn new(adapter: impl Into<String>, count: usize) -> Self {
        Self {
            adapter: adapter.into(),
            count,
            extra: Map::new(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(field.into(), value.into());
        self
    }
}

/// Storage backend contract shared by every cache adapter.
///
/// Values are JSON documents. An entry whose expiry has passed must behave
/// exactly like a missing one for every operation, whether or not the
/// adapter has physically removed it yet. Backend failures surface as
/// errors and are never reported as misses.
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    /// Registry name of this adapter.
    fn name(&self) -> &str;

    /// Store a value, replacing any previous value and expiry.
    ///
    /// # Arguments
    ///
    /// * `key` - The cache key
    /// * `value` - JSON value to store
    /// * `ttl` - Optional time-to-live; `None` means no expiry
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<()>;

    /// Fetch a value. Expired and missing entries both yield `Ok(None)`.
    async fn get(&self, key: &str) -> CacheResult<Option<Value>>;

    /// Remove a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Whether a live entry exists.
    async fn has(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Remove every entry.
    async fn clear(&self) -> CacheResult<()>;

    /// Live keys matching a glob pattern where `*` matches any substring.
    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>>;

    async fn stats(&self) -> CacheResult<CacheStats>;

    /// Remaining lifetime of a key; `None` when missing or without expiry.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    /// Physically drop expired entries, returning how many were removed.
    ///
    /// Backends that expire entries on their own keep the default.
    async fn purge_expired(&self) -> CacheResult<usize> {
        Ok(0)
    }
}
