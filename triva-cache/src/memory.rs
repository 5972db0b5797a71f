//! In-memory cache adapter.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::trace;

use crate::error::CacheResult;
use crate::pattern::glob_match;
use crate::traits::{CacheAdapter, CacheStats};

pub const MEMORY_ADAPTER: &str = "memory";

#[derive(Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|exp| exp > now)
    }
}

/// Process-local adapter over a single coarse `RwLock`.
///
/// Expiry uses tokio's clock, so paused-time tests can step through TTLs.
#[derive(Clone, Default)]
pub struct MemoryAdapter {
    data: Arc<RwLock<HashMap<String, Entry>>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheAdapter for MemoryAdapter {
    fn name(&self) -> &str {
        MEMORY_ADAPTER
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<()> {
        // A TTL past the end of the clock never expires
        let expires_at = ttl.and_then(|d| Instant::now().checked_add(d));
        self.data
            .write()
            .await
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        let now = Instant::now();
        let data = self.data.read().await;
        match data.get(key) {
            Some(entry) if entry.is_live(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.value.clone()))
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.data.write().await.remove(key);
        Ok(())
    }

    async fn has(&self, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        Ok(self
            .data
            .read()
            .await
            .get(key)
            .is_some_and(|entry| entry.is_live(now)))
    }

    async fn clear(&self) -> CacheResult<()> {
        self.data.write().await.clear();
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let now = Instant::now();
        let data = self.data.read().await;
        Ok(data
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        let now = Instant::now();
        let data = self.data.read().await;
        let live = data.values().filter(|e| e.is_live(now)).count();
        Ok(CacheStats::new(MEMORY_ADAPTER, live)
            .with("expiredPending", data.len() - live)
            .with("hits", self.hits.load(Ordering::Relaxed))
            .with("misses", self.misses.load(Ordering::Relaxed)))
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let now = Instant::now();
        let data = self.data.read().await;
        Ok(data
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|exp| exp - now))
    }

    async fn purge_expired(&self) -> CacheResult<usize> {
        let now = Instant::now();
        let mut data = self.data.write().await;
        let before = data.len();
        data.retain(|_, entry| entry.is_live(now));
        let removed = before - data.len();
        if removed > 0 {
            trace!(removed, "purged expired cache entries");
        }
        Ok(removed)
    }
}
