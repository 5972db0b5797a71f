//! Redis cache adapter.

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::error::{CacheError, CacheResult};
use crate::pattern::to_redis_pattern;
use crate::traits::{CacheAdapter, CacheStats};

pub const REDIS_ADAPTER: &str = "redis";

const SCAN_BATCH: usize = 200;

/// Options accepted by the `redis` registry factory.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RedisOptions {
    /// Connection URL, e.g. `redis://localhost:6379`.
    pub url: String,
    /// Prefix prepended to every key (`<prefix>:<key>`).
    #[serde(default)]
    pub key_prefix: Option<String>,
}

/// Redis-backed adapter. Expiry is delegated to Redis (`SET .. PX`).
#[derive(Clone)]
pub struct RedisAdapter {
    connection: ConnectionManager,
    key_prefix: Option<String>,
}

impl RedisAdapter {
    /// Connect to Redis.
    ///
    /// ```no_run
    /// use triva_cache::{RedisAdapter, RedisOptions};
    ///
    /// # async fn example() -> Result<(), triva_cache::CacheError> {
    /// let cache = RedisAdapter::connect(RedisOptions {
    ///     url: "redis://localhost:6379".into(),
    ///     key_prefix: Some("app".into()),
    /// })
    /// .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(options: RedisOptions) -> CacheResult<Self> {
        let client = Client::open(options.url.as_str())
            .map_err(|e| CacheError::Config(format!("invalid redis url: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        info!(prefix = options.key_prefix.as_deref().unwrap_or(""), "redis cache connected");
        Ok(Self {
            connection,
            key_prefix: options.key_prefix,
        })
    }

    fn build_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }

    fn strip_key(&self, stored: String) -> String {
        match &self.key_prefix {
            Some(prefix) => stored
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix(':'))
                .map(str::to_string)
                .unwrap_or(stored),
            None => stored,
        }
    }

    /// Stored (prefixed) keys matching a glob, collected with `SCAN`.
    async fn scan(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let pattern = self.build_key(&to_redis_pattern(pattern));
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }
}

#[async_trait]
impl CacheAdapter for RedisAdapter {
    fn name(&self) -> &str {
        REDIS_ADAPTER
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<()> {
        let key = self.build_key(key);
        let payload =
            serde_json::to_string(&value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let mut conn = self.connection.clone();

        let mut cmd = redis::cmd("SET");
        cmd.arg(&key).arg(payload);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        let key = self.build_key(key);
        let mut conn = self.connection.clone();

        let raw: Option<String> = conn.get(&key).await?;
        raw.map(|s| {
            serde_json::from_str(&s).map_err(|e| CacheError::Deserialization(e.to_string()))
        })
        .transpose()
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let key = self.build_key(key);
        let mut conn = self.connection.clone();
        let _: () = conn.del(&key).await?;
        Ok(())
    }

    async fn has(&self, key: &str) -> CacheResult<bool> {
        let key = self.build_key(key);
        let mut conn = self.connection.clone();
        let exists: bool = conn.exists(&key).await?;
        Ok(exists)
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        if self.key_prefix.is_none() {
            let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
            return Ok(());
        }
        for chunk in self.scan("*").await?.chunks(SCAN_BATCH) {
            let _: () = conn.del(chunk).await?;
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        Ok(self
            .scan(pattern)
            .await?
            .into_iter()
            .map(|k| self.strip_key(k))
            .collect())
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        let count = match &self.key_prefix {
            Some(_) => self.scan("*").await?.len(),
            None => {
                let mut conn = self.connection.clone();
                let size: usize = redis::cmd("DBSIZE").query_async(&mut conn).await?;
                size
            }
        };
        Ok(CacheStats::new(REDIS_ADAPTER, count)
            .with("keyPrefix", self.key_prefix.clone().unwrap_or_default()))
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let key = self.build_key(key);
        let mut conn = self.connection.clone();

        let millis: i64 = redis::cmd("PTTL").arg(&key).query_async(&mut conn).await?;
        match millis {
            // -2: missing, -1: no expiry
            ms if ms > 0 => Ok(Some(Duration::from_millis(ms as u64))),
            _ => Ok(None),
        }
    }
}
