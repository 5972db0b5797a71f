//! Adapter registry: adapter names mapped to async factories.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::embedded::{EMBEDDED_ADAPTER, EmbeddedAdapter, EmbeddedOptions};
use crate::error::{CacheError, CacheResult};
use crate::memory::{MEMORY_ADAPTER, MemoryAdapter};
use crate::traits::CacheAdapter;

/// Adapter-specific options, as written in the cache configuration.
pub type AdapterOptions = Map<String, Value>;

/// Builds an adapter from its options.
pub type AdapterFactory = Arc<
    dyn Fn(AdapterOptions) -> BoxFuture<'static, CacheResult<Arc<dyn CacheAdapter>>>
        + Send
        + Sync,
>;

static GLOBAL: Lazy<AdapterRegistry> = Lazy::new(AdapterRegistry::with_builtin);

pub struct AdapterRegistry {
    factories: RwLock<HashMap<String, AdapterFactory>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// A registry holding the adapters shipped with this crate.
    pub fn with_builtin() -> Self {
        let registry = Self::new();

        registry.register(MEMORY_ADAPTER, |options| {
            Box::pin(async move {
                if !options.is_empty() {
                    return Err(CacheError::Config(format!(
                        "memory adapter takes no options (got: {})",
                        options.keys().cloned().collect::<Vec<_>>().join(", ")
                    )));
                }
                Ok(Arc::new(MemoryAdapter::new()) as Arc<dyn CacheAdapter>)
            })
        });

        registry.register(EMBEDDED_ADAPTER, |options| {
            Box::pin(async move {
                let options: EmbeddedOptions = parse_options(EMBEDDED_ADAPTER, options)?;
                let adapter = EmbeddedAdapter::from_options(options).await?;
                Ok(Arc::new(adapter) as Arc<dyn CacheAdapter>)
            })
        });

        #[cfg(feature = "redis")]
        registry.register(crate::redis_cache::REDIS_ADAPTER, |options| {
            Box::pin(async move {
                use crate::redis_cache::{REDIS_ADAPTER, RedisAdapter, RedisOptions};
                let options: RedisOptions = parse_options(REDIS_ADAPTER, options)?;
                let adapter = RedisAdapter::connect(options).await?;
                Ok(Arc::new(adapter) as Arc<dyn CacheAdapter>)
            })
        });

        registry
    }

    /// The process-wide registry, pre-populated with the built-in adapters.
    pub fn global() -> &'static AdapterRegistry {
        &GLOBAL
    }

    /// Register (or replace) a factory under `name`.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use triva_cache::{AdapterRegistry, CacheAdapter, MemoryAdapter};
    ///
    /// let registry = AdapterRegistry::new();
    /// registry.register("scratch", |_options| {
    ///     Box::pin(async { Ok(Arc::new(MemoryAdapter::new()) as Arc<dyn CacheAdapter>) })
    /// });
    /// assert!(registry.contains("scratch"));
    /// ```
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(AdapterOptions) -> BoxFuture<'static, CacheResult<Arc<dyn CacheAdapter>>>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        debug!(adapter = %name, "cache adapter registered");
        self.factories.write().insert(name, Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Registered adapter names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Instantiate the adapter registered under `name`.
    pub async fn create(
        &self,
        name: &str,
        options: AdapterOptions,
    ) -> CacheResult<Arc<dyn CacheAdapter>> {
        let factory = self
            .factories
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::UnknownAdapter(name.to_string()))?;
        factory(options).await
    }
}

fn parse_options<T: DeserializeOwned>(adapter: &str, options: AdapterOptions) -> CacheResult<T> {
    serde_json::from_value(Value::Object(options))
        .map_err(|e| CacheError::Config(format!("invalid {} adapter options: {}", adapter, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_names() {
        let registry = AdapterRegistry::with_builtin();
        assert!(registry.contains("memory"));
        assert!(registry.contains("embedded"));
        assert!(!registry.contains("sqlite"));
    }

    #[tokio::test]
    async fn test_unknown_adapter() {
        let registry = AdapterRegistry::new();
        let err = registry.create("mongodb", Map::new()).await.err().unwrap();
        assert!(matches!(err, CacheError::UnknownAdapter(name) if name == "mongodb"));
    }

    #[tokio::test]
    async fn test_memory_rejects_options() {
        let registry = AdapterRegistry::with_builtin();
        let mut options = Map::new();
        options.insert("size".into(), json!(10));
        let err = registry.create("memory", options).await.err().unwrap();
        assert!(matches!(err, CacheError::Config(_)));
    }

    #[tokio::test]
    async fn test_embedded_options_validated() {
        let registry = AdapterRegistry::with_builtin();
        let err = registry.create("embedded", Map::new()).await.err().unwrap();
        assert!(err.to_string().contains("invalid embedded adapter options"));

        let dir = tempfile::tempdir().unwrap();
        let mut options = Map::new();
        options.insert(
            "path".into(),
            json!(dir.path().join("cache.bin").display().to_string()),
        );
        options.insert("encryptionKey".into(), json!("k"));
        let adapter = registry.create("embedded", options).await.unwrap();
        assert_eq!(adapter.name(), "embedded");
    }

    #[tokio::test]
    async fn test_custom_factory_replaces() {
        let registry = AdapterRegistry::new();
        registry.register("custom", |_| {
            Box::pin(async { Ok(Arc::new(MemoryAdapter::new()) as Arc<dyn CacheAdapter>) })
        });
        assert_eq!(registry.names(), vec!["custom".to_string()]);
        let adapter = registry.create("custom", Map::new()).await.unwrap();
        assert_eq!(adapter.name(), "memory");
    }
}
