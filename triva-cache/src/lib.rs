//! Unified cache layer for the Triva framework.
//!
//! One [`CacheAdapter`] contract over pluggable backends, a name-based
//! [`AdapterRegistry`], and the typed [`Cache`] facade used by handlers.
//!
//! # Features
//!
//! - `redis` - Enable the Redis adapter (enabled by default)
//!
//! # Adapters
//!
//! | Name       | Type                | Notes                                      |
//! |------------|---------------------|--------------------------------------------|
//! | `memory`   | [`MemoryAdapter`]   | process-local, expiry checked on access    |
//! | `embedded` | [`EmbeddedAdapter`] | single file, optional AES-256-GCM sealing  |
//! | `redis`    | `RedisAdapter`      | `SET .. PX`, `SCAN MATCH`, key prefix      |
//!
//! Other backends plug in through [`AdapterRegistry::register`].
//!
//! # Examples
//!
//! ```no_run
//! use triva_cache::{Cache, CacheConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), triva_cache::CacheError> {
//! let config = CacheConfig::embedded("data/cache.bin", Some("passphrase"))
//!     .with_retention(Duration::from_secs(3600));
//! let cache = Cache::from_config(&config).await?;
//!
//! cache.set("greeting", &"hello", None).await?;
//! let keys = cache.keys("greet*").await?;
//! assert_eq!(keys, vec!["greeting"]);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod embedded;
pub mod error;
pub mod memory;
pub mod pattern;
#[cfg(feature = "redis")]
pub mod redis_cache;
pub mod registry;
pub mod traits;

pub use cache::Cache;
pub use config::CacheConfig;
pub use embedded::{EmbeddedAdapter, EmbeddedOptions};
pub use error::{CacheError, CacheResult};
pub use memory::MemoryAdapter;
pub use pattern::glob_match;
#[cfg(feature = "redis")]
pub use redis_cache::{RedisAdapter, RedisOptions};
pub use registry::{AdapterFactory, AdapterOptions, AdapterRegistry};
pub use traits::{CacheAdapter, CacheStats};
