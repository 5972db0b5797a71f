// Triva - an HTTP/HTTPS framework core
//
// This crate assembles the member crates into one application: configuration
// and validation, the builder, and the run modes. The engine itself lives in
// triva-core; cache, rate limiting, bot redirection and retention live in
// their own crates and are re-exported here.

pub mod application;
pub mod config;
pub mod error;

pub use application::{Triva, TrivaBuilder, TrivaHandle};
pub use config::{Environment, Protocol, ServerConfig, SslConfig, TrivaConfig, Validate};
pub use error::{ConfigError, Result, TrivaError};

// Re-export core functionality
pub use triva_core::*;

pub use triva_cache;
pub use triva_log;
pub use triva_ratelimit;
pub use triva_retention;
pub use triva_useragent;

pub use triva_cache::{Cache, CacheAdapter, CacheConfig, CacheError};
pub use triva_ratelimit::{Throttle, ThrottleConfig};
pub use triva_retention::{ErrorTracker, Retention};
pub use triva_useragent::{Destination, RedirectConfig, RedirectRule, UaInfo, agent_info};

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Cache, Error, HttpMethod, Request, Response, Triva, TrivaConfig, error_handler_fn,
        handler_fn, middleware_fn,
    };
    pub use triva_core::{ErrorHandler, Handler, Middleware, Next};
}
