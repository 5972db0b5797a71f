//! # Triva Rate Limiting
//!
//! Per-client throttling for Triva applications: a sliding window of
//! `limit` requests per `window_ms`, a fixed one-second burst window,
//! whitelist and blacklist, a reduced limit for automated agents and bans
//! that grow with every repeat offence.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use triva_core::Pipeline;
//! use triva_ratelimit::{Throttle, ThrottleConfig, ThrottleMiddleware};
//!
//! # fn example() -> Result<(), triva_ratelimit::RateLimitError> {
//! let config = ThrottleConfig::new(100, Duration::from_secs(60))
//!     .with_burst_limit(20)
//!     .with_ban(5, Duration::from_secs(300))
//!     .whitelist(["127.0.0.1"]);
//!
//! let throttle = Arc::new(Throttle::new(config)?);
//! let _cleanup = throttle.spawn_cleanup();
//!
//! let mut pipeline = Pipeline::default();
//! pipeline.add_builtin(Arc::new(ThrottleMiddleware::new(throttle)));
//! # Ok(())
//! # }
//! ```
//!
//! ## Response Headers
//!
//! Accounted requests carry:
//!
//! - `X-RateLimit-Limit`: effective window limit for the client
//! - `X-RateLimit-Remaining`: requests left in the current window
//! - `X-RateLimit-Reset`: UNIX time when the oldest counted request expires
//! - `Retry-After`: seconds to wait (rejections only)

pub mod clock;
pub mod config;
pub mod decision;
pub mod error;
pub mod middleware;
pub mod throttle;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BURST_WINDOW_MS, MAX_CLEANUP_INTERVAL_MS, ThrottleConfig};
pub use decision::{Decision, RateLimitHeaders, ThrottleOutcome, ThrottleReason};
pub use error::{RateLimitError, RateLimitResult};
pub use middleware::ThrottleMiddleware;
pub use throttle::{ClientSnapshot, Throttle};
