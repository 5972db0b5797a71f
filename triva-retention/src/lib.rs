//! Request retention and error tracking for Triva.
//!
//! [`Retention`] is a pipeline hook that stores one [`RetentionRecord`] per
//! request; [`ErrorTracker`] is an error reporter that stores one
//! [`ErrorRecord`] per captured error. Both keep at most `maxEntries`
//! records, evicting the oldest, and redact credentials from stored
//! headers.
//!
//! ```
//! use std::sync::Arc;
//! use triva_core::Pipeline;
//! use triva_retention::{ErrorTracker, ErrorTrackingConfig, Retention, RetentionConfig};
//!
//! let retention = Arc::new(Retention::new(RetentionConfig::default()).unwrap());
//! let errors = Arc::new(ErrorTracker::new(ErrorTrackingConfig::default()).unwrap());
//!
//! let mut pipeline = Pipeline::default();
//! pipeline.add_hook(retention.clone());
//! pipeline.add_reporter(errors.clone());
//! ```

pub mod config;
pub mod error;
pub mod log;
pub mod redact;
pub mod retention;
pub mod tracker;

pub use config::{DEFAULT_MAX_ENTRIES, ErrorTrackingConfig, RetentionConfig};
pub use error::{RetentionError, RetentionResult};
pub use log::BoundedLog;
pub use redact::{REDACTED, is_sensitive, redact_headers};
pub use retention::{Retention, RetentionQuery, RetentionRecord};
pub use tracker::{ErrorQuery, ErrorRecord, ErrorTracker};
