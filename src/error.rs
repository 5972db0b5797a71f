// Error types for configuration and application assembly

use thiserror::Error;
use triva_cache::CacheError;
use triva_log::LogError;
use triva_ratelimit::RateLimitError;
use triva_retention::RetentionError;
use triva_useragent::RedirectError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {section} configuration: {message}")]
    Invalid {
        section: &'static str,
        message: String,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid throttle configuration: {0}")]
    Throttle(#[from] RateLimitError),

    #[error("Invalid redirects configuration: {0}")]
    Redirect(#[from] RedirectError),

    #[error("Invalid cache configuration: {0}")]
    Cache(#[from] CacheError),

    #[error("Invalid retention configuration: {0}")]
    Retention(#[from] RetentionError),
}

impl ConfigError {
    pub(crate) fn invalid(section: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            section,
            message: message.into(),
        }
    }
}

/// Errors surfaced by [`crate::Triva`] while building or starting.
#[derive(Error, Debug)]
pub enum TrivaError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] triva_core::Error),

    #[error("Cache setup failed: {0}")]
    Cache(#[from] CacheError),

    #[error("Logging setup failed: {0}")]
    Log(#[from] LogError),

    #[error("Retention export failed: {0}")]
    Retention(#[from] RetentionError),
}

pub type Result<T> = std::result::Result<T, TrivaError>;
