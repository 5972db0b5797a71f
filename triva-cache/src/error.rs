//! Error types for cache operations.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis-specific error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Backend could not be reached or failed mid-operation
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// Filesystem error in a file-backed adapter
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Key is empty or contains non-printable characters
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No factory registered under this adapter name
    #[error("Unknown cache adapter: {0}")]
    UnknownAdapter(String),

    /// Stored data could not be encrypted or decrypted
    #[error("Encryption error: {0}")]
    Encryption(String),
}

impl CacheError {
    /// Whether this error means the backend itself is failing, as opposed to
    /// a caller mistake.
    pub fn is_unavailable(&self) -> bool {
        match self {
            #[cfg(feature = "redis")]
            CacheError::Redis(_) => true,
            CacheError::Unavailable(_) | CacheError::Io(_) | CacheError::Encryption(_) => true,
            _ => false,
        }
    }
}

impl From<CacheError> for triva_core::Error {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::InvalidKey(msg) => triva_core::Error::BadRequest(msg),
            CacheError::Serialization(msg) | CacheError::Deserialization(msg) => {
                triva_core::Error::Serialization(msg)
            }
            CacheError::Config(msg) | CacheError::UnknownAdapter(msg) => {
                triva_core::Error::Internal(msg)
            }
            other => triva_core::Error::CacheUnavailable(other.to_string()),
        }
    }
}
