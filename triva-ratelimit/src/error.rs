//! Error types for rate limiting

use thiserror::Error;

/// Result type for rate limiting operations
pub type RateLimitResult<T> = Result<T, RateLimitError>;

#[derive(Debug, Error, PartialEq)]
pub enum RateLimitError {
    /// A numeric option is out of range
    #[error("throttle configuration error: {field} {message}")]
    InvalidConfig {
        field: &'static str,
        message: String,
    },

    /// The same client is both whitelisted and blacklisted
    #[error("client '{0}' is listed in both whitelist and blacklist")]
    ConflictingLists(String),
}

impl RateLimitError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            message: message.into(),
        }
    }
}

impl From<RateLimitError> for triva_core::Error {
    fn from(err: RateLimitError) -> Self {
        triva_core::Error::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = RateLimitError::invalid("limit", "must be greater than 0");
        assert_eq!(
            err.to_string(),
            "throttle configuration error: limit must be greater than 0"
        );
    }
}
