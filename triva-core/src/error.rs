// Error types for the Triva request path

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

/// Abstract error category. Every [`Error`] maps onto exactly one kind, and
/// the kind decides the status code and what the client gets to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    AuthRequired,
    Forbidden,
    NotFound,
    PayloadTooLarge,
    RateLimited,
    Internal,
    CacheUnavailable,
    Timeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::AuthRequired => "auth_required",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Internal => "internal",
            ErrorKind::CacheUnavailable => "cache_unavailable",
            ErrorKind::Timeout => "timeout",
        }
    }

    /// Generic message used when the real one must not leak.
    pub fn public_message(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "Bad Request",
            ErrorKind::AuthRequired => "Unauthorized",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "Not Found",
            ErrorKind::PayloadTooLarge => "Payload Too Large",
            ErrorKind::RateLimited => "Too Many Requests",
            ErrorKind::Internal => "Internal Server Error",
            ErrorKind::CacheUnavailable => "Service Unavailable",
            ErrorKind::Timeout => "Gateway Timeout",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Too Many Requests: {0}")]
    TooManyRequests(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Gateway Timeout: {0}")]
    Timeout(String),

    #[error("Client closed request")]
    ClientClosed,

    #[error("Response already sent")]
    ResponseAlreadySent,

    #[error("Continuation invoked more than once in '{0}'")]
    ContinuationReused(String),

    #[error("Handler completed without a response: {0}")]
    NoResponse(String),

    #[error("Response modified after it was sent: {0}")]
    LateWrite(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadRequest(_) => ErrorKind::Validation,
            Error::Unauthorized(_) => ErrorKind::AuthRequired,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::PayloadTooLarge(_) => ErrorKind::PayloadTooLarge,
            Error::TooManyRequests(_) => ErrorKind::RateLimited,
            Error::CacheUnavailable(_) => ErrorKind::CacheUnavailable,
            Error::Timeout(_) | Error::ClientClosed => ErrorKind::Timeout,
            Error::Internal(_)
            | Error::ResponseAlreadySent
            | Error::ContinuationReused(_)
            | Error::NoResponse(_)
            | Error::LateWrite(_)
            | Error::Serialization(_)
            | Error::Tls(_)
            | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::ClientClosed => 499,
            _ => match self.kind() {
                ErrorKind::Validation => 400,
                ErrorKind::AuthRequired => 401,
                ErrorKind::Forbidden => 403,
                ErrorKind::NotFound => 404,
                ErrorKind::PayloadTooLarge => 413,
                ErrorKind::RateLimited => 429,
                ErrorKind::Internal => 500,
                ErrorKind::CacheUnavailable => 503,
                ErrorKind::Timeout => 504,
            },
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// The caller-supplied message without the variant prefix.
    pub fn detail(&self) -> String {
        match self {
            Error::BadRequest(m)
            | Error::Unauthorized(m)
            | Error::Forbidden(m)
            | Error::NotFound(m)
            | Error::PayloadTooLarge(m)
            | Error::TooManyRequests(m)
            | Error::Internal(m)
            | Error::CacheUnavailable(m)
            | Error::Timeout(m)
            | Error::Serialization(m)
            | Error::Tls(m) => m.clone(),
            other => other.to_string(),
        }
    }

    /// Client-facing JSON body.
    ///
    /// Client errors carry the message their raiser chose; server errors
    /// only carry the generic reason phrase unless `expose` is set.
    pub fn to_body(&self, request_id: &str, expose: bool) -> Value {
        let kind = self.kind();
        let mut body = match kind {
            ErrorKind::Validation => json!({
                "error": kind.public_message(),
                "details": self.detail(),
            }),
            _ if self.is_client_error() && !self.detail().is_empty() => json!({
                "error": self.detail(),
            }),
            _ => json!({ "error": kind.public_message() }),
        };
        body["code"] = Value::from(kind.as_str());
        body["requestId"] = Value::from(request_id);
        if expose && self.is_server_error() {
            body["message"] = Value::from(self.to_string());
        }
        body
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
