//! Application configuration.
//!
//! One [`TrivaConfig`] is validated and committed by
//! [`TrivaBuilder::build`](crate::TrivaBuilder::build), after which it is
//! read-only. Every section rejects unknown keys.
//!
//! ```
//! use triva::TrivaConfig;
//!
//! let config = TrivaConfig::from_value(serde_json::json!({
//!     "env": "production",
//!     "cache": { "type": "memory", "retention": 60000 },
//!     "throttle": { "limit": 100, "window_ms": 60000 },
//!     "redirects": { "enabled": true, "redirectAI": true, "destination": "/ai-docs" }
//! }))
//! .unwrap();
//! assert!(config.throttle.is_some());
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use triva_cache::{AdapterRegistry, CacheConfig};
use triva_core::{DEFAULT_MAX_BODY_BYTES, PipelineOptions, ServerOptions};
use triva_log::{LogConfig, LogFormat, LogLevel};
use triva_ratelimit::ThrottleConfig;
use triva_retention::{ErrorTrackingConfig, RetentionConfig};
use triva_useragent::RedirectConfig;

use crate::error::ConfigError;

/// Per-section validation, run by the builder before anything is created.
pub trait Validate {
    fn validate(&self) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Subscriber defaults for this environment.
    pub fn log_config(&self) -> LogConfig {
        match self {
            Environment::Development => LogConfig::new()
                .level(LogLevel::Debug)
                .format(LogFormat::Pretty)
                .with_colors(true),
            Environment::Production => LogConfig::new().level(LogLevel::Info).format(LogFormat::Json),
            Environment::Test => LogConfig::new().level(LogLevel::Warn).format(LogFormat::Compact),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

/// PEM file locations for the HTTPS listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SslConfig {
    pub key: PathBuf,
    pub cert: PathBuf,
    #[serde(default)]
    pub ca: Option<PathBuf>,
}

/// Listener and pipeline limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ServerConfig {
    pub max_body_bytes: usize,
    /// Stage-chain deadline; 0 disables it.
    pub request_timeout_ms: u64,
    pub shutdown_grace_ms: u64,
    pub keep_alive: bool,
    /// Use the first `X-Forwarded-For` entry as the client identifier.
    /// `X-Real-IP` is trusted even when this is false, so strip it at the
    /// edge unless a proxy sets it.
    pub trust_proxy: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            request_timeout_ms: 30_000,
            shutdown_grace_ms: 30_000,
            keep_alive: true,
            trust_proxy: false,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    pub fn listener_options(&self) -> ServerOptions {
        ServerOptions {
            max_body_bytes: self.max_body_bytes,
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
            keep_alive: self.keep_alive,
        }
    }

    pub fn pipeline_options(&self, env: Environment) -> PipelineOptions {
        PipelineOptions {
            request_timeout: self.request_timeout(),
            trust_proxy: self.trust_proxy,
            expose_errors: env == Environment::Development,
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_bytes == 0 {
            return Err(ConfigError::invalid(
                "server",
                "maxBodyBytes must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// The complete, closed set of application options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TrivaConfig {
    #[serde(default)]
    pub env: Environment,

    #[serde(default)]
    pub protocol: Protocol,

    #[serde(default)]
    pub ssl: Option<SslConfig>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Rate limiter; disabled when absent.
    #[serde(default)]
    pub throttle: Option<ThrottleConfig>,

    #[serde(default)]
    pub redirects: Option<RedirectConfig>,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub error_tracking: ErrorTrackingConfig,
}

impl TrivaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from a `.json` or `.toml` file, chosen by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e))),
            Some("toml") => toml::from_str(&content)
                .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e))),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// Validate against an explicit adapter registry.
    pub fn validate_with(&self, registry: &AdapterRegistry) -> Result<(), ConfigError> {
        if self.protocol == Protocol::Https && self.ssl.is_none() {
            return Err(ConfigError::invalid(
                "ssl",
                "protocol \"https\" requires ssl.key and ssl.cert",
            ));
        }
        self.server.validate()?;
        self.cache.validate(registry)?;
        if let Some(throttle) = &self.throttle {
            throttle.validate()?;
        }
        if let Some(redirects) = &self.redirects {
            redirects.validate()?;
        }
        self.retention.validate()?;
        self.error_tracking.validate()?;
        Ok(())
    }
}

impl Validate for TrivaConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_with(AdapterRegistry::global())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config = TrivaConfig::from_value(json!({})).unwrap();
        assert_eq!(config.env, Environment::Development);
        assert_eq!(config.protocol, Protocol::Http);
        assert_eq!(config.cache.adapter, "memory");
        assert!(config.throttle.is_none());
        assert!(config.redirects.is_none());
        assert!(config.retention.enabled);
        assert_eq!(config.server.max_body_bytes, 1024 * 1024);
        assert_eq!(config.server.request_timeout(), Some(Duration::from_secs(30)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_options_fail() {
        assert!(TrivaConfig::from_value(json!({ "port": 3000 })).is_err());
        assert!(TrivaConfig::from_value(json!({ "server": { "timeout": 5 } })).is_err());
        assert!(TrivaConfig::from_value(json!({ "throttle": { "limitt": 5 } })).is_err());
        assert!(TrivaConfig::from_value(json!({ "redirects": { "redirectAi": true } })).is_err());
        assert!(TrivaConfig::from_value(json!({ "errorTracking": { "size": 1 } })).is_err());
    }

    #[test]
    fn test_https_requires_ssl() {
        let config = TrivaConfig::from_value(json!({ "protocol": "https" })).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { section: "ssl", .. }));

        let config = TrivaConfig::from_value(json!({
            "protocol": "https",
            "ssl": { "key": "key.pem", "cert": "cert.pem" }
        }))
        .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_section_rules_are_enforced() {
        let bad_throttle = TrivaConfig::from_value(json!({ "throttle": { "limit": 0 } })).unwrap();
        assert!(matches!(bad_throttle.validate(), Err(ConfigError::Throttle(_))));

        let bad_status =
            TrivaConfig::from_value(json!({ "redirects": { "statusCode": 303 } })).unwrap();
        assert!(matches!(bad_status.validate(), Err(ConfigError::Redirect(_))));

        let bad_cache = TrivaConfig::from_value(json!({ "cache": { "type": "floppy" } })).unwrap();
        assert!(matches!(bad_cache.validate(), Err(ConfigError::Cache(_))));

        let bad_retention =
            TrivaConfig::from_value(json!({ "retention": { "maxEntries": 0 } })).unwrap();
        assert!(matches!(bad_retention.validate(), Err(ConfigError::Retention(_))));
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let server = ServerConfig {
            request_timeout_ms: 0,
            ..ServerConfig::default()
        };
        assert_eq!(server.request_timeout(), None);
        assert!(!server.pipeline_options(Environment::Production).expose_errors);
        assert!(server.pipeline_options(Environment::Development).expose_errors);
    }

    #[test]
    fn test_env_log_defaults() {
        assert_eq!(Environment::Production.log_config().format, LogFormat::Json);
        assert_eq!(Environment::Test.log_config().level, LogLevel::Warn);
        assert_eq!(Environment::Development.log_config().format, LogFormat::Pretty);
    }
}
