use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{RetentionError, RetentionResult};

pub const DEFAULT_MAX_ENTRIES: usize = 1000;

fn default_enabled() -> bool {
    true
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

/// Request retention options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RetentionConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Written on shutdown when set.
    #[serde(default)]
    pub export_path: Option<PathBuf>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: DEFAULT_MAX_ENTRIES,
            export_path: None,
        }
    }
}

impl RetentionConfig {
    pub fn validate(&self) -> RetentionResult<()> {
        if self.max_entries == 0 {
            return Err(RetentionError::Config(
                "retention.maxEntries must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Error tracking options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ErrorTrackingConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    #[serde(default)]
    pub export_path: Option<PathBuf>,
}

impl Default for ErrorTrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: DEFAULT_MAX_ENTRIES,
            export_path: None,
        }
    }
}

impl ErrorTrackingConfig {
    pub fn validate(&self) -> RetentionResult<()> {
        if self.max_entries == 0 {
            return Err(RetentionError::Config(
                "errorTracking.maxEntries must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
