//! Throttle configuration

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RateLimitError, RateLimitResult};

/// Burst window length, fixed at one second.
pub const BURST_WINDOW_MS: u64 = 1_000;

/// Longest accepted sweep interval (one day).
pub const MAX_CLEANUP_INTERVAL_MS: u64 = 86_400_000;

/// Limiter options. All durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThrottleConfig {
    /// Requests admitted per sliding window
    pub limit: u64,
    pub window_ms: u64,
    /// Requests admitted per one-second burst window
    pub burst_limit: u64,
    /// Violations tolerated before the first ban
    pub ban_threshold: u32,
    /// Base ban duration
    pub ban_ms: u64,
    /// Growth factor applied per previous ban
    pub ban_penalty_multiplier: f64,
    /// Violations while banned before the ban is extended
    pub max_violations: u32,
    /// Interval of the idle-state sweep, at most one day
    pub cleanup_interval: u64,
    /// Client identifiers that are never limited
    pub whitelist: Vec<String>,
    /// Client identifiers that are always refused with 403
    pub blacklist: Vec<String>,
    /// Scale factor for the window limit of automated agents
    pub bot_multiplier: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            window_ms: 60_000,
            burst_limit: 20,
            ban_threshold: 5,
            ban_ms: 300_000,
            ban_penalty_multiplier: 2.0,
            max_violations: 10,
            cleanup_interval: 60_000,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            bot_multiplier: 0.5,
        }
    }
}

impl ThrottleConfig {
    /// `limit` requests per `window`.
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window_ms: millis(window),
            ..Self::default()
        }
    }

    pub fn with_burst_limit(mut self, burst_limit: u64) -> Self {
        self.burst_limit = burst_limit;
        self
    }

    pub fn with_ban(mut self, threshold: u32, duration: Duration) -> Self {
        self.ban_threshold = threshold;
        self.ban_ms = millis(duration);
        self
    }

    pub fn with_penalty(mut self, multiplier: f64, max_violations: u32) -> Self {
        self.ban_penalty_multiplier = multiplier;
        self.max_violations = max_violations;
        self
    }

    pub fn with_bot_multiplier(mut self, multiplier: f64) -> Self {
        self.bot_multiplier = multiplier;
        self
    }

    pub fn whitelist(mut self, clients: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.whitelist.extend(clients.into_iter().map(Into::into));
        self
    }

    pub fn blacklist(mut self, clients: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.blacklist.extend(clients.into_iter().map(Into::into));
        self
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn cleanup_every(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval)
    }

    /// Window limit for a client, scaled down for automated agents.
    /// Never below one request.
    pub fn effective_limit(&self, is_bot: bool) -> u64 {
        if is_bot {
            ((self.limit as f64 * self.bot_multiplier).floor() as u64).max(1)
        } else {
            self.limit
        }
    }

    pub fn validate(&self) -> RateLimitResult<()> {
        let positive: [(&'static str, u64); 5] = [
            ("limit", self.limit),
            ("window_ms", self.window_ms),
            ("burst_limit", self.burst_limit),
            ("ban_ms", self.ban_ms),
            ("cleanup_interval", self.cleanup_interval),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(RateLimitError::invalid(field, "must be greater than 0"));
            }
        }
        if self.cleanup_interval > MAX_CLEANUP_INTERVAL_MS {
            return Err(RateLimitError::invalid(
                "cleanup_interval",
                format!(
                    "must be at most {} (got {})",
                    MAX_CLEANUP_INTERVAL_MS, self.cleanup_interval
                ),
            ));
        }
        if !self.ban_penalty_multiplier.is_finite() || self.ban_penalty_multiplier < 1.0 {
            return Err(RateLimitError::invalid(
                "ban_penalty_multiplier",
                format!("must be at least 1 (got {})", self.ban_penalty_multiplier),
            ));
        }
        if !(self.bot_multiplier > 0.0 && self.bot_multiplier <= 1.0) {
            return Err(RateLimitError::invalid(
                "bot_multiplier",
                format!("must be in (0, 1] (got {})", self.bot_multiplier),
            ));
        }

        let whitelisted: HashSet<&str> = self.whitelist.iter().map(String::as_str).collect();
        if let Some(both) = self.blacklist.iter().find(|c| whitelisted.contains(c.as_str())) {
            return Err(RateLimitError::ConflictingLists(both.clone()));
        }
        Ok(())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults_are_valid() {
        assert_ok!(ThrottleConfig::default().validate());
    }

    #[test]
    fn test_rejects_zero_and_out_of_range() {
        let config = ThrottleConfig::new(0, Duration::from_secs(1));
        assert!(matches!(
            config.validate(),
            Err(RateLimitError::InvalidConfig { field: "limit", .. })
        ));

        let config = ThrottleConfig::default().with_penalty(0.5, 10);
        assert_err!(config.validate());

        let config = ThrottleConfig::default().with_bot_multiplier(1.5);
        assert_err!(config.validate());

        let config = ThrottleConfig::default()
            .whitelist(["10.0.0.1"])
            .blacklist(["10.0.0.1"]);
        assert_eq!(
            config.validate(),
            Err(RateLimitError::ConflictingLists("10.0.0.1".into()))
        );
    }

    #[test]
    fn test_extreme_durations() {
        let config = ThrottleConfig::new(1, Duration::MAX).with_ban(1, Duration::MAX);
        assert_eq!(config.window_ms, u64::MAX);
        assert_eq!(config.ban_ms, u64::MAX);
        assert_ok!(config.validate());

        let config = ThrottleConfig {
            cleanup_interval: MAX_CLEANUP_INTERVAL_MS + 1,
            ..ThrottleConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RateLimitError::InvalidConfig { field: "cleanup_interval", .. })
        ));
    }

    #[test]
    fn test_effective_limit() {
        let config = ThrottleConfig::new(5, Duration::from_secs(1)).with_bot_multiplier(0.5);
        assert_eq!(config.effective_limit(false), 5);
        assert_eq!(config.effective_limit(true), 2);

        let config = ThrottleConfig::new(1, Duration::from_secs(1)).with_bot_multiplier(0.1);
        assert_eq!(config.effective_limit(true), 1);
    }

    #[test]
    fn test_deserialize_rejects_unknown_fields() {
        let config: ThrottleConfig = serde_json::from_value(serde_json::json!({
            "limit": 5,
            "window_ms": 1000,
            "burst_limit": 10,
        }))
        .unwrap();
        assert_eq!(config.limit, 5);
        assert_eq!(config.ban_ms, 300_000);

        let err = serde_json::from_value::<ThrottleConfig>(serde_json::json!({ "windowMs": 1000 }));
        assert!(err.is_err());
    }
}
