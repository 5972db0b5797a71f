//! Limiter verdicts and the headers derived from them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleReason {
    Ok,
    Whitelisted,
    Blacklisted,
    Banned,
    RateLimit,
    BurstLimit,
}

impl ThrottleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThrottleReason::Ok => "ok",
            ThrottleReason::Whitelisted => "whitelisted",
            ThrottleReason::Blacklisted => "blacklisted",
            ThrottleReason::Banned => "banned",
            ThrottleReason::RateLimit => "rate_limit",
            ThrottleReason::BurstLimit => "burst_limit",
        }
    }
}

impl std::fmt::Display for ThrottleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one [`Throttle::check`](crate::Throttle::check).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub restricted: bool,
    pub reason: ThrottleReason,
    /// Effective window limit for this client
    pub limit: u64,
    pub remaining: u64,
    /// UNIX seconds at which the oldest counted request leaves the window
    pub reset: u64,
    /// Seconds to wait, set on rejection
    pub retry_after: Option<u64>,
}

impl Decision {
    pub fn is_forbidden(&self) -> bool {
        self.reason == ThrottleReason::Blacklisted
    }

    /// Headers for the response, `None` for whitelisted and blacklisted
    /// clients, which are not accounted.
    pub fn headers(&self) -> Option<RateLimitHeaders> {
        match self.reason {
            ThrottleReason::Whitelisted | ThrottleReason::Blacklisted => None,
            _ if self.restricted => Some(RateLimitHeaders::denied(
                self.limit,
                self.reset,
                self.retry_after.unwrap_or(1),
            )),
            _ => Some(RateLimitHeaders::allowed(
                self.limit,
                self.remaining,
                self.reset,
            )),
        }
    }

    pub fn outcome(&self) -> ThrottleOutcome {
        ThrottleOutcome {
            restricted: self.restricted,
            reason: self.reason,
            limit: self.limit,
            remaining: self.remaining,
        }
    }
}

/// Summary kept in the request extensions for retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleOutcome {
    pub restricted: bool,
    pub reason: ThrottleReason,
    pub limit: u64,
    pub remaining: u64,
}

/// Standard rate limit headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// X-RateLimit-Limit
    pub limit: u64,
    /// X-RateLimit-Remaining
    pub remaining: u64,
    /// X-RateLimit-Reset (UNIX seconds)
    pub reset: u64,
    /// Retry-After, only when limited
    pub retry_after: Option<u64>,
}

impl RateLimitHeaders {
    pub fn allowed(limit: u64, remaining: u64, reset: u64) -> Self {
        Self {
            limit,
            remaining,
            reset,
            retry_after: None,
        }
    }

    pub fn denied(limit: u64, reset: u64, retry_after: u64) -> Self {
        Self {
            limit,
            remaining: 0,
            reset,
            retry_after: Some(retry_after),
        }
    }

    pub fn to_header_pairs(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", self.reset.to_string()),
        ];
        if let Some(retry) = self.retry_after {
            headers.push(("Retry-After", retry.to_string()));
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(restricted: bool, reason: ThrottleReason) -> Decision {
        Decision {
            restricted,
            reason,
            limit: 5,
            remaining: if restricted { 0 } else { 3 },
            reset: 1_700_000_001,
            retry_after: restricted.then_some(30),
        }
    }

    #[test]
    fn test_denied_headers() {
        let headers = decision(true, ThrottleReason::Banned).headers().unwrap();
        let pairs = headers.to_header_pairs();
        assert_eq!(pairs.len(), 4);
        assert!(pairs.iter().any(|(k, v)| *k == "Retry-After" && v == "30"));
        assert!(
            pairs
                .iter()
                .any(|(k, v)| *k == "X-RateLimit-Remaining" && v == "0")
        );
    }

    #[test]
    fn test_allowed_headers() {
        let pairs = decision(false, ThrottleReason::Ok)
            .headers()
            .unwrap()
            .to_header_pairs();
        assert_eq!(pairs.len(), 3);
        assert!(pairs.iter().any(|(k, v)| *k == "X-RateLimit-Limit" && v == "5"));
    }

    #[test]
    fn test_unaccounted_clients_have_no_headers() {
        assert!(decision(false, ThrottleReason::Whitelisted).headers().is_none());
        assert!(decision(true, ThrottleReason::Blacklisted).headers().is_none());
    }

    #[test]
    fn test_outcome_serialization() {
        let value = serde_json::to_value(decision(true, ThrottleReason::BurstLimit).outcome()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "restricted": true,
                "reason": "burst_limit",
                "limit": 5,
                "remaining": 0
            })
        );
    }
}
