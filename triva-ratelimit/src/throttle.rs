//! Sliding-window limiter with a one-second burst window and escalating bans.
//!
//! ## How It Works
//!
//! Every client identifier owns two timestamp rings (window and burst), a
//! violation counter and a ban ledger. A check:
//!
//! 1. admits whitelisted clients without accounting and refuses
//!    blacklisted ones;
//! 2. while a ban is active, counts the request as a violation and extends
//!    the ban once `max_violations` is exceeded;
//! 3. drops timestamps that left their window;
//! 4. rejects when either ring is full, banning the client once the
//!    violation counter exceeds `ban_threshold`;
//! 5. otherwise records the request and admits it.
//!
//! Ban `n` (counting from zero) lasts `ban_ms × ban_penalty_multiplier^n`.
//!
//! ```
//! use std::time::Duration;
//! use triva_ratelimit::{Throttle, ThrottleConfig, ThrottleReason};
//!
//! let throttle = Throttle::new(ThrottleConfig::new(2, Duration::from_secs(60))).unwrap();
//! assert!(!throttle.check("10.0.0.1", false).restricted);
//! assert!(!throttle.check("10.0.0.1", false).restricted);
//!
//! let third = throttle.check("10.0.0.1", false);
//! assert!(third.restricted);
//! assert_eq!(third.reason, ThrottleReason::RateLimit);
//! ```

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{BURST_WINDOW_MS, ThrottleConfig};
use crate::decision::{Decision, ThrottleReason};
use crate::error::RateLimitResult;

#[derive(Debug, Default)]
struct ClientState {
    window: VecDeque<u64>,
    burst: VecDeque<u64>,
    violations: u32,
    /// 0 when not banned
    banned_until: u64,
    ban_count: u32,
    last_seen: u64,
    last_violation: u64,
}

impl ClientState {
    fn prune(&mut self, now: u64, window_ms: u64) {
        while self.window.front().is_some_and(|t| t.saturating_add(window_ms) <= now) {
            self.window.pop_front();
        }
        while self.burst.front().is_some_and(|t| t.saturating_add(BURST_WINDOW_MS) <= now) {
            self.burst.pop_front();
        }
    }

    fn is_idle(&self, now: u64, window_ms: u64) -> bool {
        self.banned_until <= now
            && self.last_seen.saturating_add(window_ms) <= now
            && self.last_violation.saturating_add(window_ms.saturating_mul(10)) <= now
    }
}

/// Point-in-time view of one client's limiter state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSnapshot {
    pub window_hits: usize,
    pub burst_hits: usize,
    pub violations: u32,
    /// Epoch milliseconds, when a ban is active
    pub banned_until: Option<u64>,
    pub ban_count: u32,
}

/// Per-process limiter state.
#[derive(Debug)]
pub struct Throttle {
    config: ThrottleConfig,
    whitelist: HashSet<String>,
    blacklist: HashSet<String>,
    clients: DashMap<String, ClientState>,
    clock: Arc<dyn Clock>,
}

impl Throttle {
    pub fn new(config: ThrottleConfig) -> RateLimitResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: ThrottleConfig, clock: Arc<dyn Clock>) -> RateLimitResult<Self> {
        config.validate()?;
        Ok(Self {
            whitelist: config.whitelist.iter().cloned().collect(),
            blacklist: config.blacklist.iter().cloned().collect(),
            config,
            clients: DashMap::new(),
            clock,
        })
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Account one request from `client` and decide whether to admit it.
    pub fn check(&self, client: &str, is_bot: bool) -> Decision {
        let limit = self.config.effective_limit(is_bot);
        let window_ms = self.config.window_ms;
        let now = self.clock.now_ms();

        if self.whitelist.contains(client) {
            trace!(client = %client, "whitelisted client");
            return Decision {
                restricted: false,
                reason: ThrottleReason::Whitelisted,
                limit,
                remaining: limit,
                reset: to_unix_secs(now.saturating_add(window_ms)),
                retry_after: None,
            };
        }
        if self.blacklist.contains(client) {
            debug!(client = %client, "blacklisted client refused");
            return Decision {
                restricted: true,
                reason: ThrottleReason::Blacklisted,
                limit,
                remaining: 0,
                reset: to_unix_secs(now.saturating_add(window_ms)),
                retry_after: None,
            };
        }

        let mut state = self.clients.entry(client.to_string()).or_default();
        state.last_seen = now;

        if state.banned_until != 0 && state.banned_until <= now {
            debug!(client = %client, "ban expired");
            state.banned_until = 0;
            state.violations = 0;
        }

        if state.banned_until > now {
            state.violations += 1;
            state.last_violation = now;
            if state.violations > self.config.max_violations {
                let duration = self.ban_duration(state.ban_count);
                state.banned_until = now.saturating_add(duration);
                state.ban_count += 1;
                state.violations = 0;
                warn!(
                    client = %client,
                    ban_ms = duration,
                    ban_count = state.ban_count,
                    "ban extended after repeated violations"
                );
            }
            return banned(limit, state.banned_until, now);
        }

        state.prune(now, window_ms);

        let window_full = state.window.len() as u64 >= limit;
        let burst_full = state.burst.len() as u64 >= self.config.burst_limit;
        if window_full || burst_full {
            state.violations += 1;
            state.last_violation = now;

            if state.violations > self.config.ban_threshold {
                let duration = self.ban_duration(state.ban_count);
                state.banned_until = now.saturating_add(duration);
                state.ban_count += 1;
                info!(
                    client = %client,
                    violations = state.violations,
                    ban_ms = duration,
                    ban_count = state.ban_count,
                    "client banned"
                );
                return banned(limit, state.banned_until, now);
            }

            let (reason, frees_at) = if window_full {
                let oldest = state.window.front().copied().unwrap_or(now);
                (ThrottleReason::RateLimit, oldest.saturating_add(window_ms))
            } else {
                let oldest = state.burst.front().copied().unwrap_or(now);
                (ThrottleReason::BurstLimit, oldest.saturating_add(BURST_WINDOW_MS))
            };
            debug!(
                client = %client,
                reason = %reason,
                violations = state.violations,
                "request rejected"
            );
            let window_reset = state
                .window
                .front()
                .map_or(now.saturating_add(window_ms), |t| t.saturating_add(window_ms));
            return Decision {
                restricted: true,
                reason,
                limit,
                remaining: 0,
                reset: to_unix_secs(window_reset),
                retry_after: Some(retry_secs(frees_at, now)),
            };
        }

        state.window.push_back(now);
        state.burst.push_back(now);
        let oldest = state.window.front().copied().unwrap_or(now);
        Decision {
            restricted: false,
            reason: ThrottleReason::Ok,
            limit,
            remaining: limit.saturating_sub(state.window.len() as u64),
            reset: to_unix_secs(oldest.saturating_add(window_ms)),
            retry_after: None,
        }
    }

    /// Duration of ban number `ban_count` (zero-based).
    pub fn ban_duration(&self, ban_count: u32) -> u64 {
        let factor = self
            .config
            .ban_penalty_multiplier
            .powi(ban_count.min(i32::MAX as u32) as i32);
        // f64 -> u64 casts saturate
        (self.config.ban_ms as f64 * factor) as u64
    }

    /// Drop state of clients that are idle, unbanned and have not
    /// violated for ten windows. Returns the number of evicted clients.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_ms();
        let window_ms = self.config.window_ms;
        let before = self.clients.len();
        self.clients.retain(|_, state| !state.is_idle(now, window_ms));
        let removed = before.saturating_sub(self.clients.len());
        if removed > 0 {
            debug!(removed, remaining = self.clients.len(), "throttle cleanup");
        }
        removed
    }

    /// Run [`cleanup`](Self::cleanup) every `cleanup_interval` until the
    /// throttle is dropped or the task is aborted.
    pub fn spawn_cleanup(self: &Arc<Self>) -> JoinHandle<()> {
        let every = self.config.cleanup_every();
        let throttle = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match throttle.upgrade() {
                    Some(throttle) => {
                        throttle.cleanup();
                    }
                    None => break,
                }
            }
        })
    }

    pub fn client_state(&self, client: &str) -> Option<ClientSnapshot> {
        let now = self.clock.now_ms();
        self.clients.get(client).map(|state| ClientSnapshot {
            window_hits: state.window.len(),
            burst_hits: state.burst.len(),
            violations: state.violations,
            banned_until: (state.banned_until > now).then_some(state.banned_until),
            ban_count: state.ban_count,
        })
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    /// Forget everything about `client`, lifting any ban.
    pub fn reset(&self, client: &str) -> bool {
        self.clients.remove(client).is_some()
    }
}

fn banned(limit: u64, banned_until: u64, now: u64) -> Decision {
    Decision {
        restricted: true,
        reason: ThrottleReason::Banned,
        limit,
        remaining: 0,
        reset: to_unix_secs(banned_until),
        retry_after: Some(retry_secs(banned_until, now)),
    }
}

fn to_unix_secs(ms: u64) -> u64 {
    ms.div_ceil(1000)
}

fn retry_secs(until: u64, now: u64) -> u64 {
    until.saturating_sub(now).div_ceil(1000).max(1)
}
