//! Rule-based redirection of AI agents, bots and crawlers.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tracing::{debug, info};
use triva_core::response::REDIRECT_STATUSES;
use triva_core::{Error, Middleware, Next, Request, Response};

use crate::classifier::{UaInfo, agent_info};
use crate::signatures::AgentCategory;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RedirectError {
    #[error("invalid redirect status code {0} (expected 301, 302, 307 or 308)")]
    InvalidStatus(u16),

    #[error("redirect destination must not be empty")]
    EmptyDestination,
}

/// Where a redirect points: a fixed location or one computed per request.
#[derive(Clone)]
pub enum Destination {
    Static(String),
    Dynamic(Arc<dyn Fn(&Request) -> String + Send + Sync>),
}

impl Destination {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&Request) -> String + Send + Sync + 'static,
    {
        Destination::Dynamic(Arc::new(f))
    }

    pub fn resolve(&self, req: &Request) -> String {
        match self {
            Destination::Static(location) => location.clone(),
            Destination::Dynamic(f) => f(req),
        }
    }
}

impl Default for Destination {
    fn default() -> Self {
        Destination::Static("/".to_string())
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Static(location) => f.debug_tuple("Static").field(location).finish(),
            Destination::Dynamic(_) => f.write_str("Dynamic(<fn>)"),
        }
    }
}

impl From<&str> for Destination {
    fn from(location: &str) -> Self {
        Destination::Static(location.to_string())
    }
}

impl From<String> for Destination {
    fn from(location: String) -> Self {
        Destination::Static(location)
    }
}

impl Serialize for Destination {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Destination::Static(location) => serializer.serialize_str(location),
            Destination::Dynamic(_) => serializer.serialize_str("<dynamic>"),
        }
    }
}

impl<'de> Deserialize<'de> for Destination {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Destination::Static)
    }
}

type RulePredicate = Arc<dyn Fn(&Request, &UaInfo) -> bool + Send + Sync>;

/// User-defined redirect rule, evaluated before the category rules.
#[derive(Clone)]
pub struct RedirectRule {
    pub name: String,
    predicate: RulePredicate,
    pub destination: Destination,
    pub status_code: u16,
}

impl RedirectRule {
    /// ```
    /// use triva_useragent::RedirectRule;
    ///
    /// let legacy = RedirectRule::new("legacy-api", |req, _ua| req.path.starts_with("/v1/"), "/v2/", 308);
    /// ```
    pub fn new<F>(
        name: impl Into<String>,
        predicate: F,
        destination: impl Into<Destination>,
        status_code: u16,
    ) -> Self
    where
        F: Fn(&Request, &UaInfo) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
            destination: destination.into(),
            status_code,
        }
    }

    pub fn matches(&self, req: &Request, ua: &UaInfo) -> bool {
        (self.predicate)(req, ua)
    }
}

impl fmt::Debug for RedirectRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedirectRule")
            .field("name", &self.name)
            .field("destination", &self.destination)
            .field("status_code", &self.status_code)
            .finish()
    }
}

/// Redirect configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RedirectConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, rename = "redirectAI")]
    pub redirect_ai: bool,

    #[serde(default)]
    pub redirect_bots: bool,

    #[serde(default)]
    pub redirect_crawlers: bool,

    #[serde(default)]
    pub destination: Destination,

    #[serde(default = "default_status")]
    pub status_code: u16,

    /// User-Agent substrings (case-insensitive) exempt from category rules.
    #[serde(default)]
    pub whitelist: Vec<String>,

    /// Log every decision at info level.
    #[serde(default)]
    pub debug: bool,

    #[serde(skip)]
    pub custom_rules: Vec<RedirectRule>,
}

fn default_status() -> u16 {
    302
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            redirect_ai: false,
            redirect_bots: false,
            redirect_crawlers: false,
            destination: Destination::default(),
            status_code: default_status(),
            whitelist: Vec::new(),
            debug: false,
            custom_rules: Vec::new(),
        }
    }
}

impl RedirectConfig {
    pub fn validate(&self) -> Result<(), RedirectError> {
        if !REDIRECT_STATUSES.contains(&self.status_code) {
            return Err(RedirectError::InvalidStatus(self.status_code));
        }
        if matches!(&self.destination, Destination::Static(s) if s.is_empty()) {
            return Err(RedirectError::EmptyDestination);
        }
        for rule in &self.custom_rules {
            if !REDIRECT_STATUSES.contains(&rule.status_code) {
                return Err(RedirectError::InvalidStatus(rule.status_code));
            }
        }
        Ok(())
    }

    pub fn with_rule(mut self, rule: RedirectRule) -> Self {
        self.custom_rules.push(rule);
        self
    }
}

/// Why a request was redirected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectReason {
    Rule(String),
    Category(AgentCategory),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectDecision {
    pub location: String,
    pub status_code: u16,
    pub reason: RedirectReason,
}

/// Evaluates redirect rules against a request.
#[derive(Debug, Clone)]
pub struct Redirector {
    config: Arc<RedirectConfig>,
    whitelist: Arc<Vec<String>>,
}

impl Redirector {
    pub fn new(config: RedirectConfig) -> Result<Self, RedirectError> {
        config.validate()?;
        let whitelist = config
            .whitelist
            .iter()
            .map(|entry| entry.to_ascii_lowercase())
            .collect();
        Ok(Self {
            config: Arc::new(config),
            whitelist: Arc::new(whitelist),
        })
    }

    pub fn config(&self) -> &RedirectConfig {
        &self.config
    }

    /// Custom rules first (registration order), then the AI, bot and
    /// crawler switches for non-whitelisted agents.
    pub fn evaluate(&self, req: &Request, ua: &UaInfo) -> Option<RedirectDecision> {
        if let Some(rule) = self.config.custom_rules.iter().find(|r| r.matches(req, ua)) {
            return Some(RedirectDecision {
                location: rule.destination.resolve(req),
                status_code: rule.status_code,
                reason: RedirectReason::Rule(rule.name.clone()),
            });
        }

        let enabled = match ua.category {
            AgentCategory::Ai => self.config.redirect_ai,
            AgentCategory::Bot => self.config.redirect_bots,
            AgentCategory::Crawler => self.config.redirect_crawlers,
            AgentCategory::Social | AgentCategory::Human => false,
        };
        if !enabled || self.is_whitelisted(req.user_agent()) {
            return None;
        }

        let location = self.config.destination.resolve(req);
        // Already at the destination: redirecting again would loop.
        if location == req.path || location == req.url {
            return None;
        }
        Some(RedirectDecision {
            location,
            status_code: self.config.status_code,
            reason: RedirectReason::Category(ua.category),
        })
    }

    fn is_whitelisted(&self, ua: &str) -> bool {
        if self.whitelist.is_empty() {
            return false;
        }
        let lower = ua.to_ascii_lowercase();
        self.whitelist.iter().any(|entry| lower.contains(entry.as_str()))
    }
}

/// Built-in pipeline stage running the [`Redirector`].
#[derive(Debug, Clone)]
pub struct RedirectMiddleware {
    redirector: Redirector,
}

impl RedirectMiddleware {
    pub fn new(redirector: Redirector) -> Self {
        Self { redirector }
    }
}

#[async_trait]
impl Middleware for RedirectMiddleware {
    async fn handle(&self, req: &mut Request, res: &mut Response, next: Next) -> Result<(), Error> {
        if !self.redirector.config().enabled {
            next.proceed();
            return Ok(());
        }

        let ua = agent_info(req);
        match self.redirector.evaluate(req, &ua) {
            Some(decision) => {
                if self.redirector.config().debug {
                    info!(
                        request_id = %req.id,
                        path = %req.path,
                        category = %ua.category,
                        agent = %ua.browser,
                        location = %decision.location,
                        status = decision.status_code,
                        reason = ?decision.reason,
                        "redirecting request"
                    );
                } else {
                    debug!(
                        request_id = %req.id,
                        location = %decision.location,
                        status = decision.status_code,
                        "redirecting request"
                    );
                }
                res.redirect(decision.location, decision.status_code)
            }
            None => {
                next.proceed();
                Ok(())
            }
        }
    }

    fn name(&self) -> &str {
        "redirect"
    }
}
