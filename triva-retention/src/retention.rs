//! Per-request retention records.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use triva_core::{AbandonReason, Completion, PipelineHook, Request, Response};
use triva_ratelimit::ThrottleOutcome;
use triva_useragent::{AgentCategory, UaInfo, agent_info, classify};

use crate::config::RetentionConfig;
use crate::error::RetentionResult;
use crate::log::BoundedLog;
use crate::redact::redact_headers;

pub(crate) fn iso_millis(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One completed request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionRecord {
    pub timestamp: String,
    pub request_id: String,
    pub method: String,
    pub url: String,
    pub pathname: String,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub ip: String,
    pub user_agent: String,
    pub ua_data: UaInfo,
    pub status_code: u16,
    /// Milliseconds
    pub duration: u64,
    /// Present when the rate limiter ran for the request
    pub throttle: Option<ThrottleOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abandoned: Option<&'static str>,
}

/// State captured when the request enters the pipeline.
#[derive(Debug, Clone)]
struct Begin {
    at: DateTime<Utc>,
    headers: BTreeMap<String, String>,
    ua: Arc<UaInfo>,
}

impl Begin {
    fn capture(req: &mut Request) -> Self {
        Self {
            at: Utc::now(),
            headers: redact_headers(req.headers.iter()),
            ua: agent_info(req),
        }
    }
}

/// Field-match query over retention records; unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct RetentionQuery {
    pub method: Option<String>,
    pub status_code: Option<u16>,
    pub ip: Option<String>,
    pub path_prefix: Option<String>,
    pub category: Option<AgentCategory>,
}

impl RetentionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    pub fn category(mut self, category: AgentCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn matches(&self, record: &RetentionRecord) -> bool {
        self.method
            .as_deref()
            .is_none_or(|m| record.method.eq_ignore_ascii_case(m))
            && self.status_code.is_none_or(|s| record.status_code == s)
            && self.ip.as_deref().is_none_or(|ip| record.ip == ip)
            && self
                .path_prefix
                .as_deref()
                .is_none_or(|p| record.pathname.starts_with(p))
            && self.category.is_none_or(|c| record.ua_data.category == c)
    }
}

/// In-memory request log, installed as a [`PipelineHook`].
#[derive(Debug)]
pub struct Retention {
    records: BoundedLog<RetentionRecord>,
    config: RetentionConfig,
}

impl Retention {
    pub fn new(config: RetentionConfig) -> RetentionResult<Self> {
        config.validate()?;
        Ok(Self {
            records: BoundedLog::new(config.max_entries),
            config,
        })
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    pub fn get_all(&self) -> Vec<RetentionRecord> {
        self.records.get_all()
    }

    /// Newest first.
    pub fn get_recent(&self, n: usize) -> Vec<RetentionRecord> {
        self.records.get_recent(n)
    }

    pub fn filter<F>(&self, predicate: F) -> Vec<RetentionRecord>
    where
        F: Fn(&RetentionRecord) -> bool,
    {
        self.records.filter(predicate)
    }

    pub fn query(&self, query: &RetentionQuery) -> Vec<RetentionRecord> {
        self.records.filter(|r| query.matches(r))
    }

    pub fn clear(&self) -> usize {
        self.records.clear()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn export(&self) -> RetentionResult<String> {
        self.records.export()
    }

    pub async fn export_to(&self, path: impl AsRef<Path>) -> RetentionResult<usize> {
        self.records.export_to(path).await
    }

    /// Flush to the configured export path, if any.
    pub async fn flush(&self) -> RetentionResult<Option<usize>> {
        match &self.config.export_path {
            Some(path) => self.records.export_to(path).await.map(Some),
            None => Ok(None),
        }
    }

    fn record(&self, req: &Request, completion: &Completion) -> RetentionRecord {
        let begin = match req.extensions.get::<Begin>() {
            Some(begin) => begin.clone(),
            None => Begin {
                at: Utc::now(),
                headers: redact_headers(req.headers.iter()),
                ua: req
                    .extensions
                    .get_arc::<UaInfo>()
                    .unwrap_or_else(|| Arc::new(classify(req.user_agent()))),
            },
        };

        RetentionRecord {
            timestamp: iso_millis(begin.at),
            request_id: req.id.clone(),
            method: req.method.to_string(),
            url: req.url.clone(),
            pathname: req.path.clone(),
            query: req
                .query
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            headers: begin.headers,
            ip: req.client_ip.clone(),
            user_agent: req.user_agent().to_string(),
            ua_data: (*begin.ua).clone(),
            status_code: completion.status,
            duration: completion.duration.as_millis() as u64,
            throttle: req.extensions.get::<ThrottleOutcome>().copied(),
            abandoned: completion.abandoned.map(|reason| match reason {
                AbandonReason::ClientClosed => "client_closed",
                AbandonReason::TimedOut => "timeout",
            }),
        }
    }
}

impl PipelineHook for Retention {
    fn on_request(&self, req: &mut Request) {
        let begin = Begin::capture(req);
        req.extensions.insert(begin);
    }

    fn on_response(&self, req: &Request, _res: &Response, completion: &Completion) {
        let record = self.record(req, completion);
        if self.records.push(record).is_some() {
            tracing::trace!(capacity = self.records.capacity(), "oldest retention record evicted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use triva_core::HttpMethod;

    fn retention(max: usize) -> Retention {
        Retention::new(RetentionConfig {
            max_entries: max,
            ..RetentionConfig::default()
        })
        .unwrap()
    }

    fn run(retention: &Retention, path: &str, status: u16) {
        let mut req = Request::new(HttpMethod::GET, path)
            .with_header("User-Agent", "Mozilla/5.0 (compatible; Googlebot/2.1)")
            .with_header("Authorization", "Bearer secret");
        req.client_ip = "10.0.0.1".into();
        retention.on_request(&mut req);
        let completion = Completion {
            status,
            duration: Duration::from_millis(12),
            abandoned: None,
        };
        retention.on_response(&req, &Response::new(), &completion);
    }

    #[test]
    fn test_record_shape() {
        let retention = retention(10);
        run(&retention, "/search?q=rust&q=ignored", 200);

        let record = &retention.get_all()[0];
        assert_eq!(record.pathname, "/search");
        assert_eq!(record.query["q"], "rust");
        assert_eq!(record.headers["authorization"], "[REDACTED]");
        assert_eq!(record.ua_data.category, AgentCategory::Crawler);
        assert_eq!(record.duration, 12);
        assert!(record.throttle.is_none());

        let value = serde_json::to_value(record).unwrap();
        assert!(value["throttle"].is_null());
        assert_eq!(value["statusCode"], 200);
        assert_eq!(value["uaData"]["isBot"], true);
        assert_eq!(value["userAgent"], "Mozilla/5.0 (compatible; Googlebot/2.1)");
        assert!(value.get("abandoned").is_none());

        let ts = value["timestamp"].as_str().unwrap();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2026-02-12T10:30:45.123Z".len());
    }

    #[test]
    fn test_bounded_and_queryable() {
        let retention = retention(3);
        run(&retention, "/a", 200);
        run(&retention, "/b", 404);
        run(&retention, "/api/c", 200);
        run(&retention, "/api/d", 500);

        assert_eq!(retention.len(), 3);
        let paths: Vec<_> = retention.get_all().into_iter().map(|r| r.pathname).collect();
        assert_eq!(paths, vec!["/b", "/api/c", "/api/d"]);
        assert_eq!(retention.get_recent(1)[0].pathname, "/api/d");

        let api_ok = retention.query(&RetentionQuery::new().path_prefix("/api").status(200));
        assert_eq!(api_ok.len(), 1);
        assert_eq!(api_ok[0].pathname, "/api/c");
        assert_eq!(
            retention
                .query(&RetentionQuery::new().category(AgentCategory::Human))
                .len(),
            0
        );
        assert_eq!(retention.filter(|r| r.status_code >= 400).len(), 2);

        assert_eq!(retention.clear(), 3);
        assert!(retention.is_empty());
    }
}
