//! Captured error records.

use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use tracing::trace;
use triva_core::{ErrorReport, ErrorReporter, Phase, RequestSnapshot};
use triva_useragent::{UaInfo, classify};

use crate::config::ErrorTrackingConfig;
use crate::error::RetentionResult;
use crate::log::BoundedLog;
use crate::redact::redact_headers;
use crate::retention::iso_millis;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub timestamp: String,
    pub request_id: String,
    /// Error kind, e.g. `internal`
    pub code: &'static str,
    pub status: u16,
    pub message: String,
    pub stack: String,
    pub phase: Phase,
    pub handler: Option<String>,
    pub request: RequestSnapshot,
    pub ua_data: UaInfo,
}

/// Field-match query over error records.
#[derive(Debug, Clone, Default)]
pub struct ErrorQuery {
    pub phase: Option<Phase>,
    pub handler: Option<String>,
    pub code: Option<String>,
}

impl ErrorQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn matches(&self, record: &ErrorRecord) -> bool {
        self.phase.is_none_or(|p| record.phase == p)
            && self
                .handler
                .as_deref()
                .is_none_or(|h| record.handler.as_deref() == Some(h))
            && self.code.as_deref().is_none_or(|c| record.code == c)
    }
}

/// Bounded store of every error the pipeline reports.
#[derive(Debug)]
pub struct ErrorTracker {
    records: BoundedLog<ErrorRecord>,
    config: ErrorTrackingConfig,
}

impl ErrorTracker {
    pub fn new(config: ErrorTrackingConfig) -> RetentionResult<Self> {
        config.validate()?;
        Ok(Self {
            records: BoundedLog::new(config.max_entries),
            config,
        })
    }

    pub fn config(&self) -> &ErrorTrackingConfig {
        &self.config
    }

    pub fn get_all(&self) -> Vec<ErrorRecord> {
        self.records.get_all()
    }

    /// Newest first.
    pub fn get_recent(&self, n: usize) -> Vec<ErrorRecord> {
        self.records.get_recent(n)
    }

    pub fn filter<F>(&self, predicate: F) -> Vec<ErrorRecord>
    where
        F: Fn(&ErrorRecord) -> bool,
    {
        self.records.filter(predicate)
    }

    pub fn query(&self, query: &ErrorQuery) -> Vec<ErrorRecord> {
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

    pub async fn flush(&self) -> RetentionResult<Option<usize>> {
        match &self.config.export_path {
            Some(path) => self.records.export_to(path).await.map(Some),
            None => Ok(None),
        }
    }
}

impl ErrorReporter for ErrorTracker {
    fn report(&self, report: &ErrorReport) {
        let mut request = report.request.clone();
        request.headers = redact_headers(
            report
                .request
                .headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );

        let record = ErrorRecord {
            timestamp: iso_millis(Utc::now()),
            request_id: report.request_id.clone(),
            code: report.kind.as_str(),
            status: report.status,
            message: report.message.clone(),
            stack: report.stack.clone(),
            phase: report.phase,
            handler: report.handler.clone(),
            ua_data: classify(&request.user_agent),
            request,
        };
        trace!(request_id = %record.request_id, code = record.code, "error captured");
        self.records.push(record);
    }
}
