//! Pipeline executor.
//!
//! The driver owns the stage index and runs every stage itself:
//!
//! 1. built-in stages (redirect evaluator, rate limiter) in insertion order
//! 2. user middleware in registration order
//! 3. route-specific middleware of the matched route
//! 4. the route handler
//!
//! Hooks observe every request on entry and on completion (retention uses
//! this), reporters receive every captured error, and user error handlers get
//! a chance to answer before the sanitized fallback body is written.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::middleware::{ErrorHandler, Handler, Middleware, Next};
use crate::routing::RouteTable;
use crate::{
    AbandonReason, Abandonment, Error, ErrorKind, Extensions, Request, Response, RouteMethod,
    client_ip,
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Stage category in which an error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Listener,
    Middleware,
    Route,
    Response,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Listener => "listener",
            Phase::Middleware => "middleware",
            Phase::Route => "route",
            Phase::Response => "response",
        }
    }
}

/// Minimal copy of a request taken when an error is captured.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSnapshot {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub ip: String,
    pub user_agent: String,
}

impl RequestSnapshot {
    pub fn capture(req: &Request) -> Self {
        Self {
            method: req.method.to_string(),
            url: req.url.clone(),
            headers: req.headers.to_map(),
            ip: req.client_ip.clone(),
            user_agent: req.user_agent().to_string(),
        }
    }
}

/// Everything known about one captured error.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub request_id: String,
    pub kind: ErrorKind,
    pub status: u16,
    pub message: String,
    /// Debug rendering of the error and its source chain.
    pub stack: String,
    pub phase: Phase,
    pub handler: Option<String>,
    pub request: RequestSnapshot,
}

/// Receives captured errors (the error tracker implements this).
pub trait ErrorReporter: Send + Sync {
    fn report(&self, report: &ErrorReport);
}

/// Final state of a request as seen by hooks.
#[derive(Debug, Clone, Copy)]
pub struct Completion {
    pub status: u16,
    pub duration: Duration,
    pub abandoned: Option<AbandonReason>,
}

/// Observer invoked on entry and on completion of every request.
pub trait PipelineHook: Send + Sync {
    fn on_request(&self, req: &mut Request);

    fn on_response(&self, req: &Request, res: &Response, completion: &Completion);
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Deadline for the stage chain; `None` disables it.
    pub request_timeout: Option<Duration>,
    /// Honour `X-Forwarded-For` when deriving the client identifier.
    /// `X-Real-IP` is used regardless of this flag, see [`client_ip`].
    pub trust_proxy: bool,
    /// Include internal messages in 5xx bodies (development only).
    pub expose_errors: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            trust_proxy: false,
            expose_errors: false,
        }
    }
}

struct Failure {
    error: Error,
    phase: Phase,
    handler: Option<String>,
}

/// Tracks which stage is running so a panic or timeout can be attributed.
#[derive(Debug, Clone)]
struct Cursor {
    phase: Phase,
    handler: Option<String>,
}

impl Cursor {
    fn enter(&mut self, phase: Phase, handler: Option<String>) {
        self.phase = phase;
        self.handler = handler;
    }

    fn fail(&self, error: Error) -> Failure {
        Failure {
            error,
            phase: self.phase,
            handler: self.handler.clone(),
        }
    }
}

enum Outcome {
    Done,
    Failed(Failure),
    Abandoned(AbandonReason),
}

pub struct Pipeline {
    builtin: Vec<Arc<dyn Middleware>>,
    middleware: Vec<Arc<dyn Middleware>>,
    routes: RouteTable,
    hooks: Vec<Arc<dyn PipelineHook>>,
    reporters: Vec<Arc<dyn ErrorReporter>>,
    error_handlers: Vec<Arc<dyn ErrorHandler>>,
    state: Extensions,
    options: PipelineOptions,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineOptions::default())
    }
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            builtin: Vec::new(),
            middleware: Vec::new(),
            routes: RouteTable::new(),
            hooks: Vec::new(),
            reporters: Vec::new(),
            error_handlers: Vec::new(),
            state: Extensions::new(),
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Add a built-in stage. Built-ins always run before user middleware.
    pub fn add_builtin(&mut self, stage: Arc<dyn Middleware>) {
        self.builtin.push(stage);
    }

    pub fn use_middleware(&mut self, stage: Arc<dyn Middleware>) {
        self.middleware.push(stage);
    }

    pub fn route(
        &mut self,
        method: impl Into<RouteMethod>,
        pattern: &str,
        middleware: Vec<Arc<dyn Middleware>>,
        handler: Arc<dyn Handler>,
    ) -> Result<(), Error> {
        self.routes.register(method, pattern, middleware, handler)
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn on_error(&mut self, handler: Arc<dyn ErrorHandler>) {
        self.error_handlers.push(handler);
    }

    pub fn add_hook(&mut self, hook: Arc<dyn PipelineHook>) {
        self.hooks.push(hook);
    }

    pub fn add_reporter(&mut self, reporter: Arc<dyn ErrorReporter>) {
        self.reporters.push(reporter);
    }

    /// Shared state visible to every request through its extensions.
    pub fn state_mut(&mut self) -> &mut Extensions {
        &mut self.state
    }

    pub fn state(&self) -> &Extensions {
        &self.state
    }

    /// Run a request without a listener (tests, embedding).
    pub async fn dispatch(&self, req: Request) -> Response {
        self.handle(req, Abandonment::new()).await
    }

    /// Run the full pipeline for one request.
    pub async fn handle(&self, mut req: Request, abandonment: Abandonment) -> Response {
        self.prepare(&mut req);

        let mut res = Response::new();
        res.header(REQUEST_ID_HEADER, req.id.clone());

        for hook in &self.hooks {
            hook.on_request(&mut req);
        }

        let mut cursor = Cursor {
            phase: Phase::Middleware,
            handler: None,
        };
        let timeout = self.options.request_timeout;

        let outcome = {
            let run = AssertUnwindSafe(self.drive(&mut req, &mut res, &mut cursor)).catch_unwind();
            let deadline = async move {
                match timeout {
                    Some(limit) => tokio::time::sleep(limit).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                reason = abandonment.wait() => Outcome::Abandoned(reason),
                () = deadline => {
                    abandonment.abandon(AbandonReason::TimedOut);
                    Outcome::Abandoned(abandonment.reason().unwrap_or(AbandonReason::TimedOut))
                }
                result = run => match result {
                    Ok(Ok(())) => Outcome::Done,
                    Ok(Err(failure)) => Outcome::Failed(failure),
                    Err(payload) => Outcome::Failed(Failure {
                        error: Error::Internal(panic_message(payload)),
                        phase: Phase::Route,
                        handler: None,
                    }),
                },
            }
        };

        let abandoned = match outcome {
            Outcome::Done => None,
            Outcome::Failed(mut failure) => {
                if failure.handler.is_none() {
                    failure.phase = cursor.phase;
                    failure.handler = cursor.handler.clone();
                }
                self.fail(failure, &mut req, &mut res).await;
                None
            }
            Outcome::Abandoned(reason) => {
                res = self.abandoned_response(reason, &req, &cursor);
                Some(reason)
            }
        };

        let late = res.take_late_writes();
        if !late.is_empty() {
            warn!(request_id = %req.id, writes = late.len(), "response modified after it was sent");
            self.report(
                &Error::LateWrite(late.join("; ")),
                Phase::Response,
                cursor.handler.as_deref(),
                &req,
            );
        }

        let completion = Completion {
            status: res.status_code(),
            duration: req.received_at.elapsed(),
            abandoned,
        };
        for hook in &self.hooks {
            hook.on_response(&req, &res, &completion);
        }

        debug!(
            request_id = %req.id,
            method = %req.method,
            path = %req.path,
            status = completion.status,
            duration_ms = completion.duration.as_millis() as u64,
            "request completed"
        );
        res
    }

    fn prepare(&self, req: &mut Request) {
        if let Some(inbound) = req.header(REQUEST_ID_HEADER)
            && is_valid_request_id(inbound)
        {
            req.id = inbound.to_string();
        }
        req.client_ip = client_ip(&req.headers, req.remote_addr, self.options.trust_proxy);
        req.extensions.merge_missing(&self.state);
    }

    async fn drive(
        &self,
        req: &mut Request,
        res: &mut Response,
        cursor: &mut Cursor,
    ) -> Result<(), Failure> {
        for stage in self.builtin.iter().chain(self.middleware.iter()) {
            cursor.enter(Phase::Middleware, Some(stage.name().to_string()));
            if !self.run_stage(stage.as_ref(), req, res, cursor).await? {
                return Ok(());
            }
        }

        let Some(matched) = self.routes.find(req.method, &req.path) else {
            cursor.enter(Phase::Route, None);
            debug!(method = %req.method, path = %req.path, "no route matched");
            let body = json!({
                "error": "Not Found",
                "code": ErrorKind::NotFound.as_str(),
                "requestId": req.id,
            });
            return res.status(404).json(&body).map_err(|e| cursor.fail(e));
        };

        req.params = matched.params;
        let route = matched.route;

        for stage in &route.middleware {
            cursor.enter(
                Phase::Middleware,
                Some(format!("{} {}", route.id, stage.name())),
            );
            if !self.run_stage(stage.as_ref(), req, res, cursor).await? {
                return Ok(());
            }
        }

        cursor.enter(Phase::Route, Some(route.id.clone()));
        route
            .handler
            .call(req, res)
            .await
            .map_err(|e| cursor.fail(e))?;

        if !res.is_sent() {
            warn!(
                route = %route.id,
                request_id = %req.id,
                "handler completed without a response"
            );
            return Err(cursor.fail(Error::NoResponse(route.id.clone())));
        }
        Ok(())
    }

    /// Run one middleware. `Ok(true)` means move on to the next stage.
    async fn run_stage(
        &self,
        stage: &dyn Middleware,
        req: &mut Request,
        res: &mut Response,
        cursor: &Cursor,
    ) -> Result<bool, Failure> {
        let next = Next::new(stage.name());
        stage
            .handle(req, res, next.clone())
            .await
            .map_err(|e| cursor.fail(e))?;

        let calls = next.calls();
        if calls > 1 {
            self.report(
                &Error::ContinuationReused(stage.name().to_string()),
                Phase::Middleware,
                cursor.handler.as_deref(),
                req,
            );
        }

        if res.is_sent() {
            if calls > 0 {
                warn!(
                    stage = %stage.name(),
                    request_id = %req.id,
                    "continuation ignored after terminal response"
                );
            }
            return Ok(false);
        }

        if calls == 0 {
            warn!(
                stage = %stage.name(),
                request_id = %req.id,
                "middleware returned without continuing or responding"
            );
            return Err(cursor.fail(Error::NoResponse(format!(
                "middleware '{}'",
                stage.name()
            ))));
        }
        Ok(true)
    }

    async fn fail(&self, failure: Failure, req: &mut Request, res: &mut Response) {
        let Failure {
            error,
            phase,
            handler,
        } = failure;

        if error.is_server_error() {
            error!(
                request_id = %req.id,
                phase = phase.as_str(),
                handler = handler.as_deref().unwrap_or("-"),
                error = %error,
                "request failed"
            );
        } else {
            debug!(
                request_id = %req.id,
                phase = phase.as_str(),
                error = %error,
                "request rejected"
            );
        }
        self.report(&error, phase, handler.as_deref(), req);

        for error_handler in &self.error_handlers {
            if res.is_sent() {
                break;
            }
            if let Err(nested) = error_handler.handle(&error, req, res).await {
                warn!(request_id = %req.id, error = %nested, "error handler failed");
                self.report(&nested, Phase::Response, Some("error handler"), req);
            }
        }

        if !res.is_sent() {
            let body = error.to_body(&req.id, self.options.expose_errors);
            res.force_json(error.status_code(), &body);
        }
    }

    fn abandoned_response(&self, reason: AbandonReason, req: &Request, cursor: &Cursor) -> Response {
        let error = match reason {
            AbandonReason::TimedOut => {
                let error = Error::Timeout(format!(
                    "request exceeded {} ms",
                    self.options
                        .request_timeout
                        .map(|d| d.as_millis())
                        .unwrap_or_default()
                ));
                warn!(request_id = %req.id, handler = cursor.handler.as_deref().unwrap_or("-"), "request deadline exceeded");
                self.report(&error, Phase::Listener, cursor.handler.as_deref(), req);
                error
            }
            AbandonReason::ClientClosed => {
                debug!(request_id = %req.id, "request abandoned by client");
                Error::ClientClosed
            }
        };

        let mut res = Response::new();
        res.header(REQUEST_ID_HEADER, req.id.clone());
        res.force_json(error.status_code(), &error.to_body(&req.id, false));
        res
    }

    fn report(&self, error: &Error, phase: Phase, handler: Option<&str>, req: &Request) {
        if self.reporters.is_empty() {
            return;
        }
        let report = ErrorReport {
            request_id: req.id.clone(),
            kind: error.kind(),
            status: error.status_code(),
            message: error.to_string(),
            stack: error_chain(error),
            phase,
            handler: handler.map(str::to_string),
            request: RequestSnapshot::capture(req),
        };
        for reporter in &self.reporters {
            reporter.report(&report);
        }
    }
}

fn is_valid_request_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 128 && id.bytes().all(|b| b.is_ascii_graphic())
}

fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut out = format!("{:?}", error);
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("stage panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("stage panicked: {}", s)
    } else {
        "stage panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_validation() {
        assert!(is_valid_request_id("abc-123"));
        assert!(!is_valid_request_id(""));
        assert!(!is_valid_request_id("has space"));
        assert!(!is_valid_request_id(&"x".repeat(129)));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload), "stage panicked: boom");
    }

    #[test]
    fn test_phase_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Phase::Middleware).unwrap(), "middleware");
    }
}
