//! Pipeline stage applying the [`Throttle`] to every request.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};
use triva_core::{Error, Middleware, Next, Request, Response};
use triva_useragent::agent_info;

use crate::decision::Decision;
use crate::throttle::Throttle;

/// Rate limiting middleware for Triva applications.
///
/// Stores the [`ThrottleOutcome`](crate::ThrottleOutcome) of its decision in
/// the request extensions.
#[derive(Debug, Clone)]
pub struct ThrottleMiddleware {
    throttle: Arc<Throttle>,
}

impl ThrottleMiddleware {
    pub fn new(throttle: Arc<Throttle>) -> Self {
        Self { throttle }
    }

    pub fn throttle(&self) -> &Arc<Throttle> {
        &self.throttle
    }

    fn client_id(req: &Request) -> String {
        if req.client_ip.is_empty() {
            triva_core::client_ip(&req.headers, req.remote_addr, false)
        } else {
            req.client_ip.clone()
        }
    }

    fn write_headers(decision: &Decision, res: &mut Response) {
        if let Some(headers) = decision.headers() {
            for (name, value) in headers.to_header_pairs() {
                res.header(name, value);
            }
        }
    }
}

#[async_trait]
impl Middleware for ThrottleMiddleware {
    async fn handle(&self, req: &mut Request, res: &mut Response, next: Next) -> Result<(), Error> {
        let client = Self::client_id(req);
        let is_bot = agent_info(req).is_bot;
        let decision = self.throttle.check(&client, is_bot);
        req.extensions.insert(decision.outcome());
        Self::write_headers(&decision, res);

        if decision.is_forbidden() {
            info!(request_id = %req.id, client = %client, "blacklisted client");
            res.status(403);
            return res.json(&json!({ "error": "forbidden" }));
        }

        if decision.restricted {
            let retry_after = decision.retry_after.unwrap_or(1);
            info!(
                request_id = %req.id,
                client = %client,
                reason = %decision.reason,
                retry_after,
                "rate limit exceeded"
            );
            res.status(429);
            return res.json(&json!({
                "error": "Too many requests",
                "limit": decision.limit,
                "window_ms": self.throttle.config().window_ms,
                "retryAfter": retry_after,
            }));
        }

        debug!(client = %client, remaining = decision.remaining, "request admitted");
        next.proceed();
        Ok(())
    }

    fn name(&self) -> &str {
        "throttle"
    }
}
