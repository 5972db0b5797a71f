//! Minimal Triva application: a JSON route, a cached counter, rate limiting
//! and AI-crawler redirection.
//!
//! Run with `cargo run --example basic` and try:
//!
//! ```text
//! curl localhost:3000/users/42
//! curl -XPOST localhost:3000/visits
//! curl -A "GPTBot/1.0" -i localhost:3000/users/42
//! ```

use std::time::Duration;

use serde_json::json;
use triva::prelude::*;

#[tokio::main]
async fn main() -> triva::Result<()> {
    let config = TrivaConfig::from_value(json!({
        "env": "development",
        "cache": { "type": "memory", "retention": 3_600_000 },
        "throttle": { "limit": 60, "window_ms": 60_000, "burst_limit": 10 },
        "redirects": { "enabled": true, "redirectAI": true, "destination": "/ai-docs" }
    }))?;

    let mut app = Triva::builder().config(config).with_logging().build().await?;

    app.get(
        "/users/:id",
        handler_fn(|req, res| {
            Box::pin(async move {
                let id = req.param("id").unwrap_or_default().to_string();
                res.json(&json!({ "userId": id }))
            })
        }),
    )?
    .post(
        "/visits",
        handler_fn(|req, res| {
            Box::pin(async move {
                let cache = req
                    .extensions
                    .get::<Cache>()
                    .cloned()
                    .ok_or_else(|| Error::Internal("cache not configured".into()))?;
                let visits = cache.get::<u64>("visits").await?.unwrap_or(0) + 1;
                cache
                    .set("visits", &visits, Some(Duration::from_secs(3600)))
                    .await?;
                res.json(&json!({ "visits": visits }))
            })
        }),
    )?
    .get(
        "/ai-docs",
        handler_fn(|_req, res| {
            Box::pin(async move { res.text("Machine-readable documentation lives here.") })
        }),
    )?;

    app.listen("127.0.0.1", 3000).await
}
