//! End-to-end scenarios through a built application, in process.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use triva::prelude::*;
use triva::triva_cache::{CacheAdapter, MemoryAdapter};
use triva::{Destination, RedirectRule};

fn from_ip(req: Request, ip: &str) -> Request {
    let addr: SocketAddr = format!("{}:40000", ip).parse().unwrap();
    req.with_remote_addr(addr)
}

async fn app(config: serde_json::Value) -> Triva {
    Triva::builder()
        .config(TrivaConfig::from_value(config).unwrap())
        .build()
        .await
        .unwrap()
}

fn ok() -> impl Handler {
    handler_fn(|_req, res| Box::pin(async move { res.json(&json!({ "ok": true })) }))
}

#[tokio::test]
async fn test_parameter_capture() {
    let mut app = app(json!({})).await;
    app.get(
        "/users/:id",
        handler_fn(|req, res| {
            Box::pin(async move {
                let id = req.param("id").unwrap_or_default().to_string();
                res.json(&json!({ "userId": id }))
            })
        }),
    )
    .unwrap();

    let res = app.dispatch(Request::new(HttpMethod::GET, "/users/42")).await;
    assert_eq!(res.status_code(), 200);
    assert_eq!(res.body_json().unwrap(), json!({ "userId": "42" }));
}

#[tokio::test]
async fn test_registration_order_wins() {
    let mut app = app(json!({})).await;
    app.get(
        "/users/admin",
        handler_fn(|req, res| {
            Box::pin(async move {
                let params = req.params.len();
                res.json(&json!({ "route": "admin", "params": params }))
            })
        }),
    )
    .unwrap()
    .get(
        "/users/:id",
        handler_fn(|req, res| {
            Box::pin(async move {
                let id = req.param("id").unwrap_or_default().to_string();
                res.json(&json!({ "route": "user", "id": id }))
            })
        }),
    )
    .unwrap();

    let admin = app.dispatch(Request::new(HttpMethod::GET, "/users/admin")).await;
    assert_eq!(admin.body_json().unwrap(), json!({ "route": "admin", "params": 0 }));

    let user = app.dispatch(Request::new(HttpMethod::GET, "/users/42")).await;
    assert_eq!(user.body_json().unwrap(), json!({ "route": "user", "id": "42" }));
}

#[tokio::test]
async fn test_rate_limit_then_ban() {
    let mut app = app(json!({
        "throttle": {
            "limit": 5,
            "window_ms": 1000,
            "burst_limit": 10,
            "ban_threshold": 3,
            "ban_ms": 60000
        }
    }))
    .await;
    app.get("/x", ok()).unwrap();

    for _ in 0..5 {
        let res = app
            .dispatch(from_ip(Request::new(HttpMethod::GET, "/x"), "10.0.0.1"))
            .await;
        assert_eq!(res.status_code(), 200);
    }

    let limited = app
        .dispatch(from_ip(Request::new(HttpMethod::GET, "/x"), "10.0.0.1"))
        .await;
    assert_eq!(limited.status_code(), 429);
    assert_eq!(limited.get_header("x-ratelimit-remaining"), Some("0"));
    let body = limited.body_json().unwrap();
    assert_eq!(body["error"], "Too many requests");
    assert_eq!(body["limit"], 5);
    assert_eq!(body["window_ms"], 1000);

    // violations two to four; the fourth exceeds the threshold
    let mut last = limited;
    for _ in 0..3 {
        last = app
            .dispatch(from_ip(Request::new(HttpMethod::GET, "/x"), "10.0.0.1"))
            .await;
        assert_eq!(last.status_code(), 429);
    }
    let retry: u64 = last.get_header("retry-after").unwrap().parse().unwrap();
    assert!((59..=60).contains(&retry), "retry-after {}", retry);

    let state = app.throttle().unwrap().client_state("10.0.0.1").unwrap();
    assert!(state.banned_until.is_some());
    assert_eq!(state.ban_count, 1);

    // other clients are unaffected
    let other = app
        .dispatch(from_ip(Request::new(HttpMethod::GET, "/x"), "10.0.0.2"))
        .await;
    assert_eq!(other.status_code(), 200);
}

#[tokio::test]
async fn test_ai_redirect_bypasses_limiter() {
    let mut app = app(json!({
        "redirects": {
            "enabled": true,
            "redirectAI": true,
            "destination": "/ai-docs",
            "statusCode": 302
        },
        "throttle": { "limit": 1, "window_ms": 60000 }
    }))
    .await;
    app.get("/x", ok()).unwrap();

    let res = app
        .dispatch(from_ip(
            Request::new(HttpMethod::GET, "/x").with_header("User-Agent", "Mozilla/5.0 ClaudeBot"),
            "10.0.0.9",
        ))
        .await;
    assert_eq!(res.status_code(), 302);
    assert_eq!(res.get_header("location"), Some("/ai-docs"));
    assert_eq!(app.throttle().unwrap().tracked_clients(), 0);

    let record = &app.retention().unwrap().get_all()[0];
    assert_eq!(record.status_code, 302);
    assert!(record.throttle.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cache_ttl_through_handlers() {
    let mut app = app(json!({ "cache": { "type": "memory" } })).await;
    app.post(
        "/cache/:key",
        handler_fn(|req, res| {
            Box::pin(async move {
                let cache = req.extensions.get::<Cache>().cloned().ok_or_else(|| {
                    Error::Internal("cache missing from state".into())
                })?;
                let key = req.param("key").unwrap_or_default().to_string();
                let value = req.text()?.to_string();
                cache.set(&key, &value, Some(Duration::from_millis(100))).await?;
                res.status(201);
                res.end()
            })
        }),
    )
    .unwrap();

    let res = app
        .dispatch(Request::new(HttpMethod::POST, "/cache/k").with_body("v"))
        .await;
    assert_eq!(res.status_code(), 201);

    tokio::time::advance(Duration::from_millis(50)).await;
    assert_eq!(app.cache().get::<String>("k").await.unwrap().as_deref(), Some("v"));

    tokio::time::advance(Duration::from_millis(100)).await;
    assert_eq!(app.cache().get::<String>("k").await.unwrap(), None);
    assert!(!app.cache().has("k").await.unwrap());
    assert!(app.cache().keys("k*").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_middleware_short_circuit() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let (a, b, c) = (trace.clone(), trace.clone(), trace.clone());

    let mut app = app(json!({})).await;
    app.use_middleware(middleware_fn("a", move |_req, _res, next| {
        let a = a.clone();
        Box::pin(async move {
            a.lock().unwrap().push("a");
            next.proceed();
            Ok(())
        })
    }))
    .use_middleware(middleware_fn("b", move |_req, res, _next| {
        let b = b.clone();
        Box::pin(async move {
            b.lock().unwrap().push("b");
            res.status(401);
            res.json(&json!({ "error": "unauthorized" }))
        })
    }))
    .use_middleware(middleware_fn("c", move |_req, _res, next| {
        let c = c.clone();
        Box::pin(async move {
            c.lock().unwrap().push("c");
            next.proceed();
            Ok(())
        })
    }));
    app.get("/secret", ok()).unwrap();

    let res = app.dispatch(Request::new(HttpMethod::GET, "/secret")).await;
    assert_eq!(res.status_code(), 401);
    assert_eq!(*trace.lock().unwrap(), vec!["a", "b"]);

    let records = app.retention().unwrap().get_all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status_code, 401);
}

#[tokio::test]
async fn test_custom_rule_and_dynamic_destination() {
    let mut app = Triva::builder()
        .config(
            TrivaConfig::from_value(json!({
                "redirects": { "enabled": true, "redirectAI": true }
            }))
            .unwrap(),
        )
        .redirect_destination(Destination::dynamic(|req| format!("/for-ai{}", req.path)))
        .redirect_rule(RedirectRule::new(
            "legacy",
            |req, _ua| req.path.starts_with("/v1/"),
            "/v2/",
            308,
        ))
        .build()
        .await
        .unwrap();
    app.get("/docs", ok()).unwrap();

    let ai = app
        .dispatch(Request::new(HttpMethod::GET, "/docs").with_header("User-Agent", "GPTBot/1.0"))
        .await;
    assert_eq!(ai.status_code(), 302);
    assert_eq!(ai.get_header("location"), Some("/for-ai/docs"));

    let legacy = app
        .dispatch(Request::new(HttpMethod::GET, "/v1/users").with_header("User-Agent", "Mozilla/5.0 Firefox/121.0"))
        .await;
    assert_eq!(legacy.status_code(), 308);
    assert_eq!(legacy.get_header("location"), Some("/v2/"));

    let human = app
        .dispatch(Request::new(HttpMethod::GET, "/docs").with_header("User-Agent", "Mozilla/5.0 Firefox/121.0"))
        .await;
    assert_eq!(human.status_code(), 200);
}

#[tokio::test]
async fn test_error_handler_and_tracking() {
    let mut app = app(json!({ "env": "production" })).await;
    app.get(
        "/fail",
        handler_fn(|_req, _res| {
            Box::pin(async move { Err(Error::Internal("connection string leaked".into())) })
        }),
    )
    .unwrap();

    let res = app
        .dispatch(Request::new(HttpMethod::GET, "/fail").with_header("X-Api-Key", "abc"))
        .await;
    assert_eq!(res.status_code(), 500);
    let body = res.body_json().unwrap();
    assert_eq!(body["code"], "internal");
    assert!(!body.to_string().contains("leaked"));
    assert_eq!(body["requestId"], res.get_header("x-request-id").unwrap());

    let errors = app.error_tracker().unwrap().get_all();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].handler.as_deref(), Some("GET /fail"));
    assert_eq!(errors[0].request.headers["x-api-key"], "[REDACTED]");

    app.on_error(error_handler_fn(|err, _req, res| {
        Box::pin(async move {
            res.status(err.status_code());
            res.json(&json!({ "handled": true }))
        })
    }));
    let handled = app.dispatch(Request::new(HttpMethod::GET, "/fail")).await;
    assert_eq!(handled.status_code(), 500);
    assert_eq!(handled.body_json().unwrap(), json!({ "handled": true }));
    assert_eq!(app.error_tracker().unwrap().len(), 2);
}

#[tokio::test]
async fn test_handler_without_response_is_internal_error() {
    let mut app = app(json!({})).await;
    app.get("/silent", handler_fn(|_req, _res| Box::pin(async move { Ok(()) })))
        .unwrap();

    let res = app.dispatch(Request::new(HttpMethod::GET, "/silent")).await;
    assert_eq!(res.status_code(), 500);
    assert_eq!(app.error_tracker().unwrap().len(), 1);
}

#[tokio::test]
async fn test_user_state_and_extra_adapter() {
    #[derive(Debug)]
    struct Greeting(&'static str);

    let mut app = Triva::builder()
        .config(TrivaConfig::from_value(json!({ "cache": { "type": "scenario-scratch" } })).unwrap())
        .cache_adapter("scenario-scratch", |_options| {
            Box::pin(async move { Ok(Arc::new(MemoryAdapter::new()) as Arc<dyn CacheAdapter>) })
        })
        .state(Greeting("hello"))
        .build()
        .await
        .unwrap();
    app.get(
        "/greet",
        handler_fn(|req, res| {
            Box::pin(async move {
                let greeting = req.extensions.get::<Greeting>().map_or("none", |g| g.0);
                res.text(greeting)
            })
        }),
    )
    .unwrap();

    assert_eq!(app.cache().adapter().name(), "memory");
    let res = app.dispatch(Request::new(HttpMethod::GET, "/greet")).await;
    assert_eq!(res.body().as_ref(), b"hello");
}

#[tokio::test]
async fn test_disabled_components_are_absent() {
    let app = app(json!({
        "retention": { "enabled": false },
        "errorTracking": { "enabled": false }
    }))
    .await;
    assert!(app.retention().is_none());
    assert!(app.error_tracker().is_none());
    assert!(app.throttle().is_none());

    let res = app.dispatch(Request::new(HttpMethod::GET, "/nothing")).await;
    assert_eq!(res.status_code(), 404);
}
