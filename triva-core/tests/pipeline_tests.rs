//! Pipeline executor behaviour: ordering, continuation, error flow.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use triva_core::*;

#[derive(Default)]
struct CapturedErrors(Mutex<Vec<ErrorReport>>);

impl ErrorReporter for CapturedErrors {
    fn report(&self, report: &ErrorReport) {
        self.0.lock().unwrap().push(report.clone());
    }
}

impl CapturedErrors {
    fn all(&self) -> Vec<ErrorReport> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Default)]
struct CapturedCompletions(Mutex<Vec<Completion>>);

impl PipelineHook for CapturedCompletions {
    fn on_request(&self, _req: &mut Request) {}

    fn on_response(&self, _req: &Request, _res: &Response, completion: &Completion) {
        self.0.lock().unwrap().push(*completion);
    }
}

fn trace_mw(name: &'static str, trace: Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn Middleware> {
    Arc::new(middleware_fn(name, move |_req, _res, next| {
        let trace = trace.clone();
        Box::pin(async move {
            trace.lock().unwrap().push(name);
            next.proceed();
            Ok(())
        })
    }))
}

fn json_handler(body: serde_json::Value) -> Arc<dyn Handler> {
    Arc::new(handler_fn(move |_req, res| {
        let body = body.clone();
        Box::pin(async move { res.json(&body) })
    }))
}

fn user_id_handler() -> Arc<dyn Handler> {
    Arc::new(handler_fn(|req, res| {
        Box::pin(async move {
            let id = req.param("id").unwrap_or_default().to_string();
            res.json(&json!({ "userId": id }))
        })
    }))
}

#[tokio::test]
async fn test_parameter_capture() {
    let mut pipeline = Pipeline::default();
    pipeline
        .route(HttpMethod::GET, "/users/:id", vec![], user_id_handler())
        .unwrap();

    let res = pipeline.dispatch(Request::new(HttpMethod::GET, "/users/42")).await;
    assert_eq!(res.status_code(), 200);
    assert_eq!(res.body_json().unwrap(), json!({ "userId": "42" }));
}

#[tokio::test]
async fn test_registration_order_tie_break() {
    let mut pipeline = Pipeline::default();
    pipeline
        .route(
            HttpMethod::GET,
            "/users/admin",
            vec![],
            Arc::new(handler_fn(|req, res| {
                Box::pin(async move { res.json(&json!({ "admin": true, "params": req.params.len() })) })
            })),
        )
        .unwrap();
    pipeline
        .route(HttpMethod::GET, "/users/:id", vec![], user_id_handler())
        .unwrap();

    let admin = pipeline.dispatch(Request::new(HttpMethod::GET, "/users/admin")).await;
    assert_eq!(admin.body_json().unwrap(), json!({ "admin": true, "params": 0 }));

    let user = pipeline.dispatch(Request::new(HttpMethod::GET, "/users/42")).await;
    assert_eq!(user.body_json().unwrap(), json!({ "userId": "42" }));
}

#[tokio::test]
async fn test_registration_order_wins_over_specificity() {
    let mut pipeline = Pipeline::default();
    pipeline
        .route(RouteMethod::Any, "/*", vec![], json_handler(json!("catch-all")))
        .unwrap();
    pipeline
        .route(HttpMethod::GET, "/exact", vec![], json_handler(json!("exact")))
        .unwrap();

    let res = pipeline.dispatch(Request::new(HttpMethod::GET, "/exact")).await;
    assert_eq!(res.body_json().unwrap(), json!("catch-all"));
}

#[tokio::test]
async fn test_method_must_match_unless_any() {
    let mut pipeline = Pipeline::default();
    pipeline
        .route(HttpMethod::POST, "/items", vec![], json_handler(json!("post")))
        .unwrap();
    pipeline
        .route(RouteMethod::Any, "/health", vec![], json_handler(json!("ok")))
        .unwrap();

    let res = pipeline.dispatch(Request::new(HttpMethod::GET, "/items")).await;
    assert_eq!(res.status_code(), 404);

    let res = pipeline.dispatch(Request::new(HttpMethod::DELETE, "/health")).await;
    assert_eq!(res.status_code(), 200);
}

#[tokio::test]
async fn test_not_found_body() {
    let pipeline = Pipeline::default();
    let res = pipeline.dispatch(Request::new(HttpMethod::GET, "/missing")).await;
    assert_eq!(res.status_code(), 404);

    let body = res.body_json().unwrap();
    assert_eq!(body["error"], "Not Found");
    assert_eq!(body["code"], "not_found");
    assert_eq!(body["requestId"], res.get_header(REQUEST_ID_HEADER).unwrap());
}

#[tokio::test]
async fn test_middleware_order_and_short_circuit() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = Pipeline::default();

    pipeline.use_middleware(trace_mw("a", trace.clone()));
    let trace_b = trace.clone();
    pipeline.use_middleware(Arc::new(middleware_fn("b", move |_req, res, _next| {
        let trace = trace_b.clone();
        Box::pin(async move {
            trace.lock().unwrap().push("b");
            res.status(401).json(&json!({ "error": "unauthorized" }))
        })
    })));
    pipeline.use_middleware(trace_mw("c", trace.clone()));
    pipeline
        .route(HttpMethod::GET, "/", vec![], json_handler(json!("handler")))
        .unwrap();

    let res = pipeline.dispatch(Request::new(HttpMethod::GET, "/")).await;
    assert_eq!(res.status_code(), 401);
    assert_eq!(*trace.lock().unwrap(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_builtin_runs_before_user_and_route_middleware() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = Pipeline::default();

    pipeline.use_middleware(trace_mw("user", trace.clone()));
    pipeline.add_builtin(trace_mw("builtin", trace.clone()));
    pipeline
        .route(
            HttpMethod::GET,
            "/",
            vec![trace_mw("route", trace.clone())],
            json_handler(json!("ok")),
        )
        .unwrap();

    pipeline.dispatch(Request::new(HttpMethod::GET, "/")).await;
    assert_eq!(*trace.lock().unwrap(), vec!["builtin", "user", "route"]);
}

#[tokio::test]
async fn test_double_continuation_is_reported_and_does_not_skip() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(CapturedErrors::default());
    let mut pipeline = Pipeline::default();
    pipeline.add_reporter(errors.clone());

    pipeline.use_middleware(Arc::new(middleware_fn("twice", |_req, _res, next| {
        Box::pin(async move {
            next.proceed();
            next.proceed();
            Ok(())
        })
    })));
    pipeline.use_middleware(trace_mw("second", trace.clone()));
    pipeline
        .route(HttpMethod::GET, "/", vec![], json_handler(json!("ok")))
        .unwrap();

    let res = pipeline.dispatch(Request::new(HttpMethod::GET, "/")).await;
    assert_eq!(res.status_code(), 200);
    assert_eq!(*trace.lock().unwrap(), vec!["second"]);

    let reports = errors.all();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].phase, Phase::Middleware);
    assert_eq!(reports[0].handler.as_deref(), Some("twice"));
    assert!(reports[0].message.contains("more than once"));
}

#[tokio::test]
async fn test_continuation_after_terminal_is_ignored() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = Pipeline::default();

    pipeline.use_middleware(Arc::new(middleware_fn("respond-then-next", |_req, res, next| {
        Box::pin(async move {
            res.status(202).end()?;
            next.proceed();
            Ok(())
        })
    })));
    pipeline.use_middleware(trace_mw("after", trace.clone()));

    let res = pipeline.dispatch(Request::new(HttpMethod::GET, "/")).await;
    assert_eq!(res.status_code(), 202);
    assert!(trace.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_handler_without_response_is_internal_error() {
    let errors = Arc::new(CapturedErrors::default());
    let mut pipeline = Pipeline::default();
    pipeline.add_reporter(errors.clone());
    pipeline
        .route(
            HttpMethod::GET,
            "/silent",
            vec![],
            Arc::new(handler_fn(|_req, _res| Box::pin(async move { Ok(()) }))),
        )
        .unwrap();

    let res = pipeline.dispatch(Request::new(HttpMethod::GET, "/silent")).await;
    assert_eq!(res.status_code(), 500);
    assert_eq!(res.body_json().unwrap()["code"], "internal");

    let reports = errors.all();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].phase, Phase::Route);
    assert_eq!(reports[0].handler.as_deref(), Some("GET /silent"));
}

#[tokio::test]
async fn test_middleware_that_neither_continues_nor_responds() {
    let mut pipeline = Pipeline::default();
    pipeline.use_middleware(Arc::new(middleware_fn("stuck", |_req, _res, _next| {
        Box::pin(async move { Ok(()) })
    })));
    pipeline
        .route(HttpMethod::GET, "/", vec![], json_handler(json!("ok")))
        .unwrap();

    let res = pipeline.dispatch(Request::new(HttpMethod::GET, "/")).await;
    assert_eq!(res.status_code(), 500);
}

#[tokio::test]
async fn test_error_is_sanitized_and_reported() {
    let errors = Arc::new(CapturedErrors::default());
    let mut pipeline = Pipeline::default();
    pipeline.add_reporter(errors.clone());
    pipeline
        .route(
            HttpMethod::GET,
            "/boom",
            vec![],
            Arc::new(handler_fn(|_req, _res| {
                Box::pin(async move { Err(Error::Internal("connection string leaked".into())) })
            })),
        )
        .unwrap();

    let req = Request::new(HttpMethod::GET, "/boom")
        .with_header("X-Request-ID", "trace-123")
        .with_header("Authorization", "Bearer secret");
    let res = pipeline.dispatch(req).await;

    assert_eq!(res.status_code(), 500);
    assert_eq!(res.get_header("x-request-id"), Some("trace-123"));
    let body = res.body_json().unwrap();
    assert_eq!(body, json!({
        "error": "Internal Server Error",
        "code": "internal",
        "requestId": "trace-123",
    }));

    let reports = errors.all();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].request_id, "trace-123");
    assert_eq!(reports[0].request.method, "GET");
    assert!(reports[0].message.contains("connection string leaked"));
}

#[tokio::test]
async fn test_user_error_handlers_run_in_order() {
    let mut pipeline = Pipeline::default();
    let calls = Arc::new(Mutex::new(Vec::new()));

    let first = calls.clone();
    pipeline.on_error(Arc::new(error_handler_fn(move |_err, _req, _res| {
        let calls = first.clone();
        Box::pin(async move {
            calls.lock().unwrap().push("observe");
            Ok(())
        })
    })));
    let second = calls.clone();
    pipeline.on_error(Arc::new(error_handler_fn(move |err, _req, res| {
        let calls = second.clone();
        Box::pin(async move {
            calls.lock().unwrap().push("respond");
            res.status(err.status_code())
                .json(&json!({ "custom": err.kind().as_str() }))
        })
    })));
    let third = calls.clone();
    pipeline.on_error(Arc::new(error_handler_fn(move |_err, _req, _res| {
        let calls = third.clone();
        Box::pin(async move {
            calls.lock().unwrap().push("never");
            Ok(())
        })
    })));
    pipeline
        .route(
            HttpMethod::GET,
            "/private",
            vec![],
            Arc::new(handler_fn(|_req, _res| {
                Box::pin(async move { Err(Error::Forbidden("no access".into())) })
            })),
        )
        .unwrap();

    let res = pipeline.dispatch(Request::new(HttpMethod::GET, "/private")).await;
    assert_eq!(res.status_code(), 403);
    assert_eq!(res.body_json().unwrap(), json!({ "custom": "forbidden" }));
    assert_eq!(*calls.lock().unwrap(), vec!["observe", "respond"]);
}

fn explode() -> Result<(), Error> {
    panic!("handler exploded")
}

#[tokio::test]
async fn test_panic_becomes_internal_error() {
    let errors = Arc::new(CapturedErrors::default());
    let mut pipeline = Pipeline::default();
    pipeline.add_reporter(errors.clone());
    pipeline
        .route(
            HttpMethod::GET,
            "/panic",
            vec![],
            Arc::new(handler_fn(|_req, _res| {
                Box::pin(async move { explode() })
            })),
        )
        .unwrap();

    let res = pipeline.dispatch(Request::new(HttpMethod::GET, "/panic")).await;
    assert_eq!(res.status_code(), 500);

    let reports = errors.all();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].handler.as_deref(), Some("GET /panic"));
    assert!(reports[0].message.contains("handler exploded"));
}

#[tokio::test]
async fn test_late_write_is_reported() {
    let errors = Arc::new(CapturedErrors::default());
    let mut pipeline = Pipeline::default();
    pipeline.add_reporter(errors.clone());
    pipeline
        .route(
            HttpMethod::GET,
            "/late",
            vec![],
            Arc::new(handler_fn(|_req, res| {
                Box::pin(async move {
                    res.text("done")?;
                    res.header("x-too-late", "1");
                    Ok(())
                })
            })),
        )
        .unwrap();

    let res = pipeline.dispatch(Request::new(HttpMethod::GET, "/late")).await;
    assert_eq!(res.status_code(), 200);
    assert!(res.get_header("x-too-late").is_none());

    let reports = errors.all();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].phase, Phase::Response);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_produces_504() {
    let completions = Arc::new(CapturedCompletions::default());
    let mut pipeline = Pipeline::new(PipelineOptions {
        request_timeout: Some(Duration::from_millis(50)),
        ..PipelineOptions::default()
    });
    pipeline.add_hook(completions.clone());
    pipeline
        .route(
            HttpMethod::GET,
            "/slow",
            vec![],
            Arc::new(handler_fn(|_req, res| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    res.text("too late")
                })
            })),
        )
        .unwrap();

    let res = pipeline.dispatch(Request::new(HttpMethod::GET, "/slow")).await;
    assert_eq!(res.status_code(), 504);
    assert_eq!(res.body_json().unwrap()["code"], "timeout");

    let completions = completions.0.lock().unwrap();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].status, 504);
    assert_eq!(completions[0].abandoned, Some(AbandonReason::TimedOut));
}

#[tokio::test]
async fn test_client_close_finalizes_with_499() {
    let completions = Arc::new(CapturedCompletions::default());
    let mut pipeline = Pipeline::default();
    pipeline.add_hook(completions.clone());
    pipeline
        .route(
            HttpMethod::GET,
            "/hang",
            vec![],
            Arc::new(handler_fn(|_req, _res| {
                Box::pin(async move {
                    std::future::pending::<()>().await;
                    Ok(())
                })
            })),
        )
        .unwrap();
    let pipeline = Arc::new(pipeline);

    let abandonment = Abandonment::new();
    let task = {
        let pipeline = pipeline.clone();
        let abandonment = abandonment.clone();
        tokio::spawn(async move {
            pipeline
                .handle(Request::new(HttpMethod::GET, "/hang"), abandonment)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    abandonment.abandon(AbandonReason::ClientClosed);

    let res = task.await.unwrap();
    assert_eq!(res.status_code(), 499);
    let completions = completions.0.lock().unwrap();
    assert_eq!(completions[0].abandoned, Some(AbandonReason::ClientClosed));
}

#[tokio::test]
async fn test_shared_state_reaches_handlers() {
    #[derive(Debug)]
    struct Greeting(&'static str);

    let mut pipeline = Pipeline::default();
    pipeline.state_mut().insert(Greeting("hello"));
    pipeline
        .route(
            HttpMethod::GET,
            "/",
            vec![],
            Arc::new(handler_fn(|req, res| {
                Box::pin(async move {
                    let greeting = req
                        .extensions
                        .get::<Greeting>()
                        .map(|g| g.0)
                        .unwrap_or("missing");
                    res.text(greeting)
                })
            })),
        )
        .unwrap();

    let res = pipeline.dispatch(Request::new(HttpMethod::GET, "/")).await;
    assert_eq!(res.body().as_ref(), b"hello");
}

#[tokio::test]
async fn test_client_ip_derivation() {
    let mut pipeline = Pipeline::new(PipelineOptions {
        trust_proxy: true,
        ..PipelineOptions::default()
    });
    pipeline
        .route(
            HttpMethod::GET,
            "/ip",
            vec![],
            Arc::new(handler_fn(|req, res| {
                Box::pin(async move { res.text(req.client_ip.clone()) })
            })),
        )
        .unwrap();

    let req = Request::new(HttpMethod::GET, "/ip")
        .with_header("X-Forwarded-For", "10.0.0.1, 10.0.0.2")
        .with_remote_addr("127.0.0.1:9000".parse().unwrap());
    let res = pipeline.dispatch(req).await;
    assert_eq!(res.body().as_ref(), b"10.0.0.1");
}
