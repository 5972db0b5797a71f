// Middleware, handler and error-handler contracts

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::warn;

use crate::{Error, Request, Response};

/// Continuation token handed to a middleware.
///
/// Calling [`Next::proceed`] tells the pipeline driver to move on to the next
/// stage once the middleware returns. The driver, not the middleware, runs
/// the downstream stages, so the token only records the signal. Calling it
/// a second time is a bug in the middleware: the call is logged, counted and
/// reported, and never advances the pipeline further.
#[derive(Debug, Clone)]
pub struct Next {
    stage: Arc<str>,
    calls: Arc<AtomicUsize>,
}

impl Next {
    pub fn new(stage: impl Into<Arc<str>>) -> Self {
        Self {
            stage: stage.into(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Signal continuation.
    pub fn proceed(&self) {
        let previous = self.calls.fetch_add(1, Ordering::SeqCst);
        if previous > 0 {
            warn!(
                stage = %self.stage,
                calls = previous + 1,
                "continuation invoked more than once"
            );
        }
    }

    /// How many times the token has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }
}

/// A pipeline stage that may continue, respond, or fail.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use triva_core::{Error, Middleware, Next, Request, Response};
///
/// struct RequireApiKey;
///
/// #[async_trait]
/// impl Middleware for RequireApiKey {
///     async fn handle(&self, req: &mut Request, res: &mut Response, next: Next) -> Result<(), Error> {
///         if req.header("x-api-key").is_some() {
///             next.proceed();
///             Ok(())
///         } else {
///             res.status(401).json(&serde_json::json!({"error": "unauthorized"}))
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, req: &mut Request, res: &mut Response, next: Next)
    -> Result<(), Error>;

    /// Identifier used in logs and error records.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// The terminal stage of a route. It must perform a terminal action on the
/// response or return an error.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, req: &mut Request, res: &mut Response) -> Result<(), Error>;
}

/// User error handler, run in registration order while the response is
/// still unsent.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle(&self, error: &Error, req: &mut Request, res: &mut Response)
    -> Result<(), Error>;
}

// ========== Closure adapters ==========

pub struct FnMiddleware<F> {
    name: String,
    f: F,
}

/// Wrap a closure as a named [`Middleware`].
///
/// ```
/// use triva_core::middleware_fn;
///
/// let log = middleware_fn("log", |req, _res, next| {
///     Box::pin(async move {
///         tracing::info!(path = %req.path, "incoming");
///         next.proceed();
///         Ok(())
///     })
/// });
/// ```
pub fn middleware_fn<F>(name: impl Into<String>, f: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response, Next) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync
        + 'static,
{
    FnMiddleware {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response, Next) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync
        + 'static,
{
    async fn handle(
        &self,
        req: &mut Request,
        res: &mut Response,
        next: Next,
    ) -> Result<(), Error> {
        (self.f)(req, res, next).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub struct FnHandler<F> {
    f: F,
}

/// Wrap a closure as a route [`Handler`].
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync
        + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync
        + 'static,
{
    async fn call(&self, req: &mut Request, res: &mut Response) -> Result<(), Error> {
        (self.f)(req, res).await
    }
}

pub struct FnErrorHandler<F> {
    f: F,
}

/// Wrap a closure as an [`ErrorHandler`].
pub fn error_handler_fn<F>(f: F) -> FnErrorHandler<F>
where
    F: for<'a> Fn(&'a Error, &'a mut Request, &'a mut Response) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync
        + 'static,
{
    FnErrorHandler { f }
}

#[async_trait]
impl<F> ErrorHandler for FnErrorHandler<F>
where
    F: for<'a> Fn(&'a Error, &'a mut Request, &'a mut Response) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync
        + 'static,
{
    async fn handle(
        &self,
        error: &Error,
        req: &mut Request,
        res: &mut Response,
    ) -> Result<(), Error> {
        (self.f)(error, req, res).await
    }
}
