//! # Triva Core
//!
//! Request-processing engine of the Triva framework: the HTTP/1.1 (and TLS)
//! listener, the ordered route table, and the pipeline executor that drives
//! built-in stages, user middleware and route handlers for every request.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use triva_core::{HttpMethod, Listener, Pipeline, handler_fn};
//!
//! # async fn run() -> Result<(), triva_core::Error> {
//! let mut pipeline = Pipeline::default();
//! pipeline.route(
//!     HttpMethod::GET,
//!     "/users/:id",
//!     vec![],
//!     Arc::new(handler_fn(|req, res| {
//!         Box::pin(async move {
//!             let id = req.param("id").unwrap_or_default().to_string();
//!             res.json(&serde_json::json!({ "userId": id }))
//!         })
//!     })),
//! )?;
//!
//! let handle = Listener::new(Arc::new(pipeline)).start("127.0.0.1", 3000).await?;
//! triva_core::shutdown_signal().await;
//! handle.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod abandon;
pub mod client_ip;
pub mod error;
pub mod extensions;
pub mod headers;
pub mod method;
pub mod middleware;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod routing;
pub mod server;
pub mod shutdown;
pub mod tls;

pub use abandon::{AbandonReason, Abandonment};
pub use client_ip::client_ip;
pub use error::{Error, ErrorKind};
pub use extensions::Extensions;
pub use headers::Headers;
pub use method::{HttpMethod, RouteMethod};
pub use middleware::{
    ErrorHandler, Handler, Middleware, Next, error_handler_fn, handler_fn, middleware_fn,
};
pub use pipeline::{
    Completion, ErrorReport, ErrorReporter, Phase, Pipeline, PipelineHook, PipelineOptions,
    REQUEST_ID_HEADER, RequestSnapshot,
};
pub use request::{ParsedBody, Request};
pub use response::Response;
pub use routing::{RouteMatch, RoutePattern, RouteTable};
pub use server::{DEFAULT_MAX_BODY_BYTES, Listener, ServerHandle, ServerOptions};
pub use shutdown::shutdown_signal;
pub use tls::TlsConfig;

/// Boxed future type used by the closure adapters.
pub use futures::future::BoxFuture;
