//! HTTP/1.1 listener with optional TLS and graceful shutdown.
//!
//! Each accepted connection runs in its own task and is served by hyper's
//! HTTP/1.1 connection driver, which handles keep-alive, `Content-Length`
//! and chunked framing and answers unparseable requests with 400 before any
//! of our code runs. Each request then runs the pipeline in a separate task
//! so a disconnecting client cannot cancel bookkeeping half-way.
//!
//! Shutdown: stop accepting, ask every connection to finish its current
//! request and close, wait up to the grace period, then abort whatever is
//! left.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::pipeline::REQUEST_ID_HEADER;
use crate::tls::TlsConfig;
use crate::{Abandonment, Error, HttpMethod, Pipeline, Request, Response};

/// Default request body limit (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub max_body_bytes: usize,
    pub shutdown_grace: Duration,
    pub keep_alive: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            shutdown_grace: Duration::from_secs(30),
            keep_alive: true,
        }
    }
}

pub struct Listener {
    pipeline: Arc<Pipeline>,
    options: ServerOptions,
    tls: Option<TlsConfig>,
}

impl Listener {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            options: ServerOptions::default(),
            tls: None,
        }
    }

    pub fn with_options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Bind `address:port` and start accepting in the background.
    ///
    /// Bind failures are returned; everything after that is per-connection
    /// and never stops the listener.
    pub async fn start(self, address: &str, port: u16) -> Result<ServerHandle, Error> {
        let listener = TcpListener::bind((address, port)).await?;
        let local_addr = listener.local_addr()?;
        let acceptor = self
            .tls
            .map(|tls| TlsAcceptor::from(Arc::clone(&tls.server_config)));

        info!(
            addr = %local_addr,
            protocol = if acceptor.is_some() { "https" } else { "http" },
            "listening"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(
            listener,
            acceptor,
            self.pipeline,
            self.options,
            stop_rx,
        ));

        Ok(ServerHandle {
            local_addr,
            stop_tx,
            task,
        })
    }
}

/// Handle to a running listener.
pub struct ServerHandle {
    local_addr: SocketAddr,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, drain connections within the grace period, and wait
    /// for the accept loop to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "listener task failed");
        }
    }
}

#[derive(Clone)]
struct ConnContext {
    pipeline: Arc<Pipeline>,
    max_body_bytes: usize,
    keep_alive: bool,
    drain: watch::Receiver<bool>,
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    pipeline: Arc<Pipeline>,
    options: ServerOptions,
    mut stop: watch::Receiver<bool>,
) {
    let (drain_tx, drain_rx) = watch::channel(false);
    let ctx = ConnContext {
        pipeline,
        max_body_bytes: options.max_body_bytes,
        keep_alive: options.keep_alive,
        drain: drain_rx,
    };
    let mut connections = JoinSet::new();
    let mut stoppable = true;

    loop {
        tokio::select! {
            biased;

            changed = stop.changed(), if stoppable => {
                if changed.is_ok() {
                    break;
                }
                // Handle dropped without stop(): keep serving.
                stoppable = false;
            }

            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let ctx = ctx.clone();
                match &acceptor {
                    Some(acceptor) => {
                        let acceptor = acceptor.clone();
                        connections.spawn(async move {
                            match acceptor.accept(stream).await {
                                Ok(tls_stream) => serve_connection(tls_stream, peer, ctx).await,
                                Err(e) => debug!(peer = %peer, error = %e, "TLS handshake failed"),
                            }
                        });
                    }
                    None => {
                        connections.spawn(serve_connection(stream, peer, ctx));
                    }
                }
            }

            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    info!(in_flight = connections.len(), "stopped accepting, draining connections");
    let _ = drain_tx.send(true);

    let drained = tokio::time::timeout(options.shutdown_grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        warn!(
            remaining = connections.len(),
            grace_ms = options.shutdown_grace.as_millis() as u64,
            "grace period elapsed, closing remaining connections"
        );
        connections.abort_all();
        while connections.join_next().await.is_some() {}
    }
    info!("listener stopped");
}

async fn serve_connection<I>(io: I, peer: SocketAddr, ctx: ConnContext)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ConnContext {
        pipeline,
        max_body_bytes,
        keep_alive,
        mut drain,
    } = ctx;

    let service = service_fn(move |req| {
        let pipeline = Arc::clone(&pipeline);
        async move { Ok::<_, Infallible>(respond(pipeline, req, peer, max_body_bytes).await) }
    });

    let conn = http1::Builder::new()
        .keep_alive(keep_alive)
        .serve_connection(TokioIo::new(io), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = drain.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    if let Err(e) = result {
        debug!(peer = %peer, error = %e, "connection closed with error");
    }
}

async fn respond(
    pipeline: Arc<Pipeline>,
    req: hyper::Request<Incoming>,
    peer: SocketAddr,
    max_body_bytes: usize,
) -> hyper::Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();

    let method = match parts.method.as_str().parse::<HttpMethod>() {
        Ok(method) => method,
        Err(e) => return reject(&e),
    };

    let declared = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    if declared.is_some_and(|len| len > max_body_bytes as u64) {
        return reject(&too_large(max_body_bytes));
    }

    let body = match Limited::new(body, max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return reject(&too_large(max_body_bytes));
        }
        Err(e) => {
            debug!(peer = %peer, error = %e, "failed to read request body");
            return reject(&Error::BadRequest("malformed request body".to_string()));
        }
    };

    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let mut request = Request::new(method, target)
        .with_body(body)
        .with_remote_addr(peer);
    for (name, value) in parts.headers.iter() {
        request
            .headers
            .append(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
    }

    let abandonment = Abandonment::new();
    let guard = abandonment.disconnect_guard();
    let task = tokio::spawn(async move { pipeline.handle(request, abandonment).await });

    let response = match task.await {
        Ok(response) => response,
        Err(e) => {
            error!(peer = %peer, error = %e, "pipeline task failed");
            guard.disarm();
            return reject(&Error::Internal("pipeline task failed".to_string()));
        }
    };
    guard.disarm();
    into_hyper(&response)
}

fn too_large(limit: usize) -> Error {
    Error::PayloadTooLarge(format!("request body exceeds {} bytes", limit))
}

/// Error response produced before a request reaches the pipeline.
fn reject(error: &Error) -> hyper::Response<Full<Bytes>> {
    let id = uuid::Uuid::new_v4().to_string();
    let body = error.to_body(&id, false).to_string();
    let mut out = hyper::Response::new(Full::new(Bytes::from(body)));
    *out.status_mut() =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    out.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(value) = HeaderValue::from_str(&id) {
        out.headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    out
}

fn into_hyper(res: &Response) -> hyper::Response<Full<Bytes>> {
    let body = res.body().clone();
    let body_len = body.len().to_string();
    let mut out = hyper::Response::new(Full::new(body));
    *out.status_mut() =
        StatusCode::from_u16(res.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    for (name, value) in res.headers().iter() {
        // hyper frames the body itself; only keep a length that agrees with it.
        if name == "content-length" && value.trim() != body_len {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                out.headers_mut().append(name, value);
            }
            _ => warn!(header = name, "dropping invalid response header"),
        }
    }
    out
}
