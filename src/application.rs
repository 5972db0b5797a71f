//! Application assembly: builder, registration API and run modes.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use triva_cache::{
    AdapterFactory, AdapterOptions, AdapterRegistry, Cache, CacheAdapter, CacheResult,
};
use triva_core::{
    BoxFuture, ErrorHandler, Extensions, Handler, HttpMethod, Listener, Middleware, Pipeline,
    Request, Response, RouteMethod, ServerHandle, TlsConfig, shutdown_signal,
};
use triva_log::{LogConfig, LogError, WorkerGuard};
use triva_ratelimit::{Throttle, ThrottleMiddleware};
use triva_retention::{ErrorTracker, Retention};
use triva_useragent::{Destination, RedirectConfig, RedirectMiddleware, RedirectRule, Redirector};

use crate::config::{Protocol, TrivaConfig, Validate};
use crate::error::{ConfigError, Result};

enum Logging {
    Off,
    FromEnv,
    Explicit(LogConfig),
}

/// Collects configuration and programmatic extensions, then builds a
/// [`Triva`] application.
///
/// ```no_run
/// use triva::{Triva, TrivaConfig};
///
/// # async fn run() -> triva::Result<()> {
/// let mut app = Triva::builder()
///     .config(TrivaConfig::default())
///     .with_logging()
///     .build()
///     .await?;
/// app.get("/health", triva::handler_fn(|_req, res| {
///     Box::pin(async move { res.json(&serde_json::json!({ "status": "ok" })) })
/// }))?;
/// app.listen("0.0.0.0", 3000).await
/// # }
/// ```
pub struct TrivaBuilder {
    config: Option<TrivaConfig>,
    config_file: Option<PathBuf>,
    redirect_rules: Vec<RedirectRule>,
    redirect_destination: Option<Destination>,
    adapters: Vec<(String, AdapterFactory)>,
    state: Extensions,
    logging: Logging,
}

impl Default for TrivaBuilder {
    fn default() -> Self {
        Self {
            config: None,
            config_file: None,
            redirect_rules: Vec::new(),
            redirect_destination: None,
            adapters: Vec::new(),
            state: Extensions::new(),
            logging: Logging::Off,
        }
    }
}

impl TrivaBuilder {
    pub fn config(mut self, config: TrivaConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the configuration from a `.json` or `.toml` file at build time.
    /// Takes precedence over [`TrivaBuilder::config`].
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Add a custom redirect rule, evaluated before the category switches.
    pub fn redirect_rule(mut self, rule: RedirectRule) -> Self {
        self.redirect_rules.push(rule);
        self
    }

    /// Replace the configured redirect destination, typically with
    /// [`Destination::dynamic`].
    pub fn redirect_destination(mut self, destination: impl Into<Destination>) -> Self {
        self.redirect_destination = Some(destination.into());
        self
    }

    /// Make an extra cache adapter available under `name`.
    pub fn cache_adapter<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(AdapterOptions) -> BoxFuture<'static, CacheResult<Arc<dyn CacheAdapter>>>
            + Send
            + Sync
            + 'static,
    {
        self.adapters.push((name.into(), Arc::new(factory)));
        self
    }

    /// Shared state visible to every request through `req.extensions`.
    pub fn state<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.state.insert(value);
        self
    }

    /// Install the tracing subscriber using the environment defaults and
    /// `TRIVA_*` overrides.
    pub fn with_logging(mut self) -> Self {
        self.logging = Logging::FromEnv;
        self
    }

    pub fn log_config(mut self, config: LogConfig) -> Self {
        self.logging = Logging::Explicit(config);
        self
    }

    pub async fn build(self) -> Result<Triva> {
        let mut config = match &self.config_file {
            Some(path) => TrivaConfig::from_file(path)?,
            None => self.config.unwrap_or_default(),
        };

        let registry = AdapterRegistry::global();
        for (name, factory) in self.adapters {
            registry.register(name, move |options| factory(options));
        }

        if !self.redirect_rules.is_empty() || self.redirect_destination.is_some() {
            let redirects = config.redirects.get_or_insert_with(|| RedirectConfig {
                enabled: true,
                ..RedirectConfig::default()
            });
            if let Some(destination) = self.redirect_destination {
                redirects.destination = destination;
            }
            if !redirects.enabled {
                warn!(
                    rules = self.redirect_rules.len(),
                    "redirect rules registered but redirects are disabled"
                );
            }
            redirects.custom_rules.extend(self.redirect_rules);
        }

        config.validate()?;

        let log_guard = match self.logging {
            Logging::Off => None,
            Logging::FromEnv => install_logging(
                config
                    .env
                    .log_config()
                    .apply_overrides(|name| std::env::var(name).ok()),
            ),
            Logging::Explicit(log) => install_logging(log),
        }
        .transpose()?;

        let config = Arc::new(config);
        Triva::assemble(config, self.state, log_guard).await
    }
}

fn install_logging(config: LogConfig) -> Option<std::result::Result<WorkerGuard, LogError>> {
    match config.init() {
        Err(LogError::AlreadyInitialized(reason)) => {
            warn!(%reason, "subscriber already installed, keeping it");
            None
        }
        other => Some(other),
    }
}

/// A built application: committed configuration, instantiated components
/// and the pipeline that routes and middleware are registered on.
pub struct Triva {
    config: Arc<TrivaConfig>,
    pipeline: Pipeline,
    cache: Cache,
    throttle: Option<Arc<Throttle>>,
    retention: Option<Arc<Retention>>,
    errors: Option<Arc<ErrorTracker>>,
    log_guard: Option<WorkerGuard>,
}

impl Triva {
    pub fn builder() -> TrivaBuilder {
        TrivaBuilder::default()
    }

    async fn assemble(
        config: Arc<TrivaConfig>,
        state: Extensions,
        log_guard: Option<WorkerGuard>,
    ) -> Result<Self> {
        let cache = Cache::from_config(&config.cache).await?;
        let mut pipeline = Pipeline::new(config.server.pipeline_options(config.env));

        if let Some(redirects) = config.redirects.as_ref().filter(|r| r.enabled) {
            let redirector = Redirector::new(redirects.clone()).map_err(ConfigError::from)?;
            pipeline.add_builtin(Arc::new(RedirectMiddleware::new(redirector)));
        }

        let throttle = match &config.throttle {
            Some(throttle) => {
                let throttle = Arc::new(Throttle::new(throttle.clone()).map_err(ConfigError::from)?);
                pipeline.add_builtin(Arc::new(ThrottleMiddleware::new(Arc::clone(&throttle))));
                pipeline.state_mut().insert_arc(Arc::clone(&throttle));
                Some(throttle)
            }
            None => None,
        };

        let retention = if config.retention.enabled {
            let retention = Arc::new(Retention::new(config.retention.clone())?);
            pipeline.add_hook(retention.clone());
            pipeline.state_mut().insert_arc(Arc::clone(&retention));
            Some(retention)
        } else {
            None
        };

        let errors = if config.error_tracking.enabled {
            let errors = Arc::new(ErrorTracker::new(config.error_tracking.clone())?);
            pipeline.add_reporter(errors.clone());
            pipeline.state_mut().insert_arc(Arc::clone(&errors));
            Some(errors)
        } else {
            None
        };

        pipeline.state_mut().insert(cache.clone());
        pipeline.state_mut().insert_arc(Arc::clone(&config));
        pipeline.state_mut().merge_missing(&state);

        info!(
            env = ?config.env,
            cache = cache.adapter().name(),
            redirects = config.redirects.as_ref().is_some_and(|r| r.enabled),
            throttle = throttle.is_some(),
            retention = retention.is_some(),
            error_tracking = errors.is_some(),
            "application built"
        );

        Ok(Self {
            config,
            pipeline,
            cache,
            throttle,
            retention,
            errors,
            log_guard,
        })
    }

    pub fn config(&self) -> &TrivaConfig {
        &self.config
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn throttle(&self) -> Option<&Arc<Throttle>> {
        self.throttle.as_ref()
    }

    pub fn retention(&self) -> Option<&Arc<Retention>> {
        self.retention.as_ref()
    }

    pub fn error_tracker(&self) -> Option<&Arc<ErrorTracker>> {
        self.errors.as_ref()
    }

    // ========== Registration ==========

    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        self.pipeline.use_middleware(Arc::new(middleware));
        self
    }

    pub fn on_error<E: ErrorHandler + 'static>(&mut self, handler: E) -> &mut Self {
        self.pipeline.on_error(Arc::new(handler));
        self
    }

    /// Register a route with its own middleware chain.
    pub fn route<H: Handler + 'static>(
        &mut self,
        method: impl Into<RouteMethod>,
        pattern: &str,
        middleware: Vec<Arc<dyn Middleware>>,
        handler: H,
    ) -> Result<&mut Self> {
        let method = method.into();
        debug!(?method, pattern, "registering route");
        self.pipeline
            .route(method, pattern, middleware, Arc::new(handler))?;
        Ok(self)
    }

    pub fn get<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> Result<&mut Self> {
        self.route(HttpMethod::GET, pattern, Vec::new(), handler)
    }

    pub fn post<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> Result<&mut Self> {
        self.route(HttpMethod::POST, pattern, Vec::new(), handler)
    }

    pub fn put<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> Result<&mut Self> {
        self.route(HttpMethod::PUT, pattern, Vec::new(), handler)
    }

    pub fn delete<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> Result<&mut Self> {
        self.route(HttpMethod::DELETE, pattern, Vec::new(), handler)
    }

    pub fn patch<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> Result<&mut Self> {
        self.route(HttpMethod::PATCH, pattern, Vec::new(), handler)
    }

    pub fn options<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> Result<&mut Self> {
        self.route(HttpMethod::OPTIONS, pattern, Vec::new(), handler)
    }

    pub fn head<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> Result<&mut Self> {
        self.route(HttpMethod::HEAD, pattern, Vec::new(), handler)
    }

    pub fn any<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> Result<&mut Self> {
        self.route(RouteMethod::Any, pattern, Vec::new(), handler)
    }

    // ========== Running ==========

    /// Run one request through the pipeline without a socket.
    pub async fn dispatch(&self, req: Request) -> Response {
        self.pipeline.dispatch(req).await
    }

    /// Bind and serve in the background.
    pub async fn start(self, address: &str, port: u16) -> Result<TrivaHandle> {
        let Triva {
            config,
            pipeline,
            cache,
            throttle,
            retention,
            errors,
            log_guard,
        } = self;

        let mut listener =
            Listener::new(Arc::new(pipeline)).with_options(config.server.listener_options());
        if config.protocol == Protocol::Https {
            let ssl = config
                .ssl
                .as_ref()
                .ok_or_else(|| ConfigError::invalid("ssl", "missing for https"))?;
            listener = listener.with_tls(TlsConfig::from_pem_files(
                &ssl.cert,
                &ssl.key,
                ssl.ca.as_deref(),
            )?);
        }
        let server = listener.start(address, port).await?;

        let mut tasks = vec![cache.spawn_sweeper(config.cache.sweep_interval())];
        if let Some(throttle) = &throttle {
            tasks.push(throttle.spawn_cleanup());
        }

        Ok(TrivaHandle {
            server,
            cache,
            retention,
            errors,
            tasks,
            _log_guard: log_guard,
        })
    }

    /// Serve until SIGINT/SIGTERM, then drain and flush.
    pub async fn listen(self, address: &str, port: u16) -> Result<()> {
        let handle = self.start(address, port).await?;
        shutdown_signal().await;
        info!("shutdown signal received");
        handle.stop().await
    }
}

/// A running application.
pub struct TrivaHandle {
    server: ServerHandle,
    cache: Cache,
    retention: Option<Arc<Retention>>,
    errors: Option<Arc<ErrorTracker>>,
    tasks: Vec<JoinHandle<()>>,
    _log_guard: Option<WorkerGuard>,
}

impl TrivaHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn retention(&self) -> Option<&Arc<Retention>> {
        self.retention.as_ref()
    }

    pub fn error_tracker(&self) -> Option<&Arc<ErrorTracker>> {
        self.errors.as_ref()
    }

    /// Stop accepting, drain in-flight requests within the grace period,
    /// stop background tasks and flush records to their export paths.
    pub async fn stop(self) -> Result<()> {
        self.server.stop().await;
        for task in &self.tasks {
            task.abort();
        }

        if let Some(retention) = &self.retention
            && let Some(written) = retention.flush().await?
        {
            info!(records = written, "retention exported");
        }
        if let Some(errors) = &self.errors
            && let Some(written) = errors.flush().await?
        {
            info!(records = written, "error records exported");
        }
        info!("server stopped");
        Ok(())
    }
}
