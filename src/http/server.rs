//! HTTP server shell.
//!
//! # Responsibilities
//! - Bind host/port, optionally with TLS
//! - Wire up middleware (tracing, request id, limits, timeout)
//! - Bound concurrent requests by the configured max threads
//! - Dispatch requests to `HttpHandler::handle`
//! - Gate and hand off websocket upgrades
//! - Issue session cookies and sweep expired sessions
//! - Shut down gracefully on the shutdown broadcast

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, ConnectInfo, DefaultBodyLimit, FromRequestParts, State},
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{validate_config, ConfigError, ServerConfig, TlsConfig};
use crate::http::request::RequestContext;
use crate::http::session::SessionStore;
use crate::http::{tls, Cookie, HttpError, HttpHandler, HttpServerRequest, HttpServerResponse};
use crate::lifecycle::{shutdown, signals, Shutdown};
use crate::observability::metrics;
use crate::websocket::{run_connection, ConnectionInfo};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS setup failed: {0}")]
    Tls(#[source] std::io::Error),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// State shared by every request.
struct AppState<H> {
    handler: Arc<H>,
    config: Arc<ServerConfig>,
    sessions: SessionStore,
    limiter: Option<Arc<Semaphore>>,
    shutdown: Shutdown,
    local_addr: SocketAddr,
    secure: bool,
}

impl<H> Clone for AppState<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            config: Arc::clone(&self.config),
            sessions: self.sessions.clone(),
            limiter: self.limiter.clone(),
            shutdown: self.shutdown.clone(),
            local_addr: self.local_addr,
            secure: self.secure,
        }
    }
}

/// Embedded HTTP server dispatching to an [`HttpHandler`].
pub struct HttpServer<H> {
    config: ServerConfig,
    handler: Arc<H>,
    sessions: SessionStore,
}

impl<H: HttpHandler> HttpServer<H> {
    /// Server listening on `host:port` with default settings.
    pub fn new(host: &str, port: u16, handler: H) -> Self {
        let mut config = ServerConfig::default();
        config.listener.host = host.to_string();
        config.listener.port = port;
        Self::with_config(config, handler)
    }

    pub fn with_config(config: ServerConfig, handler: H) -> Self {
        let sessions = SessionStore::new(config.session.max_inactive_secs);
        Self {
            config,
            handler: Arc::new(handler),
            sessions,
        }
    }

    /// Bound concurrent requests by `max` (0 = unbounded) and size the
    /// runtime built by [`start_blocking`](Self::start_blocking) by `min`.
    ///
    /// Unless `max` is 0 it must not be below `min`; a violation fails
    /// when the server starts.
    pub fn set_threads(&mut self, max: usize, min: usize) -> &mut Self {
        self.config.threads.max = max;
        self.config.threads.min = min;
        self
    }

    /// Serve HTTPS with a PEM certificate chain and private key.
    pub fn set_ssl(&mut self, cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> &mut Self {
        self.config.listener.tls = Some(TlsConfig {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        });
        self
    }

    /// Cap how long in-flight requests may finish after shutdown fires.
    /// `Duration::ZERO` waits for every request.
    pub fn set_shutdown_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.config.limits.shutdown_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Accept websocket upgrade requests.
    pub fn set_ws(&mut self) -> &mut Self {
        self.config.websocket.enabled = true;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(&self, local_addr: SocketAddr, shutdown: &Shutdown) -> Router {
        let limiter = match self.config.threads.max {
            0 => None,
            max => Some(Arc::new(Semaphore::new(max))),
        };
        let state = AppState {
            handler: Arc::clone(&self.handler),
            config: Arc::new(self.config.clone()),
            sessions: self.sessions.clone(),
            limiter,
            shutdown: shutdown.clone(),
            local_addr,
            secure: self.config.listener.tls.is_some(),
        };
        let limits = &self.config.limits;

        Router::new()
            .fallback(dispatch::<H>)
            .with_state(state)
            .layer(DefaultBodyLimit::max(limits.max_body_bytes))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(RequestBodyLimitLayer::new(limits.max_body_bytes))
                    // Innermost: `Timeout` needs a response body with `Default`.
                    .layer(TimeoutLayer::new(Duration::from_secs(limits.request_timeout_secs))),
            )
    }

    /// Serve on an already bound listener until `shutdown` fires.
    pub async fn serve(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), ServerError> {
        validate_config(&self.config).map_err(ConfigError::Validation)?;

        let local_addr = listener.local_addr()?;
        let app = self
            .build_router(local_addr, &shutdown)
            .into_make_service_with_connect_info::<SocketAddr>();

        if self.config.session.sweep_interval_secs > 0 {
            tokio::spawn(self.sessions.clone().run_sweeper(
                Duration::from_secs(self.config.session.sweep_interval_secs),
                shutdown.subscribe(),
            ));
        }

        tracing::info!(
            address = %local_addr,
            tls = self.config.listener.tls.is_some(),
            websocket = self.config.websocket.enabled,
            max_threads = self.config.threads.max,
            "HTTP server starting"
        );

        let drain_timeout = match self.config.limits.shutdown_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        match &self.config.listener.tls {
            None => {
                let server = axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown::wait(shutdown.subscribe()))
                    .into_future();
                tokio::select! {
                    result = server => result?,
                    () = drain_deadline(shutdown.subscribe(), drain_timeout) => {
                        tracing::warn!(timeout = ?drain_timeout, "Drain timeout elapsed, abandoning in-flight requests");
                    }
                }
            }
            Some(tls_config) => {
                let rustls = tls::load_tls_config(&tls_config.cert_path, &tls_config.key_path)
                    .await
                    .map_err(ServerError::Tls)?;
                let handle = axum_server::Handle::new();
                let drain = handle.clone();
                let signal = shutdown.subscribe();
                tokio::spawn(async move {
                    shutdown::wait(signal).await;
                    drain.graceful_shutdown(drain_timeout);
                });
                axum_server::from_tcp_rustls(listener.into_std()?, rustls)
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Validate the configuration, bind and serve until `shutdown` fires.
    pub async fn start(self, shutdown: Shutdown) -> Result<(), ServerError> {
        validate_config(&self.config).map_err(ConfigError::Validation)?;

        let addr = self.config.listener.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await
    }

    /// Run on a dedicated runtime until SIGINT/SIGTERM.
    pub fn start_blocking(self) -> Result<(), ServerError> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        if self.config.threads.min > 0 {
            builder.worker_threads(self.config.threads.min);
        }
        let runtime = builder.enable_all().build()?;

        runtime.block_on(async move {
            let shutdown = Shutdown::new();
            signals::spawn_signal_listener(shutdown.clone());
            self.start(shutdown).await
        })
    }
}

/// Resolve `timeout` after shutdown fires; never without a timeout.
async fn drain_deadline(signal: tokio::sync::broadcast::Receiver<()>, timeout: Option<Duration>) {
    shutdown::wait(signal).await;
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

/// Single entry point for every request.
async fn dispatch<H: HttpHandler>(State(state): State<AppState<H>>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();

    let _permit = match &state.limiter {
        Some(limiter) => match Arc::clone(limiter).acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(_) => return (StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down").into_response(),
        },
        None => None,
    };

    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));
    let ctx = RequestContext {
        local_addr: state.local_addr,
        remote_addr,
        secure: state.secure,
        sessions: state.sessions.clone(),
        session_cookie: state.config.session.cookie_name.clone(),
        default_locale: state.config.request.default_locale.clone(),
        max_body_bytes: state.config.limits.max_body_bytes,
    };

    let response = if state.config.websocket.enabled && is_websocket_upgrade(request.headers()) {
        upgrade(&state, request, ctx).await
    } else {
        handle_request(&state, request, ctx).await
    };

    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

async fn handle_request<H: HttpHandler>(state: &AppState<H>, request: Request<Body>, ctx: RequestContext) -> Response {
    let path = request.uri().path().to_string();
    let mut req = match HttpServerRequest::init(request, &path, ctx).await {
        Ok(req) => req,
        Err(e) => return reject_malformed(&path, e),
    };
    let mut res = HttpServerResponse::new();

    match state.handler.handle(&mut req, &mut res).await {
        Ok(()) => {
            attach_session_cookie(&req, &mut res);
            res.into_response()
        }
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Handler failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

async fn upgrade<H: HttpHandler>(state: &AppState<H>, request: Request<Body>, ctx: RequestContext) -> Response {
    let (mut parts, body) = request.into_parts();
    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, state).await {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    let protocol_version = parts
        .headers
        .get(header::SEC_WEBSOCKET_VERSION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("13")
        .to_string();

    let path = parts.uri.path().to_string();
    let req = match HttpServerRequest::init(Request::from_parts(parts, body), &path, ctx).await {
        Ok(req) => req,
        Err(e) => return reject_malformed(&path, e),
    };

    let mut res = HttpServerResponse::new();
    if !state.handler.on_accept(&req, &mut res) {
        tracing::debug!(path = %path, "Websocket upgrade refused by on_accept");
        let mut response = res.into_response();
        if response.status() == StatusCode::OK {
            *response.status_mut() = StatusCode::FORBIDDEN;
        }
        return response;
    }

    let Some(handler) = state.handler.on_handle(&path) else {
        tracing::debug!(path = %path, "No websocket handler for target");
        return (StatusCode::SERVICE_UNAVAILABLE, "No websocket handler for this target").into_response();
    };

    let info = ConnectionInfo {
        local_addr: req.local_addr(),
        remote_addr: req.remote_addr(),
        secure: req.is_secure(),
        protocol_version,
        cookies: req.cookies().to_vec(),
        idle_timeout_ms: state.config.websocket.idle_timeout_ms,
    };
    let shutdown = state.shutdown.subscribe();

    ws.max_message_size(state.config.websocket.max_message_bytes)
        .on_failed_upgrade(|e| tracing::warn!(error = %e, "Websocket upgrade failed"))
        .on_upgrade(move |socket| run_connection(socket, handler, info, shutdown))
}

fn reject_malformed(path: &str, error: HttpError) -> Response {
    tracing::warn!(path = %path, error = %error, "Malformed request");
    (StatusCode::BAD_REQUEST, error.to_string()).into_response()
}

/// Issue the cookie for a session created during this request.
fn attach_session_cookie(req: &HttpServerRequest, res: &mut HttpServerResponse) {
    if let Some(session) = req.created_session() {
        res.push_cookie(Cookie {
            path: "/".to_string(),
            http_only: true,
            secure: req.is_secure(),
            ..Cookie::new(req.session_cookie_name(), session.id())
        });
    }
}

/// `Connection: upgrade` plus `Upgrade: websocket`.
fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    let upgrade_websocket = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"));
    connection_upgrade && upgrade_websocket
}
