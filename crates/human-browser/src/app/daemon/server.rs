//! Daemon HTTP API: `POST /v1/command` and the `/bridge` WebSocket.

use std::net::SocketAddr;
use std::net::ToSocketAddrs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::Query;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use chrono::Utc;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::adapters::rpc::ApiResponse;
use crate::adapters::rpc::CommandRequest;
use crate::adapters::rpc::TOKEN_HEADER;
use crate::app::daemon::bridge_socket::bridge_handler;
use crate::app::daemon::error::DaemonServerError;
use crate::common::ErrorCategory;
use crate::common::ErrorCode;
use crate::domain::SnapshotRegistry;
use crate::domain::StructuredError;
use crate::infra::bridge::BridgeManager;
use crate::infra::config::ALLOW_REMOTE_ENV;
use crate::infra::config::DaemonConfig;
use crate::infra::state_file::DaemonStateFile;
use crate::infra::state_file::remove_state_file;
use crate::infra::state_file::write_state_file;
use crate::usecases::CommandRouter;
use crate::usecases::RouterConfig;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) struct DaemonState {
    pub router: CommandRouter,
    pub bridge: Arc<BridgeManager>,
    pub token: Option<String>,
    pub hello_timeout: Duration,
    pub shutdown_rx: watch::Receiver<bool>,
}

#[derive(Deserialize)]
pub(crate) struct TokenQuery {
    pub token: Option<String>,
}

/// A running daemon; dropping it without [`DaemonHandle::shutdown`] leaves
/// the server task running until the runtime stops.
pub struct DaemonHandle {
    local_addr: SocketAddr,
    state_file: DaemonStateFile,
    state_path: PathBuf,
    bridge: Arc<BridgeManager>,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl DaemonHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn http_url(&self) -> &str {
        &self.state_file.http_url
    }

    pub fn bridge_url(&self) -> &str {
        &self.state_file.bridge_url
    }

    pub fn state_file(&self) -> &DaemonStateFile {
        &self.state_file
    }

    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        self.bridge.shutdown("daemon shutting down");
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut self.join).await {
            Ok(Err(err)) => error!(error = %err, "Daemon server task failed"),
            Ok(Ok(())) => {}
            Err(_) => {
                warn!(
                    timeout_ms = SHUTDOWN_TIMEOUT.as_millis() as u64,
                    "Daemon shutdown timed out; aborting"
                );
                self.join.abort();
            }
        }
        remove_state_file(&self.state_path);
        info!("Daemon stopped");
    }
}

/// Binds, writes the state file, and starts serving in a background task.
pub async fn serve(config: DaemonConfig) -> Result<DaemonHandle, DaemonServerError> {
    let listener = bind_listener(&config)?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| DaemonServerError::Io {
            operation: "read local address",
            source,
        })?;

    let state_file = DaemonStateFile {
        pid: std::process::id(),
        http_url: format_url("http", &local_addr, ""),
        bridge_url: format_url("ws", &local_addr, "/bridge"),
        listen: local_addr.to_string(),
        token: config.token().map(str::to_string),
        started_at: Utc::now(),
    };
    if let Err(err) = write_state_file(config.state_path(), &state_file) {
        warn!(error = %err, path = %config.state_path().display(), "Failed to write daemon state file");
    }

    let bridge = Arc::new(BridgeManager::new(config.max_events()));
    let router = CommandRouter::new(
        bridge.clone(),
        SnapshotRegistry::new(config.max_snapshots()),
        RouterConfig::new(config.diff_dir()).with_bridge_url(state_file.bridge_url.clone()),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = Arc::new(DaemonState {
        router,
        bridge: bridge.clone(),
        token: config.token().map(str::to_string),
        hello_timeout: config.hello_timeout(),
        shutdown_rx: shutdown_rx.clone(),
    });

    let app = build_router(state);
    let mut server_shutdown = shutdown_rx;
    let join = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = server_shutdown.changed().await;
        });
        if let Err(err) = server.await {
            error!(error = %err, "Daemon server failed");
        }
    });
    info!(http_url = %state_file.http_url, bridge_url = %state_file.bridge_url, "Daemon listening");

    Ok(DaemonHandle {
        local_addr,
        state_file,
        state_path: config.state_path().clone(),
        bridge,
        shutdown_tx,
        join,
    })
}

fn build_router(state: Arc<DaemonState>) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    axum::Router::new()
        .route("/v1/command", post(command_handler))
        .route("/bridge", get(bridge_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn command_handler(
    State(state): State<Arc<DaemonState>>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    body: Result<Json<CommandRequest>, JsonRejection>,
) -> Response {
    if let Err(resp) = require_auth(&state, &headers, query.token.as_deref()) {
        return *resp;
    }
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return error_response(StructuredError::bad_request(format!(
                "Invalid command request: {}",
                rejection.body_text()
            )));
        }
    };

    match state.router.route(request).await {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) fn require_auth(
    state: &DaemonState,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<(), Box<Response>> {
    let Some(expected) = state.token.as_deref() else {
        return Ok(());
    };
    let header_token = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());
    let bearer_token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(str::trim);
    let candidate = query_token.or(header_token).or(bearer_token);

    if candidate == Some(expected) {
        Ok(())
    } else {
        Err(Box::new(error_response(StructuredError::new(
            ErrorCode::Unauthorized,
            "invalid token",
        ))))
    }
}

pub(crate) fn error_response(err: StructuredError) -> Response {
    (http_status(&err), Json(ApiResponse::failure(err))).into_response()
}

fn http_status(err: &StructuredError) -> StatusCode {
    match err.category() {
        ErrorCategory::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        ErrorCategory::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCategory::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCategory::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCategory::External => StatusCode::BAD_GATEWAY,
        ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn bind_listener(config: &DaemonConfig) -> Result<TcpListener, DaemonServerError> {
    let mut addrs =
        config
            .listen()
            .to_socket_addrs()
            .map_err(|e| DaemonServerError::InvalidListen {
                message: e.to_string(),
            })?;
    let addr = addrs.next().ok_or_else(|| DaemonServerError::InvalidListen {
        message: "no resolved address".to_string(),
    })?;

    if !config.allow_remote() && !addr.ip().is_loopback() {
        return Err(DaemonServerError::InvalidListen {
            message: format!("refusing to bind non-loopback address without {ALLOW_REMOTE_ENV}=1"),
        });
    }

    let listener = std::net::TcpListener::bind(addr).map_err(|source| DaemonServerError::Io {
        operation: "bind",
        source,
    })?;
    listener
        .set_nonblocking(true)
        .map_err(|source| DaemonServerError::Io {
            operation: "set non-blocking",
            source,
        })?;
    TcpListener::from_std(listener).map_err(|source| DaemonServerError::Io {
        operation: "create async listener",
        source,
    })
}

fn format_url(scheme: &str, addr: &SocketAddr, path: &str) -> String {
    let host = match addr.ip() {
        std::net::IpAddr::V4(ip) => ip.to_string(),
        std::net::IpAddr::V6(ip) => format!("[{ip}]"),
    };
    format!("{scheme}://{host}:{}{path}", addr.port())
}
