//! Blocking HTTP client the CLI uses to reach the daemon.

use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::adapters::rpc::ApiResponse;
use crate::adapters::rpc::CommandRequest;
use crate::adapters::rpc::TOKEN_HEADER;
use crate::domain::StructuredError;
use crate::infra::config::DEFAULT_LISTEN;
use crate::infra::state_file::read_state_file;

/// Extra time the HTTP call gets beyond the command's own deadline.
const RESPONSE_GRACE: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Daemon is not reachable at {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Daemon did not answer within {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },

    #[error("Daemon request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response from daemon (HTTP {status}): {message}")]
    InvalidResponse { status: u16, message: String },

    #[error(transparent)]
    Command(StructuredError),
}

impl From<ClientError> for StructuredError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Command(inner) => inner,
            ClientError::Unreachable { ref url, .. } => {
                StructuredError::disconnected(err.to_string())
                    .with_details(json!({ "url": url }))
                    .with_recovery(json!({ "next_command": "human-browser daemon" }))
            }
            ClientError::TimedOut { timeout_ms } => StructuredError::timeout(err.to_string())
                .with_details(json!({ "stage": "http", "timeout_ms": timeout_ms })),
            ClientError::Http(_) | ClientError::InvalidResponse { .. } => {
                StructuredError::internal(err.to_string())
            }
        }
    }
}

/// Where the daemon listens and the token it expects.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientEndpoint {
    base_url: String,
    token: Option<String>,
}

impl ClientEndpoint {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("none")),
        }
    }

    /// Explicit values win; the daemon state file fills whatever is missing.
    pub fn resolve(url: Option<String>, token: Option<String>, state_path: &Path) -> Self {
        let state = read_state_file(state_path).ok();
        let base_url = url
            .or_else(|| state.as_ref().map(|s| s.http_url.clone()))
            .unwrap_or_else(|| format!("http://{DEFAULT_LISTEN}"));
        let token = token.or_else(|| state.and_then(|s| s.token));
        Self::new(base_url, token)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Sends one command request and returns the daemon's `data` payload.
pub trait DaemonClient {
    fn send(&self, request: &CommandRequest) -> Result<Value, ClientError>;
}

pub struct HttpDaemonClient {
    endpoint: ClientEndpoint,
    http: reqwest::blocking::Client,
}

impl HttpDaemonClient {
    pub fn new(endpoint: ClientEndpoint) -> Result<Self, ClientError> {
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { endpoint, http })
    }

    pub fn endpoint(&self) -> &ClientEndpoint {
        &self.endpoint
    }
}

impl DaemonClient for HttpDaemonClient {
    fn send(&self, request: &CommandRequest) -> Result<Value, ClientError> {
        let url = format!("{}/v1/command", self.endpoint.base_url);
        debug!(url = %url, command = %request.command, "Sending command to daemon");

        let mut builder = self
            .http
            .post(&url)
            .timeout(Duration::from_millis(request.timeout_ms) + RESPONSE_GRACE)
            .json(request);
        if let Some(token) = self.endpoint.token() {
            builder = builder.header(TOKEN_HEADER, token);
        }

        let response = builder.send().map_err(|source| {
            if source.is_connect() {
                ClientError::Unreachable {
                    url: self.endpoint.base_url.clone(),
                    source,
                }
            } else if source.is_timeout() {
                ClientError::TimedOut {
                    timeout_ms: request.timeout_ms,
                }
            } else {
                ClientError::Http(source)
            }
        })?;

        let status = response.status().as_u16();
        let body: ApiResponse = response
            .json()
            .map_err(|err| ClientError::InvalidResponse {
                status,
                message: err.to_string(),
            })?;
        body.into_result().map_err(ClientError::Command)
    }
}
