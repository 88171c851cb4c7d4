use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::domain::AgentCommand;
use crate::domain::QueueMode;
use crate::domain::StructuredError;

/// `disconnected -> connecting -> connected`, driven by socket events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Read-only view of the bridge for `status` and `diagnose`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BridgeStatus {
    pub connected: bool,
    pub phase: LinkPhase,
    pub connection_id: Option<u64>,
    pub agent_version: Option<String>,
    pub retry_count: u64,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_ping_at: Option<DateTime<Utc>>,
    pub last_disconnect_reason: Option<String>,
    pub pending: usize,
    pub queued: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeEvent {
    pub at: DateTime<Utc>,
    pub kind: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub detail: Value,
}

/// Dispatches one command to the browser agent and awaits its result.
#[async_trait]
pub trait BridgePort: Send + Sync {
    /// Resolves with the agent's result, its structured error, `DISCONNECTED`
    /// (no connection under [`QueueMode::Fail`], or the connection dropped),
    /// or `TIMEOUT` once `timeout` elapses.
    async fn dispatch(
        &self,
        command: AgentCommand,
        payload: Value,
        mode: QueueMode,
        timeout: Duration,
    ) -> Result<Value, StructuredError>;

    fn status(&self) -> BridgeStatus;

    /// Most recent events, oldest first.
    fn recent_events(&self, limit: usize) -> Vec<BridgeEvent>;
}

pub type BridgeHandle = Arc<dyn BridgePort>;
