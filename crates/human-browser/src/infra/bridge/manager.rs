//! Single agent connection, pending-command correlation, and the hold queue.
//!
//! All mutable state sits behind one mutex so that connect, flush, dispatch,
//! completion, timeout and disconnect never interleave. Each dispatch owns a
//! `oneshot` receiver; whoever removes the request's entry from the queue or
//! the pending map is the only party allowed to answer it.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde_json::Value;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::adapters::bridge_protocol::InboundFrame;
use crate::adapters::bridge_protocol::OutboundFrame;
use crate::adapters::bridge_protocol::result_outcome;
use crate::common::mutex_lock_or_recover;
use crate::domain::AgentCommand;
use crate::domain::QueueMode;
use crate::domain::StructuredError;
use crate::infra::bridge::events::EventLog;
use crate::usecases::ports::BridgeEvent;
use crate::usecases::ports::BridgePort;
use crate::usecases::ports::BridgeStatus;
use crate::usecases::ports::LinkPhase;

pub type ConnectionId = u64;
pub type OutboundSender = mpsc::UnboundedSender<OutboundFrame>;

type Reply = oneshot::Sender<Result<Value, StructuredError>>;

struct ActiveConnection {
    id: ConnectionId,
    outbound: OutboundSender,
    connected_at: DateTime<Utc>,
}

struct PendingCommand {
    command: AgentCommand,
    connection_id: ConnectionId,
    reply: Reply,
}

struct QueuedRequest {
    request_id: String,
    command: AgentCommand,
    payload: Value,
    deadline: Instant,
    timeout: Duration,
    reply: Reply,
}

struct BridgeState {
    phase: LinkPhase,
    connection: Option<ActiveConnection>,
    next_connection_id: ConnectionId,
    pending: HashMap<String, PendingCommand>,
    queued: VecDeque<QueuedRequest>,
    retry_count: u64,
    agent_version: Option<String>,
    last_ping_at: Option<DateTime<Utc>>,
    last_disconnect_reason: Option<String>,
    events: EventLog,
}

pub struct BridgeManager {
    state: Mutex<BridgeState>,
}

fn disconnected_error(command: AgentCommand, reason: &str) -> StructuredError {
    StructuredError::disconnected(format!("Browser agent is not connected ({reason})"))
        .with_details(json!({ "command": command.as_str() }))
        .with_recovery(json!({ "next_command": "human-browser reconnect" }))
}

fn timeout_error(
    command: AgentCommand,
    request_id: &str,
    stage: &str,
    timeout: Duration,
) -> StructuredError {
    StructuredError::timeout(format!("Timed out waiting for {command}"))
        .with_details(json!({
            "command": command.as_str(),
            "request_id": request_id,
            "stage": stage,
            "timeout_ms": timeout.as_millis() as u64,
        }))
}

/// Drops the caller's entry if its `dispatch` future goes away unanswered.
struct AbandonGuard<'a> {
    manager: &'a BridgeManager,
    request_id: &'a str,
    command: AgentCommand,
    armed: bool,
}

impl AbandonGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.manager.lock();
        if let Some(stage) = take_entry(&mut state, self.request_id) {
            debug!(request_id = self.request_id, command = %self.command, stage, "Caller went away");
            state.events.push(
                "abandoned",
                json!({ "request_id": self.request_id, "command": self.command.as_str(), "stage": stage }),
            );
        }
    }
}

/// Removes a request from the queue or the pending map; returns where it was.
fn take_entry(state: &mut BridgeState, request_id: &str) -> Option<&'static str> {
    if let Some(index) = state
        .queued
        .iter()
        .position(|queued| queued.request_id == request_id)
    {
        state.queued.remove(index);
        return Some("queued");
    }
    state.pending.remove(request_id).map(|_| "pending")
}

impl BridgeManager {
    pub fn new(max_events: usize) -> Self {
        Self {
            state: Mutex::new(BridgeState {
                phase: LinkPhase::Disconnected,
                connection: None,
                next_connection_id: 0,
                pending: HashMap::new(),
                queued: VecDeque::new(),
                retry_count: 0,
                agent_version: None,
                last_ping_at: None,
                last_disconnect_reason: None,
                events: EventLog::new(max_events),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BridgeState> {
        mutex_lock_or_recover(&self.state, "bridge_state")
    }

    /// A socket was accepted on `/bridge` and is awaiting `HELLO`.
    pub fn on_socket_open(&self) {
        let mut state = self.lock();
        if state.connection.is_none() {
            state.phase = LinkPhase::Connecting;
        }
        state.events.push("socket_open", Value::Null);
    }

    /// The socket closed or misbehaved before sending `HELLO`.
    pub fn on_handshake_failed(&self, reason: &str) {
        let mut state = self.lock();
        if state.connection.is_none() {
            state.phase = LinkPhase::Disconnected;
            state.last_disconnect_reason = Some(reason.to_string());
        }
        state.events.push("handshake_failed", json!({ "reason": reason }));
    }

    /// Installs a connection after its `HELLO` and flushes the hold queue.
    ///
    /// An existing connection is replaced: its in-flight commands fail with
    /// `DISCONNECTED` and its later close is ignored.
    pub fn on_hello(&self, version: &str, retry_count: u64, outbound: OutboundSender) -> ConnectionId {
        let mut state = self.lock();
        state.next_connection_id += 1;
        let id = state.next_connection_id;

        if let Some(previous) = state.connection.take() {
            let failed = fail_pending(&mut state, previous.id, "replaced by a newer connection");
            warn!(
                previous_connection_id = previous.id,
                connection_id = id,
                failed,
                "Replacing active agent connection"
            );
            state.events.push(
                "replaced",
                json!({ "previous_connection_id": previous.id, "failed": failed }),
            );
        }

        state.connection = Some(ActiveConnection {
            id,
            outbound: outbound.clone(),
            connected_at: Utc::now(),
        });
        state.phase = LinkPhase::Connected;
        state.retry_count = retry_count;
        state.agent_version = Some(version.to_string());
        info!(connection_id = id, version = %version, retry_count, "Agent connected");
        state.events.push(
            "connected",
            json!({ "connection_id": id, "version": version, "retry_count": retry_count }),
        );

        flush_queue(&mut state, id, &outbound);
        id
    }

    /// Handles one post-handshake frame; returns a frame to send back, if any.
    pub fn handle_frame(&self, connection_id: ConnectionId, frame: InboundFrame) -> Option<OutboundFrame> {
        match frame {
            InboundFrame::Ping { ts } => {
                self.lock().last_ping_at = Some(Utc::now());
                Some(OutboundFrame::Pong { ts })
            }
            InboundFrame::Pong { .. } => None,
            InboundFrame::Hello { .. } => {
                debug!(connection_id, "Ignoring repeated HELLO");
                None
            }
            InboundFrame::Result {
                request_id,
                ok,
                result,
                error,
            } => {
                let mut state = self.lock();
                match state.pending.remove(&request_id) {
                    Some(pending) => {
                        let outcome = result_outcome(ok, result, error);
                        debug!(
                            connection_id,
                            request_id = %request_id,
                            command = %pending.command,
                            ok = outcome.is_ok(),
                            "Agent command completed"
                        );
                        let _ = pending.reply.send(outcome);
                    }
                    None => {
                        debug!(connection_id, request_id = %request_id, "Discarding late or unknown result");
                        state
                            .events
                            .push("discarded_result", json!({ "request_id": request_id }));
                    }
                }
                None
            }
            InboundFrame::Event { name, payload } => {
                debug!(connection_id, name = %name, "Agent event");
                self.lock()
                    .events
                    .push("agent_event", json!({ "name": name, "payload": payload }));
                None
            }
        }
    }

    /// The socket for `connection_id` closed. Queued requests survive.
    pub fn on_disconnect(&self, connection_id: ConnectionId, reason: &str) {
        let mut state = self.lock();
        let failed = fail_pending(&mut state, connection_id, reason);
        let is_current = state
            .connection
            .as_ref()
            .is_some_and(|connection| connection.id == connection_id);
        if !is_current {
            debug!(connection_id, reason, "Ignoring close of a replaced connection");
            return;
        }

        state.connection = None;
        state.phase = LinkPhase::Disconnected;
        state.last_disconnect_reason = Some(reason.to_string());
        info!(connection_id, reason, failed, "Agent disconnected");
        state.events.push(
            "disconnected",
            json!({ "connection_id": connection_id, "reason": reason, "failed": failed }),
        );
    }

    /// Fails everything still waiting; used when the daemon stops.
    pub fn shutdown(&self, reason: &str) {
        let mut state = self.lock();
        let pending: Vec<_> = state.pending.drain().collect();
        for (_, entry) in pending {
            let _ = entry.reply.send(Err(disconnected_error(entry.command, reason)));
        }
        while let Some(queued) = state.queued.pop_front() {
            let _ = queued
                .reply
                .send(Err(disconnected_error(queued.command, reason)));
        }
        state.connection = None;
        state.phase = LinkPhase::Disconnected;
        state.last_disconnect_reason = Some(reason.to_string());
    }

    /// Resolves a caller whose deadline fired.
    fn expire(
        &self,
        request_id: &str,
        command: AgentCommand,
        timeout: Duration,
        rx: &mut oneshot::Receiver<Result<Value, StructuredError>>,
    ) -> Result<Value, StructuredError> {
        let mut state = self.lock();
        let Some(stage) = take_entry(&mut state, request_id) else {
            drop(state);
            // Answered between the deadline and taking the lock.
            return rx.try_recv().unwrap_or_else(|_| {
                Err(StructuredError::internal(
                    "Bridge dropped the request without a result",
                ))
            });
        };

        debug!(request_id, command = %command, stage, "Command timed out");
        state.events.push(
            "timeout",
            json!({ "request_id": request_id, "command": command.as_str(), "stage": stage }),
        );
        Err(timeout_error(command, request_id, stage, timeout))
    }
}

fn fail_pending(state: &mut BridgeState, connection_id: ConnectionId, reason: &str) -> usize {
    let owned: Vec<String> = state
        .pending
        .iter()
        .filter(|(_, pending)| pending.connection_id == connection_id)
        .map(|(request_id, _)| request_id.clone())
        .collect();
    for request_id in &owned {
        if let Some(pending) = state.pending.remove(request_id) {
            let err = StructuredError::disconnected(format!(
                "Agent connection closed before {} completed ({reason})",
                pending.command
            ))
            .with_details(json!({
                "command": pending.command.as_str(),
                "request_id": request_id,
            }))
            .with_recovery(json!({ "next_command": "human-browser reconnect" }));
            let _ = pending.reply.send(Err(err));
        }
    }
    owned.len()
}

fn flush_queue(state: &mut BridgeState, connection_id: ConnectionId, outbound: &OutboundSender) {
    let now = Instant::now();
    let mut flushed = 0usize;
    while let Some(queued) = state.queued.pop_front() {
        if queued.deadline <= now {
            let _ = queued.reply.send(Err(timeout_error(
                queued.command,
                &queued.request_id,
                "queued",
                queued.timeout,
            )));
            continue;
        }
        let frame = OutboundFrame::Command {
            request_id: queued.request_id.clone(),
            command: queued.command,
            payload: queued.payload,
        };
        if outbound.send(frame).is_err() {
            let _ = queued
                .reply
                .send(Err(disconnected_error(queued.command, "connection closed during flush")));
            continue;
        }
        state.pending.insert(
            queued.request_id,
            PendingCommand {
                command: queued.command,
                connection_id,
                reply: queued.reply,
            },
        );
        flushed += 1;
    }
    if flushed > 0 {
        debug!(connection_id, flushed, "Flushed held commands");
    }
}

#[async_trait]
impl BridgePort for BridgeManager {
    async fn dispatch(
        &self,
        command: AgentCommand,
        payload: Value,
        mode: QueueMode,
        timeout: Duration,
    ) -> Result<Value, StructuredError> {
        let request_id = Uuid::new_v4().to_string();
        let deadline = Instant::now() + timeout;
        let (reply, mut rx) = oneshot::channel();

        {
            let mut state = self.lock();
            let connection = state
                .connection
                .as_ref()
                .map(|connection| (connection.id, connection.outbound.clone()));
            match connection {
                Some((connection_id, outbound)) => {
                    let frame = OutboundFrame::Command {
                        request_id: request_id.clone(),
                        command,
                        payload,
                    };
                    if outbound.send(frame).is_err() {
                        return Err(disconnected_error(command, "connection is closing"));
                    }
                    state.pending.insert(
                        request_id.clone(),
                        PendingCommand {
                            command,
                            connection_id,
                            reply,
                        },
                    );
                }
                None if mode == QueueMode::Fail => {
                    return Err(disconnected_error(command, "queue_mode=fail"));
                }
                None => {
                    state.queued.push_back(QueuedRequest {
                        request_id: request_id.clone(),
                        command,
                        payload,
                        deadline,
                        timeout,
                        reply,
                    });
                }
            }
            state.events.push(
                "dispatch",
                json!({ "request_id": request_id, "command": command.as_str(), "mode": mode.as_str() }),
            );
        }
        debug!(request_id = %request_id, command = %command, mode = mode.as_str(), "Command dispatched");

        let mut guard = AbandonGuard {
            manager: self,
            request_id: &request_id,
            command,
            armed: true,
        };
        let outcome = match tokio::time::timeout_at(deadline, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(StructuredError::internal(
                "Bridge dropped the request without a result",
            )),
            Err(_) => self.expire(&request_id, command, timeout, &mut rx),
        };
        guard.disarm();
        outcome
    }

    fn status(&self) -> BridgeStatus {
        let state = self.lock();
        BridgeStatus {
            connected: state.connection.is_some(),
            phase: state.phase,
            connection_id: state.connection.as_ref().map(|connection| connection.id),
            agent_version: state.agent_version.clone(),
            retry_count: state.retry_count,
            connected_at: state
                .connection
                .as_ref()
                .map(|connection| connection.connected_at),
            last_ping_at: state.last_ping_at,
            last_disconnect_reason: state.last_disconnect_reason.clone(),
            pending: state.pending.len(),
            queued: state.queued.len(),
        }
    }

    fn recent_events(&self, limit: usize) -> Vec<BridgeEvent> {
        self.lock().events.recent(limit)
    }
}
