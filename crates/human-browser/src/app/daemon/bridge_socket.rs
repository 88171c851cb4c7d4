//! `/bridge`: the browser agent's WebSocket.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::Query;
use axum::extract::State;
use axum::extract::ws::CloseFrame;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::close_code;
use axum::http::HeaderMap;
use axum::response::Response;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use crate::adapters::bridge_protocol::InboundFrame;
use crate::adapters::bridge_protocol::OutboundFrame;
use crate::adapters::bridge_protocol::encode_outbound;
use crate::adapters::bridge_protocol::parse_inbound;
use crate::app::daemon::server::DaemonState;
use crate::app::daemon::server::TokenQuery;
use crate::app::daemon::server::require_auth;

const MAX_PARSE_ERRORS: u8 = 3;
const SEND_TIMEOUT: Duration = Duration::from_secs(15);

struct Hello {
    version: String,
    retry_count: u64,
}

pub(crate) async fn bridge_handler(
    State(state): State<Arc<DaemonState>>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Err(resp) = require_auth(&state, &headers, query.token.as_deref()) {
        return *resp;
    }
    ws.on_upgrade(move |socket| run_bridge_socket(socket, state))
}

async fn run_bridge_socket(mut socket: WebSocket, state: Arc<DaemonState>) {
    let bridge = Arc::clone(&state.bridge);
    bridge.on_socket_open();

    let hello = match await_hello(&mut socket, state.hello_timeout).await {
        Ok(hello) => hello,
        Err(reason) => {
            warn!(reason, "Bridge handshake failed");
            bridge.on_handshake_failed(reason);
            close(&mut socket, close_code::POLICY, reason).await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let connection_id = bridge.on_hello(&hello.version, hello.retry_count, tx);
    let mut shutdown_rx = state.shutdown_rx.clone();
    let mut parse_errors = 0u8;

    let reason = loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    warn!("Daemon shutdown channel closed");
                }
                close(&mut socket, close_code::AWAY, "daemon shutting down").await;
                break "daemon shutting down";
            }
            outbound = rx.recv() => {
                // The manager dropped our sender: a newer connection took over.
                let Some(frame) = outbound else {
                    close(&mut socket, close_code::NORMAL, "replaced by a newer connection").await;
                    break "replaced";
                };
                if send_frame(&mut socket, &frame).await.is_err() {
                    break "send failed";
                }
            }
            msg = socket.recv() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(_)) => break "socket error",
                    None => break "socket closed",
                };
                match msg {
                    Message::Text(text) => match parse_inbound(&text) {
                        Ok(frame) => {
                            parse_errors = 0;
                            if let Some(reply) = bridge.handle_frame(connection_id, frame) {
                                if send_frame(&mut socket, &reply).await.is_err() {
                                    break "send failed";
                                }
                            }
                        }
                        Err(err) => {
                            parse_errors = parse_errors.saturating_add(1);
                            warn!(connection_id, error = %err, parse_errors, "Unparseable bridge frame");
                            if parse_errors >= MAX_PARSE_ERRORS {
                                close(&mut socket, close_code::POLICY, "too many parse errors").await;
                                break "too many parse errors";
                            }
                        }
                    },
                    Message::Binary(_) => {
                        close(&mut socket, close_code::UNSUPPORTED, "binary frames are not supported").await;
                        break "binary frame";
                    }
                    Message::Close(_) => break "closed by agent",
                    Message::Ping(payload) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break "send failed";
                        }
                    }
                    Message::Pong(_) => {}
                }
            }
        }
    };

    bridge.on_disconnect(connection_id, reason);
}

/// Waits for the first application frame, which must be `HELLO`.
async fn await_hello(socket: &mut WebSocket, timeout: Duration) -> Result<Hello, &'static str> {
    let deadline = Instant::now() + timeout;
    loop {
        let msg = match tokio::time::timeout_at(deadline, socket.recv()).await {
            Err(_) => return Err("hello timeout"),
            Ok(None) => return Err("closed before hello"),
            Ok(Some(Err(_))) => return Err("socket error before hello"),
            Ok(Some(Ok(msg))) => msg,
        };
        match msg {
            Message::Text(text) => {
                return match parse_inbound(&text) {
                    Ok(InboundFrame::Hello {
                        version,
                        retry_count,
                    }) => Ok(Hello {
                        version,
                        retry_count,
                    }),
                    Ok(other) => {
                        debug!(kind = other.kind(), "Frame before HELLO");
                        Err("first frame must be HELLO")
                    }
                    Err(_) => Err("invalid HELLO"),
                };
            }
            Message::Ping(payload) => {
                if socket.send(Message::Pong(payload)).await.is_err() {
                    return Err("socket error before hello");
                }
            }
            Message::Pong(_) => {}
            Message::Binary(_) => return Err("binary frame before hello"),
            Message::Close(_) => return Err("closed before hello"),
        }
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &OutboundFrame) -> Result<(), ()> {
    let payload = encode_outbound(frame).map_err(|err| {
        warn!(error = %err, "Failed to encode bridge frame");
    })?;
    match tokio::time::timeout(SEND_TIMEOUT, socket.send(Message::Text(payload))).await {
        Ok(result) => result.map_err(|_| ()),
        Err(_) => Err(()),
    }
}

async fn close(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}
