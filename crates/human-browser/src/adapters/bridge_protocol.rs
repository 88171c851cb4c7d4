//! JSON envelopes exchanged with the browser agent over `/bridge`.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::domain::AgentCommand;
use crate::domain::StructuredError;

/// Frames the agent sends to the daemon.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum InboundFrame {
    Hello {
        #[serde(default)]
        version: String,
        #[serde(default)]
        retry_count: u64,
    },
    Ping {
        #[serde(default)]
        ts: Value,
    },
    Pong {
        #[serde(default)]
        ts: Value,
    },
    Result {
        request_id: String,
        ok: bool,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<Value>,
    },
    Event {
        name: String,
        #[serde(default)]
        payload: Value,
    },
}

impl InboundFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundFrame::Hello { .. } => "HELLO",
            InboundFrame::Ping { .. } => "PING",
            InboundFrame::Pong { .. } => "PONG",
            InboundFrame::Result { .. } => "RESULT",
            InboundFrame::Event { .. } => "EVENT",
        }
    }
}

/// Frames the daemon sends to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum OutboundFrame {
    Command {
        request_id: String,
        command: AgentCommand,
        payload: Value,
    },
    Pong {
        ts: Value,
    },
}

/// Turns the `ok/result/error` triple of a `RESULT` into an outcome.
///
/// A malformed agent error still yields a structured error; the raw value is
/// kept in `details`.
pub fn result_outcome(
    ok: bool,
    result: Option<Value>,
    error: Option<Value>,
) -> Result<Value, StructuredError> {
    if ok {
        return Ok(result.unwrap_or_else(|| json!({})));
    }
    match error {
        Some(raw) => Err(
            serde_json::from_value::<StructuredError>(raw.clone()).unwrap_or_else(|_| {
                StructuredError::internal("Agent returned a malformed error")
                    .with_details(json!({ "error": raw }))
            }),
        ),
        None => Err(StructuredError::internal(
            "Agent reported failure without an error",
        )),
    }
}

pub fn parse_inbound(text: &str) -> Result<InboundFrame, serde_json::Error> {
    serde_json::from_str(text)
}

pub fn encode_outbound(frame: &OutboundFrame) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}
