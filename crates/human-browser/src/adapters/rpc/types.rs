use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::domain::QueueMode;
use crate::domain::StructuredError;
use crate::domain::command::DEFAULT_TIMEOUT_MS;

/// Body of `POST /v1/command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default = "empty_args")]
    pub args: Value,
    #[serde(default)]
    pub queue_mode: QueueMode,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn empty_args() -> Value {
    Value::Object(Map::new())
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl CommandRequest {
    pub fn new(command: impl Into<String>, args: Value) -> Self {
        Self {
            command: command.into(),
            args,
            queue_mode: QueueMode::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_queue_mode(mut self, queue_mode: QueueMode) -> Self {
        self.queue_mode = queue_mode;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// `{ok: true, data}` or `{ok: false, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StructuredError>,
}

impl ApiResponse {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: StructuredError) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<Value, StructuredError> {
        match (self.ok, self.error) {
            (true, _) => Ok(self.data.unwrap_or(Value::Null)),
            (false, Some(error)) => Err(error),
            (false, None) => Err(StructuredError::internal(
                "Daemon reported failure without an error",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults() {
        let request: CommandRequest = serde_json::from_value(json!({"command": "status"})).unwrap();
        assert_eq!(request.queue_mode, QueueMode::Hold);
        assert_eq!(request.timeout_ms, 10_000);
        assert_eq!(request.args, json!({}));
    }

    #[test]
    fn test_request_rejects_unknown_queue_mode() {
        let parsed = serde_json::from_value::<CommandRequest>(json!({
            "command": "status",
            "queue_mode": "later"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_response_shapes() {
        let ok = serde_json::to_value(ApiResponse::success(json!({"tabs": []}))).unwrap();
        assert_eq!(ok, json!({"ok": true, "data": {"tabs": []}}));

        let err = serde_json::to_value(ApiResponse::failure(StructuredError::timeout("late")))
            .unwrap();
        assert_eq!(
            err,
            json!({"ok": false, "error": {"code": "TIMEOUT", "message": "late"}})
        );
    }

    #[test]
    fn test_into_result() {
        let response: ApiResponse = serde_json::from_value(json!({
            "ok": false,
            "error": {"code": "NO_MATCH", "message": "selector not found"}
        }))
        .unwrap();
        let err = response.into_result().unwrap_err();
        assert_eq!(err.code.as_str(), "NO_MATCH");
    }
}
