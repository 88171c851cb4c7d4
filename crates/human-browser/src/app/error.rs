use serde::Serialize;
use thiserror::Error;

use crate::app::daemon::DaemonServerError;
use crate::common::ErrorCategory;
use crate::domain::StructuredError;
use crate::infra::http_client::ClientError;

/// Exit codes following sysexits.h.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const USAGE: i32 = 64;
    pub const UNAVAILABLE: i32 = 69;
    pub const IOERR: i32 = 74;
    pub const TEMPFAIL: i32 = 75;
    pub const NOPERM: i32 = 77;
}

pub fn exit_code_for_category(category: ErrorCategory) -> i32 {
    match category {
        ErrorCategory::InvalidInput => exit_codes::USAGE,
        ErrorCategory::NotFound | ErrorCategory::Unavailable => exit_codes::UNAVAILABLE,
        ErrorCategory::Timeout => exit_codes::TEMPFAIL,
        ErrorCategory::Unauthorized => exit_codes::NOPERM,
        ErrorCategory::External | ErrorCategory::Internal => exit_codes::IOERR,
    }
}

/// A command failure as the CLI reports it: one structured error plus the
/// process exit code derived from its category.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct CliError {
    pub error: StructuredError,
    pub exit_code: i32,
}

impl CliError {
    pub fn new(error: StructuredError) -> Self {
        let exit_code = exit_code_for_category(error.category());
        Self { error, exit_code }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(StructuredError::bad_request(message))
    }

    /// `{ok: false, error}` as printed to stderr.
    pub fn to_json_string(&self) -> String {
        #[derive(Serialize)]
        struct ErrorOutput<'a> {
            ok: bool,
            error: &'a StructuredError,
        }
        let output = ErrorOutput {
            ok: false,
            error: &self.error,
        };
        serde_json::to_string_pretty(&output).unwrap_or_else(|_| self.error.to_string())
    }
}

impl From<StructuredError> for CliError {
    fn from(error: StructuredError) -> Self {
        Self::new(error)
    }
}

impl From<ClientError> for CliError {
    fn from(error: ClientError) -> Self {
        Self::new(error.into())
    }
}

pub fn server_error_to_structured(error: &DaemonServerError) -> StructuredError {
    match error {
        DaemonServerError::InvalidListen { .. } => StructuredError::bad_request(error.to_string()),
        DaemonServerError::Io { operation, .. } => StructuredError::internal(error.to_string())
            .with_details(serde_json::json!({ "operation": operation })),
    }
}

impl From<DaemonServerError> for CliError {
    fn from(error: DaemonServerError) -> Self {
        Self::new(server_error_to_structured(&error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;
    use serde_json::Value;

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(CliError::usage("bad").exit_code, exit_codes::USAGE);
        assert_eq!(
            CliError::new(StructuredError::not_found("gone")).exit_code,
            exit_codes::UNAVAILABLE
        );
        assert_eq!(
            CliError::new(StructuredError::disconnected("no agent")).exit_code,
            exit_codes::UNAVAILABLE
        );
        assert_eq!(
            CliError::new(StructuredError::timeout("slow")).exit_code,
            exit_codes::TEMPFAIL
        );
        assert_eq!(
            CliError::new(StructuredError::new(ErrorCode::NoMatch, "none")).exit_code,
            exit_codes::UNAVAILABLE
        );
        assert_eq!(
            CliError::new(StructuredError::new(
                ErrorCode::Other("WEIRD".to_string()),
                "agent"
            ))
            .exit_code,
            exit_codes::IOERR
        );
        assert_eq!(
            CliError::new(StructuredError::new(ErrorCode::Unauthorized, "token")).exit_code,
            exit_codes::NOPERM
        );
    }

    #[test]
    fn test_json_output_shape() {
        let err = CliError::new(
            StructuredError::disconnected("Daemon is not reachable")
                .with_recovery(serde_json::json!({ "next_command": "human-browser daemon" })),
        );
        let parsed: Value = serde_json::from_str(&err.to_json_string()).unwrap();
        assert_eq!(parsed["ok"], false);
        assert_eq!(parsed["error"]["code"], "DISCONNECTED");
        assert_eq!(
            parsed["error"]["recovery"]["next_command"],
            "human-browser daemon"
        );
        assert!(parsed["error"].get("details").is_none());
    }

    #[test]
    fn test_invalid_listen_is_usage_error() {
        let err = CliError::from(DaemonServerError::InvalidListen {
            message: "refusing".to_string(),
        });
        assert_eq!(err.exit_code, exit_codes::USAGE);
        assert_eq!(err.error.code, ErrorCode::BadRequest);
    }
}
