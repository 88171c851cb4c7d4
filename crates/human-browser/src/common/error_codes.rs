//! Error codes shared by the daemon, the bridge agent, and the CLI.
//!
//! Codes travel as plain strings on every wire. The known set is closed on
//! the daemon side, but codes produced by the browser agent are preserved
//! verbatim even when the daemon does not recognize them.

use std::convert::Infallible;

pub const BAD_REQUEST: &str = "BAD_REQUEST";
pub const NO_MATCH: &str = "NO_MATCH";
pub const NOT_FILLABLE: &str = "NOT_FILLABLE";
pub const NOT_FOUND: &str = "NOT_FOUND";
pub const DISCONNECTED: &str = "DISCONNECTED";
pub const TIMEOUT: &str = "TIMEOUT";
pub const DEBUGGER_ATTACH_FAILED: &str = "DEBUGGER_ATTACH_FAILED";
pub const CDP_EVALUATE_FAILED: &str = "CDP_EVALUATE_FAILED";
pub const SCRIPT_EXCEPTION: &str = "SCRIPT_EXCEPTION";
pub const INTERNAL: &str = "INTERNAL";
pub const UNAUTHORIZED: &str = "UNAUTHORIZED";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    BadRequest,
    NoMatch,
    NotFillable,
    NotFound,
    Disconnected,
    Timeout,
    DebuggerAttachFailed,
    CdpEvaluateFailed,
    ScriptException,
    Internal,
    Unauthorized,
    /// Agent-supplied code outside the known set, kept as received.
    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::BadRequest => BAD_REQUEST,
            ErrorCode::NoMatch => NO_MATCH,
            ErrorCode::NotFillable => NOT_FILLABLE,
            ErrorCode::NotFound => NOT_FOUND,
            ErrorCode::Disconnected => DISCONNECTED,
            ErrorCode::Timeout => TIMEOUT,
            ErrorCode::DebuggerAttachFailed => DEBUGGER_ATTACH_FAILED,
            ErrorCode::CdpEvaluateFailed => CDP_EVALUATE_FAILED,
            ErrorCode::ScriptException => SCRIPT_EXCEPTION,
            ErrorCode::Internal => INTERNAL,
            ErrorCode::Unauthorized => UNAUTHORIZED,
            ErrorCode::Other(code) => code.as_str(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::BadRequest | ErrorCode::NotFillable => ErrorCategory::InvalidInput,
            ErrorCode::NoMatch | ErrorCode::NotFound => ErrorCategory::NotFound,
            ErrorCode::Disconnected => ErrorCategory::Unavailable,
            ErrorCode::Timeout => ErrorCategory::Timeout,
            ErrorCode::Unauthorized => ErrorCategory::Unauthorized,
            ErrorCode::DebuggerAttachFailed
            | ErrorCode::CdpEvaluateFailed
            | ErrorCode::ScriptException
            | ErrorCode::Other(_) => ErrorCategory::External,
            ErrorCode::Internal => ErrorCategory::Internal,
        }
    }

    /// Transient conditions where the same request may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::Disconnected | ErrorCode::Timeout | ErrorCode::DebuggerAttachFailed
        )
    }
}

impl std::str::FromStr for ErrorCode {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            BAD_REQUEST => ErrorCode::BadRequest,
            NO_MATCH => ErrorCode::NoMatch,
            NOT_FILLABLE => ErrorCode::NotFillable,
            NOT_FOUND => ErrorCode::NotFound,
            DISCONNECTED => ErrorCode::Disconnected,
            TIMEOUT => ErrorCode::Timeout,
            DEBUGGER_ATTACH_FAILED => ErrorCode::DebuggerAttachFailed,
            CDP_EVALUATE_FAILED => ErrorCode::CdpEvaluateFailed,
            SCRIPT_EXCEPTION => ErrorCode::ScriptException,
            INTERNAL => ErrorCode::Internal,
            UNAUTHORIZED => ErrorCode::Unauthorized,
            other => ErrorCode::Other(other.to_string()),
        })
    }
}

impl From<String> for ErrorCode {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(code) => code,
            Err(never) => match never {},
        }
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        code.as_str().to_string()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error category for programmatic handling by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed or contradictory input caught before dispatch
    InvalidInput,
    /// Unknown snapshot, ref, or element
    NotFound,
    /// No bridge connection available
    Unavailable,
    /// Deadline elapsed while queued or awaiting a result
    Timeout,
    /// Missing or wrong token
    Unauthorized,
    /// Browser-side execution failure
    External,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::InvalidInput => "invalid_input",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Unavailable => "unavailable",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Unauthorized => "unauthorized",
            ErrorCategory::External => "external",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invalid_input" => Ok(ErrorCategory::InvalidInput),
            "not_found" => Ok(ErrorCategory::NotFound),
            "unavailable" => Ok(ErrorCategory::Unavailable),
            "timeout" => Ok(ErrorCategory::Timeout),
            "unauthorized" => Ok(ErrorCategory::Unauthorized),
            "external" => Ok(ErrorCategory::External),
            "internal" => Ok(ErrorCategory::Internal),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
