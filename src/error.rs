//! Error types for inspector-raspi
//!
//! Each layer has its own `thiserror` enum. Transport errors are fatal for the
//! process; everything a tool handler can hit is funnelled into [`ToolError`],
//! which maps one-to-one onto the `error.kind` reported to the client.

use crate::mcp::types::ErrorKind;
use thiserror::Error;

/// The main error type for inspector-raspi operations
#[derive(Error, Debug)]
pub enum Error {
    /// Stdio framing errors (fatal)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// HTTP backend errors
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Tool-level failures
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Framing failures on the stdio stream. None of these can be recovered
/// mid-stream, so the serve loop terminates on any of them.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Neither newline-delimited JSON nor a `Content-Length` header was found
    #[error("no message framing detected within {0} bytes")]
    Undetected(usize),

    /// Malformed or missing `Content-Length` header
    #[error("invalid frame header: {0}")]
    InvalidHeader(String),

    /// Header block has more lines than allowed
    #[error("too many header lines (max {0})")]
    TooManyHeaders(usize),

    /// Header block grew past the limit without a terminator
    #[error("header block exceeds {0} bytes")]
    HeaderTooLarge(usize),

    /// A single frame exceeds the size limit
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// Declared or buffered frame length
        len: usize,
        /// Configured maximum
        max: usize,
    },

    /// Response could not be serialized
    #[error("failed to encode response: {0}")]
    Encode(String),

    /// Reading stdin or writing stdout failed
    #[error("stdio failure: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Error kind reported in diagnostics
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::FramingError
    }
}

/// Failures talking to the loopback HTTP API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Connection refused or otherwise could not be established
    #[error("backend unreachable at {url}: {message}")]
    Unreachable {
        /// Requested URL
        url: String,
        /// Underlying client error
        message: String,
    },

    /// Request exceeded the configured timeout
    #[error("backend request to {url} timed out after {timeout_ms}ms")]
    Timeout {
        /// Requested URL
        url: String,
        /// Configured bound
        timeout_ms: u64,
    },

    /// Backend answered with a non-2xx status
    #[error("backend returned HTTP {status} for {url}")]
    Status {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Backend answered 2xx with a body that is not JSON
    #[error("backend returned a malformed body for {url}: {message}")]
    MalformedBody {
        /// Requested URL
        url: String,
        /// Parse error
        message: String,
    },
}

impl BackendError {
    /// Connect failures and timeouts may clear up on their own; they are not
    /// worth remembering in the probe cache.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Timeout { .. })
    }
}

/// Why a capability probe produced no value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// The binary is not installed
    #[error("`{0}` is not installed")]
    MissingBinary(String),

    /// The binary ran and exited non-zero (or could not be spawned)
    #[error("`{program}` failed (status {status:?}): {stderr}")]
    CommandFailed {
        /// Program name
        program: String,
        /// Exit code, if any
        status: Option<i32>,
        /// Captured stderr
        stderr: String,
    },

    /// The binary did not finish in time
    #[error("`{program}` timed out after {timeout_ms}ms")]
    CommandTimeout {
        /// Program name
        program: String,
        /// Configured bound
        timeout_ms: u64,
    },

    /// Backend document could not be fetched
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Failures a tool call can end in. Every variant maps to a distinct
/// [`ErrorKind`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// No tool or alias with that name
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments do not match the tool's input shape
    #[error("Invalid argument `{field}`: {reason}")]
    InvalidArguments {
        /// Offending field
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// HTTP backend could not be reached
    #[error("{0}")]
    BackendUnreachable(String),

    /// HTTP backend or local probe took too long
    #[error("{0}")]
    Timeout(String),

    /// Backend responded but signalled failure
    #[error("{0}")]
    Upstream(String),

    /// Optional system tool is absent
    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    /// Anything else, including handler panics
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Create an invalid-arguments error for a field
    pub fn invalid_arguments(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Envelope kind for this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownTool(_) => ErrorKind::UnknownTool,
            Self::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            Self::BackendUnreachable(_) => ErrorKind::BackendUnreachable,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Upstream(_) => ErrorKind::UpstreamError,
            Self::MissingDependency(_) => ErrorKind::MissingDependency,
            Self::Internal(_) => ErrorKind::InternalError,
        }
    }
}

impl From<BackendError> for ToolError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unreachable { .. } => Self::BackendUnreachable(err.to_string()),
            BackendError::Timeout { .. } => Self::Timeout(err.to_string()),
            BackendError::Status { .. } | BackendError::MalformedBody { .. } => {
                Self::Upstream(err.to_string())
            }
        }
    }
}

impl From<ProbeFailure> for ToolError {
    fn from(err: ProbeFailure) -> Self {
        match err {
            ProbeFailure::MissingBinary(_) => Self::MissingDependency(err.to_string()),
            ProbeFailure::CommandFailed { .. } => Self::Upstream(err.to_string()),
            ProbeFailure::CommandTimeout { .. } => Self::Timeout(err.to_string()),
            ProbeFailure::Backend(inner) => inner.into(),
        }
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Invalid configuration value from the command line or environment
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value could not be parsed or is out of range
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        /// Argument or variable name
        name: String,
        /// Raw value
        value: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Result type alias for inspector-raspi operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a generic error from a string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Error::Generic(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Transport(TransportError::Undetected(8192));
        assert!(err.to_string().contains("Transport error"));
        assert!(err.to_string().contains("8192"));
    }

    #[test]
    fn test_tool_error_kinds_are_distinct() {
        let errors = [
            ToolError::UnknownTool("x".into()),
            ToolError::invalid_arguments("reset", "expected a boolean"),
            ToolError::BackendUnreachable("down".into()),
            ToolError::Timeout("slow".into()),
            ToolError::Upstream("500".into()),
            ToolError::MissingDependency("lsusb".into()),
            ToolError::Internal("boom".into()),
        ];
        let mut kinds: Vec<_> = errors.iter().map(|e| e.kind().as_str()).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_backend_error_mapping() {
        let timeout = BackendError::Timeout {
            url: "http://127.0.0.1:5050/health".into(),
            timeout_ms: 2000,
        };
        assert_eq!(ToolError::from(timeout).kind(), ErrorKind::Timeout);

        let refused = BackendError::Unreachable {
            url: "http://127.0.0.1:5050/health".into(),
            message: "connection refused".into(),
        };
        assert!(refused.is_transient());
        assert_eq!(ToolError::from(refused).kind(), ErrorKind::BackendUnreachable);

        let status = BackendError::Status {
            url: "http://127.0.0.1:5050/health".into(),
            status: 503,
        };
        assert!(!status.is_transient());
        assert_eq!(ToolError::from(status).kind(), ErrorKind::UpstreamError);
    }

    #[test]
    fn test_probe_failure_mapping() {
        let missing = ProbeFailure::MissingBinary("vcgencmd".into());
        let err = ToolError::from(missing);
        assert_eq!(err.kind(), ErrorKind::MissingDependency);
        assert!(err.to_string().contains("vcgencmd"));

        let slow = ProbeFailure::CommandTimeout {
            program: "dmesg".into(),
            timeout_ms: 3000,
        };
        assert_eq!(ToolError::from(slow).kind(), ErrorKind::Timeout);

        // Installed but refusing to run (e.g. dmesg_restrict) is not a missing tool
        let denied = ProbeFailure::CommandFailed {
            program: "dmesg".into(),
            status: Some(1),
            stderr: "dmesg: read kernel buffer failed: Operation not permitted".into(),
        };
        let err = ToolError::from(denied);
        assert_eq!(err.kind(), ErrorKind::UpstreamError);
        assert!(err.to_string().contains("Operation not permitted"));
    }

    #[test]
    fn test_invalid_arguments_names_field() {
        let err = ToolError::invalid_arguments("lines", "expected an integer");
        assert_eq!(err.to_string(), "Invalid argument `lines`: expected an integer");
    }

    #[test]
    fn test_generic_error() {
        let err = Error::generic("something went wrong");
        assert_eq!(err.to_string(), "something went wrong");
    }
}
