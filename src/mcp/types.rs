//! MCP protocol types
//!
//! JSON-RPC 2.0 wire types, the MCP payloads built on them, and the tool
//! request/response envelope the dispatcher works with.

use crate::error::ToolError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

/// Keep a present `"id": null` as `Some(Null)`; only an absent id means
/// notification.
fn present_id<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Method name
    pub method: String,
    /// Optional parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Request ID (None for notifications, `Some(Null)` for an explicit null)
    #[serde(
        default,
        deserialize_with = "present_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID, `null` when the request could not be read
    pub id: Value,
    /// Success result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response of the given kind
    pub fn failure(id: Value, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code: kind.code(),
                message: message.into(),
                kind: Some(kind),
                data: None,
            }),
        }
    }

    /// Create a parse error response
    pub fn parse_error(detail: &str) -> Self {
        Self::failure(Value::Null, ErrorKind::ParseError, format!("Parse error: {}", detail))
    }

    /// Create an invalid request error
    pub fn invalid_request(id: Value, detail: &str) -> Self {
        Self::failure(id, ErrorKind::InvalidRequest, format!("Invalid Request: {}", detail))
    }

    /// Create a method not found error
    pub fn method_not_found(id: Value, method: &str) -> Self {
        Self::failure(
            id,
            ErrorKind::MethodNotFound,
            format!("Method not found: {}", method),
        )
    }

    /// Create an invalid params error
    pub fn invalid_params(id: Value, msg: &str) -> Self {
        Self::failure(id, ErrorKind::InvalidArguments, format!("Invalid params: {}", msg))
    }
}

/// JSON-RPC 2.0 error object, extended with the error kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Error kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    /// Optional additional data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Failure taxonomy surfaced to clients as `error.kind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Stream framing is broken; fatal for the process
    FramingError,
    /// Frame body is not valid JSON
    ParseError,
    /// Frame is JSON but not a JSON-RPC request
    InvalidRequest,
    /// Unknown JSON-RPC method
    MethodNotFound,
    /// Unknown tool name
    UnknownTool,
    /// Arguments do not match the tool's input shape
    InvalidArguments,
    /// HTTP backend could not be reached
    BackendUnreachable,
    /// HTTP backend or probe exceeded its bound
    Timeout,
    /// HTTP backend answered with a failure
    UpstreamError,
    /// Optional system tool is absent
    MissingDependency,
    /// Anything unmapped
    InternalError,
}

impl ErrorKind {
    /// JSON-RPC error code for this kind
    pub fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidArguments => -32602,
            Self::InternalError | Self::FramingError => -32603,
            Self::UnknownTool => -32001,
            Self::BackendUnreachable => -32002,
            Self::Timeout => -32003,
            Self::UpstreamError => -32004,
            Self::MissingDependency => -32005,
        }
    }

    /// Kebab-case name, as serialized
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FramingError => "framing-error",
            Self::ParseError => "parse-error",
            Self::InvalidRequest => "invalid-request",
            Self::MethodNotFound => "method-not-found",
            Self::UnknownTool => "unknown-tool",
            Self::InvalidArguments => "invalid-arguments",
            Self::BackendUnreachable => "backend-unreachable",
            Self::Timeout => "timeout",
            Self::UpstreamError => "upstream-error",
            Self::MissingDependency => "missing-dependency",
            Self::InternalError => "internal-error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// MCP server capabilities
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpCapabilities {
    /// Tools capability
    #[serde(default)]
    pub tools: ToolsCapability,
}

/// Tools capability
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsCapability {
    /// Whether tool list changes should be notified
    #[serde(default, rename = "listChanged")]
    pub list_changed: bool,
}

/// MCP server info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerInfo {
    /// Server name
    pub name: String,
    /// Server version
    pub version: String,
}

impl Default for McpServerInfo {
    fn default() -> Self {
        Self {
            name: "inspector-raspi-mcp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// MCP tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolDefinition {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// Input JSON schema
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters for tools/call method
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Tool name
    pub name: String,
    /// Tool arguments
    #[serde(default)]
    pub arguments: Value,
}

/// Result of a successful tool call, MCP style
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallResult {
    /// Content array
    pub content: Vec<ToolContent>,
    /// The same value as structured JSON
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl ToolCallResult {
    /// Wrap a JSON value as text content plus structured content
    pub fn json(value: Value) -> Self {
        Self {
            content: vec![ToolContent::text(value.to_string())],
            structured_content: Some(value),
        }
    }
}

/// Content item in tool result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    /// Text content
    #[serde(rename = "text")]
    Text {
        /// The text content
        text: String,
    },
}

impl ToolContent {
    /// Create text content
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// A tool invocation as seen by the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    /// Correlation token, echoed verbatim
    pub id: Value,
    /// Tool name or alias
    pub tool: String,
    /// Arguments; `null` means none
    pub arguments: Value,
}

impl ToolRequest {
    /// Create a request with no arguments
    pub fn new(id: Value, tool: impl Into<String>) -> Self {
        Self {
            id,
            tool: tool.into(),
            arguments: Value::Null,
        }
    }

    /// Attach arguments
    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }
}

/// `error` half of the response envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailure {
    /// Failure kind
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
}

impl From<&ToolError> for ToolFailure {
    fn from(err: &ToolError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one tool call: exactly one of result or error
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResponse {
    /// Echoed correlation token
    pub id: Value,
    /// Result value or failure
    pub outcome: std::result::Result<Value, ToolFailure>,
}

impl ToolResponse {
    /// Whether the call succeeded
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Failure kind, if the call failed
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.outcome.as_ref().err().map(|f| f.kind)
    }

    /// `{id, result}` or `{id, error: {kind, message}}`
    pub fn envelope(&self) -> Value {
        match &self.outcome {
            Ok(result) => json!({ "id": self.id, "result": result }),
            Err(failure) => json!({ "id": self.id, "error": failure }),
        }
    }

    /// JSON-RPC form written to the transport
    pub fn into_jsonrpc(self) -> JsonRpcResponse {
        match self.outcome {
            Ok(value) => {
                let result = serde_json::to_value(ToolCallResult::json(value))
                    .unwrap_or_else(|_| json!({ "content": [] }));
                JsonRpcResponse::success(self.id, result)
            }
            Err(failure) => JsonRpcResponse::failure(self.id, failure.kind, failure.message),
        }
    }
}
