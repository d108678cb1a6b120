//! Model Context Protocol (MCP) server module
//!
//! This module implements the MCP stdio server for AI assistant integration,
//! exposing board diagnostics as MCP tools.

mod dispatcher;
mod server;
mod tools;
/// Stdio framing
pub mod transport;
/// MCP protocol types
pub mod types;

pub use dispatcher::{decode_throttled, guarded, Dispatcher};
pub use server::{McpServer, PROTOCOL_VERSION};
pub use tools::{
    FieldSpec, FieldType, InputShape, McpTool, ToolDescriptor, ToolKind, ToolRegistry,
    AVAILABLE_TOOLS, BUILTIN_TOOLS, DEFAULT_DMESG_LINES,
};
pub use transport::{FrameDecoder, Framing, StdioTransport};
pub use types::{
    ErrorKind, JsonRpcError, JsonRpcRequest, JsonRpcResponse, McpCapabilities, McpServerInfo,
    McpToolDefinition, ToolCallParams, ToolCallResult, ToolContent, ToolFailure, ToolRequest,
    ToolResponse,
};
