//! MCP stdio server implementation
//!
//! This module implements the JSON-RPC method layer (`initialize`, `ping`,
//! `tools/list`, `tools/call`, `shutdown`) and the serve loop that reads
//! frames from a [`StdioTransport`] and writes one response per request.
//!
//! Only framing failures end the loop early. Bad JSON, bad requests and
//! failing tools are answered with an error response and serving continues.

use crate::config::ServerConfig;
use crate::error::{BackendError, Result};
use crate::mcp::dispatcher::Dispatcher;
use crate::mcp::transport::StdioTransport;
use crate::mcp::types::{
    JsonRpcRequest, JsonRpcResponse, McpCapabilities, McpServerInfo, ToolCallParams, ToolRequest,
};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, instrument, warn};

/// MCP protocol revision reported by `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// MCP server state
#[derive(Debug)]
pub struct McpServer {
    /// Tool dispatcher, owner of all per-process state
    dispatcher: Dispatcher,
    /// Server info
    info: McpServerInfo,
    /// Whether `initialize` has been seen
    initialized: bool,
    /// Set by `shutdown` or `exit`
    shutdown_requested: bool,
}

impl McpServer {
    /// Create a server around a dispatcher
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            info: McpServerInfo::default(),
            initialized: false,
            shutdown_requested: false,
        }
    }

    /// Create a server for a resolved configuration
    pub fn from_config(config: &ServerConfig) -> std::result::Result<Self, BackendError> {
        Ok(Self::new(Dispatcher::from_config(config)?))
    }

    /// Tool dispatcher
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Tool dispatcher, mutable
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// Whether `initialize` has completed
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether the client asked the server to stop
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    /// Serve until end of stream, `shutdown`/`exit`, or a framing failure
    #[instrument(skip(self, transport))]
    pub async fn run<R, W>(&mut self, transport: &mut StdioTransport<R, W>) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(
            "Starting MCP server: {} v{}",
            self.info.name, self.info.version
        );

        while !self.shutdown_requested {
            let frame = match transport.read_message().await? {
                Some(frame) => frame,
                None => {
                    info!("end of input");
                    break;
                }
            };

            if let Some(response) = self.handle_frame(&frame).await {
                transport.write_message(&response).await?;
            }
        }

        info!("MCP server shutting down");
        Ok(())
    }

    /// Handle one frame body
    pub async fn handle_frame(&mut self, frame: &[u8]) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_slice(frame) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to parse request: {}", e);
                return Some(JsonRpcResponse::parse_error(&e.to_string()));
            }
        };

        if !value.is_object() {
            return Some(JsonRpcResponse::invalid_request(
                Value::Null,
                "expected a JSON object",
            ));
        }

        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                warn!("Malformed request: {}", e);
                return Some(JsonRpcResponse::invalid_request(id, &e.to_string()));
            }
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::invalid_request(
                id,
                &format!("unsupported jsonrpc version {:?}", request.jsonrpc),
            ));
        }

        self.handle_request(request).await
    }

    /// Handle a JSON-RPC request. Notifications get no response.
    #[instrument(skip(self, request), fields(method = %request.method))]
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id else {
            self.handle_notification(&request.method);
            return None;
        };
        let method = request.method.as_str();

        debug!("Handling method: {}", method);

        let response = match method {
            // Lifecycle methods
            "initialize" => self.handle_initialize(id, request.params),
            "shutdown" => {
                info!("Handling shutdown");
                self.shutdown_requested = true;
                JsonRpcResponse::success(id, Value::Null)
            }
            "ping" => JsonRpcResponse::success(id, json!({})),

            // Tool methods
            "tools/list" => JsonRpcResponse::success(
                id,
                json!({ "tools": self.dispatcher.registry().definitions() }),
            ),
            "tools/call" => self.handle_tools_call(id, request.params).await,

            _ => {
                warn!("Unknown method: {}", method);
                JsonRpcResponse::method_not_found(id, method)
            }
        };

        Some(response)
    }

    fn handle_notification(&mut self, method: &str) {
        match method {
            "initialized" | "notifications/initialized" => debug!("client initialized"),
            "exit" => {
                info!("Handling exit");
                self.shutdown_requested = true;
            }
            other => debug!(method = other, "ignoring notification"),
        }
    }

    fn handle_initialize(&mut self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        if let Some(version) = params
            .as_ref()
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
        {
            debug!("Client protocol version: {}", version);
        }

        self.initialized = true;

        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": McpCapabilities::default(),
                "serverInfo": self.info
            }),
        )
    }

    async fn handle_tools_call(&mut self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::invalid_params(id, "missing params");
        };

        let params: ToolCallParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return JsonRpcResponse::invalid_params(id, &e.to_string()),
        };

        let request = ToolRequest::new(id, params.name).with_arguments(params.arguments);
        self.dispatcher.dispatch(request).await.into_jsonrpc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendClient;
    use crate::mcp::tools::AVAILABLE_TOOLS;
    use std::time::Duration;

    fn server() -> McpServer {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let backend = BackendClient::new(port, Duration::from_millis(200)).unwrap();
        McpServer::new(Dispatcher::new(
            backend,
            Duration::from_secs(3),
            Duration::from_secs(3),
        ))
    }

    fn request(method: &str, params: Option<Value>, id: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id,
        }
    }

    #[tokio::test]
    async fn test_handle_ping() {
        let mut server = server();
        let response = server
            .handle_request(request("ping", None, Some(json!(1))))
            .await
            .unwrap();
        assert_eq!(response.result, Some(json!({})));
    }

    #[tokio::test]
    async fn test_handle_initialize() {
        let mut server = server();
        let response = server
            .handle_request(request(
                "initialize",
                Some(json!({ "protocolVersion": "2024-11-05" })),
                Some(json!(1)),
            ))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert!(result["capabilities"]["tools"].is_object());
        assert_eq!(result["serverInfo"]["name"], "inspector-raspi-mcp");
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn test_handle_tools_list() {
        let mut server = server();
        let response = server
            .handle_request(request("tools/list", None, Some(json!(2))))
            .await
            .unwrap();
        let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), AVAILABLE_TOOLS.len());
        assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));
    }

    #[tokio::test]
    async fn test_handle_unknown_method() {
        let mut server = server();
        let response = server
            .handle_request(request("unknown/method", None, Some(json!(3))))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_handle_notification() {
        let mut server = server();
        let response = server.handle_request(request("initialized", None, None)).await;
        assert!(response.is_none());
        assert!(!server.is_shutdown_requested());
    }

    #[tokio::test]
    async fn test_exit_notification_requests_shutdown() {
        let mut server = server();
        assert!(server.handle_request(request("exit", None, None)).await.is_none());
        assert!(server.is_shutdown_requested());
    }

    #[tokio::test]
    async fn test_tools_call_unknown_tool() {
        let mut server = server();
        let response = server
            .handle_request(request(
                "tools/call",
                Some(json!({ "name": "pi.nonexistent", "arguments": {} })),
                Some(json!("abc")),
            ))
            .await
            .unwrap();
        assert_eq!(response.id, json!("abc"));
        let error = response.error.unwrap();
        assert_eq!(error.code, -32001);
        assert_eq!(error.kind.map(|k| k.as_str()), Some("unknown-tool"));
    }

    #[tokio::test]
    async fn test_tools_call_missing_params() {
        let mut server = server();
        let response = server
            .handle_request(request("tools/call", None, Some(json!(4))))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_handle_frame_parse_error() {
        let mut server = server();
        let response = server.handle_frame(b"{not json").await.unwrap();
        assert_eq!(response.id, Value::Null);
        assert_eq!(response.error.unwrap().code, -32700);
    }

    #[tokio::test]
    async fn test_handle_frame_invalid_request() {
        let mut server = server();
        let response = server.handle_frame(br#"{"id": 9, "params": {}}"#).await.unwrap();
        assert_eq!(response.id, json!(9));
        assert_eq!(response.error.unwrap().code, -32600);

        let response = server.handle_frame(b"[1, 2]").await.unwrap();
        assert_eq!(response.error.unwrap().code, -32600);
    }

    #[tokio::test]
    async fn test_shutdown_request_is_answered() {
        let mut server = server();
        let response = server
            .handle_request(request("shutdown", None, Some(json!(5))))
            .await
            .unwrap();
        assert_eq!(response.result, Some(Value::Null));
        assert!(server.is_shutdown_requested());
    }
}
