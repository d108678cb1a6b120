//! MCP server integration tests
//!
//! These tests verify the MCP protocol types, the tool registry and the
//! stdio transport through the public API.

use inspector_raspi::mcp::types::{
    ErrorKind, JsonRpcRequest, JsonRpcResponse, McpToolDefinition, ToolCallResult,
};
use inspector_raspi::mcp::{FrameDecoder, Framing, StdioTransport, ToolRegistry, AVAILABLE_TOOLS};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn test_jsonrpc_request_parsing() {
    let json = r#"{
        "jsonrpc": "2.0",
        "method": "tools/list",
        "id": 1
    }"#;

    let request: JsonRpcRequest = serde_json::from_str(json).unwrap();
    assert_eq!(request.method, "tools/list");
    assert_eq!(request.id, Some(json!(1)));
}

#[test]
fn test_jsonrpc_response_success() {
    let response = JsonRpcResponse::success(json!(1), json!({"status": "ok"}));
    let json = serde_json::to_string(&response).unwrap();

    assert!(json.contains("\"jsonrpc\":\"2.0\""));
    assert!(json.contains("\"result\""));
    assert!(!json.contains("\"error\""));
}

#[test]
fn test_jsonrpc_response_error() {
    let response = JsonRpcResponse::invalid_request(json!(1), "missing method");
    let json = serde_json::to_string(&response).unwrap();

    assert!(json.contains("\"error\""));
    assert!(json.contains("-32600"));
    assert!(json.contains("\"kind\":\"invalid-request\""));
    assert!(!json.contains("\"result\""));
}

#[test]
fn test_error_codes_match_kinds() {
    let table = [
        (ErrorKind::ParseError, -32700),
        (ErrorKind::InvalidRequest, -32600),
        (ErrorKind::MethodNotFound, -32601),
        (ErrorKind::InvalidArguments, -32602),
        (ErrorKind::InternalError, -32603),
        (ErrorKind::UnknownTool, -32001),
        (ErrorKind::BackendUnreachable, -32002),
        (ErrorKind::Timeout, -32003),
        (ErrorKind::UpstreamError, -32004),
        (ErrorKind::MissingDependency, -32005),
    ];
    for (kind, code) in table {
        assert_eq!(kind.code(), code, "{kind}");
    }
}

#[test]
fn test_tool_registry_creation() {
    let registry = ToolRegistry::new();
    let definitions = registry.definitions();

    assert_eq!(definitions.len(), AVAILABLE_TOOLS.len());

    let tool_names: Vec<_> = definitions.iter().map(|d| d.name.as_str()).collect();
    assert!(tool_names.contains(&"pi-health"));
    assert!(tool_names.contains(&"pi-cpu-temp"));
    assert!(tool_names.contains(&"pi-system-info"));
    assert!(tool_names.contains(&"pi-capabilities"));
    assert!(tool_names.contains(&"pi-gpu-info"));
    assert!(tool_names.contains(&"pi-camera-info"));
    assert!(tool_names.contains(&"pi-usb-list"));
    assert!(tool_names.contains(&"pi-usb-watch"));
}

#[test]
fn test_legacy_aliases_resolve() {
    let registry = ToolRegistry::new();
    let pairs = [
        ("pi.health", "pi-health"),
        ("pi.cpuTemp", "pi-cpu-temp"),
        ("pi.systemInfo", "pi-system-info"),
        ("pi.capabilities", "pi-capabilities"),
        ("pi.gpuInfo", "pi-gpu-info"),
        ("pi.cameraInfo", "pi-camera-info"),
        ("pi.usbList", "pi-usb-list"),
        ("pi.usbWatch", "pi-usb-watch"),
    ];
    for (alias, canonical) in pairs {
        assert_eq!(registry.canonical_name(alias), Some(canonical));
    }
}

#[test]
fn test_tool_definitions_have_schemas() {
    let registry = ToolRegistry::new();
    let definitions = registry.definitions();

    for def in definitions {
        assert!(
            !def.description.is_empty(),
            "Tool {} should have a description",
            def.name
        );

        assert_eq!(
            def.input_schema["type"], "object",
            "Tool {} schema should be type object",
            def.name
        );

        assert!(
            def.input_schema["properties"].is_object(),
            "Tool {} should have properties",
            def.name
        );

        assert_eq!(def.input_schema["additionalProperties"], false);
    }
}

#[test]
fn test_usb_watch_schema_declares_reset() {
    let registry = ToolRegistry::new();
    let watch = registry
        .definitions()
        .into_iter()
        .find(|d| d.name == "pi-usb-watch")
        .unwrap();
    assert_eq!(watch.input_schema["properties"]["reset"]["type"], "boolean");
}

#[test]
fn test_tool_call_result_wraps_json() {
    let result = ToolCallResult::json(json!({"celsius": 47.8}));
    assert_eq!(result.content.len(), 1);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["content"][0]["type"], "text");
    assert_eq!(json["content"][0]["text"], r#"{"celsius":47.8}"#);
    assert_eq!(json["structuredContent"]["celsius"], 47.8);
}

#[test]
fn test_mcp_tool_definition_serialization() {
    let def = McpToolDefinition {
        name: "pi-usb-watch".to_string(),
        description: "USB diff".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "reset": { "type": "boolean" }
            }
        }),
    };

    let json = serde_json::to_string(&def).unwrap();
    assert!(json.contains("\"name\":\"pi-usb-watch\""));
    assert!(json.contains("\"inputSchema\""));

    let parsed: McpToolDefinition = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.name, "pi-usb-watch");
}

#[test]
fn test_decoder_newline_and_content_length_agree() {
    let body = br#"{"jsonrpc":"2.0","method":"ping","id":1}"#;

    let mut lines = FrameDecoder::new();
    lines.extend(&Framing::NewlineDelimited.encode(body));
    assert_eq!(lines.next_frame().unwrap().as_deref(), Some(&body[..]));
    assert_eq!(lines.framing(), Some(Framing::NewlineDelimited));

    let mut lsp = FrameDecoder::new();
    lsp.extend(&Framing::ContentLength.encode(body));
    assert_eq!(lsp.next_frame().unwrap().as_deref(), Some(&body[..]));
    assert_eq!(lsp.framing(), Some(Framing::ContentLength));
}

#[test]
fn test_decoder_rejects_oversized_frame() {
    let mut decoder = FrameDecoder::new();
    decoder.extend(b"Content-Length: 10000001\r\n\r\n");
    assert!(decoder.next_frame().is_err());
}

#[tokio::test]
async fn test_transport_replies_in_detected_framing() {
    let reader = tokio_test::io::Builder::new()
        .read(b"Content-Length: 40\r\n\r\n")
        .read(br#"{"jsonrpc":"2.0","method":"ping","id":1}"#)
        .build();
    let mut transport = StdioTransport::new(reader, Vec::new());

    let frame = transport.read_message().await.unwrap().unwrap();
    let request: JsonRpcRequest = serde_json::from_slice(&frame).unwrap();
    assert_eq!(request.method, "ping");

    transport
        .write_message(&JsonRpcResponse::success(json!(1), json!({})))
        .await
        .unwrap();
    assert!(transport.read_message().await.unwrap().is_none());

    let (_, written) = transport.into_inner();
    let text = String::from_utf8(written).unwrap();
    assert!(text.starts_with("Content-Length: "));
    assert!(text.ends_with(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#));
}
