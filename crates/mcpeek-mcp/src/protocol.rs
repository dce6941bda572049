//! MCP (Model Context Protocol) JSON-RPC 2.0 message types.

use mcpeek_core::{McpeekError, McpeekResult, ResourceDescriptor, RootDescriptor, ToolDescriptor};
use serde::{Deserialize, Serialize};

/// Protocol revision sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Request id, unique per session.
    pub id: u64,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Build a 2.0 request.
    pub fn new(id: u64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 notification (no id, no response).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    /// Build a 2.0 notification.
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// Any JSON-RPC 2.0 message received from a server.
///
/// Responses carry `id` plus `result` or `error`; server-initiated requests
/// and notifications carry `method`.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version tag.
    #[serde(default)]
    #[allow(dead_code)]
    pub jsonrpc: String,
    /// Id of the answered request.
    #[serde(default)]
    pub id: Option<u64>,
    /// Set on server-initiated messages.
    #[serde(default)]
    pub method: Option<String>,
    /// Success payload.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Error payload.
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// True for server-initiated requests and notifications.
    pub fn is_server_message(&self) -> bool {
        self.method.is_some()
    }

    /// Turn the response into its result, mapping error objects.
    pub fn into_result(self, method: &str) -> McpeekResult<serde_json::Value> {
        if let Some(err) = self.error {
            return Err(McpeekError::Server {
                code: err.code,
                message: err.message,
            });
        }
        self.result
            .ok_or_else(|| McpeekError::Protocol(format!("empty '{method}' result")))
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Extra server-provided detail.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// MCP server capabilities from the `initialize` response.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Present when the server exposes tools.
    #[serde(default)]
    pub tools: Option<serde_json::Value>,
    /// Present when the server exposes resources.
    #[serde(default)]
    pub resources: Option<serde_json::Value>,
    /// Present when the server exposes prompts.
    #[serde(default)]
    pub prompts: Option<serde_json::Value>,
}

/// MCP initialize response.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    /// Revision the server agreed to.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Advertised capabilities.
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    /// Server name and version.
    #[serde(default, rename = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

impl InitializeResult {
    /// `name version` label for reports.
    pub fn server_label(&self) -> Option<String> {
        self.server_info.as_ref().map(|info| {
            if info.version.is_empty() {
                info.name.clone()
            } else {
                format!("{} {}", info.name, info.version)
            }
        })
    }
}

/// `serverInfo` of the initialize response.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version, may be empty.
    #[serde(default)]
    pub version: String,
}

/// Parameters of the `initialize` request.
pub fn initialize_params() -> serde_json::Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "mcpeek",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

/// `tools/list` result page.
#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResult {
    /// Tools on this page.
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    /// Cursor of the next page.
    #[serde(default, rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// `resources/list` result page.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResourcesResult {
    /// Resources on this page.
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
    /// Cursor of the next page.
    #[serde(default, rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// `roots/list` result.
#[derive(Debug, Clone, Deserialize)]
pub struct ListRootsResult {
    /// Declared roots.
    #[serde(default)]
    pub roots: Vec<RootDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_request_serialization() {
        let req = JsonRpcRequest::new(1, "tools/list", Some(serde_json::json!({"cursor": "c1"})));
        let parsed = serde_json::to_value(&req).unwrap();
        assert_eq!(parsed["jsonrpc"], "2.0");
        assert_eq!(parsed["id"], 1);
        assert_eq!(parsed["method"], "tools/list");
        assert_eq!(parsed["params"]["cursor"], "c1");

        let bare = serde_json::to_value(JsonRpcRequest::new(2, "roots/list", None)).unwrap();
        assert!(bare.get("params").is_none());
    }

    #[test]
    fn test_notification_has_no_id() {
        let n = serde_json::to_value(JsonRpcNotification::new("notifications/initialized", None))
            .unwrap();
        assert!(n.get("id").is_none());
        assert_eq!(n["method"], "notifications/initialized");
    }

    #[test]
    fn test_error_response_maps_to_server_error() {
        let json =
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        match resp.into_result("roots/list").unwrap_err() {
            McpeekError::Server { code, message } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_server_request_is_recognized() {
        let json = r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#;
        let msg: JsonRpcResponse = serde_json::from_str(json).unwrap();
        assert!(msg.is_server_message());
    }

    #[test]
    fn test_initialize_result_label() {
        let json = r#"{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"test-server","version":"1.0"}}"#;
        let result: InitializeResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.protocol_version, "2024-11-05");
        assert!(result.capabilities.tools.is_some());
        assert_eq!(result.server_label().as_deref(), Some("test-server 1.0"));
    }

    #[test]
    fn test_list_tools_page_with_cursor() {
        let json = r#"{"tools":[{"name":"a"}],"nextCursor":"page2"}"#;
        let page: ListToolsResult = serde_json::from_str(json).unwrap();
        assert_eq!(page.tools.len(), 1);
        assert_eq!(page.next_cursor.as_deref(), Some("page2"));
    }
}
