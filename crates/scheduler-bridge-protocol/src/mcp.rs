//! Agent-runtime (MCP) envelopes

use rmcp::model::ErrorCode;
use rmcp::ErrorData;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// JSON-RPC version tag carried by every outbound message
pub const JSONRPC_VERSION: &str = "2.0";

/// Inbound request or notification from the agent runtime.
///
/// The `jsonrpc` field is accepted but not required.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McpRequest {
    /// Absent for notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonValue>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<JsonValue>,
}

impl McpRequest {
    /// Whether the peer expects no reply
    #[inline]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Outbound response line
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorData>,
}

impl McpResponse {
    /// Successful response
    pub fn success(id: JsonValue, result: JsonValue) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Protocol-level error response
    pub fn error(id: JsonValue, error: ErrorData) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// `-32601` reply for a method this server does not implement
    pub fn method_not_found(id: JsonValue, method: &str) -> Self {
        Self::error(
            id,
            ErrorData::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("Method not found: {method}"),
                None,
            ),
        )
    }
}

/// Methods the adapter understands. Anything else is method-not-found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum McpMethod {
    Initialize,
    Initialized,
    ToolsList,
    ToolsCall,
}

impl McpMethod {
    /// Wire name of every supported method
    pub const TABLE: [(&'static str, McpMethod); 4] = [
        ("initialize", McpMethod::Initialize),
        ("notifications/initialized", McpMethod::Initialized),
        ("tools/list", McpMethod::ToolsList),
        ("tools/call", McpMethod::ToolsCall),
    ];

    /// Look up a method by its wire name
    pub fn parse(name: &str) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(wire, _)| *wire == name)
            .map(|(_, method)| *method)
    }

    /// Wire name of this method
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Initialized => "notifications/initialized",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
        }
    }

    /// Notifications never get a reply
    #[inline]
    pub fn expects_reply(self) -> bool {
        !matches!(self, Self::Initialized)
    }
}

impl std::fmt::Display for McpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_table_round_trip() {
        for (name, method) in McpMethod::TABLE {
            assert_eq!(McpMethod::parse(name), Some(method));
            assert_eq!(method.as_str(), name);
        }
        assert_eq!(McpMethod::parse("resources/list"), None);
        assert_eq!(McpMethod::parse("Initialize"), None);
    }

    #[test]
    fn test_only_initialized_is_silent() {
        assert!(!McpMethod::Initialized.expects_reply());
        assert!(McpMethod::Initialize.expects_reply());
        assert!(McpMethod::ToolsList.expects_reply());
        assert!(McpMethod::ToolsCall.expects_reply());
    }

    #[test]
    fn test_request_parsing() {
        let request: McpRequest = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"x"}}"#,
        )
        .unwrap();
        assert_eq!(request.id, Some(json!(3)));
        assert_eq!(request.method, "tools/call");
        assert!(!request.is_notification());

        let note: McpRequest =
            serde_json::from_str(r#"{"method":"notifications/initialized"}"#).unwrap();
        assert!(note.is_notification());
        assert!(note.params.is_none());
    }

    #[test]
    fn test_success_response_shape() {
        let response = McpResponse::success(json!(1), json!({"tools": []}));
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value, json!({"jsonrpc": "2.0", "id": 1, "result": {"tools": []}}));
    }

    #[test]
    fn test_method_not_found_shape() {
        let response = McpResponse::method_not_found(json!("abc"), "prompts/list");
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], "abc");
        assert_eq!(value["error"]["code"], -32601);
        assert!(value["error"]["message"]
            .as_str()
            .unwrap()
            .contains("prompts/list"));
        assert!(value.get("result").is_none());
    }
}
