use serde::Serialize;
use serde_json::Value;

use super::request::RpcId;
use crate::error::{Language, McpError};

const JSONRPC_VERSION: &str = "2.0";

/// Outgoing reply. `id` is always present on the wire and is `null` when the
/// request id could not be recovered.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Option<RpcId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<RpcId>, result: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION, id, result: Some(result), error: None }
    }

    pub fn error(id: Option<RpcId>, error: JsonRpcError) -> Self {
        Self { jsonrpc: JSONRPC_VERSION, id, result: None, error: Some(error) }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    pub fn parse_error() -> Self {
        Self::new(-32700, "Parse error")
    }

    pub fn invalid_request() -> Self {
        Self::new(-32600, "Invalid Request")
    }

    pub fn invalid_request_with(detail: impl Into<String>) -> Self {
        Self::new(-32600, detail)
    }

    /// Protocol-level form of a taxonomy error: mapped code, message in
    /// `lang`, full details in `data`.
    pub fn from_mcp(err: &McpError, lang: Language) -> Self {
        Self {
            code: err.code.json_rpc_code(),
            message: err.render(lang),
            data: Some(err.details(lang)),
        }
    }
}

/// Result of `tools/call`, carried inside a successful response even when
/// the tool failed.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub content: Vec<ToolResultContent>,
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    #[serde(rename = "errorDetails", skip_serializing_if = "Option::is_none")]
    pub error_details: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResultContent {
    #[serde(rename = "type")]
    pub content_type: &'static str,
    pub text: String,
}

impl ToolResult {
    fn single(text: String, is_error: bool) -> Self {
        Self {
            content: vec![ToolResultContent { content_type: "text", text }],
            is_error,
            error_details: None,
        }
    }

    /// Pretty-printed JSON payload as one text block.
    pub fn json(value: &Value) -> Self {
        let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        Self::single(text, false)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::single(text.into(), true)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.error_details = Some(details);
        self
    }
}
