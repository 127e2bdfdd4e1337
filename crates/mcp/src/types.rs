//! JSON-RPC 2.0 and MCP protocol types.
//!
//! Implements the wire format of the Model Context Protocol (MCP): JSON-RPC
//! 2.0 messages carried as newline-delimited JSON over a child process's
//! stdio, or as the body of an HTTP `POST`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use switchboard_tool_runtime::{Content, PromptDefinition, PromptMessage, ToolDefinition};

use crate::capabilities::Capabilities;
use crate::error::McpError;
use crate::validate::{classify, MessageKind};

/// The MCP protocol version this crate implements.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// The only JSON-RPC version accepted on the wire.
pub const JSONRPC_VERSION: &str = "2.0";

// ── JSON-RPC 2.0 Base Types ─────────────────────────────────────────

/// A JSON-RPC 2.0 request message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RpcId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A JSON-RPC 2.0 response message (success or error).
///
/// `id` is `None` only for error responses to messages whose id could not
/// be read; it serializes as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<RpcId>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC request ID: an integer, a string or a boolean.
///
/// Fractional numbers are rejected by the validator since they cannot be
/// matched back to a pending request exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RpcId {
    Number(i64),
    String(String),
    Bool(bool),
}

impl fmt::Display for RpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcId::Number(n) => write!(f, "{n}"),
            RpcId::String(s) => write!(f, "{s}"),
            RpcId::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<i64> for RpcId {
    fn from(n: i64) -> Self {
        RpcId::Number(n)
    }
}

impl From<&str> for RpcId {
    fn from(s: &str) -> Self {
        RpcId::String(s.to_string())
    }
}

// ── Standard JSON-RPC error codes ───────────────────────────────────

/// Standard JSON-RPC 2.0 error codes, plus the MCP auth extension.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Authentication / authorization failure. `data.reason` names the cause.
    pub const AUTH_ERROR: i64 = -32001;
}

/// Notification method names.
pub mod notifications {
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const CANCELLED: &str = "notifications/cancelled";
    pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
    pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
}

// ── Message union ───────────────────────────────────────────────────

/// Any well-formed JSON-RPC message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
    Error(JsonRpcResponse),
}

impl Message {
    /// Parse and validate one raw message.
    ///
    /// Unparseable JSON yields [`McpError::Json`]; JSON that violates the
    /// JSON-RPC invariants yields [`McpError::Protocol`].
    pub fn parse(raw: &str) -> Result<Self, McpError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, McpError> {
        let message = match classify(&value) {
            MessageKind::Request => Message::Request(serde_json::from_value(value)?),
            MessageKind::Notification => Message::Notification(serde_json::from_value(value)?),
            MessageKind::Response => Message::Response(serde_json::from_value(value)?),
            MessageKind::Error => Message::Error(serde_json::from_value(value)?),
            MessageKind::Invalid => {
                return Err(McpError::Protocol("not a valid JSON-RPC 2.0 message".to_string()))
            }
        };
        Ok(message)
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Request(_) => MessageKind::Request,
            Message::Response(_) => MessageKind::Response,
            Message::Notification(_) => MessageKind::Notification,
            Message::Error(_) => MessageKind::Error,
        }
    }

    /// Serialize as a single line (no trailing newline).
    pub fn to_line(&self) -> Result<String, McpError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── MCP methods ─────────────────────────────────────────────────────

/// The request methods this runtime serves.
///
/// Both the canonical slash names (`tools/list`) and the underscore aliases
/// (`list_tools`) are accepted on input; [`McpMethod::as_str`] always yields
/// the canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum McpMethod {
    Initialize,
    Ping,
    ListTools,
    CallTool,
    ListPrompts,
    GetPrompt,
}

impl McpMethod {
    pub fn parse(name: &str) -> Option<Self> {
        let method = match name {
            "initialize" => McpMethod::Initialize,
            "ping" => McpMethod::Ping,
            "tools/list" | "list_tools" => McpMethod::ListTools,
            "tools/call" | "call_tool" => McpMethod::CallTool,
            "prompts/list" | "list_prompts" => McpMethod::ListPrompts,
            "prompts/get" | "get_prompt" => McpMethod::GetPrompt,
            _ => return None,
        };
        Some(method)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            McpMethod::Initialize => "initialize",
            McpMethod::Ping => "ping",
            McpMethod::ListTools => "tools/list",
            McpMethod::CallTool => "tools/call",
            McpMethod::ListPrompts => "prompts/list",
            McpMethod::GetPrompt => "prompts/get",
        }
    }

    /// Permission a credential must grant to invoke this method.
    /// `None` for methods open to everyone.
    pub fn permission(&self) -> Option<&'static str> {
        match self {
            McpMethod::Initialize | McpMethod::Ping => None,
            McpMethod::ListTools => Some("tools:list"),
            McpMethod::CallTool => Some("tools:call"),
            McpMethod::ListPrompts => Some("prompts:list"),
            McpMethod::GetPrompt => Some("prompts:get"),
        }
    }
}

impl fmt::Display for McpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── MCP Initialize ──────────────────────────────────────────────────

/// Parameters for the `initialize` MCP method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Capabilities,
    pub client_info: ClientInfo,
}

/// Information about the connecting client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ClientInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }
    }
}

/// Result returned from the `initialize` method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Capabilities,
    pub server_info: ServerInfo,
}

/// Information about the MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

// ── MCP tools ───────────────────────────────────────────────────────

/// Result of `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolInfo>,
}

/// Describes a single tool in MCP format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl From<ToolDefinition> for ToolInfo {
    fn from(def: ToolDefinition) -> Self {
        Self {
            name: def.name,
            description: def.description,
            input_schema: def.input_schema,
        }
    }
}

impl From<ToolInfo> for ToolDefinition {
    fn from(info: ToolInfo) -> Self {
        Self {
            name: info.name,
            description: info.description,
            input_schema: info.input_schema,
        }
    }
}

/// Parameters for `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default = "empty_object")]
    pub arguments: Value,
}

/// Result of `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl CallToolResult {
    /// All text blocks joined by newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(Content::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ── MCP prompts ─────────────────────────────────────────────────────

/// Result of `prompts/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListPromptsResult {
    pub prompts: Vec<PromptDefinition>,
}

/// Parameters for `prompts/get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptParams {
    pub name: String,
    #[serde(default)]
    pub arguments: HashMap<String, String>,
}

/// Result of `prompts/get`: ordered, role-tagged messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetPromptResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Keeps an explicit `"result": null` distinct from an absent result.
fn present<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request.
    pub fn new(id: impl Into<RpcId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Deserialize `params` into a typed structure. Missing params are
    /// treated as an empty object.
    pub fn parse_params<T: DeserializeOwned>(&self) -> Result<T, McpError> {
        let params = self.params.clone().unwrap_or_else(empty_object);
        serde_json::from_value(params).map_err(|e| McpError::InvalidParams(e.to_string()))
    }

    /// The credential carried in `params._meta.authorization`, if any.
    pub fn meta_authorization(&self) -> Option<&str> {
        self.params
            .as_ref()?
            .get("_meta")?
            .get("authorization")?
            .as_str()
    }

    /// Attach a credential under `params._meta.authorization`.
    pub fn set_meta_authorization(&mut self, credential: &str) {
        let params = self.params.get_or_insert_with(empty_object);
        if let Value::Object(map) = params {
            let meta = map.entry("_meta").or_insert_with(empty_object);
            if let Value::Object(meta) = meta {
                meta.insert("authorization".to_string(), Value::String(credential.to_string()));
            }
        }
    }
}

impl JsonRpcResponse {
    /// Create a successful response.
    pub fn success(id: RpcId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn failure(id: Option<RpcId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Convert into the result value, mapping an error object back into a
    /// classified [`McpError`].
    pub fn into_result(self) -> Result<Value, McpError> {
        match self.error {
            Some(error) => Err(McpError::from_rpc_error(error)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

impl JsonRpcNotification {
    /// Create a new JSON-RPC 2.0 notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}
