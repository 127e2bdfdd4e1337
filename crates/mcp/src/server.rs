//! MCP server implementation.
//!
//! Holds tool and prompt registries and exposes them over the MCP protocol:
//! line-delimited JSON-RPC via [`McpServer::serve`], HTTP via
//! [`McpServer::router`], or direct calls via [`McpServer::handle_request`].
//! Every dispatch is validated, optionally authorized, and isolated from
//! handler failures: a tool that errors or panics yields an `InternalError`
//! response, never a crashed server.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};

use switchboard_tool_runtime::{
    validate_input, Prompt, PromptDefinition, PromptError, PromptRegistry, Tool, ToolContext,
    ToolError, ToolRegistry,
};

use crate::auth::{AuthManager, Credential};
use crate::capabilities::Capabilities;
use crate::error::{AuthError, McpError};
use crate::transport::{LineIo, LineReader, LineWriter, NOTIFICATION_BUFFER};
use crate::types::*;
use crate::validate::salvage_id;

/// Per-connection state for [`McpServer::serve`] and the in-process
/// transport.
#[derive(Default)]
pub(crate) struct Peer {
    negotiated: StdMutex<Option<Capabilities>>,
}

impl Peer {
    fn record(&self, capabilities: Capabilities) {
        if let Ok(mut slot) = self.negotiated.lock() {
            *slot = Some(capabilities);
        }
    }

    /// Forget the negotiation; the next connection must initialize again.
    pub(crate) fn reset(&self) {
        if let Ok(mut slot) = self.negotiated.lock() {
            *slot = None;
        }
    }

    /// Whether `notification` should be passed on to this peer.
    pub(crate) fn forwards(&self, notification: &JsonRpcNotification) -> bool {
        self.wants(list_capability(&notification.method))
    }

    /// Whether the peer asked to hear about changes to `capability`.
    fn wants(&self, capability: &str) -> bool {
        self.negotiated
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|caps| caps.list_changed(capability)))
            .unwrap_or(false)
    }
}

/// MCP server exposing a tool registry and a prompt registry.
///
/// Shared as `Arc<McpServer>`; registration and dispatch both take `&self`.
pub struct McpServer {
    info: ServerInfo,
    capabilities: Capabilities,
    tools: RwLock<ToolRegistry>,
    prompts: RwLock<PromptRegistry>,
    auth: Option<AuthManager>,
    events: broadcast::Sender<JsonRpcNotification>,
}

impl McpServer {
    pub fn new(name: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(NOTIFICATION_BUFFER);
        Self {
            info: ServerInfo {
                name: name.into(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
            capabilities: Capabilities::standard(),
            tools: RwLock::new(ToolRegistry::new()),
            prompts: RwLock::new(PromptRegistry::new()),
            auth: None,
            events,
        }
    }

    /// Require credentials on every dispatch except `initialize` and `ping`.
    pub fn with_auth(mut self, auth: AuthManager) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Override the advertised capability set.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Server-initiated notifications (list-changed events).
    pub fn subscribe(&self) -> broadcast::Receiver<JsonRpcNotification> {
        self.events.subscribe()
    }

    fn announce(&self, method: &str) {
        // No receivers simply means nobody is connected.
        let _ = self.events.send(JsonRpcNotification::new(method, None));
    }

    // ── Registration ────────────────────────────────────────────────

    /// Register a tool, replacing any tool with the same name.
    pub async fn register_tool(&self, tool: impl Tool + 'static) -> Option<Arc<dyn Tool>> {
        self.register_tool_arc(Arc::new(tool)).await
    }

    pub async fn register_tool_arc(&self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        let name = tool.definition().name;
        let replaced = self.tools.write().await.register_arc(tool);
        info!(tool = %name, replaced = replaced.is_some(), "Registered tool");
        self.announce(notifications::TOOLS_LIST_CHANGED);
        replaced
    }

    /// Register a prompt, replacing any prompt with the same name.
    pub async fn register_prompt(&self, prompt: impl Prompt + 'static) -> Option<Arc<dyn Prompt>> {
        self.register_prompt_arc(Arc::new(prompt)).await
    }

    pub async fn register_prompt_arc(&self, prompt: Arc<dyn Prompt>) -> Option<Arc<dyn Prompt>> {
        let name = prompt.definition().name;
        let replaced = self.prompts.write().await.register_arc(prompt);
        info!(prompt = %name, replaced = replaced.is_some(), "Registered prompt");
        self.announce(notifications::PROMPTS_LIST_CHANGED);
        replaced
    }

    // ── Operations ──────────────────────────────────────────────────

    pub async fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .read()
            .await
            .list()
            .into_iter()
            .map(ToolInfo::from)
            .collect()
    }

    pub async fn list_prompts(&self) -> Vec<PromptDefinition> {
        self.prompts.read().await.list()
    }

    /// Look up, validate and run a tool.
    ///
    /// Unknown name → `MethodNotFound`; schema violations → `InvalidParams`
    /// before the handler runs; handler error or panic → `Internal`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        context: ToolContext,
    ) -> Result<CallToolResult, McpError> {
        let tool = self
            .tools
            .read()
            .await
            .get(name)
            .ok_or_else(|| McpError::MethodNotFound(format!("unknown tool '{name}'")))?;

        let definition = tool.definition();
        if let Err(violations) = validate_input(&arguments, &definition.input_schema) {
            let detail = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(McpError::InvalidParams(format!("{name}: {detail}")));
        }

        debug!(tool = %name, "Executing tool");
        let outcome = AssertUnwindSafe(tool.execute(arguments, &context))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(output)) => Ok(CallToolResult {
                content: output.content,
                is_error: false,
            }),
            Ok(Err(ToolError::InvalidInput(msg))) => Err(McpError::InvalidParams(msg)),
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "Tool failed");
                Err(McpError::Internal(e.to_string()))
            }
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                warn!(tool = %name, panic = %msg, "Tool panicked");
                Err(McpError::Internal(format!("tool '{name}' panicked: {msg}")))
            }
        }
    }

    /// Look up and render a prompt. Missing required arguments →
    /// `InvalidParams`; render failure or panic → `Internal`.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<GetPromptResult, McpError> {
        let prompt = self
            .prompts
            .read()
            .await
            .get(name)
            .ok_or_else(|| McpError::MethodNotFound(format!("unknown prompt '{name}'")))?;

        let definition = prompt.definition();
        let missing = definition.missing_arguments(&arguments);
        if !missing.is_empty() {
            return Err(McpError::InvalidParams(format!(
                "{name}: missing required argument(s): {}",
                missing.join(", ")
            )));
        }

        let outcome = AssertUnwindSafe(prompt.render(&arguments)).catch_unwind().await;
        match outcome {
            Ok(Ok(messages)) => Ok(GetPromptResult {
                description: definition.description,
                messages,
            }),
            Ok(Err(PromptError::MissingArgument(arg))) => Err(McpError::InvalidParams(format!(
                "{name}: missing required argument(s): {arg}"
            ))),
            Ok(Err(e)) => Err(McpError::Internal(e.to_string())),
            Err(panic) => Err(McpError::Internal(format!(
                "prompt '{name}' panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }

    // ── Dispatch ────────────────────────────────────────────────────

    /// Handle one request. `credential` is the transport-level credential
    /// (HTTP `Authorization`); `params._meta.authorization` is the fallback.
    pub async fn handle_request(
        &self,
        request: JsonRpcRequest,
        credential: Option<&Credential>,
    ) -> JsonRpcResponse {
        self.dispatch(request, credential, None).await
    }

    /// Same as [`handle_request`](Self::handle_request), recording what
    /// `initialize` negotiates on `peer`.
    pub(crate) async fn handle_request_from(
        &self,
        request: JsonRpcRequest,
        credential: Option<&Credential>,
        peer: &Peer,
    ) -> JsonRpcResponse {
        self.dispatch(request, credential, Some(peer)).await
    }

    /// Handle one notification from a client.
    pub fn handle_notification(&self, notification: &JsonRpcNotification) {
        match notification.method.as_str() {
            notifications::INITIALIZED => info!("Client confirmed initialization"),
            notifications::CANCELLED => debug!(params = ?notification.params, "Client cancelled a request"),
            method => debug!(method = %method, "Unknown notification, ignoring"),
        }
    }

    /// Handle one raw message. Returns the serialized response, or `None`
    /// when nothing should be sent back (notifications, stray responses).
    pub async fn handle_message(&self, raw: &str, credential: Option<&Credential>) -> Option<String> {
        self.handle_line(raw, credential, None).await
    }

    async fn handle_line(
        &self,
        raw: &str,
        credential: Option<&Credential>,
        peer: Option<&Peer>,
    ) -> Option<String> {
        let response = match Message::parse(raw) {
            Ok(Message::Request(request)) => self.dispatch(request, credential, peer).await,
            Ok(Message::Notification(notification)) => {
                self.handle_notification(&notification);
                return None;
            }
            Ok(Message::Response(_)) | Ok(Message::Error(_)) => {
                debug!("Ignoring response sent to server");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Rejected malformed message");
                let id = serde_json::from_str::<Value>(raw).ok().and_then(|v| salvage_id(&v));
                JsonRpcResponse::failure(id, e.to_rpc_error())
            }
        };

        match serde_json::to_string(&response) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!(error = %e, "Failed to serialize response");
                None
            }
        }
    }

    async fn dispatch(
        &self,
        request: JsonRpcRequest,
        credential: Option<&Credential>,
        peer: Option<&Peer>,
    ) -> JsonRpcResponse {
        let id = request.id.clone();
        debug!(id = %id, method = %request.method, "Handling request");

        match self.route(&request, credential, peer).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                debug!(id = %id, method = %request.method, error = %e, "Request failed");
                JsonRpcResponse::failure(Some(id), e.to_rpc_error())
            }
        }
    }

    async fn route(
        &self,
        request: &JsonRpcRequest,
        credential: Option<&Credential>,
        peer: Option<&Peer>,
    ) -> Result<Value, McpError> {
        let method = McpMethod::parse(&request.method)
            .ok_or_else(|| McpError::MethodNotFound(request.method.clone()))?;
        let subject = self.authorize(method, request, credential)?;

        match method {
            McpMethod::Initialize => {
                let params: InitializeParams = request.parse_params()?;
                let negotiated = Capabilities::negotiate(&self.capabilities, &params.capabilities);
                info!(
                    client = %params.client_info.name,
                    version = %params.protocol_version,
                    negotiated = ?negotiated.names().collect::<Vec<_>>(),
                    "Handling initialize"
                );
                if let Some(peer) = peer {
                    peer.record(negotiated);
                }
                Ok(serde_json::to_value(InitializeResult {
                    protocol_version: PROTOCOL_VERSION.to_string(),
                    capabilities: self.capabilities.clone(),
                    server_info: self.info.clone(),
                })?)
            }
            McpMethod::Ping => Ok(Value::Object(Default::default())),
            McpMethod::ListTools => Ok(serde_json::to_value(ListToolsResult {
                tools: self.list_tools().await,
            })?),
            McpMethod::CallTool => {
                let params: CallToolParams = request.parse_params()?;
                let context = ToolContext {
                    subject,
                    request_id: Some(request.id.to_string()),
                };
                let result = self.call_tool(&params.name, params.arguments, context).await?;
                Ok(serde_json::to_value(result)?)
            }
            McpMethod::ListPrompts => Ok(serde_json::to_value(ListPromptsResult {
                prompts: self.list_prompts().await,
            })?),
            McpMethod::GetPrompt => {
                let params: GetPromptParams = request.parse_params()?;
                let result = self.get_prompt(&params.name, params.arguments).await?;
                Ok(serde_json::to_value(result)?)
            }
        }
    }

    /// Check the caller may invoke `method`. Returns the authenticated
    /// subject, or `None` when auth is off or the method is open.
    fn authorize(
        &self,
        method: McpMethod,
        request: &JsonRpcRequest,
        credential: Option<&Credential>,
    ) -> Result<Option<String>, McpError> {
        let (Some(auth), Some(permission)) = (&self.auth, method.permission()) else {
            return Ok(None);
        };

        let from_meta = request.meta_authorization().and_then(Credential::parse);
        let credential = credential
            .or(from_meta.as_ref())
            .ok_or_else(|| AuthError::InvalidCredential("no credential presented".to_string()))?;

        let principal = auth.authorize(credential, permission).map_err(|e| {
            warn!(method = %method, reason = e.reason(), "Rejected request");
            e
        })?;
        Ok(Some(principal.subject))
    }

    // ── Serving ─────────────────────────────────────────────────────

    /// Serve one line-oriented connection until the peer closes it.
    ///
    /// Each request is dispatched on its own task so a slow tool never
    /// blocks the connection; a single writer task owns the output side.
    /// List-changed notifications are forwarded only if the peer negotiated
    /// `listChanged` for that capability.
    pub async fn serve<L: LineIo>(self: Arc<Self>, io: L) -> Result<(), McpError> {
        info!(server = %self.info.name, "MCP server starting");
        let (mut reader, mut writer) = io.split();
        let peer = Arc::new(Peer::default());
        let mut events = self.subscribe();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
        let writer_task = tokio::spawn(async move {
            while let Some(line) = out_rx.recv().await {
                if let Err(e) = writer.write_line(&line).await {
                    warn!(error = %e, "Failed to write response, closing connection");
                    break;
                }
            }
        });

        // Reading happens on its own task: `read_line` is not cancel-safe,
        // so it must not race inside `select!`.
        let (in_tx, mut in_rx) = mpsc::channel::<Result<String, McpError>>(256);
        let reader_task = tokio::spawn(async move {
            loop {
                match reader.read_line().await {
                    Ok(Some(line)) => {
                        if in_tx.send(Ok(line)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = in_tx.send(Err(e)).await;
                        break;
                    }
                }
            }
        });

        let mut result = Ok(());
        loop {
            tokio::select! {
                incoming = in_rx.recv() => match incoming {
                    Some(Ok(line)) => {
                        let server = Arc::clone(&self);
                        let peer = Arc::clone(&peer);
                        let out = out_tx.clone();
                        tokio::spawn(async move {
                            if let Some(response) = server.handle_line(&line, None, Some(peer.as_ref())).await {
                                let _ = out.send(response).await;
                            }
                        });
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Read failed, shutting down");
                        result = Err(e);
                        break;
                    }
                    None => {
                        info!("Transport closed, shutting down");
                        break;
                    }
                },
                event = events.recv() => match event {
                    Ok(notification) => {
                        if peer.forwards(&notification) {
                            if let Ok(line) = serde_json::to_string(&notification) {
                                let _ = out_tx.send(line).await;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Dropped list-changed notifications");
                    }
                    Err(broadcast::error::RecvError::Closed) => {}
                },
            }
        }

        reader_task.abort();
        // In-flight handlers hold senders; the writer drains until they finish.
        drop(out_tx);
        let _ = writer_task.await;
        result
    }

    /// Axum router serving `POST /mcp`.
    ///
    /// A request yields `200` with the JSON-RPC response; a notification
    /// yields `202 Accepted` with no body.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new().route("/mcp", post(http_handler)).with_state(self)
    }
}

async fn http_handler(
    State(server): State<Arc<McpServer>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let credential = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(Credential::parse);

    match server.handle_message(&body, credential.as_ref()).await {
        Some(json) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            json,
        )
            .into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Capability a list-changed notification belongs to.
fn list_capability(method: &str) -> &'static str {
    match method {
        notifications::PROMPTS_LIST_CHANGED => "prompts",
        notifications::TOOLS_LIST_CHANGED => "tools",
        _ => "",
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
