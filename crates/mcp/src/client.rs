//! MCP client implementation.
//!
//! Drives any [`Transport`]: connects with retry, performs the initialize
//! handshake, and offers typed wrappers for every MCP method. List results
//! can be cached for a TTL; a background listener drops the cache when the
//! server announces that a list changed. The listener starts on `connect`,
//! `initialize` or the first cached list call, so a client wrapped around
//! an already-connected transport is covered too. Remote tools can be wrapped as
//! local [`Tool`]s through [`RemoteTool`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use switchboard_core::ClientConfig;
use switchboard_tool_runtime::{
    PromptDefinition, Tool, ToolContext, ToolDefinition, ToolError, ToolOutput,
};

use crate::auth::TokenClaims;
use crate::capabilities::Capabilities;
use crate::error::{AuthError, McpError};
use crate::transport::Transport;
use crate::types::*;

/// A cached list result and when it was fetched.
struct Cached<T> {
    value: T,
    fetched_at: Instant,
}

/// One cache slot. `generation` is bumped on every invalidation so a fetch
/// that raced with a list-changed notification does not store stale data.
struct Slot<T> {
    entry: Option<Cached<T>>,
    generation: u64,
}

impl<T: Clone> Slot<T> {
    fn new() -> Self {
        Self {
            entry: None,
            generation: 0,
        }
    }

    fn fresh(&self, ttl: std::time::Duration) -> Option<T> {
        self.entry
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < ttl)
            .map(|c| c.value.clone())
    }

    fn store(&mut self, value: T, generation: u64) {
        if generation == self.generation {
            self.entry = Some(Cached {
                value,
                fetched_at: Instant::now(),
            });
        }
    }

    fn invalidate(&mut self) {
        self.entry = None;
        self.generation += 1;
    }
}

struct Caches {
    tools: Slot<Vec<ToolInfo>>,
    prompts: Slot<Vec<PromptDefinition>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// MCP client over a pluggable transport.
///
/// Share as `Arc<McpClient>`; every method takes `&self` and concurrent
/// calls are paired with their responses by the transport.
pub struct McpClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    token: Option<String>,
    next_id: AtomicI64,
    caches: Arc<Mutex<Caches>>,
    negotiated: Mutex<Option<Capabilities>>,
    server_info: Mutex<Option<ServerInfo>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl McpClient {
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            token: None,
            next_id: AtomicI64::new(1),
            caches: Arc::new(Mutex::new(Caches {
                tools: Slot::new(),
                prompts: Slot::new(),
            })),
            negotiated: Mutex::new(None),
            server_info: Mutex::new(None),
            listener: Mutex::new(None),
        }
    }

    /// Authenticate every request with a bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Connect the transport, retrying up to `retry_attempts` times in total
    /// with `retry_delay` between attempts.
    #[instrument(skip_all, fields(transport = %self.transport.kind()))]
    pub async fn connect(&self) -> Result<(), McpError> {
        let attempts = self.config.retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.transport.connect().await {
                Ok(()) => break,
                Err(e) if attempt < attempts => {
                    warn!(attempt, attempts, error = %e, "Connect failed, retrying");
                    tokio::time::sleep(self.config.retry_delay()).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(attempts, error = %e, "Connect failed, giving up");
                    return Err(e);
                }
            }
        }

        self.ensure_listener();
        info!(attempt, "MCP client connected");
        Ok(())
    }

    /// Start the list-changed listener unless one is already running.
    fn ensure_listener(&self) {
        let running = lock(&self.listener)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        if !running {
            self.spawn_listener();
        }
    }

    fn spawn_listener(&self) {
        let mut events = self.transport.subscribe();
        let caches = Arc::clone(&self.caches);
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(notification) => match notification.method.as_str() {
                        notifications::TOOLS_LIST_CHANGED => {
                            debug!("Tool list changed, dropping cache");
                            lock(&caches).tools.invalidate();
                        }
                        notifications::PROMPTS_LIST_CHANGED => {
                            debug!("Prompt list changed, dropping cache");
                            lock(&caches).prompts.invalidate();
                        }
                        other => debug!(method = %other, "Ignoring server notification"),
                    },
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        let mut caches = lock(&caches);
                        caches.tools.invalidate();
                        caches.prompts.invalidate();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        if let Some(previous) = lock(&self.listener).replace(handle) {
            previous.abort();
        }
    }

    /// Perform the `initialize` handshake and send `notifications/initialized`.
    pub async fn initialize(&self, client_info: ClientInfo) -> Result<InitializeResult, McpError> {
        self.ensure_listener();
        let ours = Capabilities::standard();
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ours.clone(),
            client_info,
        };
        let result: InitializeResult = self
            .request(McpMethod::Initialize, Some(serde_json::to_value(params)?))
            .await?;

        if result.protocol_version != PROTOCOL_VERSION {
            return Err(McpError::Protocol(format!(
                "server speaks protocol {}, expected {PROTOCOL_VERSION}",
                result.protocol_version
            )));
        }

        let negotiated = Capabilities::negotiate(&result.capabilities, &ours);
        info!(
            server = %result.server_info.name,
            capabilities = ?negotiated.names().collect::<Vec<_>>(),
            "MCP session initialized"
        );
        *lock(&self.negotiated) = Some(negotiated);
        *lock(&self.server_info) = Some(result.server_info.clone());

        self.transport
            .notify(JsonRpcNotification::new(notifications::INITIALIZED, None))
            .await?;
        Ok(result)
    }

    /// Capabilities agreed during `initialize`, if it has run.
    pub fn negotiated_capabilities(&self) -> Option<Capabilities> {
        lock(&self.negotiated).clone()
    }

    pub fn server_info(&self) -> Option<ServerInfo> {
        lock(&self.server_info).clone()
    }

    pub async fn ping(&self) -> Result<(), McpError> {
        let _: Value = self.request(McpMethod::Ping, None).await?;
        Ok(())
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>, McpError> {
        if self.config.cache_enabled {
            self.ensure_listener();
        }
        let generation = {
            let caches = lock(&self.caches);
            if self.config.cache_enabled {
                if let Some(hit) = caches.tools.fresh(self.config.cache_ttl()) {
                    debug!(count = hit.len(), "Tool list served from cache");
                    return Ok(hit);
                }
            }
            caches.tools.generation
        };

        let result: ListToolsResult = self.request(McpMethod::ListTools, None).await?;
        if self.config.cache_enabled {
            lock(&self.caches).tools.store(result.tools.clone(), generation);
        }
        Ok(result.tools)
    }

    pub async fn list_prompts(&self) -> Result<Vec<PromptDefinition>, McpError> {
        if self.config.cache_enabled {
            self.ensure_listener();
        }
        let generation = {
            let caches = lock(&self.caches);
            if self.config.cache_enabled {
                if let Some(hit) = caches.prompts.fresh(self.config.cache_ttl()) {
                    debug!(count = hit.len(), "Prompt list served from cache");
                    return Ok(hit);
                }
            }
            caches.prompts.generation
        };

        let result: ListPromptsResult = self.request(McpMethod::ListPrompts, None).await?;
        if self.config.cache_enabled {
            lock(&self.caches).prompts.store(result.prompts.clone(), generation);
        }
        Ok(result.prompts)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        self.request(McpMethod::CallTool, Some(serde_json::to_value(params)?))
            .await
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<GetPromptResult, McpError> {
        let params = GetPromptParams {
            name: name.to_string(),
            arguments,
        };
        self.request(McpMethod::GetPrompt, Some(serde_json::to_value(params)?))
            .await
    }

    /// Drop both list caches.
    pub fn invalidate_caches(&self) {
        let mut caches = lock(&self.caches);
        caches.tools.invalidate();
        caches.prompts.invalidate();
    }

    /// Stop the listener, drop caches and close the transport.
    pub async fn disconnect(&self) -> Result<(), McpError> {
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
        self.invalidate_caches();
        *lock(&self.negotiated) = None;
        self.transport.close().await?;
        info!("MCP client disconnected");
        Ok(())
    }

    /// Wrap every tool the server offers as a local [`Tool`].
    pub async fn remote_tools(self: &Arc<Self>) -> Result<Vec<RemoteTool>, McpError> {
        Ok(self
            .list_tools()
            .await?
            .into_iter()
            .map(|info| RemoteTool {
                client: Arc::clone(self),
                info,
            })
            .collect())
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: McpMethod,
        params: Option<Value>,
    ) -> Result<T, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut request = JsonRpcRequest::new(id, method.as_str(), params);

        if let Some(token) = &self.token {
            if let Some(permission) = method.permission() {
                check_token(token, permission)?;
            }
            request.set_meta_authorization(&format!("Bearer {token}"));
        }

        debug!(id, method = %method, "Sending request");
        let value = self.transport.send(request).await?.into_result()?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Refuse locally what the server would refuse anyway: an expired token
/// or one lacking `permission`.
fn check_token(token: &str, permission: &str) -> Result<(), AuthError> {
    let claims = TokenClaims::decode_unverified(token)?;
    if claims.is_expired_at(chrono::Utc::now().timestamp()) {
        return Err(AuthError::Expired);
    }
    if !claims.grants(permission) {
        return Err(AuthError::PermissionDenied(permission.to_string()));
    }
    Ok(())
}

impl Drop for McpClient {
    fn drop(&mut self) {
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
    }
}

/// A remote MCP tool usable wherever a local [`Tool`] is expected.
pub struct RemoteTool {
    client: Arc<McpClient>,
    info: ToolInfo,
}

impl RemoteTool {
    pub fn name(&self) -> &str {
        &self.info.name
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::from(self.info.clone())
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolOutput, ToolError> {
        match self.client.call_tool(&self.info.name, input).await {
            Ok(result) if result.is_error => Err(ToolError::ExecutionFailed(result.text())),
            Ok(result) => Ok(ToolOutput {
                content: result.content,
            }),
            Err(McpError::InvalidParams(msg)) => Err(ToolError::InvalidInput(msg)),
            Err(McpError::Timeout(after)) => Err(ToolError::Timeout(after)),
            Err(e) => Err(ToolError::ExecutionFailed(e.to_string())),
        }
    }
}
