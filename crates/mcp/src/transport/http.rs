//! HTTP transport: one `POST` per JSON-RPC message.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use switchboard_core::{TransportConfig, TransportKind};

use super::{Transport, NOTIFICATION_BUFFER};
use crate::error::McpError;
use crate::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, Message, RpcId};

/// Transport posting each message to `base_url + path`.
///
/// Connections are pooled by `reqwest` (bounded idle connections per host,
/// idle keep-alive timeout). Every request carries the configured headers
/// and, when set, `Authorization: Bearer <token>`. There is no server push
/// over this transport, so [`Transport::subscribe`] never yields.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    connected: AtomicBool,
    notifications: broadcast::Sender<JsonRpcNotification>,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, McpError> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| McpError::Transport("http transport requires a base_url".to_string()))?;
        let endpoint = format!("{}{}", base_url.trim_end_matches('/'), config.path);

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .pool_max_idle_per_host(config.pool_size)
            .pool_idle_timeout(config.keep_alive())
            .default_headers(Self::default_headers(config)?)
            .build()
            .map_err(|e| McpError::Transport(format!("failed to build HTTP client: {e}")))?;
        let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER);

        Ok(Self {
            client,
            endpoint,
            timeout: config.timeout(),
            connected: AtomicBool::new(false),
            notifications,
        })
    }

    fn default_headers(config: &TransportConfig) -> Result<HeaderMap, McpError> {
        let invalid = |what: &str, e: &dyn std::fmt::Display| {
            McpError::Transport(format!("invalid header {what}: {e}"))
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(name, &e))?;
            let value = HeaderValue::from_str(value).map_err(|e| invalid(name.as_str(), &e))?;
            headers.insert(name, value);
        }
        if let Some(token) = &config.auth_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| invalid("authorization", &e))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, body: String) -> Result<(StatusCode, String), McpError> {
        let response = self
            .client
            .post(&self.endpoint)
            .body(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.classify(e))?;
        Ok((status, text))
    }

    fn classify(&self, e: reqwest::Error) -> McpError {
        if e.is_timeout() {
            McpError::Timeout(self.timeout)
        } else {
            McpError::Transport(e.to_string())
        }
    }

    async fn exchange(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let (status, body) = self.post(serde_json::to_string(request)?).await?;

        let response = match Message::parse(&body) {
            Ok(Message::Response(resp)) | Ok(Message::Error(resp)) => resp,
            Ok(other) => {
                return Err(McpError::Protocol(format!(
                    "expected a response, got a {:?}",
                    other.kind()
                )))
            }
            Err(_) if !status.is_success() => {
                return Err(McpError::Transport(format!("HTTP {status} from {}", self.endpoint)))
            }
            Err(e) => return Err(e),
        };

        match &response.id {
            Some(id) if *id == request.id => Ok(response),
            None if response.is_error() => Ok(response),
            other => Err(McpError::Protocol(format!(
                "response id {other:?} does not match request id {}",
                request.id
            ))),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    /// Probes the endpoint with `ping`; any JSON-RPC answer counts as up.
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn connect(&self) -> Result<(), McpError> {
        if self.is_connected() {
            return Ok(());
        }
        let probe = JsonRpcRequest::new(RpcId::String("connect-probe".into()), "ping", None);
        self.exchange(&probe).await?;
        self.connected.store(true, Ordering::SeqCst);
        info!("HTTP transport connected");
        Ok(())
    }

    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        if !self.is_connected() {
            return Err(McpError::NotConnected);
        }
        debug!(id = %request.id, method = %request.method, "posting request");
        self.exchange(&request).await
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<(), McpError> {
        if !self.is_connected() {
            return Err(McpError::NotConnected);
        }
        let (status, _) = self.post(serde_json::to_string(&notification)?).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(McpError::Transport(format!("HTTP {status} for notification {}", notification.method)))
        }
    }

    async fn close(&self) -> Result<(), McpError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn subscribe(&self) -> broadcast::Receiver<JsonRpcNotification> {
        self.notifications.subscribe()
    }
}
