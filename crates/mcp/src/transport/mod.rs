//! MCP transport layer.
//!
//! [`Transport`] is the client-side contract: connect, send a request and
//! wait for its paired response, fire notifications, close. Implementations:
//!
//! - [`ProcessTransport`]: spawns a server process, newline-delimited JSON
//!   over its stdin/stdout, many concurrent requests multiplexed by id
//! - [`HttpTransport`]: one `POST` per message over a pooled `reqwest` client
//! - [`InProcessTransport`]: calls straight into an [`McpServer`](crate::McpServer)
//!
//! The server side reads and writes lines through [`LineIo`].

mod http;
mod in_process;
mod line;
mod process;

pub use http::HttpTransport;
pub use in_process::InProcessTransport;
pub use line::{ChannelLines, LineIo, LineReader, LineWriter, StreamLines};
pub use process::ProcessTransport;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

use switchboard_core::{TransportConfig, TransportKind};

use crate::error::McpError;
use crate::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Capacity of the server-notification broadcast channel.
pub(crate) const NOTIFICATION_BUFFER: usize = 64;

/// A client-side connection to one MCP server.
///
/// All methods take `&self` so a transport can be shared behind an `Arc`
/// and used by many concurrent callers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the connection. Calling it on a connected transport is a no-op.
    async fn connect(&self) -> Result<(), McpError>;

    /// Send a request and wait for the response carrying the same id.
    ///
    /// The wait is bounded by the transport's timeout. An error response from
    /// the peer is returned as `Ok`; use [`JsonRpcResponse::into_result`].
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError>;

    /// Send a notification. No response is expected.
    async fn notify(&self, notification: JsonRpcNotification) -> Result<(), McpError>;

    /// Tear down the connection, failing every pending `send`.
    async fn close(&self) -> Result<(), McpError>;

    fn is_connected(&self) -> bool;

    fn kind(&self) -> TransportKind;

    /// Notifications pushed by the server (e.g. list-changed events).
    fn subscribe(&self) -> broadcast::Receiver<JsonRpcNotification>;
}

/// Build the transport described by `config` without connecting it.
pub fn build_transport(config: &TransportConfig) -> Result<Arc<dyn Transport>, McpError> {
    config.validate()?;
    let transport: Arc<dyn Transport> = match config.kind {
        TransportKind::Stdio => Arc::new(ProcessTransport::new(config)?),
        TransportKind::Http => Arc::new(HttpTransport::new(config)?),
    };
    Ok(transport)
}

/// Build the transport described by `config` and connect it.
pub async fn connect_from_config(config: &TransportConfig) -> Result<Arc<dyn Transport>, McpError> {
    let transport = build_transport(config)?;
    transport.connect().await?;
    Ok(transport)
}
