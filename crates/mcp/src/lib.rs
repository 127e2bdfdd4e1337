//! Switchboard: an MCP (Model Context Protocol) runtime.
//!
//! Implements MCP over JSON-RPC 2.0 on both sides of the wire, plus the
//! plumbing needed to run many servers behind one client.
//!
//! # Architecture
//!
//! - **types**: JSON-RPC 2.0 and MCP-specific protocol types
//! - **validate**: structural validation and classification of raw messages
//! - **capabilities**: capability sets and their negotiation
//! - **transport**: pluggable transports (subprocess, HTTP, in-process) and
//!   server-side line I/O
//! - **server**: MCP server dispatching to tool and prompt registries
//! - **client**: MCP client with handshake, retry and list caching
//! - **session**: bounded pool of live client sessions with idle eviction
//! - **balancer**: load balancing with per-backend circuit breakers
//! - **auth**: HMAC bearer tokens and Ed25519 certificates
//! - **error**: unified error type and JSON-RPC error mapping
//!
//! # Usage
//!
//! ## Server
//! ```no_run
//! use std::sync::Arc;
//! use switchboard_mcp::server::McpServer;
//! use switchboard_mcp::transport::StreamLines;
//! use switchboard_tool_runtime::EchoTool;
//!
//! # async fn example() {
//! let server = Arc::new(McpServer::new("my-server"));
//! server.register_tool(EchoTool).await;
//! server.serve(StreamLines::stdio()).await.unwrap();
//! # }
//! ```
//!
//! ## Client
//! ```no_run
//! use switchboard_core::{ClientConfig, TransportConfig};
//! use switchboard_mcp::client::McpClient;
//! use switchboard_mcp::transport::connect_from_config;
//! use switchboard_mcp::types::ClientInfo;
//!
//! # async fn example() {
//! let transport = connect_from_config(&TransportConfig::stdio("my-mcp-server", &[]))
//!     .await
//!     .unwrap();
//! let client = McpClient::new(transport, ClientConfig::default());
//! client.initialize(ClientInfo::new("my-client")).await.unwrap();
//! let tools = client.list_tools().await.unwrap();
//! # }
//! ```

pub mod auth;
pub mod balancer;
pub mod capabilities;
pub mod client;
pub mod error;
pub mod server;
pub mod session;
pub mod transport;
pub mod types;
pub mod validate;

pub use auth::{AuthManager, CertificateAuthority, Credential, Principal, TokenClaims, TokenValidation};
pub use balancer::{BackendStats, CircuitState, LoadBalancer};
pub use capabilities::{CapabilityOptions, Capabilities};
pub use client::{McpClient, RemoteTool};
pub use error::{AuthError, McpError};
pub use server::McpServer;
pub use session::{SessionHandle, SessionId, SessionInfo, SessionManager};
pub use transport::{
    build_transport, connect_from_config, HttpTransport, InProcessTransport, ProcessTransport,
    Transport,
};
pub use types::*;
