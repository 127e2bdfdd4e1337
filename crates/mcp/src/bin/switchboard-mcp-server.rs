//! Demo MCP server exposing the built-in tools and prompts.
//!
//! Serves newline-delimited JSON-RPC on stdin/stdout by default, or HTTP
//! `POST /mcp` with `--http <addr>`. Logs go to stderr; stdout belongs to
//! the protocol.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use switchboard_core::{AuthConfig, RuntimeConfig};
use switchboard_mcp::auth::AuthManager;
use switchboard_mcp::server::McpServer;
use switchboard_mcp::transport::StreamLines;
use switchboard_tool_runtime::{CalculatorTool, CodeReviewPrompt, EchoTool, SleepTool};

#[derive(Parser, Debug)]
#[command(name = "switchboard-mcp-server", about = "Switchboard demo MCP server")]
struct Cli {
    /// Serve HTTP on this address instead of stdio.
    #[arg(long)]
    http: Option<SocketAddr>,

    /// Server name reported during initialize.
    #[arg(long, default_value = "switchboard-demo")]
    name: String,

    /// Runtime config file; only its `[auth]` section is used here.
    #[arg(long)]
    config: Option<PathBuf>,

    /// HMAC secret for bearer tokens. Enables auth.
    #[arg(long, env = "SWITCHBOARD_AUTH_TOKEN_SECRET", hide_env_values = true)]
    token_secret: Option<String>,

    /// File of trusted certificate issuer keys. Enables auth.
    #[arg(long, env = "SWITCHBOARD_AUTH_CERTIFICATE_PATH")]
    certificate_path: Option<PathBuf>,
}

impl Cli {
    fn auth_config(&self) -> anyhow::Result<AuthConfig> {
        let mut auth = match &self.config {
            Some(path) => {
                let auth = RuntimeConfig::auth_from_file(path)
                    .with_context(|| format!("loading config from {}", path.display()))?;
                info!(path = %path.display(), "Loaded auth config");
                auth
            }
            None => AuthConfig::default(),
        };
        if self.token_secret.is_some() {
            auth.token_secret = self.token_secret.clone();
        }
        if self.certificate_path.is_some() {
            auth.certificate_path = self.certificate_path.clone();
        }
        Ok(auth)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    switchboard_core::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut server = McpServer::new(cli.name.clone());
    match AuthManager::from_config(&cli.auth_config()?).context("configuring auth")? {
        Some(auth) => {
            info!("Auth enabled");
            server = server.with_auth(auth);
        }
        None => warn!("Auth disabled: every caller may invoke every method"),
    }

    let server = Arc::new(server);
    server.register_tool(EchoTool).await;
    server.register_tool(CalculatorTool).await;
    server.register_tool(SleepTool).await;
    server.register_prompt(CodeReviewPrompt).await;

    match cli.http {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("binding {addr}"))?;
            info!(addr = %listener.local_addr()?, "Serving MCP over HTTP");
            axum::serve(listener, server.router()).await?;
        }
        None => {
            server.serve(StreamLines::stdio()).await?;
        }
    }

    Ok(())
}
