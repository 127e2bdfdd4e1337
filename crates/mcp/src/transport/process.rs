//! Subprocess transport: newline-delimited JSON over a child's stdio.
//!
//! The child's pipes are owned by two background tasks. The writer task
//! drains an mpsc queue into stdin, so concurrent senders never interleave
//! partial lines. The reader task parses stdout line by line and completes
//! the pending request whose id matches each response.
//!
//! A send's timeout covers both queueing the line and waiting for the
//! answer, so a child that stops reading stdin cannot park callers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

use switchboard_core::{TransportConfig, TransportKind};

use super::{Transport, NOTIFICATION_BUFFER};
use crate::error::McpError;
use crate::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, Message, RpcId};

type PendingMap = Arc<Mutex<HashMap<RpcId, oneshot::Sender<JsonRpcResponse>>>>;

/// Everything tied to one spawned child. Replaced wholesale on reconnect.
struct Connection {
    child: Child,
    outgoing: mpsc::Sender<String>,
    pending: PendingMap,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Transport that spawns an MCP server process and talks to it over stdio.
pub struct ProcessTransport {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    timeout: Duration,
    connection: Mutex<Option<Connection>>,
    connected: Arc<AtomicBool>,
    notifications: broadcast::Sender<JsonRpcNotification>,
}

impl ProcessTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, McpError> {
        let command = config
            .command
            .clone()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| McpError::Transport("stdio transport requires a command".to_string()))?;
        let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER);

        Ok(Self {
            command,
            args: config.args.clone(),
            env: config.env.clone(),
            timeout: config.timeout(),
            connection: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            notifications,
        })
    }

    /// Background task: owns stdin, writes one line per queued message.
    async fn write_loop(mut stdin: ChildStdin, mut outgoing: mpsc::Receiver<String>) {
        while let Some(line) = outgoing.recv().await {
            let result = async {
                stdin.write_all(line.as_bytes()).await?;
                stdin.write_all(b"\n").await?;
                stdin.flush().await
            }
            .await;
            if let Err(e) = result {
                warn!(error = %e, "stdin write failed, stopping writer");
                break;
            }
        }
    }

    /// Background task: owns stdout, routes responses to pending callers.
    async fn read_loop(
        stdout: ChildStdout,
        pending: PendingMap,
        connected: Arc<AtomicBool>,
        notifications: broadcast::Sender<JsonRpcNotification>,
    ) {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    Self::dispatch_line(line, &pending, &notifications).await;
                }
                Ok(None) => {
                    debug!("server stdout closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "server stdout read failed");
                    break;
                }
            }
        }

        connected.store(false, Ordering::SeqCst);
        // Dropping the senders wakes every waiter with a closed-channel error.
        pending.lock().await.clear();
    }

    async fn dispatch_line(
        line: &str,
        pending: &Mutex<HashMap<RpcId, oneshot::Sender<JsonRpcResponse>>>,
        notifications: &broadcast::Sender<JsonRpcNotification>,
    ) {
        let message = match Message::parse(line) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "skipping non JSON-RPC line from server");
                return;
            }
        };

        match message {
            Message::Response(resp) | Message::Error(resp) => {
                let Some(id) = resp.id.clone() else {
                    warn!(error = ?resp.error, "server reported an error without an id");
                    return;
                };
                match pending.lock().await.remove(&id) {
                    Some(tx) => {
                        let _ = tx.send(resp);
                    }
                    None => debug!(id = %id, "response for unknown or expired id"),
                }
            }
            Message::Notification(notif) => {
                debug!(method = %notif.method, "server notification");
                let _ = notifications.send(notif);
            }
            Message::Request(req) => {
                debug!(method = %req.method, id = %req.id, "ignoring server-initiated request");
            }
        }
    }

    async fn spawn(&self) -> Result<Connection, McpError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::Transport(format!("failed to spawn '{}': {e}", self.command)))?;

        // `child` is dropped (and killed) if either pipe is missing.
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("failed to capture server stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("failed to capture server stdout".to_string()))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (outgoing, outgoing_rx) = mpsc::channel::<String>(256);

        let writer = tokio::spawn(Self::write_loop(stdin, outgoing_rx));
        let reader = tokio::spawn(Self::read_loop(
            stdout,
            Arc::clone(&pending),
            Arc::clone(&self.connected),
            self.notifications.clone(),
        ));

        Ok(Connection {
            child,
            outgoing,
            pending,
            reader,
            writer,
        })
    }

    async fn shutdown(conn: Connection) {
        let Connection {
            mut child,
            pending,
            reader,
            writer,
            ..
        } = conn;
        reader.abort();
        writer.abort();
        if let Err(e) = child.kill().await {
            debug!(error = %e, "kill failed, process already gone");
        }
        pending.lock().await.clear();
    }

    /// Queue handle and wait map of the live connection.
    async fn channels(&self) -> Result<(mpsc::Sender<String>, PendingMap), McpError> {
        let guard = self.connection.lock().await;
        match guard.as_ref() {
            Some(conn) if self.connected.load(Ordering::SeqCst) => {
                Ok((conn.outgoing.clone(), Arc::clone(&conn.pending)))
            }
            _ => Err(McpError::NotConnected),
        }
    }
}

#[async_trait]
impl Transport for ProcessTransport {
    #[instrument(skip_all, fields(command = %self.command))]
    async fn connect(&self) -> Result<(), McpError> {
        let mut guard = self.connection.lock().await;
        if guard.is_some() && self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(stale) = guard.take() {
            debug!("reaping exited server process");
            Self::shutdown(stale).await;
        }

        let conn = self.spawn().await?;
        info!(pid = ?conn.child.id(), "MCP server process started");
        *guard = Some(conn);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let deadline = Instant::now() + self.timeout;
        let (outgoing, pending) = self.channels().await?;
        let id = request.id.clone();
        let line = serde_json::to_string(&request)?;
        let (tx, rx) = oneshot::channel();

        {
            let mut map = pending.lock().await;
            if map.contains_key(&id) {
                return Err(McpError::Protocol(format!("request id {id} is already in flight")));
            }
            map.insert(id.clone(), tx);
        }

        match timeout_at(deadline, outgoing.send(line)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                pending.lock().await.remove(&id);
                return Err(McpError::Transport("server stdin closed".to_string()));
            }
            Err(_) => {
                pending.lock().await.remove(&id);
                warn!(id = %id, timeout = ?self.timeout, "request timed out waiting for stdin");
                return Err(McpError::Timeout(self.timeout));
            }
        }
        debug!(id = %id, method = %request.method, "sent request");

        match timeout_at(deadline, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(McpError::Transport(
                "connection closed before a response arrived".to_string(),
            )),
            Err(_) => {
                pending.lock().await.remove(&id);
                warn!(id = %id, timeout = ?self.timeout, "request timed out");
                Err(McpError::Timeout(self.timeout))
            }
        }
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<(), McpError> {
        let (outgoing, _) = self.channels().await?;
        let line = serde_json::to_string(&notification)?;
        match tokio::time::timeout(self.timeout, outgoing.send(line)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(McpError::Transport("server stdin closed".to_string())),
            Err(_) => Err(McpError::Timeout(self.timeout)),
        }
    }

    async fn close(&self) -> Result<(), McpError> {
        let conn = self.connection.lock().await.take();
        self.connected.store(false, Ordering::SeqCst);
        if let Some(conn) = conn {
            info!(command = %self.command, "stopping MCP server process");
            Self::shutdown(conn).await;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    fn subscribe(&self) -> broadcast::Receiver<JsonRpcNotification> {
        self.notifications.subscribe()
    }
}
