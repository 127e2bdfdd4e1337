//! Transport into a server living in the same process.
//!
//! Requests go straight to [`McpServer`] dispatch without serialization.
//! Like a connection served by [`McpServer::serve`], the transport keeps
//! what its `initialize` negotiated and only passes on list-changed
//! notifications for capabilities where both sides agreed on `listChanged`.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

use switchboard_core::TransportKind;

use super::{Transport, NOTIFICATION_BUFFER};
use crate::auth::Credential;
use crate::error::McpError;
use crate::server::{McpServer, Peer};
use crate::types::{notifications, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// In-process transport. Optional artificial latency makes round trips
/// observable.
///
/// Reports itself as `stdio` since it has no network hop.
pub struct InProcessTransport {
    server: Arc<McpServer>,
    latency: Option<Duration>,
    credential: Option<Credential>,
    connected: AtomicBool,
    peer: Arc<Peer>,
    notifications: broadcast::Sender<JsonRpcNotification>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl InProcessTransport {
    pub fn new(server: Arc<McpServer>) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER);
        Self {
            server,
            latency: None,
            credential: None,
            connected: AtomicBool::new(false),
            peer: Arc::new(Peer::default()),
            notifications,
            forwarder: Mutex::new(None),
        }
    }

    /// Delay every send by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Present `credential` the way an HTTP client would in its header.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn start_forwarder(&self) {
        let mut events = self.server.subscribe();
        let peer = Arc::clone(&self.peer);
        let out = self.notifications.clone();
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(notification) => {
                        if peer.forwards(&notification) {
                            let _ = out.send(notification);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Dropped list-changed notifications, announcing both lists");
                        for method in [
                            notifications::TOOLS_LIST_CHANGED,
                            notifications::PROMPTS_LIST_CHANGED,
                        ] {
                            let notification = JsonRpcNotification::new(method, None);
                            if peer.forwards(&notification) {
                                let _ = out.send(notification);
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.stop_forwarder(Some(handle));
    }

    fn stop_forwarder(&self, replacement: Option<JoinHandle<()>>) {
        let previous = std::mem::replace(
            &mut *self.forwarder.lock().unwrap_or_else(PoisonError::into_inner),
            replacement,
        );
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn connect(&self) -> Result<(), McpError> {
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.start_forwarder();
        }
        Ok(())
    }

    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        if !self.is_connected() {
            return Err(McpError::NotConnected);
        }
        self.delay().await;
        Ok(self
            .server
            .handle_request_from(request, self.credential.as_ref(), &self.peer)
            .await)
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<(), McpError> {
        if !self.is_connected() {
            return Err(McpError::NotConnected);
        }
        self.server.handle_notification(&notification);
        Ok(())
    }

    async fn close(&self) -> Result<(), McpError> {
        self.connected.store(false, Ordering::SeqCst);
        self.stop_forwarder(None);
        self.peer.reset();
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

impl Drop for InProcessTransport {
    fn drop(&mut self) {
        if let Some(forwarder) = self
            .forwarder
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            forwarder.abort();
        }
    }
}
