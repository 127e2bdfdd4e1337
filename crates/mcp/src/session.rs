//! Bounded pool of live client sessions with idle eviction.
//!
//! A session is an initialized [`McpClient`] plus the bookkeeping needed to
//! expire it. Admission is decided under the table lock by reserving a slot
//! before the (slow) connect and handshake, so concurrent creators can never
//! overshoot `max_sessions`; a full table fails fast with
//! [`McpError::SessionLimit`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use switchboard_core::{ClientConfig, SessionConfig, TransportConfig, TransportKind};

use crate::capabilities::Capabilities;
use crate::client::McpClient;
use crate::error::McpError;
use crate::transport::{build_transport, Transport};
use crate::types::ClientInfo;

pub type SessionId = Uuid;

struct Activity {
    at: DateTime<Utc>,
    instant: Instant,
}

/// A live, initialized session.
pub struct SessionHandle {
    id: SessionId,
    kind: TransportKind,
    client: Arc<McpClient>,
    capabilities: Capabilities,
    created_at: DateTime<Utc>,
    activity: StdMutex<Activity>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn client(&self) -> &Arc<McpClient> {
        &self.client
    }

    /// Capabilities negotiated at creation. Fixed for the session's life.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.activity().at
    }

    pub fn idle_for(&self) -> Duration {
        self.activity().instant.elapsed()
    }

    /// Record activity, postponing idle eviction.
    pub fn touch(&self) {
        let mut activity = self.activity();
        activity.at = Utc::now();
        activity.instant = Instant::now();
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            transport: self.kind,
            capabilities: self.capabilities.names().map(str::to_string).collect(),
            created_at: self.created_at,
            last_activity: self.last_activity(),
        }
    }

    fn activity(&self) -> std::sync::MutexGuard<'_, Activity> {
        self.activity.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Snapshot of a session for listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub transport: TransportKind,
    pub capabilities: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Default)]
struct Table {
    sessions: HashMap<SessionId, Arc<SessionHandle>>,
    /// Slots claimed by creations still connecting.
    reserved: usize,
    closed: bool,
}

pub struct SessionManager {
    config: SessionConfig,
    client_config: ClientConfig,
    table: Mutex<Table>,
    sweeper: StdMutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl SessionManager {
    pub fn new(config: SessionConfig, client_config: ClientConfig) -> Self {
        Self {
            config,
            client_config,
            table: Mutex::new(Table::default()),
            sweeper: StdMutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Build a transport from `config` and open a session over it.
    pub async fn create_session(&self, config: &TransportConfig) -> Result<SessionId, McpError> {
        self.create_session_with(build_transport(config)?).await
    }

    /// Open a session over an existing transport: connect, initialize, and
    /// admit it. Fails fast with `SessionLimit` when the table is full.
    #[instrument(skip_all, fields(transport = %transport.kind()))]
    pub async fn create_session_with(
        &self,
        transport: Arc<dyn Transport>,
    ) -> Result<SessionId, McpError> {
        {
            let mut table = self.table.lock().await;
            if table.closed {
                return Err(McpError::Transport("session manager is shut down".to_string()));
            }
            if table.sessions.len() + table.reserved >= self.config.max_sessions {
                warn!(max = self.config.max_sessions, "Session limit reached");
                return Err(McpError::SessionLimit(self.config.max_sessions));
            }
            table.reserved += 1;
        }

        let opened = self.open(transport).await;

        let mut table = self.table.lock().await;
        table.reserved -= 1;
        let handle = opened?;

        if table.closed {
            drop(table);
            let _ = handle.client.disconnect().await;
            return Err(McpError::Transport("session manager is shut down".to_string()));
        }

        let id = handle.id;
        table.sessions.insert(id, handle);
        info!(session_id = %id, active = table.sessions.len(), "Session created");
        Ok(id)
    }

    async fn open(&self, transport: Arc<dyn Transport>) -> Result<Arc<SessionHandle>, McpError> {
        let kind = transport.kind();
        let client = Arc::new(McpClient::new(transport, self.client_config.clone()));
        client.connect().await?;

        let name = self
            .client_config
            .client_name
            .clone()
            .unwrap_or_else(|| "switchboard".to_string());
        if let Err(e) = client.initialize(ClientInfo::new(name)).await {
            let _ = client.disconnect().await;
            return Err(e);
        }

        let now = Utc::now();
        Ok(Arc::new(SessionHandle {
            id: Uuid::new_v4(),
            kind,
            capabilities: client.negotiated_capabilities().unwrap_or_default(),
            client,
            created_at: now,
            activity: StdMutex::new(Activity {
                at: now,
                instant: Instant::now(),
            }),
        }))
    }

    /// Fetch a session and mark it active.
    pub async fn get_session(&self, id: &SessionId) -> Result<Arc<SessionHandle>, McpError> {
        let table = self.table.lock().await;
        let handle = table
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| McpError::SessionNotFound(id.to_string()))?;
        handle.touch();
        Ok(handle)
    }

    /// Close a session. Unknown or already-closed ids are a no-op.
    pub async fn close_session(&self, id: &SessionId) -> Result<(), McpError> {
        let removed = self.table.lock().await.sessions.remove(id);
        match removed {
            Some(handle) => {
                if let Err(e) = handle.client.disconnect().await {
                    warn!(session_id = %id, error = %e, "Error closing session transport");
                }
                info!(session_id = %id, "Session closed");
            }
            None => debug!(session_id = %id, "Close of unknown session ignored"),
        }
        Ok(())
    }

    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let table = self.table.lock().await;
        let mut infos: Vec<_> = table.sessions.values().map(|h| h.info()).collect();
        infos.sort_by_key(|i| i.created_at);
        infos
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Evict sessions idle longer than `session_timeout`, closing their
    /// transports. Returns the evicted ids.
    pub async fn sweep_idle(&self) -> Vec<SessionId> {
        let timeout = self.config.session_timeout();
        let expired: Vec<_> = {
            let mut table = self.table.lock().await;
            let ids: Vec<_> = table
                .sessions
                .values()
                .filter(|h| h.idle_for() > timeout)
                .map(|h| h.id)
                .collect();
            ids.iter().filter_map(|id| table.sessions.remove(id)).collect()
        };

        for handle in &expired {
            info!(session_id = %handle.id, idle_ms = handle.idle_for().as_millis() as u64, "Evicting idle session");
            if let Err(e) = handle.client.disconnect().await {
                warn!(session_id = %handle.id, error = %e, "Error closing evicted session");
            }
        }
        expired.iter().map(|h| h.id).collect()
    }

    /// Run [`sweep_idle`](Self::sweep_idle) every `sweep_interval` until the
    /// manager is dropped or shut down.
    pub fn start_sweeper(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let every = self.config.sweep_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = weak.upgrade() else { break };
                if manager.shut_down.load(Ordering::SeqCst) {
                    break;
                }
                let evicted = manager.sweep_idle().await;
                if !evicted.is_empty() {
                    debug!(count = evicted.len(), "Sweep evicted sessions");
                }
            }
        });

        let previous = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop the sweeper, refuse new sessions, and close every live one.
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }

        let sessions: Vec<_> = {
            let mut table = self.table.lock().await;
            table.closed = true;
            table.sessions.drain().map(|(_, h)| h).collect()
        };
        for handle in sessions {
            if let Err(e) = handle.client.disconnect().await {
                warn!(session_id = %handle.id, error = %e, "Error closing session during shutdown");
            }
        }
        info!("Session manager shut down");
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(sweeper) = self
            .sweeper
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            sweeper.abort();
        }
    }
}
