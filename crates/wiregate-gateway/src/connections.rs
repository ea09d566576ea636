//! WebSocket session registry.
//!
//! Tracks open connections, lets a connection adopt an HTTP session by token,
//! and pushes broadcasts to every open connection. The connection map is a
//! sharded concurrent map so opens and closes on unrelated connections do
//! not contend.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wiregate_core::id;
use wiregate_crypto::CryptoSlot;

use crate::envelope;
use crate::error::GatewayError;
use crate::session::{HttpSession, HttpSessionStore};
use crate::Result;

/// Identifier of a WebSocket connection.
pub type ConnectionId = String;

/// Frame queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

/// One open WebSocket connection.
#[derive(Debug)]
pub struct ConnectionEntry {
    id: ConnectionId,
    path: String,
    opened_at: DateTime<Utc>,
    session: Option<Arc<HttpSession>>,
    pending_challenge: Mutex<Option<String>>,
    crypto: CryptoSlot,
    sender: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionEntry {
    /// Create an entry whose frames go to `sender`.
    pub fn new(path: impl Into<String>, sender: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id: id::uuid(),
            path: path.into(),
            opened_at: Utc::now(),
            session: None,
            pending_challenge: Mutex::new(None),
            crypto: CryptoSlot::new(),
            sender,
        }
    }

    /// Bind an HTTP session.
    pub fn with_session(mut self, session: Option<Arc<HttpSession>>) -> Self {
        self.session = session;
        self
    }

    /// Record the challenge the client sent on connect.
    pub fn with_challenge(self, challenge: Option<String>) -> Self {
        *self.pending_challenge.lock() = challenge;
        self
    }

    /// Connection ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path the connection was opened on.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Open time.
    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Bound HTTP session.
    pub fn session(&self) -> Option<&Arc<HttpSession>> {
        self.session.as_ref()
    }

    /// Token of the bound HTTP session.
    pub fn bound_token(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.token())
    }

    /// Challenge awaiting a signed API reply.
    pub fn pending_challenge(&self) -> Option<String> {
        self.pending_challenge.lock().clone()
    }

    /// Crypto state for this connection. Authoritative for WebSocket calls.
    pub fn crypto(&self) -> &CryptoSlot {
        &self.crypto
    }

    /// Serialize `message`, seal it if the connection has crypto state, and
    /// queue it.
    pub fn send<T: Serialize>(&self, message: &T) -> Result<()> {
        let text = envelope::seal(serde_json::to_string(message)?, self.crypto.get().as_deref())?;
        self.send_raw(Outbound::Text(text))
    }

    /// Queue a frame as is.
    pub fn send_raw(&self, frame: Outbound) -> Result<()> {
        self.sender
            .send(frame)
            .map_err(|_| GatewayError::WebSocket(format!("connection {} is closed", self.id)))
    }

    /// Whether the writer side is still accepting frames.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Registry of open WebSocket connections.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionEntry>>,
    sessions: Arc<HttpSessionStore>,
}

impl ConnectionRegistry {
    /// Create a registry resolving tokens against `sessions`.
    pub fn new(sessions: Arc<HttpSessionStore>) -> Self {
        Self {
            connections: DashMap::new(),
            sessions,
        }
    }

    /// Add a connection to the broadcast set.
    pub fn on_open(&self, entry: ConnectionEntry) -> Arc<ConnectionEntry> {
        let entry = Arc::new(entry);
        self.connections
            .insert(entry.id().to_string(), Arc::clone(&entry));
        info!(
            "WebSocket connection {} opened on {} (session: {})",
            entry.id(),
            entry.path(),
            entry.session().map_or("none", |s| s.id())
        );
        entry
    }

    /// Remove a connection and drop its crypto state.
    pub fn on_close(&self, id: &str) -> Option<Arc<ConnectionEntry>> {
        let (_, entry) = self.connections.remove(id)?;
        entry.crypto().clear();
        info!("WebSocket connection {} closed", id);
        Some(entry)
    }

    /// Resolve a session token (decimal text) to an active HTTP session.
    pub fn resolve_by_token(&self, token: &str) -> Option<Arc<HttpSession>> {
        let session = self.sessions.get_by_token(id::parse_token(token)?);
        if session.is_none() {
            debug!("No session for presented token");
        }
        session
    }

    /// Look up a connection.
    pub fn get(&self, id: &str) -> Option<Arc<ConnectionEntry>> {
        self.connections.get(id).map(|e| Arc::clone(e.value()))
    }

    /// Send to one connection.
    pub fn send_to<T: Serialize>(&self, id: &str, message: &T) -> Result<()> {
        let entry = self
            .get(id)
            .ok_or_else(|| GatewayError::WebSocket(format!("unknown connection {}", id)))?;
        entry.send(message)
    }

    /// Send `message` to every open connection, each sealed with its own
    /// state. Failed members are logged and pruned. Returns how many sends
    /// succeeded.
    pub fn broadcast<T: Serialize>(&self, message: &T) -> usize {
        // Snapshot first so no shard lock is held while sending
        let members: Vec<Arc<ConnectionEntry>> = self
            .connections
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();

        let mut delivered = 0;
        for entry in members {
            match entry.send(message) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Broadcast to {} failed: {}", entry.id(), e);
                    if !entry.is_open() {
                        self.on_close(entry.id());
                    }
                }
            }
        }
        debug!("Broadcast delivered to {} connections", delivered);
        delivered
    }

    /// Number of open connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are open.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// IDs of open connections.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }

    /// The HTTP session store tokens resolve against.
    pub fn sessions(&self) -> &Arc<HttpSessionStore> {
        &self.sessions
    }
}
