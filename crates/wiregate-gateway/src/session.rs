//! HTTP-level sessions.
//!
//! Each session carries a numeric token. A WebSocket that did not arrive with
//! the session cookie can present the token to adopt the session.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use wiregate_core::id;
use wiregate_crypto::CryptoSlot;

/// An HTTP-level session.
#[derive(Debug)]
pub struct HttpSession {
    id: String,
    token: u32,
    active: AtomicBool,
    crypto: CryptoSlot,
    attributes: DashMap<String, Value>,
    created_at: DateTime<Utc>,
    last_access_ms: AtomicI64,
}

impl HttpSession {
    fn new(id: String, token: u32) -> Self {
        let now = Utc::now();
        Self {
            id,
            token,
            active: AtomicBool::new(true),
            crypto: CryptoSlot::new(),
            attributes: DashMap::new(),
            created_at: now,
            last_access_ms: AtomicI64::new(now.timestamp_millis()),
        }
    }

    /// Session ID, as sent in the session cookie.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Numeric token a WebSocket presents to adopt this session.
    pub fn token(&self) -> u32 {
        self.token
    }

    /// Whether the session has not been invalidated.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Symmetric crypto state for HTTP calls on this session.
    pub fn crypto(&self) -> &CryptoSlot {
        &self.crypto
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Record activity.
    pub fn touch(&self) {
        self.last_access_ms
            .store(Utc::now().timestamp_millis(), Ordering::Release);
    }

    /// Time since the last recorded activity.
    pub fn idle_for(&self) -> Duration {
        let idle = Utc::now().timestamp_millis() - self.last_access_ms.load(Ordering::Acquire);
        Duration::from_millis(idle.max(0) as u64)
    }

    /// Read an attribute.
    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.attributes.get(key).map(|v| v.clone())
    }

    /// Set an attribute.
    pub fn set_attribute(&self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    /// Remove an attribute.
    pub fn remove_attribute(&self, key: &str) -> Option<Value> {
        self.attributes.remove(key).map(|(_, v)| v)
    }

    fn invalidate(&self) {
        self.active.store(false, Ordering::Release);
        self.crypto.clear();
        self.attributes.clear();
    }
}

/// Store of HTTP sessions, indexed by ID and by token.
#[derive(Debug, Default)]
pub struct HttpSessionStore {
    sessions: DashMap<String, Arc<HttpSession>>,
    tokens: DashMap<u32, String>,
}

impl HttpSessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with a fresh ID and a token unique within the store.
    pub fn create(&self) -> Arc<HttpSession> {
        let id = id::uuid();
        let token = loop {
            let candidate = id::numeric_token();
            // Claim the token atomically so racing creates never share one
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.tokens.entry(candidate) {
                slot.insert(id.clone());
                break candidate;
            }
        };

        let session = Arc::new(HttpSession::new(id.clone(), token));
        self.sessions.insert(id, Arc::clone(&session));
        debug!("Created HTTP session {}", session.id());
        session
    }

    /// Look up an active session by ID.
    pub fn get(&self, id: &str) -> Option<Arc<HttpSession>> {
        self.sessions
            .get(id)
            .map(|s| Arc::clone(s.value()))
            .filter(|s| s.is_active())
    }

    /// Look up an active session by token.
    pub fn get_by_token(&self, token: u32) -> Option<Arc<HttpSession>> {
        let id = self.tokens.get(&token)?.value().clone();
        self.get(&id)
    }

    /// Record activity on a session. Returns false if it does not exist.
    pub fn touch(&self, id: &str) -> bool {
        match self.get(id) {
            Some(session) => {
                session.touch();
                true
            }
            None => false,
        }
    }

    /// End a session: mark inactive, drop its crypto state and unindex it.
    pub fn invalidate(&self, id: &str) -> bool {
        match self.sessions.remove(id) {
            Some((_, session)) => {
                self.tokens.remove(&session.token());
                session.invalidate();
                debug!("Invalidated HTTP session {}", id);
                true
            }
            None => false,
        }
    }

    /// Invalidate every session idle longer than `idle`. Returns how many ended.
    pub fn sweep_expired(&self, idle: Duration) -> usize {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle_for() > idle)
            .map(|entry| entry.key().clone())
            .collect();

        let count = expired.iter().filter(|id| self.invalidate(id)).count();
        if count > 0 {
            info!("Expired {} idle HTTP sessions", count);
        }
        count
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether there are no live sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
