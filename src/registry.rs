//! Session registry
//!
//! Maps session tokens to live [`SignalingSession`] handles. Lookups return
//! cloned `Arc`s so the registry lock is never held across negotiation
//! operations.

use crate::session::SignalingSession;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Concurrent map of active signaling sessions
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SignalingSession>>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new session under its token
    ///
    /// # Errors
    ///
    /// Returns `DuplicateSession` if the token is already registered; the
    /// existing session is left untouched.
    pub async fn create(&self, session: Arc<SignalingSession>) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(session.id()) {
            return Err(Error::DuplicateSession(session.id().to_string()));
        }
        debug!(session_id = %session.id(), "session registered");
        sessions.insert(session.id().to_string(), session);
        Ok(())
    }

    /// Look up a session by token
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if no session is registered under `token`.
    pub async fn get(&self, token: &str) -> Result<Arc<SignalingSession>> {
        self.sessions
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(token.to_string()))
    }

    /// Remove a session, returning it if it was present
    ///
    /// Removing an absent token is not an error.
    pub async fn remove(&self, token: &str) -> Option<Arc<SignalingSession>> {
        let removed = self.sessions.write().await.remove(token);
        if removed.is_some() {
            debug!(session_id = %token, "session removed");
        }
        removed
    }

    /// Whether a session is registered under `token`
    pub async fn contains(&self, token: &str) -> bool {
        self.sessions.read().await.contains_key(token)
    }

    /// Number of registered sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drain all sessions, returning them for teardown
    pub async fn clear(&self) -> Vec<Arc<SignalingSession>> {
        let mut sessions = self.sessions.write().await;
        sessions.drain().map(|(_, session)| session).collect()
    }
}
