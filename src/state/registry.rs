use super::session::{Session, SessionError, SessionSetup};
use crate::broadcast::ConnectionRegistry;
use crate::types::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-wide store of sessions. Sessions are never removed.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session under a fresh identifier
    pub async fn create(
        &self,
        setup: SessionSetup,
        connections: ConnectionRegistry,
    ) -> Arc<Session> {
        let mut sessions = self.sessions.write().await;
        let id = loop {
            let candidate = ulid::Ulid::new().to_string();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        let session = Arc::new(Session::new(id.clone(), setup, connections));
        sessions.insert(id, session.clone());
        session
    }

    pub async fn get(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
