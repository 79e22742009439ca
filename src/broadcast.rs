//! Live observer connections and per-session fan-out.

use crate::protocol::ServerMessage;
use crate::types::{ConnectionId, SessionId, Side};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Outbound half of an observer connection
pub type ConnectionSender = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug)]
struct Connection {
    id: ConnectionId,
    side: Side,
    tx: ConnectionSender,
}

/// Process-wide mapping from session to its live observer connections
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, Vec<Connection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and hand it its init message.
    ///
    /// The first connection of a session plays black; every later one is tagged
    /// white, so extra joiners share the white tag as spectators. `init` is queued
    /// on the connection before it becomes visible to `publish`.
    pub async fn join(
        &self,
        session_id: &str,
        tx: ConnectionSender,
        init: impl FnOnce(Side) -> ServerMessage,
    ) -> (ConnectionId, Side) {
        let mut sessions = self.sessions.write().await;
        let connections = sessions.entry(session_id.to_string()).or_default();

        let side = if connections.is_empty() {
            Side::Black
        } else {
            Side::White
        };
        let id = ulid::Ulid::new().to_string();

        if tx.send(init(side)).is_err() {
            tracing::warn!(
                "Connection {} for session {} closed before init",
                id,
                session_id
            );
            if connections.is_empty() {
                sessions.remove(session_id);
            }
            return (id, side);
        }

        connections.push(Connection {
            id: id.clone(),
            side,
            tx,
        });
        tracing::info!(
            "Connection {} joined session {} as player {} ({} connected)",
            id,
            session_id,
            side.number(),
            connections.len()
        );

        (id, side)
    }

    /// Remove a connection; drops the session's set once it is empty
    pub async fn leave(&self, session_id: &str, connection_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(connections) = sessions.get_mut(session_id) {
            connections.retain(|c| c.id != connection_id);
            tracing::info!(
                "Connection {} left session {} ({} remaining)",
                connection_id,
                session_id,
                connections.len()
            );
            if connections.is_empty() {
                sessions.remove(session_id);
            }
        }
    }

    /// Deliver `msg` to every connection of the session, pruning the ones that
    /// can no longer receive. Returns how many connections got the message.
    pub async fn publish(&self, session_id: &str, msg: &ServerMessage) -> usize {
        let mut sessions = self.sessions.write().await;
        let Some(connections) = sessions.get_mut(session_id) else {
            return 0;
        };

        connections.retain(|c| {
            let delivered = c.tx.send(msg.clone()).is_ok();
            if !delivered {
                tracing::warn!(
                    "Dropping connection {} from session {}: delivery failed",
                    c.id,
                    session_id
                );
            }
            delivered
        });

        let delivered = connections.len();
        if connections.is_empty() {
            sessions.remove(session_id);
        }
        delivered
    }

    /// Side tag assigned to a connection at join time
    #[cfg(test)]
    pub async fn side_of(&self, session_id: &str, connection_id: &str) -> Option<Side> {
        self.sessions
            .read()
            .await
            .get(session_id)?
            .iter()
            .find(|c| c.id == connection_id)
            .map(|c| c.side)
    }

    #[cfg(test)]
    pub async fn connection_count(&self, session_id: &str) -> usize {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map_or(0, Vec::len)
    }

    #[cfg(test)]
    pub async fn has_session(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }
}
