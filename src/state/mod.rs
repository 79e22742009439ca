pub mod orchestrator;
pub mod registry;
pub mod session;

pub use orchestrator::{DriveOutcome, Orchestrator};
pub use registry::SessionRegistry;
pub use session::{MoveApplied, Session, SessionError, SessionSetup, SessionSnapshot};

use crate::agent::{AgentConfig, LlmError};
use crate::broadcast::ConnectionRegistry;
use crate::types::*;
use std::sync::Arc;

/// Shared application state
#[derive(Debug, Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
    pub connections: ConnectionRegistry,
    pub orchestrator: Orchestrator,
    pub agent_config: AgentConfig,
}

/// What a move submission did
#[derive(Debug, Clone)]
pub enum MoveOutcome {
    /// A stone was placed
    Applied(MoveApplied),
    /// The sentinel asked for an automated turn; the board is unchanged
    AgentTurnRequested {
        snapshot: SessionSnapshot,
        scheduled: bool,
    },
}

impl AppState {
    pub fn new(agent_config: AgentConfig) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            connections: ConnectionRegistry::new(),
            orchestrator: Orchestrator::new(agent_config.move_delay),
            agent_config,
        }
    }

    /// Create a session, binding a remote agent to each side that names one
    pub async fn start_session(&self, config: SessionConfig) -> Result<Arc<Session>, LlmError> {
        let black = config
            .black
            .as_ref()
            .map(|endpoint| self.agent_config.build_source(endpoint))
            .transpose()?;
        let white = config
            .white
            .as_ref()
            .map(|endpoint| self.agent_config.build_source(endpoint))
            .transpose()?;

        Ok(self
            .open_session(SessionSetup {
                mode: config.mode,
                first_side: config.first_side,
                black,
                white,
            })
            .await)
    }

    /// Register a session built from ready move sources. In AI mode an
    /// automated first side starts playing right away.
    pub async fn open_session(&self, setup: SessionSetup) -> Arc<Session> {
        let session = self
            .sessions
            .create(setup, self.connections.clone())
            .await;
        tracing::info!(
            "Created game {} ({:?} mode, black {}, white {}); {} games in memory",
            session.id(),
            session.mode(),
            if session.is_automated(Side::Black) { "agent" } else { "human" },
            if session.is_automated(Side::White) { "agent" } else { "human" },
            self.sessions.len().await,
        );

        if session.mode() == PlayerMode::Ai && session.awaits_agent().await {
            self.orchestrator.schedule(&session);
        }
        session
    }

    /// Apply a human move, or request an automated turn with the sentinel
    pub async fn submit_move(
        &self,
        session_id: &str,
        x: i32,
        y: i32,
    ) -> Result<MoveOutcome, SessionError> {
        let session = self.sessions.get(session_id).await?;

        if (x, y) == AGENT_TURN_SENTINEL {
            let scheduled = self.orchestrator.schedule(&session);
            return Ok(MoveOutcome::AgentTurnRequested {
                snapshot: session.snapshot().await,
                scheduled,
            });
        }

        let applied = session.submit_move(x, y).await?;
        if session.is_automated(applied.active) {
            self.orchestrator.schedule(&session);
        }
        Ok(MoveOutcome::Applied(applied))
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(AgentConfig::default())
    }
}
