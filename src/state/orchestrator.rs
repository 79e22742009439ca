//! Drives automated turns.
//!
//! A session is driven by at most one loop at a time. The loop consults the
//! active side's move source, applies the result, and keeps going while the
//! next side is automated too, pausing between chained turns so observers see a
//! human-paced game.

use super::session::{Session, SessionError};
use std::sync::Arc;
use std::time::Duration;

/// Why a driving loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    /// The side to move has no move source
    HandedOff,
    /// The move source found no point to play
    Unavailable,
    /// Another move landed while the source was consulting
    Superseded,
    /// The proposal was rejected and the turn dropped
    Dropped,
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    move_delay: Duration,
}

impl Orchestrator {
    pub fn new(move_delay: Duration) -> Self {
        Self { move_delay }
    }

    /// Start driving the session in the background unless a loop already is.
    /// Returns whether a new loop was spawned.
    pub fn schedule(&self, session: &Arc<Session>) -> bool {
        if !session.try_begin_driving() {
            tracing::debug!("Game {}: agent loop already running", session.id());
            return false;
        }

        let session = session.clone();
        let move_delay = self.move_delay;
        tokio::spawn(async move {
            run(session, move_delay).await;
        });
        true
    }
}

async fn run(session: Arc<Session>, move_delay: Duration) {
    loop {
        let outcome = drive(&session, move_delay).await;
        session.end_driving();
        tracing::debug!("Game {}: agent loop stopped: {:?}", session.id(), outcome);

        // A human move may have handed the turn to an agent while this loop held
        // the claim; its schedule() call was a no-op.
        let may_owe_turn = matches!(outcome, DriveOutcome::HandedOff | DriveOutcome::Superseded);
        if !may_owe_turn
            || !session.awaits_agent().await
            || !session.try_begin_driving()
        {
            break;
        }
    }
}

/// Play automated turns until the side to move is not automated or a turn fails
pub async fn drive(session: &Session, move_delay: Duration) -> DriveOutcome {
    let mut chained = false;

    loop {
        if chained && !move_delay.is_zero() {
            tokio::time::sleep(move_delay).await;
        }

        let Some((source, ctx)) = session.begin_consulting().await else {
            return DriveOutcome::HandedOff;
        };
        let side = ctx.side;
        tracing::info!(
            "Game {}: {} ({}) is thinking",
            session.id(),
            side.label(),
            source.name()
        );

        let proposal = match source.request_move(&ctx).await {
            Ok(proposal) => proposal,
            Err(unavailable) => {
                tracing::info!(
                    "Game {}: {} cannot move: {}",
                    session.id(),
                    side.label(),
                    unavailable.rationale
                );
                return DriveOutcome::Unavailable;
            }
        };

        match session.submit_agent_move(side, proposal).await {
            Ok(applied) => {
                if !session.is_automated(applied.active) {
                    return DriveOutcome::HandedOff;
                }
                chained = true;
            }
            Err(e) => {
                tracing::warn!(
                    "Game {}: dropped {} agent move: {}",
                    session.id(),
                    side.label(),
                    e
                );
                return match e {
                    SessionError::StaleTurn { .. } => DriveOutcome::Superseded,
                    _ => DriveOutcome::Dropped,
                };
            }
        }
    }
}
