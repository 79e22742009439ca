use crate::agent::{MoveContext, MoveProposal, MoveSource};
use crate::broadcast::{ConnectionRegistry, ConnectionSender};
use crate::protocol::ServerMessage;
use crate::types::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid move ({x}, {y})")]
    InvalidMove { x: i32, y: i32 },

    #[error("{} is no longer to move ({} is)", .expected.label(), .active.label())]
    StaleTurn { expected: Side, active: Side },

    #[error("Game {0} not found")]
    NotFound(SessionId),
}

/// Everything a session is created from
#[derive(Clone, Default)]
pub struct SessionSetup {
    pub mode: PlayerMode,
    pub first_side: Side,
    pub black: Option<Arc<dyn MoveSource>>,
    pub white: Option<Arc<dyn MoveSource>>,
}

/// Read-only view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub board: Board,
    pub current_player: Side,
    pub moves_history: Vec<MoveRecord>,
    pub chat_history: Vec<ChatRecord>,
    pub last_move: Option<LastMove>,
}

/// Result of an accepted move
#[derive(Debug, Clone)]
pub struct MoveApplied {
    pub board: Board,
    pub active: Side,
    pub applied: MoveRecord,
    pub last_move: Option<LastMove>,
}

#[derive(Debug)]
struct SessionState {
    board: Board,
    active: Side,
    moves: Vec<MoveRecord>,
    chat: Vec<ChatRecord>,
    last_move: Option<LastMove>,
    /// Rationale of the side that just moved; cleared on every accepted move
    thinking: String,
}

impl SessionState {
    fn new(first_side: Side) -> Self {
        Self {
            board: Board::new(),
            active: first_side,
            moves: Vec::new(),
            chat: Vec::new(),
            last_move: None,
            thinking: String::new(),
        }
    }

    fn place(&mut self, x: i32, y: i32) -> Result<MoveRecord, SessionError> {
        if !self.board.is_valid_move(x, y) {
            return Err(SessionError::InvalidMove { x, y });
        }
        let record = MoveRecord {
            x: x as usize,
            y: y as usize,
            side: self.active,
        };
        self.board.place(record.x, record.y, record.side);
        self.moves.push(record);
        self.thinking.clear();
        self.active = self.active.opponent();
        Ok(record)
    }

    fn applied(&self, record: MoveRecord) -> MoveApplied {
        MoveApplied {
            board: self.board.clone(),
            active: self.active,
            applied: record,
            last_move: self.last_move.clone(),
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            board: self.board.clone(),
            current_player: self.active,
            moves_history: self.moves.clone(),
            chat_history: self.chat.clone(),
            last_move: self.last_move.clone(),
        }
    }

    fn move_complete(&self) -> ServerMessage {
        ServerMessage::MoveComplete {
            board: self.board.clone(),
            current_player: self.active,
            last_move: self.last_move.clone(),
            thinking: self.thinking.clone(),
            chat_history: self.chat.clone(),
            moves_history: self.moves.clone(),
        }
    }
}

/// One game: board, history and the optional move source of each side.
///
/// Every mutation goes through the state lock, and each mutation's broadcast is
/// published before the lock is released, so observers see moves and chat in
/// exactly the order they were accepted.
pub struct Session {
    id: SessionId,
    mode: PlayerMode,
    black: Option<Arc<dyn MoveSource>>,
    white: Option<Arc<dyn MoveSource>>,
    state: Mutex<SessionState>,
    connections: ConnectionRegistry,
    driving: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("black", &self.black.as_ref().map(|s| s.name().to_string()))
            .field("white", &self.white.as_ref().map(|s| s.name().to_string()))
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(id: SessionId, setup: SessionSetup, connections: ConnectionRegistry) -> Self {
        Self {
            id,
            mode: setup.mode,
            black: setup.black,
            white: setup.white,
            state: Mutex::new(SessionState::new(setup.first_side)),
            connections,
            driving: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> PlayerMode {
        self.mode
    }

    pub fn bound_source_for(&self, side: Side) -> Option<Arc<dyn MoveSource>> {
        match side {
            Side::Black => self.black.clone(),
            Side::White => self.white.clone(),
        }
    }

    pub fn is_automated(&self, side: Side) -> bool {
        match side {
            Side::Black => self.black.is_some(),
            Side::White => self.white.is_some(),
        }
    }

    pub async fn active_side(&self) -> Side {
        self.state.lock().await.active
    }

    /// Whether the side to move has a move source bound
    pub async fn awaits_agent(&self) -> bool {
        let active = self.active_side().await;
        self.is_automated(active)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Place a stone for the active side on behalf of a human
    pub async fn submit_move(&self, x: i32, y: i32) -> Result<MoveApplied, SessionError> {
        let mut state = self.state.lock().await;
        let record = state.place(x, y).inspect_err(|_| {
            tracing::warn!("Game {}: invalid move ({}, {})", self.id, x, y);
        })?;
        state.last_move = Some(LastMove {
            x: record.x,
            y: record.y,
            rationale: String::new(),
        });
        tracing::info!(
            "Game {}: {} played ({}, {})",
            self.id,
            record.side.label(),
            record.x,
            record.y
        );

        self.connections
            .publish(&self.id, &state.move_complete())
            .await;
        Ok(state.applied(record))
    }

    /// Apply a move produced by `side`'s move source. The proposal is dropped if
    /// the active side changed while the source was consulting.
    pub async fn submit_agent_move(
        &self,
        side: Side,
        proposal: MoveProposal,
    ) -> Result<MoveApplied, SessionError> {
        let mut state = self.state.lock().await;
        if state.active != side {
            return Err(SessionError::StaleTurn {
                expected: side,
                active: state.active,
            });
        }

        // Coordinates beyond i32 saturate and fail the board check
        let x = i32::try_from(proposal.x).unwrap_or(i32::MAX);
        let y = i32::try_from(proposal.y).unwrap_or(i32::MAX);
        let record = state.place(x, y).inspect_err(|_| {
            tracing::warn!(
                "Game {}: invalid {} agent move ({}, {})",
                self.id,
                side.label(),
                proposal.x,
                proposal.y
            );
        })?;
        state.last_move = Some(LastMove {
            x: record.x,
            y: record.y,
            rationale: proposal.rationale.clone(),
        });
        state.thinking = proposal.rationale.clone();
        state.chat.push(ChatRecord {
            side,
            text: proposal.rationale,
        });
        tracing::info!(
            "Game {}: {} agent played ({}, {})",
            self.id,
            side.label(),
            record.x,
            record.y
        );

        self.connections
            .publish(&self.id, &state.move_complete())
            .await;
        Ok(state.applied(record))
    }

    /// Append a chat line and republish it to every observer
    pub async fn submit_chat(&self, side: Side, text: String) -> ChatRecord {
        let mut state = self.state.lock().await;
        let record = ChatRecord { side, text };
        state.chat.push(record.clone());
        tracing::info!(
            "Game {}: chat from {}: {}",
            self.id,
            side.label(),
            record.text
        );

        self.connections
            .publish(&self.id, &ServerMessage::from(record.clone()))
            .await;
        record
    }

    /// If the side to move is automated, announce that it is thinking and hand
    /// back its source along with the position it should consider.
    pub async fn begin_consulting(&self) -> Option<(Arc<dyn MoveSource>, MoveContext)> {
        let state = self.state.lock().await;
        let source = self.bound_source_for(state.active)?;

        self.connections
            .publish(
                &self.id,
                &ServerMessage::ThinkingStart {
                    player: state.active,
                    board: state.board.clone(),
                    current_player: state.active,
                    moves_history: state.moves.clone(),
                },
            )
            .await;

        let ctx = MoveContext {
            board: state.board.clone(),
            side: state.active,
            moves: state.moves.clone(),
            chat: state.chat.clone(),
        };
        Some((source, ctx))
    }

    /// Register an observer connection. Its init message carries the snapshot
    /// taken under the same lock, so no accepted move can fall between the two.
    pub async fn attach(&self, tx: ConnectionSender) -> (ConnectionId, Side) {
        let state = self.state.lock().await;
        let snapshot = state.snapshot();

        self.connections
            .join(&self.id, tx, move |side| ServerMessage::Init {
                player_number: side,
                board: snapshot.board,
                current_player: snapshot.current_player,
                moves_history: snapshot.moves_history,
                chat_history: snapshot.chat_history,
                last_move: snapshot.last_move,
                server_now: chrono::Utc::now().to_rfc3339(),
            })
            .await
    }

    pub async fn detach(&self, connection_id: &str) {
        self.connections.leave(&self.id, connection_id).await;
    }

    /// Claim the right to drive automated turns. Returns false if already claimed.
    pub fn try_begin_driving(&self) -> bool {
        self.driving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_driving(&self) {
        self.driving.store(false, Ordering::Release);
    }

    pub fn is_driving(&self) -> bool {
        self.driving.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn human_session(first_side: Side) -> (Session, ConnectionRegistry) {
        let connections = ConnectionRegistry::new();
        let session = Session::new(
            "game".to_string(),
            SessionSetup {
                mode: PlayerMode::Human,
                first_side,
                ..Default::default()
            },
            connections.clone(),
        );
        (session, connections)
    }

    fn proposal(x: usize, y: usize, rationale: &str) -> MoveProposal {
        MoveProposal {
            x,
            y,
            rationale: rationale.to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_move_scenario() {
        let (session, _) = human_session(Side::Black);

        let applied = session.submit_move(3, 3).await.unwrap();
        assert_eq!(applied.board.get(3, 3), Some(Cell::Stone(Side::Black)));
        assert_eq!(applied.active, Side::White);
        assert_eq!(
            applied.applied,
            MoveRecord {
                x: 3,
                y: 3,
                side: Side::Black
            }
        );

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.moves_history, vec![applied.applied]);
        assert_eq!(snapshot.current_player, Side::White);
    }

    #[tokio::test]
    async fn test_double_submission_rejected() {
        let (session, _) = human_session(Side::Black);
        session.submit_move(3, 3).await.unwrap();

        let err = session.submit_move(3, 3).await.unwrap_err();
        assert_eq!(err, SessionError::InvalidMove { x: 3, y: 3 });

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.current_player, Side::White);
        assert_eq!(snapshot.moves_history.len(), 1);
        assert_eq!(snapshot.board.stone_count(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_rejected() {
        let (session, _) = human_session(Side::Black);
        let n = BOARD_SIZE as i32;

        for (x, y) in [(-1, 0), (0, -1), (n, 0), (0, n), (-1, -1)] {
            assert!(session.submit_move(x, y).await.is_err());
        }
        let snapshot = session.snapshot().await;
        assert!(snapshot.moves_history.is_empty());
        assert_eq!(snapshot.current_player, Side::Black);
    }

    #[tokio::test]
    async fn test_sides_alternate_from_configured_first() {
        let (session, _) = human_session(Side::White);
        let points = [(0, 0), (1, 0), (2, 0), (3, 0), (4, 0)];

        for (x, y) in points {
            session.submit_move(x, y).await.unwrap();
        }

        let snapshot = session.snapshot().await;
        let sides: Vec<Side> = snapshot.moves_history.iter().map(|m| m.side).collect();
        assert_eq!(
            sides,
            vec![Side::White, Side::Black, Side::White, Side::Black, Side::White]
        );
        assert_eq!(snapshot.board.stone_count(), points.len());
        for (record, (x, y)) in snapshot.moves_history.iter().zip(points) {
            assert_eq!((record.x as i32, record.y as i32), (x, y));
            assert_eq!(
                snapshot.board.get(record.x, record.y),
                Some(Cell::Stone(record.side))
            );
        }
    }

    #[tokio::test]
    async fn test_concurrent_submissions_on_same_point() {
        let (session, _) = human_session(Side::Black);
        let session = Arc::new(session);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let session = session.clone();
            handles.push(tokio::spawn(async move { session.submit_move(9, 9).await }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(session.snapshot().await.moves_history.len(), 1);
    }

    #[tokio::test]
    async fn test_agent_move_records_rationale() {
        let (session, _) = human_session(Side::Black);

        let applied = session
            .submit_agent_move(Side::Black, proposal(15, 3, "I take the star point"))
            .await
            .unwrap();
        assert_eq!(applied.active, Side::White);

        let snapshot = session.snapshot().await;
        assert_eq!(
            snapshot.last_move,
            Some(LastMove {
                x: 15,
                y: 3,
                rationale: "I take the star point".to_string()
            })
        );
        assert_eq!(
            snapshot.chat_history,
            vec![ChatRecord {
                side: Side::Black,
                text: "I take the star point".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_stale_agent_move_dropped() {
        let (session, _) = human_session(Side::Black);
        session.submit_move(0, 0).await.unwrap();

        let err = session
            .submit_agent_move(Side::Black, proposal(5, 5, "late"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::StaleTurn {
                expected: Side::Black,
                active: Side::White
            }
        );
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.moves_history.len(), 1);
        assert!(snapshot.chat_history.is_empty());
    }

    #[tokio::test]
    async fn test_agent_move_beyond_i32_rejected() {
        let (session, _) = human_session(Side::Black);

        let err = session
            .submit_agent_move(Side::Black, proposal((1usize << 32) + 3, 3, "wraps"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidMove { x: i32::MAX, y: 3 }));

        let err = session
            .submit_agent_move(Side::Black, proposal(3, usize::MAX, "wraps"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidMove { x: 3, y: i32::MAX }));

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.board.get(3, 3), Some(Cell::Empty));
        assert!(snapshot.moves_history.is_empty());
        assert!(snapshot.chat_history.is_empty());
        assert_eq!(snapshot.current_player, Side::Black);
    }

    #[tokio::test]
    async fn test_thinking_cleared_by_next_move() {
        let (session, connections) = human_session(Side::Black);
        let (tx, mut rx) = mpsc::unbounded_channel();
        connections
            .join("game", tx, |_| ServerMessage::Error {
                code: "INIT".to_string(),
                msg: String::new(),
            })
            .await;
        rx.recv().await;

        session
            .submit_agent_move(Side::Black, proposal(3, 3, "corner"))
            .await
            .unwrap();
        session.submit_move(15, 15).await.unwrap();

        match rx.recv().await {
            Some(ServerMessage::MoveComplete { thinking, .. }) => assert_eq!(thinking, "corner"),
            other => panic!("Expected MoveComplete, got {:?}", other),
        }
        match rx.recv().await {
            Some(ServerMessage::MoveComplete {
                thinking,
                last_move,
                ..
            }) => {
                assert!(thinking.is_empty());
                assert_eq!(last_move.map(|m| (m.x, m.y)), Some((15, 15)));
            }
            other => panic!("Expected MoveComplete, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chat_appends_without_turn_change() {
        let (session, _) = human_session(Side::Black);

        let record = session.submit_chat(Side::White, "good luck".to_string()).await;
        assert_eq!(record.side, Side::White);

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.chat_history, vec![record]);
        assert_eq!(snapshot.current_player, Side::Black);
        assert!(snapshot.moves_history.is_empty());
    }

    #[tokio::test]
    async fn test_attach_sends_snapshot() {
        let (session, _) = human_session(Side::Black);
        session.submit_move(3, 3).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_, side) = session.attach(tx).await;
        assert_eq!(side, Side::Black);

        match rx.recv().await {
            Some(ServerMessage::Init {
                player_number,
                current_player,
                moves_history,
                ..
            }) => {
                assert_eq!(player_number, Side::Black);
                assert_eq!(current_player, Side::White);
                assert_eq!(moves_history.len(), 1);
            }
            other => panic!("Expected Init, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_begin_consulting_requires_bound_source() {
        let (session, _) = human_session(Side::Black);
        assert!(session.begin_consulting().await.is_none());
        assert!(!session.awaits_agent().await);
    }

    #[test]
    fn test_driving_claim_is_exclusive() {
        let (session, _) = human_session(Side::Black);
        assert!(session.try_begin_driving());
        assert!(!session.try_begin_driving());
        session.end_driving();
        assert!(!session.is_driving());
        assert!(session.try_begin_driving());
    }
}
