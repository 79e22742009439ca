use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Chat line, attributed server-side to the connection's side
    Chat { message: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on every live connection
    Init {
        player_number: Side,
        board: Board,
        current_player: Side,
        moves_history: Vec<MoveRecord>,
        chat_history: Vec<ChatRecord>,
        last_move: Option<LastMove>,
        server_now: String,
    },
    /// An automated side started consulting its move source
    ThinkingStart {
        player: Side,
        board: Board,
        current_player: Side,
        moves_history: Vec<MoveRecord>,
    },
    MoveComplete {
        board: Board,
        current_player: Side,
        last_move: Option<LastMove>,
        /// Rationale of the move just made (empty for human moves)
        thinking: String,
        chat_history: Vec<ChatRecord>,
        moves_history: Vec<MoveRecord>,
    },
    Chat {
        player: Side,
        message: String,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl From<ChatRecord> for ServerMessage {
    fn from(record: ChatRecord) -> Self {
        ServerMessage::Chat {
            player: record.side,
            message: record.text,
        }
    }
}
