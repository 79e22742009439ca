//! WebSocket message dispatch

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::Session;
use crate::types::Side;

/// Handle a client message from a connection tagged `side`. Returns a direct
/// reply for the sender, if any; broadcasts go through the session.
pub async fn handle_message(
    msg: ClientMessage,
    side: Side,
    session: &Session,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Chat { message } => {
            session.submit_chat(side, message).await;
            None
        }
    }
}
