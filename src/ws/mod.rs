pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::SessionId;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(game_id): Path<SessionId>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!("WebSocket connection request for game {}", game_id);

    ws.on_upgrade(move |socket| handle_socket(socket, game_id, state))
}

fn encode(msg: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!("Failed to serialize server message: {}", e);
            None
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, game_id: SessionId, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let session = match state.sessions.get(&game_id).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("WebSocket for unknown game {}", game_id);
            let error = ServerMessage::Error {
                code: "NOT_FOUND".to_string(),
                msg: e.to_string(),
            };
            if let Some(msg) = encode(&error) {
                let _ = sender.send(msg).await;
            }
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let (connection_id, side) = session.attach(tx).await;

    loop {
        tokio::select! {
            // Session broadcasts, starting with init
            outbound = rx.recv() => {
                let Some(msg) = outbound else {
                    // Pruned by the registry
                    break;
                };
                if let Some(msg) = encode(&msg) {
                    if sender.send(msg).await.is_err() {
                        break;
                    }
                }
            }

            // Handle client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message on game {}: {}", game_id, text);
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                if let Some(response) =
                                    handlers::handle_message(client_msg, side, &session).await
                                {
                                    if let Some(msg) = encode(&response) {
                                        if sender.send(msg).await.is_err() {
                                            tracing::error!("Failed to send response");
                                            break;
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::error!("Failed to parse client message: {}", e);
                                let error = ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                };
                                if let Some(msg) = encode(&error) {
                                    let _ = sender.send(msg).await;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    session.detach(&connection_id).await;
    tracing::info!(
        "WebSocket connection closed for game {} (player {})",
        game_id,
        side.number()
    );
}
