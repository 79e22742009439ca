//! HTTP API endpoints for starting, playing and inspecting games.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::agent::LlmError;
use crate::state::{AppState, MoveOutcome, SessionError};
use crate::types::*;
use crate::ws;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Game not found")]
    NotFound,

    #[error("Invalid move")]
    InvalidMove,

    #[error("Invalid game configuration: {0}")]
    BadConfig(String),
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(_) => ApiError::NotFound,
            SessionError::InvalidMove { .. } | SessionError::StaleTurn { .. } => {
                ApiError::InvalidMove
            }
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        ApiError::BadConfig(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::InvalidMove | ApiError::BadConfig(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Body of `POST /start_game`
#[derive(Debug, Clone, Deserialize)]
pub struct StartGameRequest {
    #[serde(default)]
    pub player_type: PlayerMode,
    #[serde(default)]
    pub black_model_url: Option<String>,
    #[serde(default)]
    pub black_model_name: Option<String>,
    #[serde(default)]
    pub black_provider: Option<ProviderKind>,
    #[serde(default)]
    pub white_model_url: Option<String>,
    #[serde(default)]
    pub white_model_name: Option<String>,
    #[serde(default)]
    pub white_provider: Option<ProviderKind>,
    #[serde(default)]
    pub first_player: Option<u8>,
}

fn endpoint(
    url: Option<String>,
    model: Option<String>,
    provider: Option<ProviderKind>,
) -> Option<AgentEndpoint> {
    let url = url.filter(|u| !u.trim().is_empty())?;
    Some(AgentEndpoint {
        url,
        model: model.unwrap_or_default(),
        provider: provider.unwrap_or_default(),
    })
}

impl TryFrom<StartGameRequest> for SessionConfig {
    type Error = ApiError;

    fn try_from(req: StartGameRequest) -> Result<Self, Self::Error> {
        let first_side = match req.first_player {
            None => Side::Black,
            Some(n) => Side::from_number(n).ok_or_else(|| {
                ApiError::BadConfig(format!("first_player must be 1 or 2, got {}", n))
            })?,
        };

        Ok(SessionConfig {
            mode: req.player_type,
            first_side,
            black: endpoint(
                req.black_model_url,
                req.black_model_name,
                req.black_provider,
            ),
            white: endpoint(
                req.white_model_url,
                req.white_model_name,
                req.white_provider,
            ),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StartGameResponse {
    pub game_id: SessionId,
    pub message: String,
    pub board: Board,
    pub current_player: Side,
    pub last_move: Option<LastMove>,
}

/// Body of `POST /make_move`
#[derive(Debug, Clone, Deserialize)]
pub struct MoveRequest {
    #[serde(default)]
    pub game_id: Option<SessionId>,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub expected_format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GameResponse {
    pub game_id: SessionId,
    pub board: Board,
    pub current_player: Side,
    pub message: String,
    pub status: String,
    pub last_move: Option<LastMove>,
}

#[derive(Debug, Serialize)]
pub struct GameStateResponse {
    pub game_id: SessionId,
    pub board: Board,
    pub current_player: Side,
}

/// Start a new game.
///
/// POST /start_game
pub async fn start_game(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartGameRequest>,
) -> Result<Json<StartGameResponse>, ApiError> {
    let config = SessionConfig::try_from(req)?;
    let session = state.start_session(config).await.inspect_err(|e| {
        tracing::warn!("Failed to start game: {}", e);
    })?;
    let snapshot = session.snapshot().await;

    Ok(Json(StartGameResponse {
        game_id: session.id().to_string(),
        message: "Game created".to_string(),
        board: snapshot.board,
        current_player: snapshot.current_player,
        last_move: snapshot.last_move,
    }))
}

/// Place a stone, or with `(-1, -1)` ask the side to move's agent to play.
///
/// POST /make_move
pub async fn make_move(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MoveRequest>,
) -> Result<Response, ApiError> {
    let game_id = req.game_id.ok_or(ApiError::NotFound)?;

    let response = match state.submit_move(&game_id, req.x, req.y).await? {
        MoveOutcome::AgentTurnRequested {
            snapshot,
            scheduled,
        } => {
            if !scheduled {
                tracing::debug!("Game {}: agent turn already in progress", game_id);
            }
            GameResponse {
                game_id,
                board: snapshot.board,
                current_player: snapshot.current_player,
                message: "AI move triggered".to_string(),
                status: "success".to_string(),
                last_move: snapshot.last_move,
            }
        }
        MoveOutcome::Applied(applied) => GameResponse {
            game_id,
            board: applied.board,
            current_player: applied.active,
            message: format!("Move accepted: ({}, {})", req.x, req.y),
            status: "success".to_string(),
            last_move: applied.last_move,
        },
    };

    if req.expected_format.as_deref() == Some("text") {
        return Ok(format!(
            "Game ID: {}\nBoard State:\n{}\nCurrent Player: {}",
            response.game_id,
            response.board.to_text(),
            response.current_player.number()
        )
        .into_response());
    }
    Ok(Json(response).into_response())
}

/// Read-only view of a game.
///
/// GET /game_state/{game_id}
pub async fn game_state(
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<SessionId>,
) -> Result<Json<GameStateResponse>, ApiError> {
    let session = state.sessions.get(&game_id).await?;
    let snapshot = session.snapshot().await;

    Ok(Json(GameStateResponse {
        game_id,
        board: snapshot.board,
        current_player: snapshot.current_player,
    }))
}

/// Game routes. Static assets and middleware are layered on by the caller.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/start_game", post(start_game))
        .route("/make_move", post(make_move))
        .route("/game_state/{game_id}", get(game_state))
        .route("/ws/{game_id}", get(ws::ws_handler))
        .with_state(state)
}
