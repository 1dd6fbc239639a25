//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use checkers_shared::protocol::{
    api::{
        ChatRequest, DrawRequestBody, GameSnapshot, MoveRejection, MoveRequest, MoveResponse,
    },
    events::ChatMessagePayload,
};
use uuid::Uuid;

use crate::{
    domain::{GameId, HubStats},
    ui::state::AppState,
    usecase::MoveCommand,
};

use super::{auth::AuthUser, error::ApiError};

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Debug endpoint to get current hub registry stats
pub async fn debug_hub_stats(State(state): State<Arc<AppState>>) -> Json<HubStats> {
    Json(state.hub.stats().await)
}

/// Create a game; the caller plays red.
pub async fn create_game(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<(StatusCode, Json<GameSnapshot>), ApiError> {
    let session = state.create_game_usecase.execute(user).await?;
    Ok((StatusCode::CREATED, Json(session.to_snapshot())))
}

pub async fn join_game(
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<Uuid>,
    AuthUser(user): AuthUser,
) -> Result<Json<GameSnapshot>, ApiError> {
    let session = state
        .join_game_usecase
        .execute(GameId::new(game_id), user)
        .await?;
    Ok(Json(session.to_snapshot()))
}

/// Full state fetch, used by clients after every (re)connect.
pub async fn get_game(
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<Uuid>,
) -> Result<Json<GameSnapshot>, ApiError> {
    let session = state.get_game_usecase.execute(GameId::new(game_id)).await?;
    Ok(Json(session.to_snapshot()))
}

/// Versioned move submission.
///
/// The body is a `MoveResponse` for every outcome except internal errors, so
/// clients can branch on `success` alone.
pub async fn submit_move(
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<Uuid>,
    AuthUser(user): AuthUser,
    Json(request): Json<MoveRequest>,
) -> Result<Response, ApiError> {
    if request.game_id != game_id {
        return Err(ApiError::bad_request("game id in path and body differ"));
    }

    let command = MoveCommand {
        game_id: GameId::new(game_id),
        user,
        mv: request.mv,
        expected_version: request.expected_version,
        optimistic_id: request.optimistic_id,
    };

    match state.apply_move_usecase.execute(command).await {
        Ok(session) => Ok(Json(MoveResponse::accepted(session.to_new_state())).into_response()),
        Err(err) => {
            let Some((reason, current_version)) = err.rejection() else {
                return Err(ApiError::internal(err.to_string()));
            };
            tracing::info!("Move in game {} rejected: {}", game_id, err);
            let status = match reason {
                MoveRejection::VersionConflict | MoveRejection::TransientConflict => {
                    StatusCode::CONFLICT
                }
                MoveRejection::GameNotFound => StatusCode::NOT_FOUND,
                MoveRejection::NotAPlayer => StatusCode::FORBIDDEN,
                MoveRejection::IllegalMove
                | MoveRejection::NotYourTurn
                | MoveRejection::GameNotActive => StatusCode::UNPROCESSABLE_ENTITY,
            };
            Ok((
                status,
                Json(MoveResponse::rejected(reason, current_version)),
            )
                .into_response())
        }
    }
}

pub async fn send_chat(
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<Uuid>,
    AuthUser(user): AuthUser,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatMessagePayload>, ApiError> {
    let message = state
        .send_chat_usecase
        .execute(GameId::new(game_id), user, request.content)
        .await?;
    Ok(Json(message))
}

/// Offer, accept or decline a draw.
pub async fn respond_draw(
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<Uuid>,
    AuthUser(user): AuthUser,
    Json(request): Json<DrawRequestBody>,
) -> Result<Json<GameSnapshot>, ApiError> {
    let session = state
        .respond_draw_usecase
        .execute(GameId::new(game_id), user, request.action)
        .await?;
    Ok(Json(session.to_snapshot()))
}

pub async fn resign_game(
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<Uuid>,
    AuthUser(user): AuthUser,
) -> Result<Json<GameSnapshot>, ApiError> {
    let session = state
        .resign_game_usecase
        .execute(GameId::new(game_id), user)
        .await?;
    Ok(Json(session.to_snapshot()))
}
