//! Payloads of the envelopes pushed over the event stream.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::{Board, Move, Player};

use super::api::GameStatus;

/// Sent once when a connection is registered in the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatusPayload {
    pub connection_id: Uuid,
    pub group: String,
    pub client_id: String,
    pub status: String,
}

/// Sent right before the hub drops a connection on purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionClosedPayload {
    pub reason: String,
}

/// An accepted move, with the resulting authoritative state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMovePayload {
    pub game_id: Uuid,
    #[serde(rename = "move")]
    pub mv: Move,
    pub player: Player,
    pub moved_by: String,
    pub version: u64,
    pub board: Board,
    pub current_player: Player,
    pub move_count: u32,
    pub winner: Option<Player>,
    pub status: GameStatus,
    /// Correlation id of the client-side optimistic update, echoed back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimistic_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoinedPayload {
    pub game_id: Uuid,
    pub user_id: String,
    pub color: Player,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<Uuid>,
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    pub game_id: Uuid,
    pub user_id: String,
    pub content: String,
    pub sent_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    YourTurn,
    PlayerJoined,
    DrawOffered,
    GameOver,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub id: Uuid,
    pub user_id: String,
    pub kind: NotificationKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawRequestPayload {
    pub game_id: Uuid,
    pub from_user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawResponsePayload {
    pub game_id: Uuid,
    pub from_user: String,
    pub accepted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    NoPiecesOrMoves,
    Resignation,
    DrawAgreed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOverPayload {
    pub game_id: Uuid,
    pub winner: Option<Player>,
    pub reason: GameOverReason,
    pub version: u64,
}
