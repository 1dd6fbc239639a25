//! HTTP request and response bodies.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::{Board, Move, Player};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Waiting,
    Active,
    Completed,
}

/// Full authoritative game state, as returned by the state fetch endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub game_id: Uuid,
    pub version: u64,
    pub board: Board,
    pub current_player: Player,
    pub move_count: u32,
    pub winner: Option<Player>,
    pub status: GameStatus,
    pub red_player: Option<String>,
    pub black_player: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_offered_by: Option<String>,
}

/// Versioned move submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub game_id: Uuid,
    #[serde(rename = "move")]
    pub mv: Move,
    pub expected_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimistic_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGameState {
    pub version: u64,
    pub board: Board,
    pub current_player: Player,
    pub winner: Option<Player>,
    pub move_count: u32,
    pub status: GameStatus,
}

/// Why a move was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveRejection {
    /// Expected version did not match; the client must resync.
    VersionConflict,
    /// Benign persistence race; safe to retry once with fresh state.
    TransientConflict,
    IllegalMove,
    NotYourTurn,
    NotAPlayer,
    GameNotActive,
    GameNotFound,
}

impl MoveRejection {
    pub fn is_transient(self) -> bool {
        matches!(self, MoveRejection::TransientConflict)
    }
}

/// Response of the move endpoint.
///
/// Anything other than `success: true` means "resync required" unless the
/// rejection is transient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_game_state: Option<NewGameState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<MoveRejection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<u64>,
}

impl MoveResponse {
    pub fn accepted(state: NewGameState) -> Self {
        Self {
            success: true,
            new_game_state: Some(state),
            reason: None,
            current_version: None,
        }
    }

    pub fn rejected(reason: MoveRejection, current_version: Option<u64>) -> Self {
        Self {
            success: false,
            new_game_state: None,
            reason: Some(reason),
            current_version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawAction {
    Offer,
    Accept,
    Decline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRequestBody {
    pub action: DrawAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
