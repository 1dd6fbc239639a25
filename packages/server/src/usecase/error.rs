//! UseCase 層のエラー定義

use checkers_shared::protocol::api::MoveRejection;
use thiserror::Error;

use crate::domain::{DomainError, RepositoryError};

/// ゲームのライフサイクル操作（作成・参加・投了・引き分け・チャット）のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("Game not found: {0}")]
    NotFound(String),
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// 同時に別の書き込みが入った。最新状態を取り直せば再試行できる。
    #[error("Concurrent update: {0}")]
    Conflict(String),
    #[error("Repository error: {0}")]
    Repository(String),
}

impl From<RepositoryError> for GameError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::GameNotFound(id) => GameError::NotFound(id),
            RepositoryError::VersionMismatch { .. } | RepositoryError::Transient(_) => {
                GameError::Conflict(err.to_string())
            }
            RepositoryError::AlreadyExists(_) => GameError::Repository(err.to_string()),
        }
    }
}

/// 手の適用のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyMoveError {
    #[error("Game not found: {0}")]
    GameNotFound(String),
    /// 期待バージョンが古い。クライアントは再同期が必要。
    #[error("Version conflict: expected {expected}, current {current}")]
    VersionConflict { expected: u64, current: u64 },
    /// 永続化時の一時的な競合。1 回だけ再試行してよい。
    #[error("Transient conflict: {0}")]
    Transient(String),
    #[error("Move rejected: {0}")]
    Rejected(DomainError),
    #[error("Repository error: {0}")]
    Repository(String),
}

impl ApplyMoveError {
    /// レスポンスに載せる拒否理由と、分かっていれば現在のバージョン
    ///
    /// `Repository` は内部エラーなので `None`。
    pub fn rejection(&self) -> Option<(MoveRejection, Option<u64>)> {
        let rejection = match self {
            ApplyMoveError::GameNotFound(_) => (MoveRejection::GameNotFound, None),
            ApplyMoveError::VersionConflict { current, .. } => {
                (MoveRejection::VersionConflict, Some(*current))
            }
            ApplyMoveError::Transient(_) => (MoveRejection::TransientConflict, None),
            ApplyMoveError::Rejected(DomainError::NotYourTurn) => (MoveRejection::NotYourTurn, None),
            ApplyMoveError::Rejected(DomainError::NotAPlayer) => (MoveRejection::NotAPlayer, None),
            ApplyMoveError::Rejected(DomainError::GameNotActive) => {
                (MoveRejection::GameNotActive, None)
            }
            ApplyMoveError::Rejected(_) => (MoveRejection::IllegalMove, None),
            ApplyMoveError::Repository(_) => return None,
        };
        Some(rejection)
    }
}

impl From<DomainError> for ApplyMoveError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::VersionConflict { expected, current } => {
                ApplyMoveError::VersionConflict { expected, current }
            }
            other => ApplyMoveError::Rejected(other),
        }
    }
}

impl From<RepositoryError> for ApplyMoveError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::GameNotFound(id) => ApplyMoveError::GameNotFound(id),
            RepositoryError::VersionMismatch { expected, current } => {
                ApplyMoveError::VersionConflict { expected, current }
            }
            RepositoryError::Transient(reason) => ApplyMoveError::Transient(reason),
            RepositoryError::AlreadyExists(_) => ApplyMoveError::Repository(err.to_string()),
        }
    }
}

/// 購読のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscribeError {
    #[error("Game not found: {0}")]
    GameNotFound(String),
    /// 他人のユーザーチャネルは購読できない
    #[error("User '{requester}' may not subscribe to user channel '{target}'")]
    Forbidden { requester: String, target: String },
    #[error("Repository error: {0}")]
    Repository(String),
}

impl From<RepositoryError> for SubscribeError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::GameNotFound(id) => SubscribeError::GameNotFound(id),
            other => SubscribeError::Repository(other.to_string()),
        }
    }
}
