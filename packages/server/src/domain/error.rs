//! Domain and repository errors.

use checkers_shared::game::RuleError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Invalid game id: '{0}'")]
    InvalidGameId(String),
    #[error("Invalid user id: '{0}'")]
    InvalidUserId(String),
    #[error("Invalid client id: '{0}'")]
    InvalidClientId(String),
    #[error("Version conflict: expected {expected}, current {current}")]
    VersionConflict { expected: u64, current: u64 },
    #[error("Game is not active")]
    GameNotActive,
    #[error("Game already has two players")]
    GameFull,
    #[error("User is already seated in this game")]
    AlreadyJoined,
    #[error("User is not a player in this game")]
    NotAPlayer,
    #[error("It is not this player's turn")]
    NotYourTurn,
    #[error("No pending draw offer from the opponent")]
    NoDrawOffer,
    #[error(transparent)]
    Rule(#[from] RuleError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("Game not found: {0}")]
    GameNotFound(String),
    #[error("Game already exists: {0}")]
    AlreadyExists(String),
    /// Compare-and-set lost: the stored version is not the expected one.
    #[error("Stored version {current} does not match expected {expected}")]
    VersionMismatch { expected: u64, current: u64 },
    /// Benign race (duplicate write, lock contention); safe to retry.
    #[error("Transient storage conflict: {0}")]
    Transient(String),
}
