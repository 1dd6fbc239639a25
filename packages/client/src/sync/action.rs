//! Sync actions.

use uuid::Uuid;

use super::state::QueuedMove;

/// Discrete inputs of the sync reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    ConnectionAttempt,
    ConnectionEstablished,
    ConnectionFailed { error: String },
    ConnectionClosed { intentional: bool },
    SseMessageReceived { sequence_number: Option<u64> },
    OptimisticMoveCreated { id: Uuid },
    OptimisticMoveConfirmed { id: Uuid },
    /// A full snapshot replaced every pending local move.
    OptimisticMovesDiscarded,
    /// A move submitted while disconnected.
    OfflineMoveQueued(QueuedMove),
    RetryMoveQueued(QueuedMove),
    MoveQueueProcessingStart,
    /// Every queued move was replayed.
    MoveQueueProcessingComplete { replayed: Vec<Uuid> },
    /// Replay stopped at `failed`. Moves after it stay queued as they were;
    /// `failed` itself is dropped only when `drop_failed` is set.
    MoveQueueProcessingFailed {
        replayed: Vec<Uuid>,
        failed: Uuid,
        drop_failed: bool,
        error: String,
    },
    SyncConflictDetected { current_version: Option<u64> },
    ConflictResolutionStart,
    ConflictResolutionComplete { version: u64 },
    /// The refetch failed; the conflict stays flagged for the UI.
    ConflictResolutionFailed { error: String },
}
