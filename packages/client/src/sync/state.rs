//! Sync state shape.

use checkers_shared::game::Move;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::transport::ConnectionState;

/// Default bound of the move queue (offline + retry).
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// Which list a queued move sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// Submitted while disconnected
    Offline,
    /// Failed after the transient retry, or lost to a network error
    Retry,
}

/// A move waiting to be replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMove {
    pub id: Uuid,
    pub game_id: Uuid,
    #[serde(rename = "move")]
    pub mv: Move,
    /// Version the move was first submitted against. Replay uses the
    /// version tracked at replay time instead.
    pub expected_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimistic_id: Option<Uuid>,
    /// Submission order across both lists.
    pub seq: u64,
    pub queued_at: i64,
    pub kind: QueueKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionSlice {
    pub status: ConnectionState,
    pub reconnect_attempts: u32,
    pub last_error: Option<String>,
    /// Highest sequence number seen on the current process' stream.
    pub last_sequence: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveQueueSlice {
    pub offline: Vec<QueuedMove>,
    pub retry: Vec<QueuedMove>,
    pub processing: bool,
    pub capacity: usize,
}

impl Default for MoveQueueSlice {
    fn default() -> Self {
        Self {
            offline: Vec::new(),
            retry: Vec::new(),
            processing: false,
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl MoveQueueSlice {
    pub fn len(&self) -> usize {
        self.offline.len() + self.retry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Both lists merged back into submission order.
    pub fn ordered(&self) -> Vec<QueuedMove> {
        let mut moves: Vec<QueuedMove> =
            self.offline.iter().chain(self.retry.iter()).cloned().collect();
        moves.sort_by_key(|m| m.seq);
        moves
    }
}

/// Version conflict reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictInfo {
    pub current_version: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OptimisticSlice {
    /// Correlation ids of unconfirmed local moves, oldest first.
    pub pending: Vec<Uuid>,
    pub conflict: Option<ConflictInfo>,
    pub resolving: bool,
}

/// Everything the sync layer tracks, reduced from [`SyncAction`](super::SyncAction)s.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncState {
    pub connection: ConnectionSlice,
    pub move_queue: MoveQueueSlice,
    pub optimistic: OptimisticSlice,
}

impl SyncState {
    pub fn with_queue_capacity(capacity: usize) -> Self {
        Self {
            move_queue: MoveQueueSlice {
                capacity,
                ..MoveQueueSlice::default()
            },
            ..Self::default()
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status == ConnectionState::Connected
    }
}
