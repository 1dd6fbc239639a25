//! Client-side sync layer.
//!
//! - `state` / `action` / `reducer`: sync state reduced from discrete actions
//! - `game_sync`: move submission, queue replay and reconciliation for one game

mod action;
mod game_sync;
mod reducer;
mod state;

pub use action::SyncAction;
pub use game_sync::{GameSync, ReplayReport, SubmitOutcome, SyncConfig};
pub use reducer::reduce;
pub use state::{
    ConflictInfo, ConnectionSlice, DEFAULT_QUEUE_CAPACITY, MoveQueueSlice, OptimisticSlice,
    QueueKind, QueuedMove, SyncState,
};
