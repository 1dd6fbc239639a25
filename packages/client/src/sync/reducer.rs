//! Pure sync reducer.
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - 各アクションによる状態遷移
//!
//! ### どのような状況を想定しているか
//! - 正常系：接続確立、楽観的更新の確定、キューの再送完了
//! - 異常系：接続失敗の累積、再送の途中失敗
//! - エッジケース：キュー上限で最古の手が捨てられる

use uuid::Uuid;

use crate::transport::ConnectionState;

use super::{
    action::SyncAction,
    state::{ConflictInfo, QueueKind, QueuedMove, SyncState},
};

/// Apply one action.
pub fn reduce(mut state: SyncState, action: SyncAction) -> SyncState {
    match action {
        SyncAction::ConnectionAttempt => {
            state.connection.status = ConnectionState::Connecting;
        }
        SyncAction::ConnectionEstablished => {
            state.connection.status = ConnectionState::Connected;
            state.connection.reconnect_attempts = 0;
            state.connection.last_error = None;
        }
        SyncAction::ConnectionFailed { error } => {
            state.connection.status = ConnectionState::Reconnecting;
            state.connection.reconnect_attempts += 1;
            state.connection.last_error = Some(error);
        }
        SyncAction::ConnectionClosed { intentional } => {
            state.connection.status = if intentional {
                ConnectionState::IntentionallyDisconnected
            } else {
                ConnectionState::Disconnected
            };
            state.move_queue.processing = false;
        }
        SyncAction::SseMessageReceived { sequence_number } => {
            if let Some(seq) = sequence_number {
                let last = state.connection.last_sequence.get_or_insert(seq);
                *last = (*last).max(seq);
            }
        }
        SyncAction::OptimisticMoveCreated { id } => {
            if !state.optimistic.pending.contains(&id) {
                state.optimistic.pending.push(id);
            }
        }
        SyncAction::OptimisticMoveConfirmed { id } => {
            state.optimistic.pending.retain(|p| *p != id);
        }
        SyncAction::OptimisticMovesDiscarded => {
            state.optimistic.pending.clear();
        }
        SyncAction::OfflineMoveQueued(mv) => enqueue(&mut state, mv, QueueKind::Offline),
        SyncAction::RetryMoveQueued(mv) => enqueue(&mut state, mv, QueueKind::Retry),
        SyncAction::MoveQueueProcessingStart => {
            state.move_queue.processing = true;
        }
        SyncAction::MoveQueueProcessingComplete { replayed } => {
            remove_queued(&mut state, &replayed);
            state.move_queue.processing = false;
        }
        SyncAction::MoveQueueProcessingFailed {
            mut replayed,
            failed,
            drop_failed,
            error,
        } => {
            if drop_failed {
                replayed.push(failed);
            }
            remove_queued(&mut state, &replayed);
            state.move_queue.processing = false;
            state.connection.last_error = Some(error);
        }
        SyncAction::SyncConflictDetected { current_version } => {
            state.optimistic.conflict = Some(ConflictInfo { current_version });
        }
        SyncAction::ConflictResolutionStart => {
            state.optimistic.resolving = true;
        }
        SyncAction::ConflictResolutionComplete { .. } => {
            state.optimistic.resolving = false;
            state.optimistic.conflict = None;
            state.optimistic.pending.clear();
        }
        SyncAction::ConflictResolutionFailed { error } => {
            state.optimistic.resolving = false;
            state.optimistic.pending.clear();
            state.connection.last_error = Some(error);
        }
    }
    state
}

fn enqueue(state: &mut SyncState, mut mv: QueuedMove, kind: QueueKind) {
    mv.kind = kind;
    let queue = &mut state.move_queue;

    // 上限に達していたら最も古い手を捨てる
    while queue.capacity > 0 && queue.len() >= queue.capacity {
        let oldest_offline = queue.offline.first().map(|m| m.seq);
        let oldest_retry = queue.retry.first().map(|m| m.seq);
        let dropped = match (oldest_offline, oldest_retry) {
            (Some(o), Some(r)) if r < o => queue.retry.remove(0),
            (Some(_), _) => queue.offline.remove(0),
            (None, Some(_)) => queue.retry.remove(0),
            (None, None) => break,
        };
        tracing::warn!("Move queue full; dropping oldest move {}", dropped.mv);
    }

    let list = match kind {
        QueueKind::Offline => &mut queue.offline,
        QueueKind::Retry => &mut queue.retry,
    };
    let at = list.partition_point(|m| m.seq < mv.seq);
    list.insert(at, mv);
}

fn remove_queued(state: &mut SyncState, ids: &[Uuid]) {
    state.move_queue.offline.retain(|m| !ids.contains(&m.id));
    state.move_queue.retry.retain(|m| !ids.contains(&m.id));
}
