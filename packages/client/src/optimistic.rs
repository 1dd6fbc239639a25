//! Optimistic update manager.
//!
//! Each local move is recorded as a pending update keyed by a client-generated
//! correlation id. The id travels with the move request and comes back in the
//! server's `GAME_MOVE` event, which confirms the update. On any conflict the
//! server snapshot wins and every pending update is discarded.
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - 楽観的更新の作成 / 確定 / 取り消しとリスナー通知
//!
//! ### どのような状況を想定しているか
//! - 正常系：サーバーから同じ ID が返ってきて確定する
//! - 異常系：競合時にすべての保留中の更新が破棄される
//! - エッジケース：取り消しで作成前の盤面がそのまま復元される

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use checkers_shared::{
    game::{Board, Move, Player},
    protocol::{api::GameSnapshot, events::GameMovePayload},
    time::Clock,
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateStatus {
    Pending,
    Confirmed,
    Rejected,
}

/// Board state shown before a local move was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSnapshot {
    pub board: Board,
    pub current_player: Player,
    pub move_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticUpdate {
    /// Correlation id, sent as `optimisticId`.
    pub id: Uuid,
    pub mv: Move,
    pub before: LocalSnapshot,
    pub expected_version: u64,
    pub status: UpdateStatus,
    pub created_at: i64,
}

/// Notifications delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimisticEvent {
    Created(OptimisticUpdate),
    Confirmed(OptimisticUpdate),
    RolledBack(OptimisticUpdate),
    /// Pending updates discarded at once (conflict or explicit clear).
    Cleared(Vec<OptimisticUpdate>),
}

type Listener = Arc<dyn Fn(&OptimisticEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: BTreeMap<u64, Listener>,
}

/// Listener registration. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entries
                .remove(&self.id);
        }
    }
}

/// 楽観的更新の管理
pub struct OptimisticUpdateManager {
    clock: Arc<dyn Clock>,
    /// 保留中の更新（作成順）
    pending: Mutex<Vec<OptimisticUpdate>>,
    listeners: Arc<Mutex<Listeners>>,
}

impl OptimisticUpdateManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            pending: Mutex::new(Vec::new()),
            listeners: Arc::new(Mutex::new(Listeners::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<OptimisticUpdate>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a local move. `board_before` is kept as-is for rollback.
    pub fn create_update(
        &self,
        mv: Move,
        board_before: Board,
        current_player: Player,
        move_count: u32,
        expected_version: u64,
    ) -> OptimisticUpdate {
        let update = OptimisticUpdate {
            id: Uuid::new_v4(),
            mv,
            before: LocalSnapshot {
                board: board_before,
                current_player,
                move_count,
            },
            expected_version,
            status: UpdateStatus::Pending,
            created_at: self.clock.now_millis(),
        };
        self.lock().push(update.clone());
        tracing::debug!("Optimistic update {} created for {}", update.id, mv);
        self.notify(&OptimisticEvent::Created(update.clone()));
        update
    }

    /// Mark `id` as confirmed and drop it from the pending set.
    pub fn confirm_update(&self, id: Uuid) -> Option<OptimisticUpdate> {
        let mut update = self.take(id)?;
        update.status = UpdateStatus::Confirmed;
        self.notify(&OptimisticEvent::Confirmed(update.clone()));
        Some(update)
    }

    /// Reject `id`. The returned update carries the snapshot to restore.
    pub fn rollback_update(&self, id: Uuid) -> Option<OptimisticUpdate> {
        let mut update = self.take(id)?;
        update.status = UpdateStatus::Rejected;
        tracing::debug!("Optimistic update {} rolled back", id);
        self.notify(&OptimisticEvent::RolledBack(update.clone()));
        Some(update)
    }

    /// Discard every pending update, oldest first.
    pub fn clear_all_updates(&self) -> Vec<OptimisticUpdate> {
        let mut cleared = std::mem::take(&mut *self.lock());
        if cleared.is_empty() {
            return cleared;
        }
        for update in &mut cleared {
            update.status = UpdateStatus::Rejected;
        }
        self.notify(&OptimisticEvent::Cleared(cleared.clone()));
        cleared
    }

    /// Server wins: drop all local speculation in favour of `server`.
    pub fn resolve_conflict(&self, server: &GameSnapshot) -> Vec<OptimisticUpdate> {
        let discarded = self.clear_all_updates();
        if !discarded.is_empty() {
            tracing::info!(
                "Discarded {} optimistic update(s); server is at version {}",
                discarded.len(),
                server.version
            );
        }
        discarded
    }

    /// Confirm the update echoed back by a `GAME_MOVE` event, if it is ours.
    pub fn reconcile(&self, event: &GameMovePayload) -> Option<OptimisticUpdate> {
        let id = event.optimistic_id?;
        self.confirm_update(id)
    }

    /// Earliest pending update, i.e. the state before all local speculation.
    pub fn oldest(&self) -> Option<OptimisticUpdate> {
        self.lock().first().cloned()
    }

    pub fn pending(&self) -> Vec<OptimisticUpdate> {
        self.lock().clone()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Register a listener called after every change.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&OptimisticEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.insert(id, Arc::new(listener));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    fn take(&self, id: Uuid) -> Option<OptimisticUpdate> {
        let mut pending = self.lock();
        let index = pending.iter().position(|u| u.id == id)?;
        Some(pending.remove(index))
    }

    fn notify(&self, event: &OptimisticEvent) {
        // ロックを外してから呼び出す（リスナーからの再入に備える）
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}
