//! Move submission and reconciliation for one game.
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - 手の送信（重複排除、一時的な競合の再試行、オフライン時のキュー投入）
//! - 再接続時のキューの順次再送と、サーバー優先の再同期
//!
//! ### どのような状況を想定しているか
//! - 正常系：接続中の送信でバージョンが進む。再接続で B, C の順に再送される
//! - 異常系：バージョン競合で楽観的更新が破棄され、サーバーの状態に置き換わる
//! - エッジケース：再送の途中で失敗すると、それ以降の手は並びを保ったまま残る

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use checkers_shared::{
    game::{Move, Player, apply_move},
    protocol::{
        Envelope, EventType,
        api::{GameSnapshot, GameStatus, MoveRejection, MoveRequest, NewGameState},
        events::{
            DrawRequestPayload, GameMovePayload, GameOverPayload, PlayerJoinedPayload,
        },
    },
    time::Clock,
};
use rand::Rng;
use uuid::Uuid;

use crate::{
    api::MoveApi,
    error::SyncError,
    optimistic::{OptimisticUpdate, OptimisticUpdateManager},
    queue_store::QueueStore,
    transport::ConnectionState,
};

use super::{
    action::SyncAction,
    reducer::reduce,
    state::{DEFAULT_QUEUE_CAPACITY, QueueKind, QueuedMove, SyncState},
};

/// Sync tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// An identical move resubmitted within this window is dropped.
    pub dedupe_window: Duration,
    /// Bounds of the random delay before the single transient retry.
    pub transient_retry_min: Duration,
    pub transient_retry_max: Duration,
    pub queue_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            dedupe_window: Duration::from_millis(500),
            transient_retry_min: Duration::from_millis(50),
            transient_retry_max: Duration::from_millis(250),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// What happened to a submitted move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted { version: u64 },
    /// Same move submitted again inside the dedupe window.
    Duplicate,
    Queued(QueueKind),
    /// The server refused the move; local state was resynchronized.
    Rejected { reason: Option<MoveRejection> },
}

/// Result of one queue replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub replayed: usize,
    /// Queue entry the replay stopped at.
    pub failed: Option<Uuid>,
    pub reason: Option<MoveRejection>,
    pub remaining: usize,
}

enum Attempt {
    Accepted(u64),
    Rejected {
        reason: Option<MoveRejection>,
        current_version: Option<u64>,
    },
    Failed(String),
}

struct Inner {
    state: SyncState,
    /// Displayed game. `version` is always the last authoritative one; the
    /// board may include unconfirmed local moves.
    view: Option<GameSnapshot>,
    last_submission: Option<(Move, i64)>,
    next_seq: u64,
}

/// ゲーム 1 つ分の同期
pub struct GameSync {
    game_id: Uuid,
    api: Arc<dyn MoveApi>,
    store: Arc<dyn QueueStore>,
    optimistic: Arc<OptimisticUpdateManager>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    /// 送信と再送を直列化する
    submission: tokio::sync::Mutex<()>,
    inner: Mutex<Inner>,
}

impl GameSync {
    pub fn new(
        game_id: Uuid,
        api: Arc<dyn MoveApi>,
        store: Arc<dyn QueueStore>,
        optimistic: Arc<OptimisticUpdateManager>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        Self {
            game_id,
            api,
            store,
            optimistic,
            clock,
            config,
            submission: tokio::sync::Mutex::new(()),
            inner: Mutex::new(Inner {
                state: SyncState::with_queue_capacity(config.queue_capacity),
                view: None,
                last_submission: None,
                next_seq: 1,
            }),
        }
    }

    pub fn game_id(&self) -> Uuid {
        self.game_id
    }

    pub fn state(&self) -> SyncState {
        self.lock().state.clone()
    }

    pub fn view(&self) -> Option<GameSnapshot> {
        self.lock().view.clone()
    }

    pub fn queued_moves(&self) -> Vec<QueuedMove> {
        self.lock().state.move_queue.ordered()
    }

    pub fn optimistic(&self) -> &Arc<OptimisticUpdateManager> {
        &self.optimistic
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, action: SyncAction) {
        let mut inner = self.lock();
        let state = std::mem::take(&mut inner.state);
        inner.state = reduce(state, action);
    }

    fn version(&self) -> Option<u64> {
        self.lock().view.as_ref().map(|v| v.version)
    }

    /// Load the persisted queue of this game.
    pub async fn restore_queue(&self) -> Result<usize, SyncError> {
        let stored = self.store.load().await?;
        let mut restored = 0;
        for queued in stored.into_iter().filter(|m| m.game_id == self.game_id) {
            {
                let mut inner = self.lock();
                inner.next_seq = inner.next_seq.max(queued.seq + 1);
            }
            let action = match queued.kind {
                QueueKind::Offline => SyncAction::OfflineMoveQueued(queued),
                QueueKind::Retry => SyncAction::RetryMoveQueued(queued),
            };
            self.dispatch(action);
            restored += 1;
        }
        if restored > 0 {
            tracing::info!("Restored {} queued move(s) for game {}", restored, self.game_id);
        }
        Ok(restored)
    }

    /// Fetch the full state and let it replace local speculation.
    pub async fn resync(&self) -> Result<GameSnapshot, SyncError> {
        let snapshot = self.api.fetch_game(self.game_id).await?;
        self.apply_snapshot(&snapshot, true);
        Ok(snapshot)
    }

    /// Feed a transport state change. On (re)connect the full state is
    /// fetched and the queue replayed.
    pub async fn on_transport_state(
        &self,
        state: ConnectionState,
    ) -> Result<Option<ReplayReport>, SyncError> {
        match state {
            ConnectionState::Connecting => self.dispatch(SyncAction::ConnectionAttempt),
            ConnectionState::Reconnecting => self.dispatch(SyncAction::ConnectionFailed {
                error: "connection lost".to_string(),
            }),
            ConnectionState::Disconnected => {
                self.dispatch(SyncAction::ConnectionClosed { intentional: false })
            }
            ConnectionState::IntentionallyDisconnected => {
                self.dispatch(SyncAction::ConnectionClosed { intentional: true })
            }
            ConnectionState::Connected => {
                self.dispatch(SyncAction::ConnectionEstablished);
                self.resync().await?;
                return Ok(Some(self.replay_queue().await));
            }
        }
        Ok(None)
    }

    /// Submit a move.
    ///
    /// Connected: older queued moves are replayed first. If any of them is
    /// still stuck the new move is queued behind it; otherwise it is sent with
    /// the tracked version, retried once on a transient race and queued for
    /// retry if it still fails. Disconnected: queued.
    pub async fn submit_move(&self, mv: Move) -> Result<SubmitOutcome, SyncError> {
        let now = self.clock.now_millis();
        let window = self.config.dedupe_window.as_millis() as i64;

        let _turn = self.submission.lock().await;
        let (last_submission, blocked) = {
            let inner = self.lock();
            (
                inner.last_submission,
                inner.state.is_connected() && !inner.state.move_queue.is_empty(),
            )
        };
        if let Some((last, at)) = last_submission
            && last == mv
            && now - at < window
        {
            tracing::debug!("Dropping duplicate submission of {}", mv);
            return Ok(SubmitOutcome::Duplicate);
        }

        // キューに残っている手を追い越さない
        if blocked {
            let report = self.replay_locked().await;
            tracing::debug!("Replayed {} queued move(s) before {}", report.replayed, mv);
        }

        let update = self.begin_optimistic(mv)?;
        let (connected, backlog) = {
            let mut inner = self.lock();
            inner.last_submission = Some((mv, now));
            (
                inner.state.is_connected(),
                !inner.state.move_queue.is_empty(),
            )
        };

        if !connected {
            self.enqueue(mv, &update, QueueKind::Offline).await;
            return Ok(SubmitOutcome::Queued(QueueKind::Offline));
        }
        if backlog {
            tracing::info!("Move {} queued behind undelivered moves", mv);
            self.enqueue(mv, &update, QueueKind::Retry).await;
            return Ok(SubmitOutcome::Queued(QueueKind::Retry));
        }

        match self.send(mv, update.id).await {
            Attempt::Accepted(version) => Ok(SubmitOutcome::Accepted { version }),
            Attempt::Rejected {
                reason,
                current_version,
            } => {
                tracing::info!("Move {} rejected: {:?}", mv, reason);
                let restore = self.optimistic.oldest();
                self.optimistic.rollback_update(update.id);
                self.resolve_conflict(current_version, restore).await;
                Ok(SubmitOutcome::Rejected { reason })
            }
            Attempt::Failed(error) => {
                tracing::warn!("Move {} not delivered ({}); queued for retry", mv, error);
                self.enqueue(mv, &update, QueueKind::Retry).await;
                Ok(SubmitOutcome::Queued(QueueKind::Retry))
            }
        }
    }

    /// Replay queued moves in submission order, stopping at the first
    /// failure. Each success advances the tracked version.
    pub async fn replay_queue(&self) -> ReplayReport {
        let _turn = self.submission.lock().await;
        self.replay_locked().await
    }

    /// Body of [`replay_queue`](Self::replay_queue); the caller holds the
    /// submission lock.
    async fn replay_locked(&self) -> ReplayReport {
        let queued = {
            let inner = self.lock();
            if inner.state.move_queue.processing || !inner.state.is_connected() {
                return ReplayReport {
                    remaining: inner.state.move_queue.len(),
                    ..ReplayReport::default()
                };
            }
            inner.state.move_queue.ordered()
        };
        if queued.is_empty() {
            return ReplayReport::default();
        }

        self.dispatch(SyncAction::MoveQueueProcessingStart);
        tracing::info!("Replaying {} queued move(s)", queued.len());

        let mut replayed = Vec::new();
        for item in &queued {
            let optimistic_id = item.optimistic_id.unwrap_or_else(Uuid::new_v4);
            let (reason, current_version, error) = match self.send(item.mv, optimistic_id).await {
                Attempt::Accepted(version) => {
                    tracing::debug!("Replayed {} (now version {})", item.mv, version);
                    replayed.push(item.id);
                    continue;
                }
                Attempt::Rejected {
                    reason,
                    current_version,
                } => (reason, current_version, format!("rejected: {:?}", reason)),
                Attempt::Failed(error) => (None, None, error),
            };

            // 再試行しても通らない拒否だけは捨てる
            let drop_failed = reason.is_some_and(is_permanent);
            tracing::warn!("Replay stopped at {}: {}", item.mv, error);
            self.dispatch(SyncAction::MoveQueueProcessingFailed {
                replayed: replayed.clone(),
                failed: item.id,
                drop_failed,
                error,
            });
            self.persist_queue().await;

            if reason.is_some() {
                let restore = self.optimistic.oldest();
                if drop_failed {
                    self.optimistic.rollback_update(optimistic_id);
                }
                self.resolve_conflict(current_version, restore).await;
            }
            return ReplayReport {
                replayed: replayed.len(),
                failed: Some(item.id),
                reason,
                remaining: self.lock().state.move_queue.len(),
            };
        }

        let count = replayed.len();
        self.dispatch(SyncAction::MoveQueueProcessingComplete { replayed });
        self.persist_queue().await;
        ReplayReport {
            replayed: count,
            ..ReplayReport::default()
        }
    }

    /// Apply an inbound envelope of the game channel.
    pub async fn handle_envelope(&self, envelope: &Envelope) {
        self.dispatch(SyncAction::SseMessageReceived {
            sequence_number: envelope.sequence_number,
        });

        match envelope.r#type {
            EventType::GameState => match envelope.payload_as::<GameSnapshot>() {
                // 再接続直後の再送で既に先へ進んでいることがある
                Ok(snapshot) if self.version().is_some_and(|v| snapshot.version < v) => {
                    tracing::debug!("Ignoring stale GAME_STATE (version {})", snapshot.version);
                }
                Ok(snapshot) => self.apply_snapshot(&snapshot, true),
                Err(e) => tracing::warn!("Malformed GAME_STATE payload: {}", e),
            },
            EventType::GameMove => match envelope.payload_as::<GameMovePayload>() {
                Ok(event) => self.apply_move_event(&event).await,
                Err(e) => tracing::warn!("Malformed GAME_MOVE payload: {}", e),
            },
            EventType::GameOver => {
                if let Ok(over) = envelope.payload_as::<GameOverPayload>() {
                    self.update_view(|view| {
                        view.status = GameStatus::Completed;
                        view.winner = over.winner;
                        view.draw_offered_by = None;
                        view.version = view.version.max(over.version);
                    });
                }
            }
            EventType::PlayerJoined => {
                if let Ok(joined) = envelope.payload_as::<PlayerJoinedPayload>() {
                    self.update_view(|view| {
                        match joined.color {
                            Player::Red => {
                                view.red_player = Some(joined.user_id.clone())
                            }
                            Player::Black => {
                                view.black_player = Some(joined.user_id.clone())
                            }
                        }
                        view.status = GameStatus::Active;
                    });
                }
            }
            EventType::DrawRequest => {
                if let Ok(request) = envelope.payload_as::<DrawRequestPayload>() {
                    self.update_view(|view| view.draw_offered_by = Some(request.from_user.clone()));
                }
            }
            EventType::DrawResponse => self.update_view(|view| view.draw_offered_by = None),
            _ => {}
        }
    }

    async fn apply_move_event(&self, event: &GameMovePayload) {
        if self.optimistic.reconcile(event).is_some()
            && let Some(id) = event.optimistic_id
        {
            self.dispatch(SyncAction::OptimisticMoveConfirmed { id });
        }

        let Some(current) = self.version() else {
            return;
        };
        if event.version <= current {
            // 送信結果で反映済み
            return;
        }
        if event.version > current + 1 {
            tracing::info!(
                "Missed events (local version {}, event version {}); resyncing",
                current,
                event.version
            );
            if let Err(e) = self.resync().await {
                tracing::warn!("Resync failed: {}", e);
            }
            return;
        }
        self.update_view(|view| {
            view.version = event.version;
            view.board = event.board.clone();
            view.current_player = event.current_player;
            view.move_count = event.move_count;
            view.winner = event.winner;
            view.status = event.status;
        });
    }

    fn update_view(&self, f: impl FnOnce(&mut GameSnapshot)) {
        if let Some(view) = self.lock().view.as_mut() {
            f(view);
        }
    }

    fn apply_snapshot(&self, snapshot: &GameSnapshot, discard_pending: bool) {
        if discard_pending {
            self.optimistic.resolve_conflict(snapshot);
            self.dispatch(SyncAction::OptimisticMovesDiscarded);
        }
        self.lock().view = Some(snapshot.clone());
    }

    fn apply_new_state(&self, state: &NewGameState) {
        self.update_view(|view| {
            view.version = state.version;
            view.board = state.board.clone();
            view.current_player = state.current_player;
            view.winner = state.winner;
            view.move_count = state.move_count;
            view.status = state.status;
        });
    }

    /// Record the optimistic update and apply the move to the local view
    /// when the local rules accept it.
    fn begin_optimistic(&self, mv: Move) -> Result<OptimisticUpdate, SyncError> {
        let Some(view) = self.view() else {
            return Err(SyncError::NotSynced(self.game_id));
        };
        let update = self.optimistic.create_update(
            mv,
            view.board.clone(),
            view.current_player,
            view.move_count,
            view.version,
        );

        match apply_move(&view.board, view.current_player, mv) {
            Ok(outcome) => self.update_view(|view| {
                view.board = outcome.board;
                view.current_player = outcome.next_player;
                view.move_count += 1;
                view.winner = outcome.winner;
            }),
            Err(e) => tracing::debug!("Local rules reject {}: {}; the server decides", mv, e),
        }
        self.dispatch(SyncAction::OptimisticMoveCreated { id: update.id });
        Ok(update)
    }

    async fn attempt(&self, mv: Move, optimistic_id: Uuid) -> Attempt {
        let Some(expected_version) = self.version() else {
            return Attempt::Failed(SyncError::NotSynced(self.game_id).to_string());
        };
        let request = MoveRequest {
            game_id: self.game_id,
            mv,
            expected_version,
            optimistic_id: Some(optimistic_id),
        };

        match self.api.submit_move(request).await {
            Ok(response) if response.success => {
                if let Some(state) = &response.new_game_state {
                    self.apply_new_state(state);
                } else if let Err(e) = self.resync().await {
                    tracing::warn!("Resync after accepted move failed: {}", e);
                }
                if self.optimistic.confirm_update(optimistic_id).is_some() {
                    self.dispatch(SyncAction::OptimisticMoveConfirmed { id: optimistic_id });
                }
                Attempt::Accepted(self.version().unwrap_or(expected_version + 1))
            }
            Ok(response) => Attempt::Rejected {
                reason: response.reason,
                current_version: response.current_version,
            },
            Err(e) => Attempt::Failed(e.to_string()),
        }
    }

    /// One attempt, plus exactly one retry on a transient race.
    async fn send(&self, mv: Move, optimistic_id: Uuid) -> Attempt {
        let first = self.attempt(mv, optimistic_id).await;
        let transient = matches!(
            &first,
            Attempt::Rejected { reason: Some(reason), .. } if reason.is_transient()
        );
        if !transient {
            return first;
        }

        let delay = self.transient_delay();
        tracing::debug!("Transient conflict on {}; retrying once in {:?}", mv, delay);
        tokio::time::sleep(delay).await;

        // 最新の状態を取り直してから再試行する（保留中の更新は残す）
        match self.api.fetch_game(self.game_id).await {
            Ok(snapshot) => self.apply_snapshot(&snapshot, false),
            Err(e) => return Attempt::Failed(e.to_string()),
        }

        match self.attempt(mv, optimistic_id).await {
            Attempt::Rejected {
                reason: Some(reason),
                ..
            } if reason.is_transient() => {
                Attempt::Failed("transient conflict persisted after retry".to_string())
            }
            second => second,
        }
    }

    fn transient_delay(&self) -> Duration {
        let min = self.config.transient_retry_min.as_millis() as u64;
        let max = self.config.transient_retry_max.as_millis() as u64;
        if max <= min {
            return self.config.transient_retry_min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..max))
    }

    /// Server wins: refetch, discard speculation, clear the conflict.
    ///
    /// `restore` is the earliest pending update at the time of the conflict;
    /// if the refetch fails the view falls back to the board it recorded.
    async fn resolve_conflict(
        &self,
        current_version: Option<u64>,
        restore: Option<OptimisticUpdate>,
    ) {
        self.dispatch(SyncAction::SyncConflictDetected { current_version });
        self.dispatch(SyncAction::ConflictResolutionStart);
        match self.resync().await {
            Ok(snapshot) => self.dispatch(SyncAction::ConflictResolutionComplete {
                version: snapshot.version,
            }),
            Err(e) => {
                tracing::error!("Resync after conflict failed: {}", e);
                if let Some(restore) = restore {
                    self.update_view(|view| {
                        view.board = restore.before.board;
                        view.current_player = restore.before.current_player;
                        view.move_count = restore.before.move_count;
                    });
                }
                self.optimistic.clear_all_updates();
                self.dispatch(SyncAction::ConflictResolutionFailed {
                    error: e.to_string(),
                });
            }
        }
    }

    async fn enqueue(&self, mv: Move, update: &OptimisticUpdate, kind: QueueKind) {
        let queued = {
            let mut inner = self.lock();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            QueuedMove {
                id: Uuid::new_v4(),
                game_id: self.game_id,
                mv,
                expected_version: update.expected_version,
                optimistic_id: Some(update.id),
                seq,
                queued_at: self.clock.now_millis(),
                kind,
            }
        };
        let action = match kind {
            QueueKind::Offline => SyncAction::OfflineMoveQueued(queued),
            QueueKind::Retry => SyncAction::RetryMoveQueued(queued),
        };
        self.dispatch(action);
        self.persist_queue().await;
    }

    /// Write this game's queue, keeping entries of other games in the store.
    async fn persist_queue(&self) {
        let mut moves = match self.store.load().await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Failed to read stored move queue: {}", e);
                Vec::new()
            }
        };
        moves.retain(|m| m.game_id != self.game_id);
        moves.extend(self.queued_moves());
        if let Err(e) = self.store.save(&moves).await {
            tracing::warn!("Failed to persist move queue: {}", e);
        }
    }
}

/// Rejections a replay can never turn into an acceptance.
fn is_permanent(reason: MoveRejection) -> bool {
    matches!(
        reason,
        MoveRejection::IllegalMove
            | MoveRejection::NotYourTurn
            | MoveRejection::NotAPlayer
            | MoveRejection::GameNotActive
            | MoveRejection::GameNotFound
    )
}
