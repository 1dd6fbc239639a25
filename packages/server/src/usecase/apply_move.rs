//! UseCase: バージョン付きの手の適用
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - ApplyMoveUseCase::execute() メソッド
//! - 期待バージョンの検証、compare-and-set による保存、GAME_MOVE の発行
//!
//! ### なぜこのテストが必要か
//! - バージョンは受理された手ごとにちょうど 1 増え、拒否された手では変わらない
//! - 競合した手は再同期を促す理由付きで拒否されなければならない
//!
//! ### どのような状況を想定しているか
//! - 正常系：手が受理され、GAME_MOVE と相手への手番通知が発行される
//! - 異常系：古いバージョン、手番違い、永続化時の一時的な競合
//! - エッジケース：決着がついた手では GAME_OVER も発行される

use std::sync::Arc;

use checkers_shared::{
    game::Move,
    protocol::{
        EventType,
        events::{GameMovePayload, GameOverPayload, GameOverReason, NotificationKind},
    },
    time::Clock,
};
use uuid::Uuid;

use crate::domain::{EventPublisher, GameId, GameRepository, GameSession, GroupKey, UserId};

use super::{
    error::ApplyMoveError,
    event::{notify, publish},
};

/// 手の適用リクエスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCommand {
    pub game_id: GameId,
    pub user: UserId,
    pub mv: Move,
    pub expected_version: u64,
    /// クライアント側の楽観的更新の相関 ID。GAME_MOVE にそのまま載せて返す。
    pub optimistic_id: Option<Uuid>,
}

/// 手の適用のユースケース
pub struct ApplyMoveUseCase {
    repository: Arc<dyn GameRepository>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl ApplyMoveUseCase {
    pub fn new(
        repository: Arc<dyn GameRepository>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            publisher,
            clock,
        }
    }

    /// 手を検証して適用し、保存後のセッションを返す
    ///
    /// # Returns
    ///
    /// * `Ok(GameSession)` - バージョンが 1 進んだセッション
    /// * `Err(ApplyMoveError)` - 拒否（状態は変わらない）
    pub async fn execute(&self, command: MoveCommand) -> Result<GameSession, ApplyMoveError> {
        let now = self.clock.now_millis();

        // 1. 最新状態を取得して、純粋関数で次の状態を計算
        let session = self.repository.get(&command.game_id).await?;
        let applied = session.play(&command.user, command.mv, command.expected_version, now)?;

        // 2. compare-and-set で保存
        self.repository
            .save_if_version(applied.session.clone(), command.expected_version)
            .await?;

        let next = applied.session;
        tracing::info!(
            "Game {}: {} played {} (version {} -> {})",
            command.game_id,
            command.user,
            command.mv,
            command.expected_version,
            next.version
        );

        // 3. イベント発行
        let channel = GroupKey::game(&command.game_id);
        let payload = GameMovePayload {
            game_id: command.game_id.as_uuid(),
            mv: command.mv,
            player: applied.player,
            moved_by: command.user.to_string(),
            version: next.version,
            board: next.board.clone(),
            current_player: next.current_player,
            move_count: next.move_count,
            winner: next.winner,
            status: next.status,
            optimistic_id: command.optimistic_id,
        };
        publish(
            self.publisher.as_ref(),
            &channel,
            EventType::GameMove,
            &payload,
            now,
        );

        if let Some(winner) = next.winner {
            let game_over = GameOverPayload {
                game_id: command.game_id.as_uuid(),
                winner: Some(winner),
                reason: GameOverReason::NoPiecesOrMoves,
                version: next.version,
            };
            publish(
                self.publisher.as_ref(),
                &channel,
                EventType::GameOver,
                &game_over,
                now,
            );
            if let Some(opponent) = next.opponent_of(&command.user) {
                notify(
                    self.publisher.as_ref(),
                    opponent,
                    NotificationKind::GameOver,
                    format!("{} won the game", winner),
                    Some(command.game_id),
                    now,
                );
            }
        } else if next.current_player != applied.player {
            if let Some(opponent) = next.player_of(next.current_player) {
                notify(
                    self.publisher.as_ref(),
                    opponent,
                    NotificationKind::YourTurn,
                    format!("{} played {}, your turn", command.user, command.mv),
                    Some(command.game_id),
                    now,
                );
            }
        }

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{DomainError, MockGameRepository, RepositoryError},
        infrastructure::repository::InMemoryGameRepository,
        usecase::test_support::{RecordingPublisher, clock, seed_active_game, user},
    };
    use checkers_shared::{
        game::{Board, Piece, Player, Position},
        protocol::api::GameStatus,
    };

    fn command(game: &GameSession, who: &str, mv: &str, expected_version: u64) -> MoveCommand {
        MoveCommand {
            game_id: game.id,
            user: user(who),
            mv: mv.parse().unwrap(),
            expected_version,
            optimistic_id: None,
        }
    }

    fn create_usecase() -> (
        ApplyMoveUseCase,
        Arc<InMemoryGameRepository>,
        Arc<RecordingPublisher>,
    ) {
        let repository = Arc::new(InMemoryGameRepository::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let usecase = ApplyMoveUseCase::new(repository.clone(), publisher.clone(), clock());
        (usecase, repository, publisher)
    }

    #[tokio::test]
    async fn test_accepted_move_increments_version_and_publishes() {
        // テスト項目: 受理された手でバージョンが 1 進み、GAME_MOVE が相関 ID 付きで発行される
        // given (前提条件):
        let (usecase, repository, publisher) = create_usecase();
        let game = seed_active_game(&repository).await;
        let optimistic_id = Uuid::new_v4();
        let mut cmd = command(&game, "alice", "c3-d4", 0);
        cmd.optimistic_id = Some(optimistic_id);

        // when (操作):
        let next = usecase.execute(cmd).await.unwrap();

        // then (期待する結果):
        assert_eq!(next.version, 1);
        assert_eq!(next.current_player, Player::Black);
        assert_eq!(repository.get(&game.id).await.unwrap().version, 1);

        let events = publisher.events();
        let (channel, envelope) = &events[0];
        assert_eq!(channel, &GroupKey::game(&game.id));
        assert_eq!(envelope.r#type, EventType::GameMove);
        let payload: GameMovePayload = envelope.payload_as().unwrap();
        assert_eq!(payload.version, 1);
        assert_eq!(payload.optimistic_id, Some(optimistic_id));
        assert_eq!(payload.moved_by, "alice");

        assert_eq!(
            publisher.types_on(&GroupKey::user(&user("bob"))),
            vec![EventType::NotificationCreated]
        );
    }

    #[tokio::test]
    async fn test_stale_expected_version_is_rejected() {
        // テスト項目: 古い期待バージョンの手は VersionConflict で拒否され、バージョンは変わらない
        // given (前提条件):
        let (usecase, repository, publisher) = create_usecase();
        let game = seed_active_game(&repository).await;
        usecase
            .execute(command(&game, "alice", "c3-d4", 0))
            .await
            .unwrap();
        let before = publisher.events().len();

        // when (操作):
        let result = usecase.execute(command(&game, "bob", "f6-e5", 0)).await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ApplyMoveError::VersionConflict {
                expected: 0,
                current: 1
            })
        );
        assert_eq!(repository.get(&game.id).await.unwrap().version, 1);
        assert_eq!(publisher.events().len(), before);
    }

    #[tokio::test]
    async fn test_out_of_turn_move_is_rejected() {
        // テスト項目: 手番でないプレイヤーの手は拒否される
        // given (前提条件):
        let (usecase, repository, _publisher) = create_usecase();
        let game = seed_active_game(&repository).await;

        // when (操作):
        let result = usecase.execute(command(&game, "bob", "f6-e5", 0)).await;

        // then (期待する結果):
        assert_eq!(result, Err(ApplyMoveError::Rejected(DomainError::NotYourTurn)));
    }

    #[tokio::test]
    async fn test_transient_persistence_race_is_reported() {
        // テスト項目: 保存時の一時的な競合は Transient として返され、イベントは発行されない
        // given (前提条件):
        let game = GameSession::new(GameId::generate(), user("alice"), 0)
            .join(user("bob"), 0)
            .unwrap();
        let stored = game.clone();
        let mut repository = MockGameRepository::new();
        repository
            .expect_get()
            .returning(move |_| Ok(stored.clone()));
        repository
            .expect_save_if_version()
            .times(1)
            .returning(|_, _| Err(RepositoryError::Transient("lock contention".to_string())));
        let publisher = Arc::new(RecordingPublisher::default());
        let usecase = ApplyMoveUseCase::new(Arc::new(repository), publisher.clone(), clock());

        // when (操作):
        let result = usecase.execute(command(&game, "alice", "c3-d4", 0)).await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ApplyMoveError::Transient("lock contention".to_string()))
        );
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_winning_move_publishes_game_over() {
        // テスト項目: 最後の駒を取る手で GAME_OVER が発行され、ゲームが終了する
        // given (前提条件): 黒の駒が 1 つだけ残っている盤面
        let mut board = Board::empty();
        board.set(Position::new(5, 2), Some(Piece::man(Player::Red)));
        board.set(Position::new(4, 3), Some(Piece::man(Player::Black)));
        let mut game = GameSession::new(GameId::generate(), user("alice"), 0)
            .join(user("bob"), 0)
            .unwrap();
        game.board = board;
        let stored = game.clone();
        let mut repository = MockGameRepository::new();
        repository
            .expect_get()
            .returning(move |_| Ok(stored.clone()));
        repository
            .expect_save_if_version()
            .withf(|session, expected| *expected == 0 && session.version == 1)
            .returning(|_, _| Ok(()));
        let publisher = Arc::new(RecordingPublisher::default());
        let usecase = ApplyMoveUseCase::new(Arc::new(repository), publisher.clone(), clock());

        // when (操作): c3 から e5 へジャンプ
        let next = usecase
            .execute(command(&game, "alice", "c3-e5", 0))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(next.winner, Some(Player::Red));
        assert_eq!(next.status, GameStatus::Completed);
        assert_eq!(
            publisher.types_on(&GroupKey::game(&game.id)),
            vec![EventType::GameMove, EventType::GameOver]
        );
    }
}
