//! UseCase: 投了

use std::sync::Arc;

use checkers_shared::{
    protocol::{
        EventType,
        events::{GameOverPayload, GameOverReason, NotificationKind},
    },
    time::Clock,
};

use crate::domain::{EventPublisher, GameId, GameRepository, GameSession, GroupKey, UserId};

use super::{
    error::GameError,
    event::{notify, publish},
};

/// 投了のユースケース
pub struct ResignGameUseCase {
    repository: Arc<dyn GameRepository>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl ResignGameUseCase {
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

    pub async fn execute(&self, game_id: GameId, user: UserId) -> Result<GameSession, GameError> {
        let now = self.clock.now_millis();
        let session = self.repository.get(&game_id).await?;
        let resigned = session.resign(&user, now)?;
        self.repository
            .save_if_version(resigned.clone(), session.version)
            .await?;
        tracing::info!("'{}' resigned game {}", user, game_id);

        let payload = GameOverPayload {
            game_id: game_id.as_uuid(),
            winner: resigned.winner,
            reason: GameOverReason::Resignation,
            version: resigned.version,
        };
        publish(
            self.publisher.as_ref(),
            &GroupKey::game(&game_id),
            EventType::GameOver,
            &payload,
            now,
        );
        if let Some(opponent) = resigned.opponent_of(&user) {
            notify(
                self.publisher.as_ref(),
                opponent,
                NotificationKind::GameOver,
                format!("{} resigned", user),
                Some(game_id),
                now,
            );
        }

        Ok(resigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::DomainError,
        infrastructure::repository::InMemoryGameRepository,
        usecase::test_support::{RecordingPublisher, clock, seed_active_game, user},
    };
    use checkers_shared::{game::Player, protocol::api::GameStatus};

    #[tokio::test]
    async fn test_resign_completes_game() {
        // テスト項目: 投了するとゲームが終了し、GAME_OVER が発行される
        // given (前提条件):
        let repository = Arc::new(InMemoryGameRepository::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let game = seed_active_game(&repository).await;
        let usecase = ResignGameUseCase::new(repository.clone(), publisher.clone(), clock());

        // when (操作):
        let resigned = usecase.execute(game.id, user("bob")).await.unwrap();

        // then (期待する結果):
        assert_eq!(resigned.winner, Some(Player::Red));
        assert_eq!(resigned.status, GameStatus::Completed);
        let events = publisher.events();
        let (_, game_over) = &events[0];
        let payload: GameOverPayload = game_over.payload_as().unwrap();
        assert_eq!(payload.reason, GameOverReason::Resignation);
        assert_eq!(payload.winner, Some(Player::Red));
    }

    #[tokio::test]
    async fn test_spectator_cannot_resign() {
        // テスト項目: プレイヤー以外は投了できない
        // given (前提条件):
        let repository = Arc::new(InMemoryGameRepository::new());
        let game = seed_active_game(&repository).await;
        let usecase = ResignGameUseCase::new(
            repository.clone(),
            Arc::new(RecordingPublisher::default()),
            clock(),
        );

        // when (操作):
        let result = usecase.execute(game.id, user("carol")).await;

        // then (期待する結果):
        assert_eq!(result, Err(GameError::Domain(DomainError::NotAPlayer)));
    }
}
