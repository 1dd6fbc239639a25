//! UseCase: ゲームへの参加

use std::sync::Arc;

use checkers_shared::{
    game::Player,
    protocol::{
        EventType,
        events::{NotificationKind, PlayerJoinedPayload},
    },
    time::Clock,
};

use crate::domain::{EventPublisher, GameId, GameRepository, GameSession, GroupKey, UserId};

use super::{
    error::GameError,
    event::{notify, publish},
};

/// ゲーム参加のユースケース
pub struct JoinGameUseCase {
    repository: Arc<dyn GameRepository>,
    /// EventPublisher（イベント発行の抽象化）
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl JoinGameUseCase {
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

    /// 2 人目のプレイヤーとして黒で参加し、PLAYER_JOINED を発行する
    pub async fn execute(&self, game_id: GameId, user: UserId) -> Result<GameSession, GameError> {
        let now = self.clock.now_millis();
        let session = self.repository.get(&game_id).await?;
        let joined = session.join(user.clone(), now)?;
        self.repository
            .save_if_version(joined.clone(), session.version)
            .await?;
        tracing::info!("'{}' joined game {}", user, game_id);

        let payload = PlayerJoinedPayload {
            game_id: game_id.as_uuid(),
            user_id: user.to_string(),
            color: Player::Black,
        };
        publish(
            self.publisher.as_ref(),
            &GroupKey::game(&game_id),
            EventType::PlayerJoined,
            &payload,
            now,
        );
        notify(
            self.publisher.as_ref(),
            &joined.red_player,
            NotificationKind::PlayerJoined,
            format!("{} joined your game", user),
            Some(game_id),
            now,
        );

        Ok(joined)
    }
}
