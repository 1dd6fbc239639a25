//! UseCase: ゲーム内チャット

use std::sync::Arc;

use checkers_shared::{
    protocol::{EventType, events::ChatMessagePayload},
    time::Clock,
};

use crate::domain::{DomainError, EventPublisher, GameId, GameRepository, GroupKey, UserId};

use super::{error::GameError, event::publish};

/// チャットメッセージの最大文字数
pub const MAX_CHAT_LENGTH: usize = 500;

/// チャット送信のユースケース
pub struct SendChatUseCase {
    repository: Arc<dyn GameRepository>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl SendChatUseCase {
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

    /// プレイヤーのメッセージを MESSAGE_SENT として `game:<id>` に発行する
    pub async fn execute(
        &self,
        game_id: GameId,
        user: UserId,
        content: String,
    ) -> Result<ChatMessagePayload, GameError> {
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(GameError::InvalidMessage("message is empty".to_string()));
        }
        if content.chars().count() > MAX_CHAT_LENGTH {
            return Err(GameError::InvalidMessage(format!(
                "message exceeds {} characters",
                MAX_CHAT_LENGTH
            )));
        }

        let session = self.repository.get(&game_id).await?;
        if session.color_of(&user).is_none() {
            return Err(GameError::Domain(DomainError::NotAPlayer));
        }

        let payload = ChatMessagePayload {
            game_id: game_id.as_uuid(),
            user_id: user.to_string(),
            content,
            sent_at: self.clock.now_millis(),
        };
        publish(
            self.publisher.as_ref(),
            &GroupKey::game(&game_id),
            EventType::MessageSent,
            &payload,
            payload.sent_at,
        );
        tracing::debug!("Chat from '{}' in game {}", user, game_id);

        Ok(payload)
    }
}
