//! UseCase: ゲーム作成

use std::sync::Arc;

use checkers_shared::time::Clock;

use crate::domain::{GameId, GameRepository, GameSession, UserId};

use super::error::GameError;

/// ゲーム作成のユースケース
pub struct CreateGameUseCase {
    /// Repository（データアクセス層の抽象化）
    repository: Arc<dyn GameRepository>,
    clock: Arc<dyn Clock>,
}

impl CreateGameUseCase {
    pub fn new(repository: Arc<dyn GameRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// 作成者を赤として、待機中のゲームを作成する
    pub async fn execute(&self, creator: UserId) -> Result<GameSession, GameError> {
        let session = GameSession::new(GameId::generate(), creator, self.clock.now_millis());
        self.repository.create(session.clone()).await?;
        tracing::info!("Game {} created by '{}'", session.id, session.red_player);
        Ok(session)
    }
}
