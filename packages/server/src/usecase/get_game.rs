//! UseCase: ゲーム状態の取得

use std::sync::Arc;

use crate::domain::{GameId, GameRepository, GameSession};

use super::error::GameError;

/// ゲーム状態取得のユースケース
///
/// 再接続したクライアントは必ずこれで最新状態を取り直す。
pub struct GetGameUseCase {
    repository: Arc<dyn GameRepository>,
}

impl GetGameUseCase {
    pub fn new(repository: Arc<dyn GameRepository>) -> Self {
        Self { repository }
    }

    pub async fn execute(&self, game_id: GameId) -> Result<GameSession, GameError> {
        Ok(self.repository.get(&game_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repository::InMemoryGameRepository;

    #[tokio::test]
    async fn test_get_missing_game_is_not_found() {
        // テスト項目: 存在しないゲームは NotFound
        // given (前提条件):
        let usecase = GetGameUseCase::new(Arc::new(InMemoryGameRepository::new()));
        let game_id = GameId::generate();

        // when (操作):
        let result = usecase.execute(game_id).await;

        // then (期待する結果):
        assert_eq!(result, Err(GameError::NotFound(game_id.to_string())));
    }
}
