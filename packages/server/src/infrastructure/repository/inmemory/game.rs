//! InMemory Game Repository 実装
//!
//! ドメイン層が定義する GameRepository trait の具体的な実装。
//! HashMap をインメモリ DB として使用します。
//!
//! `save_if_version` はロックを取ったまま比較と置き換えを行う（compare-and-set）。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{GameId, GameRepository, GameSession, RepositoryError};

/// インメモリ Game Repository 実装
#[derive(Default)]
pub struct InMemoryGameRepository {
    /// Key: GameId, Value: 最新のセッション
    games: Mutex<HashMap<GameId, GameSession>>,
}

impl InMemoryGameRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.games.lock().await.len()
    }
}

#[async_trait]
impl GameRepository for InMemoryGameRepository {
    async fn create(&self, session: GameSession) -> Result<(), RepositoryError> {
        let mut games = self.games.lock().await;
        if games.contains_key(&session.id) {
            return Err(RepositoryError::AlreadyExists(session.id.to_string()));
        }
        tracing::debug!("Game {} created", session.id);
        games.insert(session.id, session);
        Ok(())
    }

    async fn get(&self, game_id: &GameId) -> Result<GameSession, RepositoryError> {
        let games = self.games.lock().await;
        games
            .get(game_id)
            .cloned()
            .ok_or_else(|| RepositoryError::GameNotFound(game_id.to_string()))
    }

    async fn save_if_version(
        &self,
        session: GameSession,
        expected_version: u64,
    ) -> Result<(), RepositoryError> {
        let mut games = self.games.lock().await;
        let stored = games
            .get_mut(&session.id)
            .ok_or_else(|| RepositoryError::GameNotFound(session.id.to_string()))?;

        if stored.version != expected_version {
            return Err(RepositoryError::VersionMismatch {
                expected: expected_version,
                current: stored.version,
            });
        }
        if stored.revision + 1 != session.revision {
            return Err(RepositoryError::Transient(format!(
                "game {} was written concurrently (revision {} -> {})",
                session.id, stored.revision, session.revision
            )));
        }

        tracing::debug!(
            "Game {} saved at version {} (revision {})",
            session.id,
            session.version,
            session.revision
        );
        *stored = session;
        Ok(())
    }
}
