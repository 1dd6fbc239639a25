//! Repository trait 定義
//!
//! ドメイン層が必要とするゲームセッションの永続化インターフェース。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。

use async_trait::async_trait;

use super::{entity::GameSession, error::RepositoryError, value_object::GameId};

/// Game Repository trait
///
/// バージョン付きの保存は compare-and-set として実装しなければならない。
/// UseCase 層で read-modify-write をしてはいけない。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GameRepository: Send + Sync {
    /// 新しいゲームを保存
    async fn create(&self, session: GameSession) -> Result<(), RepositoryError>;

    /// ゲームを取得
    async fn get(&self, game_id: &GameId) -> Result<GameSession, RepositoryError>;

    /// 保存済みのバージョンが `expected_version` と一致する場合のみ `session` で置き換える
    ///
    /// 一致しなければ `RepositoryError::VersionMismatch` を返し、何も変更しない。
    /// バージョンは一致するが別の書き込みが先に入った場合（`revision` のずれ）は
    /// `RepositoryError::Transient` を返す。
    async fn save_if_version(
        &self,
        session: GameSession,
        expected_version: u64,
    ) -> Result<(), RepositoryError>;
}
