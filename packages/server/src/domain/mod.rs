//! Domain layer.
//!
//! ゲームセッションのエンティティ、値オブジェクト、そして Infrastructure 層が
//! 実装するインターフェース（Repository / EventHub / EventPublisher）を定義します。

pub mod entity;
pub mod error;
pub mod hub;
pub mod publisher;
pub mod repository;
pub mod value_object;

pub use entity::{AppliedMove, GameSession};
pub use error::{DomainError, RepositoryError};
pub use hub::{
    AddOptions, ConnectionInfo, ConnectionMetadata, EventHub, EventSink, GroupStats, HubStats,
};
pub use publisher::EventPublisher;
pub use repository::GameRepository;
#[cfg(test)]
pub use repository::MockGameRepository;
pub use value_object::{ClientId, ConnectionId, GameId, GroupKey, MAX_ID_LENGTH, Namespace, UserId};
