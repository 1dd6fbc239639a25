//! UseCase layer.
//!
//! 各ユースケースは Domain 層の trait（Repository / EventHub / EventPublisher）にだけ依存し、
//! `execute` で 1 つの操作を実行します。

pub mod apply_move;
pub mod create_game;
pub mod error;
mod event;
pub mod get_game;
pub mod join_game;
pub mod resign_game;
pub mod respond_draw;
pub mod send_chat;
pub mod subscribe;

#[cfg(test)]
pub(crate) mod test_support;

pub use apply_move::{ApplyMoveUseCase, MoveCommand};
pub use create_game::CreateGameUseCase;
pub use error::{ApplyMoveError, GameError, SubscribeError};
pub use get_game::GetGameUseCase;
pub use join_game::JoinGameUseCase;
pub use resign_game::ResignGameUseCase;
pub use respond_draw::RespondDrawUseCase;
pub use send_chat::{MAX_CHAT_LENGTH, SendChatUseCase};
pub use subscribe::{SubscribeUseCase, SubscriptionHandle};
