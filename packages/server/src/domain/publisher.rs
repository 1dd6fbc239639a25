//! EventPublisher trait 定義
//!
//! UseCase 層がドメインイベントを発行するためのインターフェース。
//! 発行されたイベントは Hub へ転送され、購読中のクライアントに届く。

use checkers_shared::protocol::Envelope;

use super::value_object::{GroupKey, UserId};

/// Event Publisher trait
///
/// 発行のたびにプロセス内で単調増加する `sequence_number` が割り当てられ、
/// 割り当て済みのエンベロープが返る。
pub trait EventPublisher: Send + Sync {
    /// `user:<id>` チャネルに発行する
    fn emit_to_user(&self, user_id: &UserId, envelope: Envelope) -> Envelope;

    /// 任意のチャネルに発行する
    fn emit_to_channel(&self, channel: &GroupKey, envelope: Envelope) -> Envelope;

    /// 複数ユーザーに発行する。ユーザーごとに別の番号が振られる。
    fn emit_to_users(&self, user_ids: &[UserId], envelope: Envelope) -> Vec<Envelope> {
        user_ids
            .iter()
            .map(|user_id| self.emit_to_user(user_id, envelope.clone()))
            .collect()
    }
}
