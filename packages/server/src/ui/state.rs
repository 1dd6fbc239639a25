//! Server state.

use std::sync::Arc;

use crate::{
    domain::EventHub,
    usecase::{
        ApplyMoveUseCase, CreateGameUseCase, GetGameUseCase, JoinGameUseCase, ResignGameUseCase,
        RespondDrawUseCase, SendChatUseCase, SubscribeUseCase,
    },
};

/// Shared application state
pub struct AppState {
    /// CreateGameUseCase（ゲーム作成のユースケース）
    pub create_game_usecase: Arc<CreateGameUseCase>,
    /// JoinGameUseCase（ゲーム参加のユースケース）
    pub join_game_usecase: Arc<JoinGameUseCase>,
    /// GetGameUseCase（ゲーム状態取得のユースケース）
    pub get_game_usecase: Arc<GetGameUseCase>,
    /// ApplyMoveUseCase（手の適用のユースケース）
    pub apply_move_usecase: Arc<ApplyMoveUseCase>,
    /// ResignGameUseCase（投了のユースケース）
    pub resign_game_usecase: Arc<ResignGameUseCase>,
    /// RespondDrawUseCase（引き分けのユースケース）
    pub respond_draw_usecase: Arc<RespondDrawUseCase>,
    /// SendChatUseCase（チャットのユースケース）
    pub send_chat_usecase: Arc<SendChatUseCase>,
    /// SubscribeUseCase（イベント購読のユースケース）
    pub subscribe_usecase: Arc<SubscribeUseCase>,
    /// EventHub（デバッグ用の統計取得）
    pub hub: Arc<dyn EventHub>,
}
