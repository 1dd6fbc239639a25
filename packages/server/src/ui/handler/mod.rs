mod auth;
mod error;
mod http;
mod sse;

pub use auth::{AuthUser, USER_ID_HEADER};
pub use error::ApiError;
pub use http::{
    create_game, debug_hub_stats, get_game, health_check, join_game, resign_game, respond_draw,
    send_chat, submit_move,
};
pub use sse::{game_events, user_events};
