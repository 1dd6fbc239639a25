//! Request identity.
//!
//! 認証そのものは外部の責務。ここでは認証済みのユーザー ID を
//! `X-User-Id` ヘッダー（EventSource 向けに `user_id` クエリも可）から受け取る。

use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use serde::Deserialize;

use crate::domain::UserId;

use super::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Deserialize)]
struct UserIdQuery {
    user_id: Option<String>,
}

/// 認証済みユーザー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = match parts.headers.get(USER_ID_HEADER) {
            Some(value) => value.to_str().ok().map(str::to_string),
            None => Query::<UserIdQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(query)| query.user_id),
        };

        let Some(raw) = raw else {
            return Err(ApiError::unauthorized("missing user identity"));
        };
        UserId::new(raw)
            .map(AuthUser)
            .map_err(|e| ApiError::unauthorized(e.to_string()))
    }
}
