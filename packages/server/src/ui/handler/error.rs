//! HTTP error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use checkers_shared::protocol::api::ErrorBody;

use crate::{
    domain::DomainError,
    usecase::{GameError, SubscribeError},
};

/// `{ "error": "..." }` とステータスコードの組
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{}", self.message);
        }
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        let status = match &err {
            GameError::NotFound(_) => StatusCode::NOT_FOUND,
            GameError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
            GameError::Domain(DomainError::NotAPlayer) => StatusCode::FORBIDDEN,
            GameError::Domain(DomainError::GameFull | DomainError::AlreadyJoined) => {
                StatusCode::CONFLICT
            }
            GameError::Domain(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GameError::Conflict(_) => StatusCode::CONFLICT,
            GameError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<SubscribeError> for ApiError {
    fn from(err: SubscribeError) -> Self {
        let status = match &err {
            SubscribeError::GameNotFound(_) => StatusCode::NOT_FOUND,
            SubscribeError::Forbidden { .. } => StatusCode::FORBIDDEN,
            SubscribeError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self::bad_request(err.to_string())
    }
}
