//! HTTP API client.

use async_trait::async_trait;
use checkers_shared::protocol::{
    api::{
        ChatRequest, DrawAction, DrawRequestBody, ErrorBody, GameSnapshot, MoveRequest,
        MoveResponse,
    },
    events::ChatMessagePayload,
};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::ApiError;

/// Identity header understood by the server's auth stand-in.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Move submission and full-state fetch, the two calls the sync layer needs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MoveApi: Send + Sync {
    /// Submit a versioned move. A rejection is an `Ok` response with
    /// `success == false`.
    async fn submit_move(&self, request: MoveRequest) -> Result<MoveResponse, ApiError>;

    async fn fetch_game(&self, game_id: Uuid) -> Result<GameSnapshot, ApiError>;
}

/// reqwest implementation of the game API.
#[derive(Debug, Clone)]
pub struct HttpMoveApi {
    client: reqwest::Client,
    base_url: String,
    user_id: String,
}

impl HttpMoveApi {
    pub fn new(client: reqwest::Client, base_url: &str, user_id: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: user_id.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header(USER_ID_HEADER, &self.user_id)
    }

    /// Create a game as red.
    pub async fn create_game(&self) -> Result<GameSnapshot, ApiError> {
        decode(self.post("/api/games").send().await?).await
    }

    pub async fn join_game(&self, game_id: Uuid) -> Result<GameSnapshot, ApiError> {
        decode(self.post(&format!("/api/games/{}/join", game_id)).send().await?).await
    }

    pub async fn send_chat(
        &self,
        game_id: Uuid,
        content: String,
    ) -> Result<ChatMessagePayload, ApiError> {
        let response = self
            .post(&format!("/api/games/{}/chat", game_id))
            .json(&ChatRequest { content })
            .send()
            .await?;
        decode(response).await
    }

    pub async fn respond_draw(
        &self,
        game_id: Uuid,
        action: DrawAction,
    ) -> Result<GameSnapshot, ApiError> {
        let response = self
            .post(&format!("/api/games/{}/draw", game_id))
            .json(&DrawRequestBody { action })
            .send()
            .await?;
        decode(response).await
    }

    pub async fn resign(&self, game_id: Uuid) -> Result<GameSnapshot, ApiError> {
        decode(self.post(&format!("/api/games/{}/resign", game_id)).send().await?).await
    }
}

#[async_trait]
impl MoveApi for HttpMoveApi {
    async fn submit_move(&self, request: MoveRequest) -> Result<MoveResponse, ApiError> {
        let response = self
            .post(&format!("/api/games/{}/moves", request.game_id))
            .json(&request)
            .send()
            .await?;

        // 拒否も MoveResponse で返るが、認証エラーや 5xx は ErrorBody
        let status = response.status();
        if status.is_server_error()
            || status == StatusCode::BAD_REQUEST
            || status == StatusCode::UNAUTHORIZED
        {
            return Err(status_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn fetch_game(&self, game_id: Uuid) -> Result<GameSnapshot, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/api/games/{}", game_id)))
            .header(USER_ID_HEADER, &self.user_id)
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    if !response.status().is_success() {
        return Err(status_error(response).await);
    }
    Ok(response.json().await?)
}

async fn status_error(response: Response) -> ApiError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    ApiError::Status { status, message }
}
