//! Underlying server-push stream.

use std::{collections::VecDeque, pin::Pin};

use async_trait::async_trait;
use checkers_shared::protocol::sse::SseDecoder;
use futures_util::{Stream, StreamExt, stream};
use reqwest::header::ACCEPT;
use uuid::Uuid;

use crate::{api::USER_ID_HEADER, error::TransportError};

/// Stream of raw `data` payloads, one item per SSE event.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Opens server-push streams.
///
/// The transport owns reconnection; an implementation only opens one stream
/// per call and reports how it ended.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn open(&self, url: &str) -> Result<FrameStream, TransportError>;
}

/// `text/event-stream` over HTTP.
pub struct HttpEventSource {
    client: reqwest::Client,
    user_id: String,
}

impl HttpEventSource {
    pub fn new(client: reqwest::Client, user_id: impl Into<String>) -> Self {
        Self {
            client,
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn open(&self, url: &str) -> Result<FrameStream, TransportError> {
        let response = self
            .client
            .get(url)
            .header(USER_ID_HEADER, &self.user_id)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected(status.as_u16()));
        }

        let bytes = Box::pin(response.bytes_stream());
        let frames = stream::unfold(
            (bytes, SseDecoder::new(), VecDeque::new()),
            |(mut bytes, mut decoder, mut pending)| async move {
                loop {
                    if let Some(frame) = pending.pop_front() {
                        return Some((Ok(frame), (bytes, decoder, pending)));
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => pending.extend(decoder.push(&chunk)),
                        Some(Err(e)) => {
                            let err = TransportError::Stream(e.to_string());
                            return Some((Err(err), (bytes, decoder, pending)));
                        }
                        None => return None,
                    }
                }
            },
        );
        Ok(Box::pin(frames))
    }
}

/// Stream URL of a game channel.
pub fn game_stream_url(base_url: &str, game_id: Uuid, tab_id: &str) -> String {
    format!(
        "{}/api/events/games/{}?tab_id={}",
        base_url.trim_end_matches('/'),
        game_id,
        tab_id
    )
}

/// Stream URL of a user channel.
pub fn user_stream_url(base_url: &str, user_id: &str, tab_id: &str) -> String {
    format!(
        "{}/api/events/users/{}?tab_id={}",
        base_url.trim_end_matches('/'),
        user_id,
        tab_id
    )
}
