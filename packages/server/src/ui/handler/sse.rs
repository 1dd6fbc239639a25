//! Server-sent event stream handlers.
//!
//! Each subscription owns one mpsc receiver; the hub keeps the sender. Frames
//! are forwarded as `data: <json>\n\n` in the order the hub pushed them.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, Sse},
};
use futures_util::{Stream, stream};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    domain::{ClientId, GameId, UserId},
    ui::state::AppState,
    usecase::{SubscribeUseCase, SubscriptionHandle},
};

use super::{auth::AuthUser, error::ApiError};

/// Query parameters for an event stream
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub tab_id: String,
}

/// Unsubscribes when the response stream is dropped (client went away, or
/// the hub closed the sink).
struct DisconnectGuard {
    usecase: Arc<SubscribeUseCase>,
    handle: SubscriptionHandle,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let usecase = self.usecase.clone();
        let handle = self.handle.clone();
        runtime.spawn(async move {
            usecase.disconnect(&handle).await;
        });
    }
}

fn event_stream(
    usecase: Arc<SubscribeUseCase>,
    handle: SubscriptionHandle,
    rx: mpsc::UnboundedReceiver<String>,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let guard = DisconnectGuard { usecase, handle };
    stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let frame = rx.recv().await?;
        Some((Ok(Event::default().data(frame)), (rx, guard)))
    })
}

/// `GET /api/events/games/{game_id}?tab_id=`
pub async fn game_events(
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<Uuid>,
    Query(query): Query<StreamQuery>,
    AuthUser(user): AuthUser,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let client_id = ClientId::new(query.tab_id)?;
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = state
        .subscribe_usecase
        .subscribe_game(GameId::new(game_id), user, client_id, tx)
        .await?;

    Ok(Sse::new(event_stream(
        state.subscribe_usecase.clone(),
        handle,
        rx,
    )))
}

/// `GET /api/events/users/{user_id}?tab_id=`
pub async fn user_events(
    State(state): State<Arc<AppState>>,
    Path(target): Path<String>,
    Query(query): Query<StreamQuery>,
    AuthUser(user): AuthUser,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let target = UserId::new(target)?;
    let client_id = ClientId::new(query.tab_id)?;
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = state
        .subscribe_usecase
        .subscribe_user(target, user, client_id, tx)
        .await?;

    Ok(Sse::new(event_stream(
        state.subscribe_usecase.clone(),
        handle,
        rx,
    )))
}
