//! ドメインイベント発行のヘルパー

use checkers_shared::protocol::{
    Envelope, EventType,
    events::{NotificationKind, NotificationPayload},
};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{EventPublisher, GameId, GroupKey, UserId};

/// Serialize `payload` and emit it on `channel`.
///
/// A payload that fails to serialize is logged and skipped; the state change
/// that produced it has already been persisted.
pub(crate) fn publish<T: Serialize>(
    publisher: &dyn EventPublisher,
    channel: &GroupKey,
    event_type: EventType,
    payload: &T,
    now: i64,
) -> Option<Envelope> {
    match Envelope::with_payload(event_type, payload, now) {
        Ok(envelope) => Some(publisher.emit_to_channel(channel, envelope)),
        Err(e) => {
            tracing::error!("Failed to serialize {:?} payload: {}", event_type, e);
            None
        }
    }
}

pub(crate) fn publish_to_user<T: Serialize>(
    publisher: &dyn EventPublisher,
    user_id: &UserId,
    event_type: EventType,
    payload: &T,
    now: i64,
) -> Option<Envelope> {
    publish(publisher, &GroupKey::user(user_id), event_type, payload, now)
}

/// NOTIFICATION_CREATED を `user:<id>` に発行する
pub(crate) fn notify(
    publisher: &dyn EventPublisher,
    user_id: &UserId,
    kind: NotificationKind,
    message: String,
    game_id: Option<GameId>,
    now: i64,
) -> Option<Envelope> {
    let payload = NotificationPayload {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        kind,
        message,
        game_id: game_id.map(|id| id.as_uuid()),
    };
    publish_to_user(
        publisher,
        user_id,
        EventType::NotificationCreated,
        &payload,
        now,
    )
}
