//! Event envelope pushed to clients as `data: <json>\n\n` frames.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Envelope type tag.
///
/// `HEARTBEAT`, `CONNECTION_STATUS` and `connection_closed` are protocol
/// types; the rest carry domain events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "HEARTBEAT")]
    Heartbeat,
    #[serde(rename = "CONNECTION_STATUS")]
    ConnectionStatus,
    #[serde(rename = "connection_closed")]
    ConnectionClosed,
    #[serde(rename = "SERVER_SHUTDOWN")]
    ServerShutdown,
    #[serde(rename = "GAME_MOVE")]
    GameMove,
    #[serde(rename = "GAME_STATE")]
    GameState,
    #[serde(rename = "GAME_OVER")]
    GameOver,
    #[serde(rename = "PLAYER_JOINED")]
    PlayerJoined,
    #[serde(rename = "PRESENCE_UPDATE")]
    PresenceUpdate,
    #[serde(rename = "MESSAGE_SENT")]
    MessageSent,
    #[serde(rename = "NOTIFICATION_CREATED")]
    NotificationCreated,
    #[serde(rename = "DRAW_REQUEST")]
    DrawRequest,
    #[serde(rename = "DRAW_RESPONSE")]
    DrawResponse,
    /// Any type this build does not know about.
    #[serde(other)]
    Unknown,
}

impl EventType {
    /// Protocol-level types that never reach the application callback.
    pub fn is_heartbeat(self) -> bool {
        matches!(self, EventType::Heartbeat)
    }
}

/// A typed, timestamped message unit.
///
/// `sequence_number` is assigned by the server-side emitter from one
/// process-wide counter. It is absent on envelopes the hub builds itself
/// (heartbeats, connection status) and resets when the server restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub r#type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

impl Envelope {
    /// Envelope without payload or sequence number.
    pub fn bare(r#type: EventType, timestamp: i64) -> Self {
        Self {
            r#type,
            payload: None,
            timestamp,
            sequence_number: None,
        }
    }

    /// Envelope carrying a serializable payload.
    pub fn with_payload<T: Serialize>(
        r#type: EventType,
        payload: &T,
        timestamp: i64,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            r#type,
            payload: Some(serde_json::to_value(payload)?),
            timestamp,
            sequence_number: None,
        })
    }

    /// Decode the payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let value = self.payload.clone().unwrap_or(serde_json::Value::Null);
        serde_json::from_value(value)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::events::ConnectionClosedPayload;

    #[test]
    fn test_envelope_wire_format_uses_camel_case() {
        // テスト項目: エンベロープは type / timestamp / sequenceNumber のキーで出力される
        // given (前提条件):
        let mut envelope = Envelope::bare(EventType::GameMove, 1000);
        envelope.sequence_number = Some(7);

        // when (操作):
        let json: serde_json::Value =
            serde_json::from_str(&envelope.to_json().unwrap()).unwrap();

        // then (期待する結果):
        assert_eq!(json["type"], "GAME_MOVE");
        assert_eq!(json["timestamp"], 1000);
        assert_eq!(json["sequenceNumber"], 7);
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn test_heartbeat_without_sequence_number_parses() {
        // テスト項目: sequenceNumber を持たないハートビートも解析できる
        // given (前提条件):
        let text = r#"{"type":"HEARTBEAT","timestamp":42}"#;

        // when (操作):
        let envelope = Envelope::from_json(text).unwrap();

        // then (期待する結果):
        assert!(envelope.r#type.is_heartbeat());
        assert_eq!(envelope.sequence_number, None);
    }

    #[test]
    fn test_unknown_type_is_tolerated() {
        // テスト項目: 未知の type は Unknown として受理される
        // given (前提条件):
        let text = r#"{"type":"FRIEND_ACCEPTED","timestamp":1,"payload":{"x":1}}"#;

        // when (操作):
        let envelope = Envelope::from_json(text).unwrap();

        // then (期待する結果):
        assert_eq!(envelope.r#type, EventType::Unknown);
    }

    #[test]
    fn test_connection_closed_type_is_lowercase() {
        // テスト項目: connection_closed は小文字の type 名で送られる
        // given (前提条件):
        let envelope = Envelope::with_payload(
            EventType::ConnectionClosed,
            &ConnectionClosedPayload {
                reason: "replaced".to_string(),
            },
            5,
        )
        .unwrap();

        // when (操作):
        let json = envelope.to_json().unwrap();
        let payload: ConnectionClosedPayload = envelope.payload_as().unwrap();

        // then (期待する結果):
        assert!(json.contains(r#""type":"connection_closed""#));
        assert_eq!(payload.reason, "replaced");
    }
}
