//! Raw message records as fetched from the conversation store.

use serde::{Deserialize, Serialize};

/// Conversation identifier (opaque string assigned by the server).
pub type ConvoId = String;

/// Message identifier. Monotonically increasing per conversation.
pub type MessageId = u64;

/// Prefix that marks a body as server-authored.
pub const SERVER_MARKER: &str = "SERVER:";

/// Immutable message record.
///
/// Created by the remote store and never mutated client-side. The id travels
/// as a decimal string on the wire.
///
/// # Invariants
///
/// - `id` is unique within a conversation and increases with send order.
/// - `body` is either an encrypted blob or a `SERVER:<type>:<payload>`
///   marker; [`Message::is_from_server`] tells which.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Message {
    /// Server-assigned id.
    #[serde(with = "id_as_string")]
    pub id: MessageId,
    /// Author's user id.
    pub sender_id: String,
    /// Author's display name at send time.
    pub sender_name: String,
    /// Send time in Unix seconds (UTC).
    #[serde(rename = "TimestampUTC")]
    pub timestamp_utc: i64,
    /// Encrypted blob or server marker.
    pub body: String,
}

impl Message {
    /// Whether the body carries the server marker instead of ciphertext.
    pub fn is_from_server(&self) -> bool {
        self.body.starts_with(SERVER_MARKER)
    }
}

mod id_as_string {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.trim().parse().map_err(|e| D::Error::custom(format!("invalid message id {raw:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(body: &str) -> Message {
        Message {
            id: 7,
            sender_id: "u1".into(),
            sender_name: "alice".into(),
            timestamp_utc: 1_700_000_000,
            body: body.into(),
        }
    }

    #[test]
    fn server_marker_detected() {
        assert!(message("SERVER:0:alice").is_from_server());
        assert!(!message("aGVsbG8=").is_from_server());
        assert!(!message("server:0:alice").is_from_server());
    }

    #[test]
    fn id_travels_as_string() {
        let json = serde_json::to_value(message("x")).unwrap();
        assert_eq!(json["Id"], "7");
        assert_eq!(json["TimestampUTC"], 1_700_000_000);
    }

    #[test]
    fn parses_wire_record() {
        let raw = r#"{"Id":"42","SenderId":"u2","SenderName":"bob","TimestampUTC":5,"Body":"SERVER:1:bob"}"#;
        let parsed: Message = serde_json::from_str(raw).unwrap();

        assert_eq!(parsed.id, 42);
        assert_eq!(parsed.sender_name, "bob");
        assert!(parsed.is_from_server());
    }

    #[test]
    fn rejects_non_numeric_id() {
        let raw = r#"{"Id":"abc","SenderId":"u2","SenderName":"bob","TimestampUTC":5,"Body":""}"#;
        assert!(serde_json::from_str::<Message>(raw).is_err());
    }
}
