//! Chat messages as delivered by the server.
//!
//! A [`Message`] arrives either pushed over the live channel (one JSON object
//! per text frame) or pulled as part of a [`crate::MessagePage`]. Messages are
//! immutable once received.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Server-assigned message id.
///
/// Strictly increasing per server and unique, so it doubles as the ordering
/// key of the timeline.
pub type MessageId = u64;

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Server-assigned attachment id.
    pub id: u64,
    /// Original file name.
    pub filename: String,
    /// MIME type reported by the uploader.
    #[serde(rename = "mimetype")]
    pub mime_type: String,
    /// Download URL.
    pub url: String,
    /// Server-side storage path, when the server exposes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned id, strictly increasing.
    pub id: MessageId,
    /// Text body.
    pub body: String,
    /// ISO-8601 creation time as sent by the server.
    pub timestamp: String,
    /// Author's user id.
    #[serde(rename = "user_id")]
    pub author_user_id: u64,
    /// Author's email address.
    #[serde(rename = "user_email")]
    pub author_email: String,
    /// Attachments in upload order.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Decode a live-channel text frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Decode` if the frame is not a JSON message object
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ProtocolError::decode("message", &e))
    }

    /// Encode as a live-channel text frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Encode` if serialization fails
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ProtocolError::Encode { kind: "message", reason: e.to_string() })
    }

    /// Parsed creation time. `None` if the timestamp is not ISO-8601.
    ///
    /// Timestamps without an offset are taken as UTC.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }
}

/// Parse an ISO-8601 timestamp, treating offset-less values as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok().map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    const FRAME: &str = r#"{
        "id": 42,
        "body": "hello",
        "timestamp": "2024-03-01T12:30:00Z",
        "user_id": 7,
        "user_email": "ada@example.com",
        "attachments": [
            {"id": 1, "filename": "a.png", "mimetype": "image/png", "url": "/uploads/a.png"}
        ]
    }"#;

    #[test]
    fn decodes_wire_field_names() {
        let message = Message::decode(FRAME).unwrap();
        assert_eq!(message.id, 42);
        assert_eq!(message.author_user_id, 7);
        assert_eq!(message.author_email, "ada@example.com");
        assert_eq!(message.attachments.len(), 1);
        assert_eq!(message.attachments[0].mime_type, "image/png");
        assert_eq!(message.attachments[0].path, None);
    }

    #[test]
    fn attachments_default_to_empty() {
        let raw = r#"{"id":1,"body":"x","timestamp":"2024-03-01T12:30:00Z","user_id":1,"user_email":"a@b"}"#;
        let message = Message::decode(raw).unwrap();
        assert!(message.attachments.is_empty());
    }

    #[test]
    fn malformed_frame_is_decode_error() {
        let result = Message::decode("{not json");
        assert!(matches!(result, Err(ProtocolError::Decode { kind: "message", .. })));

        let result = Message::decode(r#"{"id":"x"}"#);
        assert!(matches!(result, Err(ProtocolError::Decode { .. })));
    }

    #[test]
    fn encode_uses_wire_names() {
        let message = Message::decode(FRAME).unwrap();
        let text = message.encode().unwrap();
        assert!(text.contains("\"user_email\""));
        assert!(text.contains("\"mimetype\""));
        assert!(!text.contains("\"path\""));
    }

    #[test]
    fn timestamps_without_offset_are_utc() {
        let at = parse_timestamp("2024-03-01T23:59:58.123456").unwrap();
        assert_eq!((at.day(), at.hour(), at.minute()), (1, 23, 59));

        let at = parse_timestamp("2024-03-01T23:59:58+02:00").unwrap();
        assert_eq!(at.hour(), 21);

        assert!(parse_timestamp("yesterday").is_none());
    }
}
