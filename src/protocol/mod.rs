//! Chat protocol codec: message models, schema digests, and the signed
//! transport envelope.
//!
//! Wire shapes (JSON):
//!
//! ```text
//! ChatMessage          { "timestamp", "msg_id", "content": [ContentPart…] }
//! ContentPart          { "type": "text", "text": "…" } | { "type": "end-session" }
//! ChatAcknowledgement  { "timestamp", "acknowledged_msg_id" }
//! ```
//!
//! Each model is identified on the fabric by its schema digest; the
//! supervisor's dispatch table is keyed on it.

pub mod envelope;
pub mod manifest;

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

pub use envelope::Envelope;

/// Protocol name advertised in the manifest.
pub const PROTOCOL_NAME: &str = "AgentChatProtocol";
/// Protocol version advertised in the manifest.
pub const PROTOCOL_VERSION: &str = "0.3.0";

/// Schema digest of [`ChatMessage`].
pub static CHAT_MESSAGE_DIGEST: LazyLock<String> = LazyLock::new(|| model_digest("ChatMessage"));
/// Schema digest of [`ChatAcknowledgement`].
pub static CHAT_ACK_DIGEST: LazyLock<String> = LazyLock::new(|| model_digest("ChatAcknowledgement"));
/// Digest of the chat protocol as a whole.
pub static PROTOCOL_DIGEST: LazyLock<String> = LazyLock::new(|| {
    let mut hasher = Sha256::new();
    hasher.update(PROTOCOL_NAME.as_bytes());
    hasher.update(b":");
    hasher.update(PROTOCOL_VERSION.as_bytes());
    for digest in [CHAT_MESSAGE_DIGEST.as_str(), CHAT_ACK_DIGEST.as_str()] {
        hasher.update(b"|");
        hasher.update(digest.as_bytes());
    }
    format!("proto:{}", hex::encode(hasher.finalize()))
});

/// `"model:" + hex(SHA256(name))`.
pub fn model_digest(name: &str) -> String {
    format!("model:{}", hex::encode(Sha256::digest(name.as_bytes())))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u32),
    #[error("envelope has no payload")]
    MissingPayload,
}

/// Inbound timestamps: RFC 3339, or an offset-less ISO 8601 value (as Python
/// peers stamp with `datetime.utcnow()`), which is read as UTC. Outbound
/// timestamps always serialise as RFC 3339.
mod wire_time {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, de};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw:?}")))
    }

    pub(super) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }
}

// ── Models ────────────────────────────────────────────────────────────────────

/// One tagged unit of a chat message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ContentPart {
    Text { text: String },
    EndSession,
    /// Any content kind this agent does not interpret. Decoded so the rest of
    /// the message survives; never sent.
    #[serde(other)]
    Other,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(deserialize_with = "wire_time::deserialize")]
    pub timestamp: DateTime<Utc>,
    pub msg_id: Uuid,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    /// New message with a fresh v4 id, stamped now.
    pub fn new(content: Vec<ContentPart>) -> Self {
        Self { timestamp: Utc::now(), msg_id: Uuid::new_v4(), content }
    }

    /// Order-preserving concatenation of every text part. Other parts add nothing.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn ends_session(&self) -> bool {
        self.content.iter().any(|p| matches!(p, ContentPart::EndSession))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAcknowledgement {
    #[serde(deserialize_with = "wire_time::deserialize")]
    pub timestamp: DateTime<Utc>,
    pub acknowledged_msg_id: Uuid,
}

impl ChatAcknowledgement {
    /// Acknowledge `msg_id`, stamped now.
    pub fn for_message(msg_id: Uuid) -> Self {
        Self { timestamp: Utc::now(), acknowledged_msg_id: msg_id }
    }
}

/// Any message this agent can put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatProtocolMessage {
    Message(ChatMessage),
    Acknowledgement(ChatAcknowledgement),
}

impl ChatProtocolMessage {
    pub fn schema_digest(&self) -> &'static str {
        match self {
            ChatProtocolMessage::Message(_) => CHAT_MESSAGE_DIGEST.as_str(),
            ChatProtocolMessage::Acknowledgement(_) => CHAT_ACK_DIGEST.as_str(),
        }
    }

    /// Serialise the inner model as JSON.
    pub fn to_json(&self) -> Result<String, CodecError> {
        let json = match self {
            ChatProtocolMessage::Message(m) => serde_json::to_string(m)?,
            ChatProtocolMessage::Acknowledgement(a) => serde_json::to_string(a)?,
        };
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_parts_use_kebab_tags() {
        let parts = vec![ContentPart::text("Hi there!"), ContentPart::EndSession];
        let v = serde_json::to_value(&parts).unwrap();
        assert_eq!(v, json!([{ "type": "text", "text": "Hi there!" }, { "type": "end-session" }]));
    }

    #[test]
    fn decodes_inbound_message() {
        let raw = json!({
            "timestamp": "2025-01-01T12:00:00Z",
            "msg_id": "6f1c1a5e-8f0a-4e7b-9c55-2b1f3f1d2a10",
            "content": [{ "type": "text", "text": "Hello" }]
        });
        let msg: ChatMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.text(), "Hello");
        assert!(!msg.ends_session());
        assert_eq!(msg.msg_id.to_string(), "6f1c1a5e-8f0a-4e7b-9c55-2b1f3f1d2a10");
    }

    #[test]
    fn decodes_message_without_utc_offset() {
        let raw = r#"{"timestamp":"2025-01-01T12:00:00.123456","msg_id":"6f1c1a5e-8f0a-4e7b-9c55-2b1f3f1d2a10","content":[{"type":"text","text":"Hello"}]}"#;
        let msg: ChatMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.text(), "Hello");
        assert_eq!(msg.timestamp.to_rfc3339(), "2025-01-01T12:00:00.123456+00:00");
    }

    #[test]
    fn decodes_acknowledgement_without_utc_offset() {
        let raw = json!({
            "timestamp": "2025-01-01T12:00:00",
            "acknowledged_msg_id": "6f1c1a5e-8f0a-4e7b-9c55-2b1f3f1d2a10"
        });
        let ack: ChatAcknowledgement = serde_json::from_value(raw).unwrap();
        assert_eq!(ack.timestamp.to_rfc3339(), "2025-01-01T12:00:00+00:00");
    }

    #[test]
    fn offset_timestamps_convert_to_utc() {
        let ts = wire_time::parse("2025-01-01T14:00:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-01-01T12:00:00+00:00");
        assert!(wire_time::parse("yesterday").is_none());
    }

    #[test]
    fn outbound_timestamp_round_trips() {
        let msg = ChatMessage::new(vec![ContentPart::text("x")]);
        let back: ChatMessage = serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn unknown_content_kind_is_tolerated() {
        let raw = json!({
            "timestamp": "2025-01-01T12:00:00Z",
            "msg_id": "6f1c1a5e-8f0a-4e7b-9c55-2b1f3f1d2a10",
            "content": [
                { "type": "start-session" },
                { "type": "text", "text": "A" },
                { "type": "end-session" }
            ]
        });
        let msg: ChatMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.content[0], ContentPart::Other);
        assert_eq!(msg.text(), "A");
        assert!(msg.ends_session());
    }

    #[test]
    fn text_concatenates_in_order_and_skips_other_parts() {
        let msg = ChatMessage::new(vec![
            ContentPart::text("A"),
            ContentPart::EndSession,
            ContentPart::text("B"),
        ]);
        assert_eq!(msg.text(), "AB");
    }

    #[test]
    fn text_of_empty_message_is_empty() {
        assert_eq!(ChatMessage::new(vec![ContentPart::EndSession]).text(), "");
    }

    #[test]
    fn acknowledgement_wire_fields() {
        let id = Uuid::new_v4();
        let ack = ChatAcknowledgement::for_message(id);
        let v = serde_json::to_value(&ack).unwrap();
        assert_eq!(v["acknowledged_msg_id"], id.to_string());
        assert!(v.get("timestamp").is_some());
    }

    #[test]
    fn digests_are_distinct_and_prefixed() {
        assert!(CHAT_MESSAGE_DIGEST.starts_with("model:"));
        assert!(CHAT_ACK_DIGEST.starts_with("model:"));
        assert_ne!(*CHAT_MESSAGE_DIGEST, *CHAT_ACK_DIGEST);
        assert!(PROTOCOL_DIGEST.starts_with("proto:"));
    }

    #[test]
    fn protocol_message_reports_its_digest() {
        let m = ChatProtocolMessage::Message(ChatMessage::new(vec![]));
        assert_eq!(m.schema_digest(), CHAT_MESSAGE_DIGEST.as_str());
        let a = ChatProtocolMessage::Acknowledgement(ChatAcknowledgement::for_message(Uuid::nil()));
        assert_eq!(a.schema_digest(), CHAT_ACK_DIGEST.as_str());
    }
}
