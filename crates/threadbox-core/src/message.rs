//! Inbound message types for threadbox.
//!
//! A [`Message`] is built from the raw bytes a transport hands over. Payloads
//! holding a JSON object contribute their `sender` and `message` fields;
//! anything else is kept verbatim as text from an unknown sender.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::trace;

/// A message identifier, unique and increasing within one router.
pub type MessageId = u64;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Sender reported when the payload does not name one.
pub const UNKNOWN_SENDER: &str = "unknown";

/// Payload field holding the sender.
pub const SENDER_FIELD: &str = "sender";

/// Payload field holding the message text.
pub const CONTENT_FIELD: &str = "message";

/// Current wall-clock time in milliseconds.
#[must_use]
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Reasons a payload could not be read as structured data.
///
/// These never leave this module: every variant selects the plain-text
/// fallback.
#[derive(Debug, Error)]
enum PayloadError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,
}

/// Sender and content extracted from a raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    /// Sender identifier.
    pub sender_id: String,
    /// Message text.
    pub content: String,
}

impl DecodedPayload {
    /// Decode a raw payload, falling back to plain text.
    #[must_use]
    pub fn decode(payload: &[u8]) -> Self {
        match decode_fields(payload) {
            Ok(fields) => Self {
                sender_id: field_text(&fields, SENDER_FIELD)
                    .unwrap_or_else(|| UNKNOWN_SENDER.to_string()),
                content: field_text(&fields, CONTENT_FIELD)
                    .unwrap_or_else(|| payload_text(payload)),
            },
            Err(e) => {
                trace!(error = %e, size = payload.len(), "Payload kept as plain text");
                Self {
                    sender_id: UNKNOWN_SENDER.to_string(),
                    content: payload_text(payload),
                }
            }
        }
    }

    /// Turn the decoded fields into an unread message.
    #[must_use]
    pub fn into_message(self, id: MessageId, received_at: Timestamp) -> Message {
        Message {
            id,
            sender_id: self.sender_id,
            content: self.content,
            received_at,
            unread: true,
        }
    }
}

fn decode_fields(payload: &[u8]) -> Result<Map<String, Value>, PayloadError> {
    match serde_json::from_slice(payload)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(PayloadError::NotAnObject),
    }
}

/// Strings are taken verbatim, `null` counts as absent, and any other value
/// is rendered as JSON text.
fn field_text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn payload_text(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}

/// A message admitted into a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Admission sequence number.
    pub id: MessageId,
    /// Sender identifier, or [`UNKNOWN_SENDER`].
    pub sender_id: String,
    /// Message text.
    pub content: String,
    /// When the router admitted the message.
    pub received_at: Timestamp,
    /// Whether no view has shown this message yet.
    pub unread: bool,
}

impl Message {
    /// Build a message from a raw payload.
    ///
    /// Decoding never fails; see [`DecodedPayload::decode`].
    #[must_use]
    pub fn from_payload(id: MessageId, payload: &[u8], received_at: Timestamp) -> Self {
        DecodedPayload::decode(payload).into_message(id, received_at)
    }

    /// Clear the unread flag.
    ///
    /// Returns `true` if the message was unread.
    pub fn mark_read(&mut self) -> bool {
        std::mem::replace(&mut self.unread, false)
    }
}
