//! WebSocket message types: envelope and commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

impl WsMessage {
    /// Builds a server message stamped now.
    #[must_use]
    pub fn new(id: String, msg_type: WsMessageType, payload: serde_json::Value) -> Self {
        Self {
            id,
            msg_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Builds an error message.
    #[must_use]
    pub fn error(id: String, code: u16, message: &str) -> Self {
        Self::new(
            id,
            WsMessageType::Error,
            serde_json::json!({ "code": code, "message": message }),
        )
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client broadcast event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands that a client can send over WebSocket, either bare or as the
/// `payload` of a [`WsMessage`].
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Subscribe to event topics.
    Subscribe {
        /// Topic names (`swaps`, `listings`, `custody`). Use `["*"]` for
        /// all topics.
        topics: Vec<String>,
    },
    /// Unsubscribe from event topics.
    Unsubscribe {
        /// Topic names to drop. `"*"` drops everything.
        topics: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_command_parses() {
        let cmd: Option<WsCommand> =
            serde_json::from_str(r#"{"command":"subscribe","topics":["swaps","*"]}"#).ok();
        assert_eq!(
            cmd,
            Some(WsCommand::Subscribe {
                topics: vec!["swaps".to_string(), "*".to_string()],
            })
        );
    }

    #[test]
    fn envelope_uses_type_key() {
        let msg = WsMessage::error("c1".to_string(), 400, "malformed JSON");
        let json = serde_json::to_value(&msg).unwrap_or_default();
        assert_eq!(json.get("type"), Some(&serde_json::json!("error")));
        assert_eq!(json.get("id"), Some(&serde_json::json!("c1")));
    }
}
