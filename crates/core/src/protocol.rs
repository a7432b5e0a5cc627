//! Defines the JSON message protocol spoken with the Neuro service.
//!
//! Every WebSocket text frame carries exactly one JSON object with a `type`
//! discriminator. Inbound objects are decoded leniently: missing fields fall
//! back to defaults and unknown fields are ignored, so a partially formed
//! message never tears down a healthy connection.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Errors raised while encoding or decoding wire messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Failed to decode inbound message: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("Failed to encode outbound message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A message received from the Neuro service.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct InboundMessage {
    /// The routing discriminator. Empty when the sender omitted it.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
    /// Free-form informational payload, e.g. on `connected` or `error`.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

impl InboundMessage {
    /// Decodes a single text frame. The frame must hold a JSON object; serde
    /// would otherwise accept a struct written as a positional array.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(frame).map_err(ProtocolError::Decode)?;
        if !value.is_object() {
            return Err(ProtocolError::Decode(serde::de::Error::custom("expected a JSON object")));
        }
        serde_json::from_value(value).map_err(ProtocolError::Decode)
    }
}

/// Messages sent from the client to the Neuro service.
///
/// The two variants deliberately use different clocks: `Heartbeat` carries
/// whole seconds since the Unix epoch while `Chat` carries seconds on the
/// client's [`EngineClock`]. Consumers of the wire format rely on this, so
/// the timestamps are not unified.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// A chat line typed by the player.
    Chat {
        text: String,
        user_id: String,
        timestamp: f64,
    },
    /// Keep-alive sent on the heartbeat timer.
    Heartbeat { timestamp: i64 },
}

impl OutboundMessage {
    pub fn chat(text: impl Into<String>, user_id: impl Into<String>, clock: &EngineClock) -> Self {
        Self::Chat {
            text: text.into(),
            user_id: user_id.into(),
            timestamp: clock.seconds(),
        }
    }

    /// A heartbeat stamped with the current wall-clock time.
    pub fn heartbeat() -> Self {
        Self::Heartbeat {
            timestamp: unix_timestamp(),
        }
    }

    /// Serializes the message into the body of a text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

/// Whole seconds since the Unix epoch.
pub fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Monotonic seconds elapsed since the owning client was created.
#[derive(Debug, Clone, Copy)]
pub struct EngineClock {
    started: Instant,
}

impl EngineClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

impl Default for EngineClock {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full_inbound_message() {
        let json = r#"{"type":"ai_response","text":"hello","timestamp":1718000000.25}"#;
        let msg = InboundMessage::decode(json).unwrap();

        assert_eq!(msg.kind, "ai_response");
        assert_eq!(msg.text.as_deref(), Some("hello"));
        assert_eq!(msg.message, None);
        assert_eq!(msg.timestamp, Some(1718000000.25));
    }

    #[test]
    fn test_decode_tolerates_missing_and_extra_fields() {
        let msg = InboundMessage::decode(r#"{"data":{"thinking":true}}"#).unwrap();
        assert_eq!(msg, InboundMessage::default());

        let msg = InboundMessage::decode(r#"{"type":"connected","message":"hi"}"#).unwrap();
        assert_eq!(msg.kind, "connected");
        assert_eq!(msg.message.as_deref(), Some("hi"));
        assert!(msg.text.is_none());
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        assert!(matches!(
            InboundMessage::decode("not json"),
            Err(ProtocolError::Decode(_))
        ));
        assert!(InboundMessage::decode(r#"["ai_response"]"#).is_err());
        assert!(matches!(
            InboundMessage::decode(r#"["ai_response","hello"]"#),
            Err(ProtocolError::Decode(_))
        ));
        assert!(InboundMessage::decode(r#""ai_response""#).is_err());
        assert!(InboundMessage::decode("null").is_err());
        assert!(InboundMessage::decode(r#"{"type":"ai_response","text":42}"#).is_err());
    }

    #[test]
    fn test_chat_wire_format() {
        let msg = OutboundMessage::Chat {
            text: "hi neuro".to_string(),
            user_id: "player_1".to_string(),
            timestamp: 12.5,
        };
        assert_eq!(
            msg.encode().unwrap(),
            r#"{"type":"chat","text":"hi neuro","user_id":"player_1","timestamp":12.5}"#
        );
    }

    #[test]
    fn test_heartbeat_uses_unix_seconds() {
        let before = unix_timestamp();
        let msg = OutboundMessage::heartbeat();
        let after = unix_timestamp();

        let OutboundMessage::Heartbeat { timestamp } = msg else {
            panic!("Expected a heartbeat");
        };
        assert!(timestamp >= before && timestamp <= after);

        let json: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(json["type"], "heartbeat");
        assert_eq!(json["timestamp"], timestamp);
        assert_eq!(json.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_chat_round_trips_text_through_inbound_decoder() {
        let clock = EngineClock::start();
        let text = "what's up, \"neuro\"? ünïcødé";
        let encoded = OutboundMessage::chat(text, "tester", &clock).encode().unwrap();

        let decoded = InboundMessage::decode(&encoded).unwrap();
        assert_eq!(decoded.kind, "chat");
        assert_eq!(decoded.text.as_deref(), Some(text));
    }

    #[test]
    fn test_engine_clock_is_relative_to_start() {
        let clock = EngineClock::start();
        let first = clock.seconds();
        assert!(first >= 0.0 && first < 5.0);
        assert!(clock.seconds() >= first);
    }
}
