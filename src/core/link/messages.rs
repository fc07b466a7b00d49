//! Wire format of the pulse server link.
//!
//! Inbound frames are JSON objects keyed by message kind. Each frame is
//! classified into exactly one [`InboundMessage`] before any field is used;
//! a frame carrying several known keys is classified by the first of
//! `socket_id`, `linked`, `pulses` it contains.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub const KEY_SOCKET_ID: &str = "socket_id";
pub const KEY_LINKED: &str = "linked";
pub const KEY_PULSES: &str = "pulses";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("`{key}` must be {expected}")]
    WrongType {
        key: &'static str,
        expected: &'static str,
    },
    #[error("`socket_id` is empty")]
    EmptySocketId,
}

/// A classified server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Server assigned this socket an id; answered with the device id.
    Handshake { socket_id: String },
    /// Server paired (or unpaired) this device with a controller.
    LinkStatus { linked: bool },
    /// Raw pulse elements; validated one by one by the scheduler.
    PulseBatch { pulses: Vec<Value> },
    /// Nothing this client understands; carries the keys for logging.
    Unknown { keys: Vec<String> },
}

impl InboundMessage {
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        match value {
            Value::Object(map) => Self::classify(map),
            _ => Err(DecodeError::NotAnObject),
        }
    }

    fn classify(mut map: Map<String, Value>) -> Result<Self, DecodeError> {
        if let Some(value) = map.remove(KEY_SOCKET_ID) {
            return match value {
                Value::String(socket_id) if socket_id.is_empty() => Err(DecodeError::EmptySocketId),
                Value::String(socket_id) => Ok(Self::Handshake { socket_id }),
                _ => Err(DecodeError::WrongType {
                    key: KEY_SOCKET_ID,
                    expected: "a string",
                }),
            };
        }

        if let Some(value) = map.remove(KEY_LINKED) {
            return match value {
                Value::Bool(linked) => Ok(Self::LinkStatus { linked }),
                _ => Err(DecodeError::WrongType {
                    key: KEY_LINKED,
                    expected: "a boolean",
                }),
            };
        }

        if let Some(value) = map.remove(KEY_PULSES) {
            return match value {
                Value::Array(pulses) => Ok(Self::PulseBatch { pulses }),
                _ => Err(DecodeError::WrongType {
                    key: KEY_PULSES,
                    expected: "an array",
                }),
            };
        }

        Ok(Self::Unknown {
            keys: map.into_iter().map(|(key, _)| key).collect(),
        })
    }

    /// Short name used in logs and the display snapshot.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Handshake { .. } => "handshake",
            Self::LinkStatus { .. } => "link_status",
            Self::PulseBatch { .. } => "pulse_batch",
            Self::Unknown { .. } => "unknown",
        }
    }
}

/// Frames this client sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    /// Handshake reply binding the socket to the bracelet's serial number.
    DeviceId { device_id: String },
}

impl OutboundMessage {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_each_known_kind() {
        assert_eq!(
            InboundMessage::decode(r#"{"socket_id": "abc123"}"#).unwrap(),
            InboundMessage::Handshake {
                socket_id: "abc123".to_string()
            }
        );
        assert_eq!(
            InboundMessage::decode(r#"{"linked": false}"#).unwrap(),
            InboundMessage::LinkStatus { linked: false }
        );
        assert_eq!(
            InboundMessage::decode(r#"{"pulses": [[0.5, 500], [0.8, "bad"]]}"#).unwrap(),
            InboundMessage::PulseBatch {
                pulses: vec![json!([0.5, 500]), json!([0.8, "bad"])]
            }
        );
    }

    #[test]
    fn unknown_keys_are_kept_for_logging() {
        let message = InboundMessage::decode(r#"{"motd": "hi", "version": 3}"#).unwrap();
        match message {
            InboundMessage::Unknown { mut keys } => {
                keys.sort();
                assert_eq!(keys, vec!["motd", "version"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            InboundMessage::decode("{}").unwrap().kind(),
            "unknown"
        );
    }

    #[test]
    fn socket_id_takes_precedence_over_other_keys() {
        let message = InboundMessage::decode(r#"{"linked": true, "socket_id": "s1"}"#).unwrap();
        assert_eq!(message.kind(), "handshake");
    }

    #[test]
    fn malformed_frames_fail_closed() {
        assert!(matches!(
            InboundMessage::decode("{not json"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            InboundMessage::decode("[1, 2]"),
            Err(DecodeError::NotAnObject)
        ));
        assert!(matches!(
            InboundMessage::decode(r#"{"socket_id": 42}"#),
            Err(DecodeError::WrongType { key: "socket_id", .. })
        ));
        assert!(matches!(
            InboundMessage::decode(r#"{"socket_id": ""}"#),
            Err(DecodeError::EmptySocketId)
        ));
        assert!(matches!(
            InboundMessage::decode(r#"{"linked": "yes"}"#),
            Err(DecodeError::WrongType { key: "linked", .. })
        ));
        assert!(matches!(
            InboundMessage::decode(r#"{"pulses": {"0": [1, 2]}}"#),
            Err(DecodeError::WrongType { key: "pulses", .. })
        ));
    }

    #[test]
    fn device_id_reply_is_a_flat_object() {
        let reply = OutboundMessage::DeviceId {
            device_id: "D4A1C0FFEE".to_string(),
        };
        let encoded: Value = serde_json::from_str(&reply.encode().unwrap()).unwrap();
        assert_eq!(encoded, json!({"device_id": "D4A1C0FFEE"}));
    }
}
