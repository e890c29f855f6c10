//! Stateless conversion between raw frames and typed messages.

use serde_json::{Map, Value};

use crate::message::{InboundMessage, OutboundMessage};

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("malformed inbound payload: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("inbound payload of {size} bytes exceeds limit of {limit}")]
    Oversized { size: usize, limit: usize },

    #[error("failed to encode outbound message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Classify an inbound frame.
///
/// Frames over `max_bytes` are rejected before parsing.  Valid JSON that
/// matches no known shape decodes to [`InboundMessage::Unrecognized`];
/// only unparseable input is an error.
pub fn decode(raw: &[u8], max_bytes: usize) -> Result<InboundMessage, CodecError> {
    if raw.len() > max_bytes {
        return Err(CodecError::Oversized {
            size: raw.len(),
            limit: max_bytes,
        });
    }

    let value: Value = serde_json::from_slice(raw).map_err(CodecError::Malformed)?;
    let Value::Object(map) = &value else {
        return Ok(InboundMessage::Unrecognized {
            raw: value.to_string(),
        });
    };

    match map.get("type").and_then(Value::as_str) {
        Some("welcome") => {
            return Ok(InboundMessage::Welcome {
                text: field_text(map, "message").unwrap_or_default(),
            })
        }
        Some("pong") => return Ok(InboundMessage::Pong),
        _ => {}
    }

    // Command requests are recognized by shape alone.
    match (field_text(map, "target"), field_text(map, "command")) {
        (Some(target), Some(command)) => Ok(InboundMessage::CommandRequest { target, command }),
        _ => Ok(InboundMessage::Unrecognized {
            raw: value.to_string(),
        }),
    }
}

/// Serialize an outbound message to its JSON text frame.
pub fn encode(msg: &OutboundMessage) -> Result<String, CodecError> {
    serde_json::to_string(msg).map_err(CodecError::Encode)
}

/// String or number field rendered as text.
fn field_text(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = crate::MAX_INBOUND_BYTES;

    #[test]
    fn welcome_with_message() {
        let msg = decode(br#"{"type":"welcome","message":"hello tv"}"#, LIMIT).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Welcome {
                text: "hello tv".into()
            }
        );
    }

    #[test]
    fn welcome_without_message_is_empty_text() {
        let msg = decode(br#"{"type":"welcome"}"#, LIMIT).unwrap();
        assert_eq!(msg, InboundMessage::Welcome { text: String::new() });
    }

    #[test]
    fn pong() {
        assert_eq!(decode(br#"{"type":"pong"}"#, LIMIT).unwrap(), InboundMessage::Pong);
    }

    #[test]
    fn command_without_type() {
        let msg = decode(br#"{"target":"all","command":"sleep"}"#, LIMIT).unwrap();
        assert_eq!(
            msg,
            InboundMessage::CommandRequest {
                target: "all".into(),
                command: "sleep".into()
            }
        );
    }

    #[test]
    fn numeric_command_is_rendered_as_text() {
        let msg = decode(br#"{"target":"TV-1","command":26}"#, LIMIT).unwrap();
        assert_eq!(
            msg,
            InboundMessage::CommandRequest {
                target: "TV-1".into(),
                command: "26".into()
            }
        );
    }

    #[test]
    fn unknown_shape_is_unrecognized() {
        let msg = decode(br#"{"type":"broadcast","payload":1}"#, LIMIT).unwrap();
        assert!(matches!(msg, InboundMessage::Unrecognized { .. }));

        let msg = decode(b"[1,2,3]", LIMIT).unwrap();
        assert_eq!(msg, InboundMessage::Unrecognized { raw: "[1,2,3]".into() });
    }

    #[test]
    fn malformed_json_is_error() {
        let err = decode(b"{not json", LIMIT).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn oversized_rejected_before_parse() {
        let raw = vec![b' '; 32];
        let err = decode(&raw, 16).unwrap_err();
        assert!(matches!(err, CodecError::Oversized { size: 32, limit: 16 }));
    }

    #[test]
    fn encode_ping() {
        let text = encode(&OutboundMessage::ping("TV-1", "1.1.1.1")).unwrap();
        assert!(text.starts_with(r#"{"type":"ping""#));
    }
}
