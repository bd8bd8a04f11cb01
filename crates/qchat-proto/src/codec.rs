//! JSON text codec for the persistent channel.
//!
//! Decoding first parses a generic JSON value so that failures can be
//! classified precisely (not JSON, no tag, unknown tag, bad fields) before the
//! typed conversion into [`InboundFrame`].

use serde_json::Value;

use crate::{
    action::OutboundAction,
    errors::{DecodeError, EncodeError},
    frame::{FrameType, InboundFrame},
};

/// Encode an outbound request as a JSON text frame.
pub fn encode(action: &OutboundAction) -> Result<String, EncodeError> {
    serde_json::to_string(action)
        .map_err(|e| EncodeError::Serialize { action: action.name(), reason: e.to_string() })
}

/// Decode raw frame bytes.
///
/// # Errors
///
/// - `DecodeError::NotUtf8` if the bytes are not UTF-8
/// - any error from [`decode_str`]
pub fn decode(bytes: &[u8]) -> Result<InboundFrame, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::NotUtf8)?;
    decode_str(text)
}

/// Decode a JSON text frame.
///
/// Unknown extra fields are ignored.
pub fn decode_str(text: &str) -> Result<InboundFrame, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let Some(object) = value.as_object() else {
        return Err(DecodeError::NotAnObject);
    };

    let tag = object.get("type").and_then(Value::as_str).ok_or(DecodeError::MissingType)?;
    let frame_type =
        FrameType::from_tag(tag).ok_or_else(|| DecodeError::UnknownType(tag.to_owned()))?;

    serde_json::from_value(value)
        .map_err(|e| DecodeError::InvalidFrame { frame_type, reason: e.to_string() })
}
