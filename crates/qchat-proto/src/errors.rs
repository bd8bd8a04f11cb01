//! Codec errors.

use thiserror::Error;

use crate::frame::FrameType;

/// Reasons an inbound frame failed to decode.
///
/// Every variant is recoverable at the channel level: the caller drops the
/// frame and keeps the connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Frame bytes are not valid UTF-8
    #[error("frame is not valid UTF-8")]
    NotUtf8,

    /// Frame text is not valid JSON
    #[error("malformed JSON: {0}")]
    Malformed(String),

    /// Frame is valid JSON but not an object
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// Object has no string `type` field
    #[error("frame has no type tag")]
    MissingType,

    /// `type` names a frame outside the known set
    #[error("unknown frame type: {0}")]
    UnknownType(String),

    /// Known frame type with missing or mistyped fields
    #[error("invalid {frame_type} frame: {reason}")]
    InvalidFrame {
        /// Type tag of the rejected frame
        frame_type: FrameType,
        /// What was wrong with its fields
        reason: String,
    },
}

/// Errors from encoding an outbound request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Serializer rejected the value
    #[error("failed to encode {action}: {reason}")]
    Serialize {
        /// Action that failed to encode
        action: &'static str,
        /// Serializer message
        reason: String,
    },
}
