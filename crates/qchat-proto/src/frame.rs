//! Server-to-client frames on the persistent channel.
//!
//! Every frame is one JSON object tagged by its `type` field. The set of types
//! is closed: a frame either decodes into one [`InboundFrame`] variant with its
//! required fields present, or it fails to decode.
//!
//! | type         | required fields       |
//! |--------------|-----------------------|
//! | `joined`     | `room`                |
//! | `secure_msg` | `sender`, `blob_hex`  |
//! | `delivered`  | `to`, `blob_hex`      |
//! | `event`      | `payload`             |
//! | `error`      | `message`             |

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Participant identity in the chat network.
///
/// A client joins the room named after its own node id, so push frames
/// addressed to that node arrive on its channel.
pub type NodeId = u64;

/// Frame received from the messaging server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// Acknowledges a join request.
    Joined {
        /// Room that was joined. Servers send either a string or an integer;
        /// both normalize to the decimal string form.
        #[serde(deserialize_with = "room_id")]
        room: String,
    },

    /// Ciphertext addressed to the joined node.
    SecureMsg {
        /// Node that sent the message
        sender: NodeId,
        /// Hex-encoded ciphertext
        blob_hex: String,
    },

    /// Confirms that a message sent by the joined node was relayed.
    Delivered {
        /// Node the message was relayed to
        to: NodeId,
        /// Hex-encoded ciphertext that was relayed
        blob_hex: String,
    },

    /// Generic server notification with an opaque payload.
    Event {
        /// Arbitrary JSON payload
        payload: serde_json::Value,
    },

    /// Non-fatal server fault.
    Error {
        /// Human-readable description
        message: String,
    },
}

impl InboundFrame {
    /// Type tag of this frame.
    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::Joined { .. } => FrameType::Joined,
            Self::SecureMsg { .. } => FrameType::SecureMsg,
            Self::Delivered { .. } => FrameType::Delivered,
            Self::Event { .. } => FrameType::Event,
            Self::Error { .. } => FrameType::Error,
        }
    }
}

/// Discriminant of [`InboundFrame`], used to key subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameType {
    /// `joined`
    Joined,
    /// `secure_msg`
    SecureMsg,
    /// `delivered`
    Delivered,
    /// `event`
    Event,
    /// `error`
    Error,
}

impl FrameType {
    /// Every frame type, in wire-table order.
    pub const ALL: [Self; 5] = [Self::Joined, Self::SecureMsg, Self::Delivered, Self::Event, Self::Error];

    /// Wire tag carried in the `type` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Joined => "joined",
            Self::SecureMsg => "secure_msg",
            Self::Delivered => "delivered",
            Self::Event => "event",
            Self::Error => "error",
        }
    }

    /// Parse a wire tag. Returns `None` for tags outside the closed set.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RoomRepr {
    Text(String),
    Number(u64),
}

fn room_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RoomRepr::deserialize(deserializer)? {
        RoomRepr::Text(room) => room,
        RoomRepr::Number(room) => room.to_string(),
    })
}
