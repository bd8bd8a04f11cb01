//! Events published to the UI.

use qchat_core::ConnectionState;

use crate::record::{ChatMessageRecord, RecordId};

/// Notifications emitted by the chat runtime, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Channel changed state
    ConnectionChanged {
        /// Previous state
        from: ConnectionState,
        /// New state
        to: ConnectionState,
    },

    /// Server acknowledged the requested room
    RoomJoined {
        /// Room joined
        room: String,
    },

    /// Channel dropped while joined; the room must be joined again
    RoomLost {
        /// Room that was lost
        room: String,
    },

    /// A record was appended to the log
    RecordAdded(ChatMessageRecord),

    /// Decrypt-on-demand recovered a record's plaintext
    PlaintextAttached {
        /// Record that was updated
        id: RecordId,
        /// Recovered text
        plaintext: String,
    },

    /// A request was dropped because the channel was not connected
    SendDropped {
        /// Name of the dropped action
        action: &'static str,
    },

    /// Server reported a non-fatal fault
    ServerError {
        /// Server message
        message: String,
    },

    /// Generic server notification
    Notification {
        /// Opaque payload
        payload: serde_json::Value,
    },
}
