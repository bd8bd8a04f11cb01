//! Error types for the chat channel core.
//!
//! One enum per state machine. Transport failures are not errors at this
//! layer: they are events that drive the reconnect path.

use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors from connection state machine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Invalid state transition attempted
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when error occurred
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },
}

/// Errors from room session operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    /// Room id was empty or whitespace
    #[error("room id must not be empty")]
    EmptyRoom,

    /// Session is already joined to another room
    #[error("already joined to room {current}, cannot join {requested}")]
    AlreadyJoined {
        /// Room currently joined
        current: String,
        /// Room that was requested
        requested: String,
    },
}

/// Failure reported by a dispatch listener.
///
/// A failing listener never stops delivery to the listeners after it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerError {
    /// Listener state was already borrowed (re-entrant dispatch)
    #[error("{listener} state is busy")]
    Busy {
        /// Which listener was busy
        listener: &'static str,
    },

    /// Listener could not handle the frame
    #[error("listener rejected frame: {0}")]
    Rejected(String),
}
