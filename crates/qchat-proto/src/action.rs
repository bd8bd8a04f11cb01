//! Client-to-server requests on the persistent channel.

use serde::{Deserialize, Serialize};

/// Request sent by the client, tagged by its `action` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundAction {
    /// Ask the server to route pushes for `room` to this channel.
    Join {
        /// Room to join
        room: String,
    },
}

impl OutboundAction {
    /// Wire name of the action.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
        }
    }
}
