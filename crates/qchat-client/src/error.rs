//! Client error types.

use qchat_core::{ConnectionError, RoomError};
use thiserror::Error;

use crate::{control::ControlError, record::RecordId, transport::TransportError};

/// Errors surfaced to callers of the chat workflow and its handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Message text was empty after trimming
    #[error("message is empty")]
    EmptyMessage,

    /// No record with this id
    #[error("unknown record {0}")]
    UnknownRecord(RecordId),

    /// Record is not a received message with ciphertext
    #[error("record {0} has nothing to decrypt")]
    NotDecryptable(RecordId),

    /// Record already carries plaintext
    #[error("record {0} is already decrypted")]
    AlreadyDecrypted(RecordId),

    /// Session was torn down before the operation completed
    #[error("chat session is closed")]
    SessionClosed,

    /// Control-plane call failed
    #[error(transparent)]
    Control(#[from] ControlError),

    /// Room join was rejected locally
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Connection state machine rejected the operation
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Transport could not be set up
    #[error(transparent)]
    Transport(#[from] TransportError),
}
