//! Control-plane payloads.
//!
//! Encrypt-and-send and decrypt are stateless JSON request/response calls
//! against the chat API. The cryptography behind them is opaque to this
//! workspace: requests carry plaintext or hex ciphertext, responses carry an
//! `ok` flag and, for decrypt, the recovered plaintext.

use serde::{Deserialize, Serialize};

use crate::frame::NodeId;

/// Path of the encrypt-and-send call.
pub const SEND_PATH: &str = "/chat/send";

/// Path of the decrypt call.
pub const DECRYPT_PATH: &str = "/chat/decrypt";

/// Body of `POST /chat/send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptSendRequest {
    /// Sending node
    pub sender: NodeId,
    /// Receiving node
    pub receiver: NodeId,
    /// Plaintext to encrypt and relay
    pub message: String,
}

/// Response to `POST /chat/send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptSendResponse {
    /// Whether the server accepted the message
    pub ok: bool,
}

/// Body of `POST /chat/decrypt`.
///
/// `owner` is the node whose key material decrypts the blob (the receiver of
/// the original message); `peer` is the node that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptRequest {
    /// Node that owns the decryption key
    pub owner: NodeId,
    /// Node that encrypted the blob
    pub peer: NodeId,
    /// Hex-encoded ciphertext
    pub blob_hex: String,
}

/// Response to `POST /chat/decrypt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptResponse {
    /// Whether decryption succeeded
    pub ok: bool,
    /// Recovered plaintext, present when `ok` is true
    #[serde(default)]
    pub plaintext: Option<String>,
}
