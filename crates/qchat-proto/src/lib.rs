//! Wire protocol for the secure chat channel.
//!
//! The persistent channel carries JSON text frames. Inbound frames are tagged
//! by a `type` field and decode into the closed [`InboundFrame`] sum type.
//! Outbound frames are client requests tagged by an `action` field
//! ([`OutboundAction`]). The control plane (encrypt/decrypt over HTTP) uses the
//! request/response payloads in [`control`].
//!
//! Nothing in this crate performs I/O. Decoding is pure: malformed input
//! yields a [`DecodeError`] and never panics.

pub mod action;
pub mod codec;
pub mod control;
pub mod errors;
pub mod frame;

pub use action::OutboundAction;
pub use codec::{decode, decode_str, encode};
pub use errors::{DecodeError, EncodeError};
pub use frame::{FrameType, InboundFrame, NodeId};
