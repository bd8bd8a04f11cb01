//! Transport seam between the runtime and the persistent channel.
//!
//! The runtime never touches a socket directly. It executes
//! [`ConnectionAction`](qchat_core::ConnectionAction)s against a [`Transport`]
//! and feeds the transport's events back into the connection state machine.

use std::future::Future;

use qchat_core::TransportEvent;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No socket is open
    #[error("no open socket")]
    NotOpen,

    /// Socket task has stopped accepting frames
    #[error("socket closed")]
    Closed,
}

/// Persistent channel I/O.
///
/// Implementations hold at most one socket. `open` and `release` return
/// immediately; the outcome of an open arrives later as
/// [`TransportEvent::Opened`], [`TransportEvent::Error`] or
/// [`TransportEvent::Closed`].
pub trait Transport {
    /// Start opening a socket to `endpoint`, replacing any previous one.
    fn open(&mut self, endpoint: &str);

    /// Queue one text frame on the open socket.
    fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the socket, if any. Events from it are no longer reported.
    fn release(&mut self);

    /// Next event from the current socket.
    ///
    /// Returns `None` once the transport can never produce another event.
    fn next_event(&mut self) -> impl Future<Output = Option<TransportEvent>>;
}
