//! Secure chat client.
//!
//! Builds the chat feature on top of the Sans-IO core:
//!
//! - [`chat::ChatWorkflow`]: send and decrypt-on-demand over the control
//!   plane, push frames over the data plane, one ordered [`MessageLog`].
//! - [`runtime::Runtime`]: single-threaded event loop that drives the
//!   connection, the reconnect timer, the transport and in-flight control
//!   plane calls, and executes the actions they produce.
//! - [`handle::ChatHandle`]: cloneable front end for UIs.
//!
//! With the `transport` feature, [`ws::WsTransport`] and
//! [`http::HttpControlPlane`] provide the production WebSocket and HTTP
//! implementations.

pub mod chat;
pub mod config;
pub mod control;
pub mod error;
pub mod event;
pub mod handle;
pub mod record;
pub mod runtime;
pub mod system_env;
pub mod transport;

#[cfg(feature = "transport")]
pub mod http;
#[cfg(feature = "transport")]
pub mod ws;

pub use chat::{ChatWorkflow, DecryptTicket, SendTicket};
pub use config::ClientConfig;
pub use control::{ControlError, ControlPlane};
pub use error::ClientError;
pub use event::ChatEvent;
pub use handle::ChatHandle;
pub use record::{ChatMessageRecord, Direction, MessageLog, RecordId, RecordOrigin};
pub use runtime::Runtime;
pub use system_env::SystemEnv;
pub use transport::{Transport, TransportError};
