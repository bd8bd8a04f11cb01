//! Sans-IO core of the secure chat channel.
//!
//! Three cooperating state machines, none of which own a socket or a timer:
//!
//! - [`connection::Connection`]: reconnecting lifecycle of the persistent
//!   channel. Consumes transport and timer events, returns
//!   [`connection::ConnectionAction`]s for a driver to execute.
//! - [`dispatch::DispatchRegistry`]: routes decoded frames to listeners by
//!   frame type, plus wildcard listeners.
//! - [`room::RoomSession`]: join request and acknowledgment tracking.
//!
//! Everything here is single-threaded. Listener state is shared through `Rc`
//! and `RefCell` and the types are deliberately `!Send`.

pub mod connection;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod room;

pub use connection::{
    Connection, ConnectionAction, ConnectionConfig, ConnectionState, RetryPolicy, TimerId,
    TransportEvent,
};
pub use dispatch::{DispatchRegistry, DispatchReport, Subscription, Topic};
pub use env::Environment;
pub use error::{ConnectionError, ListenerError, RoomError};
pub use room::{RoomSession, RoomStatus};
