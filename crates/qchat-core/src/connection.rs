//! Persistent channel state machine.
//!
//! Manages the reconnecting lifecycle of the push channel. Uses the action
//! pattern: methods consume transport and timer events and return actions for
//! the driver to execute. The state machine owns no socket and no timer, so
//! every transition is testable without I/O.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐ connect()/timer ┌────────────┐  Opened  ┌───────────┐
//! │ Disconnected │────────────────>│ Connecting │─────────>│ Connected │
//! └──────────────┘                 └────────────┘          └───────────┘
//!        ↑        Error/Closed           │                       │
//!        └───────────────────────────────┴───────────────────────┘
//!                    (schedules one reconnect timer)
//!
//!   close() from any state ──> Closing (terminal)
//! ```
//!
//! # Invariants
//!
//! - At most one live socket: `Open` is only emitted on the transition into
//!   `Connecting`, and only from `Disconnected`.
//! - At most one pending reconnect timer. Scheduling a new one cancels the
//!   old one first; a timer firing with a stale id is ignored.
//! - `Closing` is terminal. No action other than `Release` is ever emitted
//!   from it.

use std::{fmt, time::Duration};

use qchat_proto::{InboundFrame, OutboundAction, codec};

use crate::{
    dispatch::{DispatchRegistry, Subscription, Topic},
    error::{ConnectionError, ListenerError},
};

/// Delay before reconnecting after the channel drops.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Upper bound on the reconnect delay when backing off exponentially.
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// How long to wait before each reconnect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Same delay before every attempt
    Fixed(Duration),
    /// Delay doubles with each consecutive failed attempt, capped at `max`
    Exponential {
        /// Delay before the first attempt
        initial: Duration,
        /// Largest delay ever used
        max: Duration,
    },
}

impl RetryPolicy {
    /// Delay before the reconnect that follows `failures` consecutive failed
    /// attempts (0 for the first drop after a successful open).
    pub fn delay(&self, failures: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { initial, max } => {
                let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
                initial.saturating_mul(factor).min(max)
            },
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Fixed(DEFAULT_RETRY_DELAY)
    }
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// URL of the messaging endpoint
    pub endpoint: String,
    /// Reconnect delay policy
    pub retry: RetryPolicy,
}

impl ConnectionConfig {
    /// Configuration for `endpoint` with the default retry policy.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), retry: RetryPolicy::default() }
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket; a reconnect may be pending
    Disconnected,
    /// Socket requested, waiting for it to open
    Connecting,
    /// Socket open, frames flow both ways
    Connected,
    /// Explicitly closed; terminal
    Closing,
}

/// Identifies one scheduled reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Events reported by the transport driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Socket finished opening
    Opened,
    /// One frame arrived
    Message(Vec<u8>),
    /// Socket closed, by either side
    Closed {
        /// Close reason, if the peer gave one
        reason: Option<String>,
    },
    /// Socket failed
    Error(String),
}

/// Actions returned by the connection state machine.
///
/// The driver executes these in order:
/// - `Open`: start a socket to `endpoint`
/// - `Transmit`: write one text frame
/// - `Release`: close the socket, if any
/// - `ScheduleReconnect` / `CancelReconnect`: manage the single reconnect timer
/// - `StateChanged`: informational, for observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a socket to this endpoint
    Open {
        /// Endpoint URL
        endpoint: String,
    },

    /// Send this text frame
    Transmit(String),

    /// Close the socket
    Release,

    /// Call [`Connection::handle_timer`] with `timer` after `delay`
    ScheduleReconnect {
        /// Timer to report when it fires
        timer: TimerId,
        /// How long to wait
        delay: Duration,
    },

    /// Drop a previously scheduled timer
    CancelReconnect {
        /// Timer to drop
        timer: TimerId,
    },

    /// State transition happened
    StateChanged {
        /// Previous state
        from: ConnectionState,
        /// New state
        to: ConnectionState,
    },
}

/// Reconnecting channel state machine.
///
/// Owns the [`DispatchRegistry`] that decoded frames are delivered to.
#[derive(Debug)]
pub struct Connection {
    state: ConnectionState,
    config: ConnectionConfig,
    registry: DispatchRegistry,
    pending_timer: Option<TimerId>,
    next_timer: u64,
    failures: u32,
    dropped_sends: u64,
}

impl Connection {
    /// Create a new connection in [`ConnectionState::Disconnected`] state.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            config,
            registry: DispatchRegistry::new(),
            pending_timer: None,
            next_timer: 0,
            failures: 0,
            dropped_sends: 0,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Endpoint this connection opens sockets to
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Connection configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Registry that decoded frames are dispatched to
    pub fn registry(&self) -> &DispatchRegistry {
        &self.registry
    }

    /// Reconnect timer currently pending, if any
    pub fn pending_reconnect(&self) -> Option<TimerId> {
        self.pending_timer
    }

    /// Number of sends dropped because the channel was not connected
    pub fn dropped_sends(&self) -> u64 {
        self.dropped_sends
    }

    /// True once [`Connection::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closing
    }

    /// Start connecting.
    ///
    /// Opening while a socket is already connecting or connected is a no-op,
    /// so there is never more than one live socket.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` after [`Connection::close`]
    pub fn connect(&mut self) -> Result<Vec<ConnectionAction>, ConnectionError> {
        match self.state {
            ConnectionState::Disconnected => {
                let mut actions = Vec::new();
                self.cancel_timer(&mut actions);
                self.begin_connecting(&mut actions);
                Ok(actions)
            },
            ConnectionState::Connecting | ConnectionState::Connected => Ok(Vec::new()),
            ConnectionState::Closing => {
                Err(ConnectionError::InvalidState { state: self.state, operation: "connect" })
            },
        }
    }

    /// Send a request to the server.
    ///
    /// Nothing is queued: outside [`ConnectionState::Connected`] the request
    /// is dropped with a warning and counted in [`Connection::dropped_sends`].
    pub fn send(&mut self, action: &OutboundAction) -> Vec<ConnectionAction> {
        if self.state != ConnectionState::Connected {
            self.dropped_sends += 1;
            tracing::warn!(
                action = action.name(),
                state = ?self.state,
                dropped = self.dropped_sends,
                "channel not connected, dropping send"
            );
            return Vec::new();
        }

        match codec::encode(action) {
            Ok(text) => vec![ConnectionAction::Transmit(text)],
            Err(error) => {
                self.dropped_sends += 1;
                tracing::error!(%error, "failed to encode outbound action");
                Vec::new()
            },
        }
    }

    /// Subscribe to decoded frames. See [`DispatchRegistry::subscribe`].
    pub fn on<F>(&self, topic: impl Into<Topic>, listener: F) -> Subscription
    where
        F: FnMut(&InboundFrame) -> Result<(), ListenerError> + 'static,
    {
        self.registry.subscribe(topic, listener)
    }

    /// Close the channel for good.
    ///
    /// Cancels any pending reconnect. Calling it again returns no actions.
    pub fn close(&mut self) -> Vec<ConnectionAction> {
        if self.state == ConnectionState::Closing {
            return Vec::new();
        }

        let mut actions = Vec::new();
        self.cancel_timer(&mut actions);
        self.transition(ConnectionState::Closing, &mut actions);
        actions.push(ConnectionAction::Release);

        tracing::info!(endpoint = %self.config.endpoint, "channel closed");
        actions
    }

    /// Process an event from the transport driver.
    pub fn handle_transport(&mut self, event: TransportEvent) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        match (self.state, event) {
            (ConnectionState::Closing, TransportEvent::Opened) => {
                tracing::debug!("socket opened after close, releasing");
                actions.push(ConnectionAction::Release);
            },
            (ConnectionState::Closing, event) => {
                tracing::trace!(?event, "ignoring transport event after close");
            },

            (ConnectionState::Connecting, TransportEvent::Opened) => {
                self.failures = 0;
                self.cancel_timer(&mut actions);
                self.transition(ConnectionState::Connected, &mut actions);
                tracing::info!(endpoint = %self.config.endpoint, "channel connected");
            },
            (state, TransportEvent::Opened) => {
                tracing::warn!(?state, "unexpected open event, ignoring");
            },

            (ConnectionState::Connected, TransportEvent::Message(bytes)) => {
                self.deliver(&bytes);
            },
            (state, TransportEvent::Message(bytes)) => {
                tracing::debug!(?state, len = bytes.len(), "dropping frame received while not connected");
            },

            (
                ConnectionState::Connecting | ConnectionState::Connected,
                TransportEvent::Closed { reason },
            ) => {
                tracing::info!(reason = reason.as_deref().unwrap_or("none"), "channel dropped");
                self.transition(ConnectionState::Disconnected, &mut actions);
                self.schedule_reconnect(&mut actions);
            },
            (ConnectionState::Connecting | ConnectionState::Connected, TransportEvent::Error(error)) => {
                tracing::warn!(%error, "channel error");
                self.transition(ConnectionState::Disconnected, &mut actions);
                self.schedule_reconnect(&mut actions);
            },
            (ConnectionState::Disconnected, event) => {
                tracing::trace!(?event, "already disconnected, reconnect pending");
            },
        }

        actions
    }

    /// Process a fired reconnect timer.
    ///
    /// Only the currently pending timer is honored.
    pub fn handle_timer(&mut self, timer: TimerId) -> Vec<ConnectionAction> {
        if self.pending_timer != Some(timer) {
            tracing::debug!(%timer, "ignoring stale reconnect timer");
            return Vec::new();
        }
        self.pending_timer = None;

        if self.state != ConnectionState::Disconnected {
            return Vec::new();
        }

        tracing::debug!(%timer, attempt = self.failures, "reconnecting");
        let mut actions = Vec::new();
        self.begin_connecting(&mut actions);
        actions
    }

    fn deliver(&self, bytes: &[u8]) {
        match codec::decode(bytes) {
            Ok(frame) => {
                let report = self.registry.dispatch(&frame);
                tracing::trace!(frame_type = %frame.frame_type(), ?report, "frame dispatched");
            },
            Err(error) => {
                tracing::warn!(%error, len = bytes.len(), "dropping undecodable frame");
            },
        }
    }

    fn begin_connecting(&mut self, actions: &mut Vec<ConnectionAction>) {
        self.transition(ConnectionState::Connecting, actions);
        actions.push(ConnectionAction::Open { endpoint: self.config.endpoint.clone() });
    }

    fn schedule_reconnect(&mut self, actions: &mut Vec<ConnectionAction>) {
        self.cancel_timer(actions);

        let timer = TimerId(self.next_timer);
        self.next_timer += 1;
        let delay = self.config.retry.delay(self.failures);
        self.failures = self.failures.saturating_add(1);
        self.pending_timer = Some(timer);

        tracing::debug!(%timer, ?delay, "reconnect scheduled");
        actions.push(ConnectionAction::ScheduleReconnect { timer, delay });
    }

    fn cancel_timer(&mut self, actions: &mut Vec<ConnectionAction>) {
        if let Some(timer) = self.pending_timer.take() {
            actions.push(ConnectionAction::CancelReconnect { timer });
        }
    }

    fn transition(&mut self, to: ConnectionState, actions: &mut Vec<ConnectionAction>) {
        let from = self.state;
        if from != to {
            self.state = to;
            actions.push(ConnectionAction::StateChanged { from, to });
        }
    }
}
