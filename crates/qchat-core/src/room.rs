//! Room join tracking.
//!
//! Joining is a fire-and-forget request followed by an asynchronous `joined`
//! acknowledgment. The session only reports joined once the acknowledgment
//! names the room that was requested; acknowledgments for any other room are
//! ignored. There is no join timeout and no automatic retry.

use std::{cell::RefCell, rc::Rc};

use qchat_proto::{FrameType, InboundFrame, NodeId, OutboundAction};

use crate::{
    connection::{Connection, ConnectionAction},
    dispatch::Subscription,
    error::{ListenerError, RoomError},
};

#[derive(Debug, Default)]
struct RoomState {
    requested: Option<String>,
    joined: bool,
}

/// Read-only view of a room session, shareable with listeners.
#[derive(Debug, Clone, Default)]
pub struct RoomStatus {
    inner: Rc<RefCell<RoomState>>,
}

impl RoomStatus {
    /// Most recently requested room, joined or not.
    pub fn room(&self) -> Option<String> {
        self.inner.borrow().requested.clone()
    }

    /// True once the server acknowledged the requested room.
    pub fn is_joined(&self) -> bool {
        self.inner.borrow().joined
    }

    /// Room currently joined, if any.
    pub fn joined_room(&self) -> Option<String> {
        let state = self.inner.borrow();
        state.requested.clone().filter(|_| state.joined)
    }

    /// Joined room parsed as a node id.
    ///
    /// Rooms are named after the node that owns them; a joined room that is
    /// not a number yields `None`.
    pub fn joined_node(&self) -> Option<NodeId> {
        self.joined_room().and_then(|room| room.parse().ok())
    }
}

/// Join request and acknowledgment state for one connection.
#[derive(Debug)]
pub struct RoomSession {
    status: RoomStatus,
    subscription: Option<Subscription>,
}

impl RoomSession {
    /// Create a session listening for `joined` acknowledgments on
    /// `connection`.
    pub fn attach(connection: &Connection) -> Self {
        let status = RoomStatus::default();
        let state = Rc::clone(&status.inner);

        let subscription = connection.on(FrameType::Joined, move |frame| {
            let InboundFrame::Joined { room } = frame else {
                return Ok(());
            };
            let mut state =
                state.try_borrow_mut().map_err(|_| ListenerError::Busy { listener: "room" })?;

            if state.requested.as_deref() != Some(room.as_str()) {
                tracing::debug!(%room, requested = ?state.requested, "ignoring ack for another room");
            } else if !state.joined {
                state.joined = true;
                tracing::info!(%room, "room joined");
            }
            Ok(())
        });

        Self { status, subscription: Some(subscription) }
    }

    /// Request to join `room`.
    ///
    /// Does not wait for the acknowledgment. Re-joining the room already
    /// joined re-sends the request. If the channel is not connected the
    /// request is dropped by the connection and no acknowledgment will come.
    ///
    /// # Errors
    ///
    /// - `RoomError::EmptyRoom` if `room` is blank
    /// - `RoomError::AlreadyJoined` if joined to a different room
    pub fn join(
        &mut self,
        connection: &mut Connection,
        room: impl Into<String>,
    ) -> Result<Vec<ConnectionAction>, RoomError> {
        let room = room.into().trim().to_owned();
        if room.is_empty() {
            return Err(RoomError::EmptyRoom);
        }

        {
            let mut state = self.status.inner.borrow_mut();
            if state.joined
                && let Some(current) = state.requested.as_deref()
                && current != room
            {
                return Err(RoomError::AlreadyJoined { current: current.to_owned(), requested: room });
            }
            state.requested = Some(room.clone());
        }

        tracing::debug!(%room, "requesting join");
        Ok(connection.send(&OutboundAction::Join { room }))
    }

    /// Shareable view of this session.
    pub fn status(&self) -> RoomStatus {
        self.status.clone()
    }

    /// True once the server acknowledged the requested room.
    pub fn is_joined(&self) -> bool {
        self.status.is_joined()
    }

    /// Most recently requested room.
    pub fn room(&self) -> Option<String> {
        self.status.room()
    }

    /// Forget the acknowledgment, keeping the requested room.
    ///
    /// Called when the channel drops: the server no longer routes pushes to
    /// this client until it joins again.
    pub fn reset(&mut self) -> bool {
        let mut state = self.status.inner.borrow_mut();
        std::mem::replace(&mut state.joined, false)
    }

    /// Stop listening for acknowledgments.
    pub fn detach(&mut self) -> bool {
        self.subscription.take().is_some_and(Subscription::unsubscribe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionConfig, TransportEvent};

    fn connected() -> Connection {
        let mut conn = Connection::new(ConnectionConfig::new("ws://test/ws"));
        conn.connect().unwrap();
        conn.handle_transport(TransportEvent::Opened);
        conn
    }

    fn ack(conn: &mut Connection, room: &str) {
        let text = format!(r#"{{"type":"joined","room":"{room}"}}"#);
        conn.handle_transport(TransportEvent::Message(text.into_bytes()));
    }

    #[test]
    fn join_sends_request_without_waiting() {
        let mut conn = connected();
        let mut room = RoomSession::attach(&conn);

        let actions = room.join(&mut conn, "1").unwrap();

        assert_eq!(
            actions,
            vec![ConnectionAction::Transmit(r#"{"action":"join","room":"1"}"#.into())]
        );
        assert_eq!(room.room().as_deref(), Some("1"));
        assert!(!room.is_joined());
    }

    #[test]
    fn switching_rooms_after_join_is_rejected() {
        let mut conn = connected();
        let mut room = RoomSession::attach(&conn);
        room.join(&mut conn, "1").unwrap();
        ack(&mut conn, "1");

        assert_eq!(
            room.join(&mut conn, "2"),
            Err(RoomError::AlreadyJoined { current: "1".into(), requested: "2".into() })
        );
        assert!(room.join(&mut conn, "1").is_ok());
        assert!(room.is_joined());
    }

    #[test]
    fn blank_room_is_rejected() {
        let mut conn = connected();
        let mut room = RoomSession::attach(&conn);
        assert_eq!(room.join(&mut conn, "  "), Err(RoomError::EmptyRoom));
        assert_eq!(room.room(), None);
    }

    #[test]
    fn reset_clears_joined_and_keeps_room() {
        let mut conn = connected();
        let mut room = RoomSession::attach(&conn);
        room.join(&mut conn, "4").unwrap();
        ack(&mut conn, "4");
        assert_eq!(room.status().joined_node(), Some(4));

        assert!(room.reset());
        assert!(!room.is_joined());
        assert_eq!(room.room().as_deref(), Some("4"));
        assert_eq!(room.status().joined_room(), None);
    }

    #[test]
    fn detached_session_ignores_acks() {
        let mut conn = connected();
        let mut room = RoomSession::attach(&conn);
        room.join(&mut conn, "1").unwrap();

        assert!(room.detach());
        assert!(!room.detach());
        ack(&mut conn, "1");

        assert!(!room.is_joined());
        assert!(conn.registry().is_empty());
    }
}
