//! Chat delivery workflow.
//!
//! Two planes feed one ordered [`MessageLog`]:
//!
//! - Control plane (request/response): encrypt-and-send, and
//!   decrypt-on-demand for received records. These calls are split into a
//!   synchronous `begin_*` that validates and builds the request, and a
//!   `complete_*` that applies the response. A driver can keep any number of
//!   calls in flight and complete them in any order; they are correlated by
//!   ticket, not by arrival order.
//! - Data plane (push frames): `secure_msg` and `delivered` frames append
//!   records while the room is joined.
//!
//! # Invariants
//!
//! - Every ticket carries the generation it was issued under.
//!   [`ChatWorkflow::teardown`] bumps the generation, and a completion from an
//!   older generation never touches the log.
//! - Decrypt attaches plaintext to exactly the record named by its ticket and
//!   never overwrites existing plaintext.

use std::{cell::RefCell, rc::Rc};

use qchat_core::{Connection, Environment, ListenerError, RoomStatus, Subscription};
use qchat_proto::{
    FrameType, InboundFrame, NodeId,
    control::{DecryptRequest, DecryptResponse, EncryptSendRequest, EncryptSendResponse},
};

use crate::{
    control::{ControlError, ControlPlane},
    error::ClientError,
    event::ChatEvent,
    record::{Attach, ChatMessageRecord, Direction, MessageLog, NewRecord, RecordId},
};

/// Pending encrypt-and-send call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendTicket {
    generation: u64,
    sender: NodeId,
    receiver: NodeId,
    text: String,
}

/// Pending decrypt call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptTicket {
    generation: u64,
    id: RecordId,
}

impl DecryptTicket {
    /// Record the plaintext will be attached to.
    pub fn record(&self) -> RecordId {
        self.id
    }
}

#[derive(Debug, Default)]
struct ChatState {
    log: MessageLog,
    generation: u64,
    draft: String,
    events: Vec<ChatEvent>,
}

impl ChatState {
    fn append(&mut self, record: NewRecord) -> RecordId {
        let record = self.log.append(record).clone();
        let id = record.id;
        self.events.push(ChatEvent::RecordAdded(record));
        id
    }
}

/// Send, receive and decrypt for one joined room.
pub struct ChatWorkflow<E: Environment> {
    env: E,
    state: Rc<RefCell<ChatState>>,
    subscriptions: Vec<Subscription>,
}

impl<E: Environment> ChatWorkflow<E> {
    /// Attach the workflow to `connection`.
    ///
    /// Push frames are only recorded while `room` reports joined; the joined
    /// room is the local node id.
    pub fn attach(connection: &Connection, room: RoomStatus, env: E) -> Self {
        let state = Rc::new(RefCell::new(ChatState::default()));
        let mut subscriptions = Vec::with_capacity(4);

        let (shared, status, clock) = (Rc::clone(&state), room.clone(), env.clone());
        subscriptions.push(connection.on(FrameType::SecureMsg, move |frame| {
            let InboundFrame::SecureMsg { sender, blob_hex } = frame else {
                return Ok(());
            };
            let Some(node) = local_node(&status)? else {
                tracing::debug!(sender, "secure_msg while not joined, dropping");
                return Ok(());
            };
            let record = NewRecord::pushed(*sender, node, blob_hex.clone(), clock.wall_clock_millis());
            let id = borrow(&shared)?.append(record);
            tracing::debug!(%id, sender, "message received");
            Ok(())
        }));

        let (shared, status, clock) = (Rc::clone(&state), room, env.clone());
        subscriptions.push(connection.on(FrameType::Delivered, move |frame| {
            let InboundFrame::Delivered { to, blob_hex } = frame else {
                return Ok(());
            };
            let Some(node) = local_node(&status)? else {
                tracing::debug!(to, "delivered while not joined, dropping");
                return Ok(());
            };
            let record = NewRecord::receipt(node, *to, blob_hex.clone(), clock.wall_clock_millis());
            let id = borrow(&shared)?.append(record);
            tracing::debug!(%id, to, "delivery confirmed");
            Ok(())
        }));

        let shared = Rc::clone(&state);
        subscriptions.push(connection.on(FrameType::Error, move |frame| {
            if let InboundFrame::Error { message } = frame {
                tracing::warn!(%message, "server error");
                borrow(&shared)?.events.push(ChatEvent::ServerError { message: message.clone() });
            }
            Ok(())
        }));

        let shared = Rc::clone(&state);
        subscriptions.push(connection.on(FrameType::Event, move |frame| {
            if let InboundFrame::Event { payload } = frame {
                borrow(&shared)?.events.push(ChatEvent::Notification { payload: payload.clone() });
            }
            Ok(())
        }));

        Self { env, state, subscriptions }
    }

    /// Validate a message and build its encrypt-and-send request.
    ///
    /// The text is trimmed before sending.
    ///
    /// # Errors
    ///
    /// - `ClientError::EmptyMessage` if the text is blank
    pub fn begin_send(
        &self,
        sender: NodeId,
        receiver: NodeId,
        text: &str,
    ) -> Result<(SendTicket, EncryptSendRequest), ClientError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let generation = self.state.borrow().generation;
        let ticket = SendTicket { generation, sender, receiver, text: text.to_owned() };
        let request = EncryptSendRequest { sender, receiver, message: text.to_owned() };
        Ok((ticket, request))
    }

    /// Apply the outcome of an encrypt-and-send call.
    ///
    /// On success a sent record carrying the typed text is appended and the
    /// draft is cleared if it still holds that text. On failure the log is
    /// untouched.
    pub fn complete_send(
        &self,
        ticket: SendTicket,
        result: Result<EncryptSendResponse, ControlError>,
    ) -> Result<RecordId, ClientError> {
        let mut state = self.state.borrow_mut();
        if ticket.generation != state.generation {
            tracing::debug!(generation = ticket.generation, "discarding send completion from closed session");
            return Err(ClientError::SessionClosed);
        }

        let response = result?;
        if !response.ok {
            return Err(ControlError::Rejected { operation: "send" }.into());
        }

        if state.draft.trim() == ticket.text {
            state.draft.clear();
        }

        let record = NewRecord::local_send(
            ticket.sender,
            ticket.receiver,
            ticket.text,
            self.env.wall_clock_millis(),
        );
        let id = state.append(record);
        tracing::info!(%id, sender = ticket.sender, receiver = ticket.receiver, "message sent");
        Ok(id)
    }

    /// Build the decrypt request for a received record.
    ///
    /// # Errors
    ///
    /// - `ClientError::UnknownRecord` if no record has this id
    /// - `ClientError::NotDecryptable` if the record is not a received message
    ///   with ciphertext
    /// - `ClientError::AlreadyDecrypted` if the record has plaintext
    pub fn begin_decrypt(&self, id: RecordId) -> Result<(DecryptTicket, DecryptRequest), ClientError> {
        let state = self.state.borrow();
        let record = state.log.get(id).ok_or(ClientError::UnknownRecord(id))?;

        if record.direction != Direction::Received {
            return Err(ClientError::NotDecryptable(id));
        }
        let Some(blob_hex) = record.ciphertext.clone() else {
            return Err(ClientError::NotDecryptable(id));
        };
        if record.plaintext.is_some() {
            return Err(ClientError::AlreadyDecrypted(id));
        }

        let ticket = DecryptTicket { generation: state.generation, id };
        let request = DecryptRequest { owner: record.receiver, peer: record.sender, blob_hex };
        Ok((ticket, request))
    }

    /// Apply the outcome of a decrypt call to the ticket's record.
    ///
    /// Returns the record's plaintext. If the record gained plaintext while
    /// the call was in flight, that plaintext is kept and returned.
    pub fn complete_decrypt(
        &self,
        ticket: DecryptTicket,
        result: Result<DecryptResponse, ControlError>,
    ) -> Result<String, ClientError> {
        let mut state = self.state.borrow_mut();
        if ticket.generation != state.generation {
            tracing::debug!(id = %ticket.id, "discarding decrypt completion from closed session");
            return Err(ClientError::SessionClosed);
        }

        let response = result?;
        let plaintext = match response {
            DecryptResponse { ok: true, plaintext: Some(plaintext) } => plaintext,
            _ => return Err(ControlError::Rejected { operation: "decrypt" }.into()),
        };

        match state.log.attach_plaintext(ticket.id, plaintext.clone()) {
            Attach::Stored => {
                tracing::debug!(id = %ticket.id, "plaintext attached");
                state.events.push(ChatEvent::PlaintextAttached { id: ticket.id, plaintext: plaintext.clone() });
                Ok(plaintext)
            },
            Attach::Kept(existing) => Ok(existing),
            Attach::Unknown => Err(ClientError::UnknownRecord(ticket.id)),
        }
    }

    /// Encrypt and send a message, then record it.
    pub async fn send_message<C: ControlPlane>(
        &self,
        control: &C,
        sender: NodeId,
        receiver: NodeId,
        text: &str,
    ) -> Result<RecordId, ClientError> {
        let (ticket, request) = self.begin_send(sender, receiver, text)?;
        let result = control.encrypt_send(&request).await;
        self.complete_send(ticket, result)
    }

    /// Decrypt a received record, or return its plaintext if already known.
    pub async fn decrypt<C: ControlPlane>(&self, control: &C, id: RecordId) -> Result<String, ClientError> {
        if let Some(plaintext) = self.plaintext(id) {
            return Ok(plaintext);
        }
        let (ticket, request) = self.begin_decrypt(id)?;
        let result = control.decrypt(&request).await;
        self.complete_decrypt(ticket, result)
    }

    /// Stop recording push frames and invalidate every outstanding ticket.
    pub fn teardown(&mut self) {
        self.state.borrow_mut().generation += 1;
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }

    /// Snapshot of the log, oldest first.
    pub fn records(&self) -> Vec<ChatMessageRecord> {
        self.state.borrow().log.records().to_vec()
    }

    /// One record by id.
    pub fn record(&self, id: RecordId) -> Option<ChatMessageRecord> {
        self.state.borrow().log.get(id).cloned()
    }

    /// Plaintext of a record, if known.
    pub fn plaintext(&self, id: RecordId) -> Option<String> {
        self.state.borrow().log.get(id).and_then(|r| r.plaintext.clone())
    }

    /// Number of records in the log.
    pub fn len(&self) -> usize {
        self.state.borrow().log.len()
    }

    /// True if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain queued events.
    pub fn take_events(&self) -> Vec<ChatEvent> {
        std::mem::take(&mut self.state.borrow_mut().events)
    }

    /// Replace the unsent draft.
    pub fn set_draft(&self, text: impl Into<String>) {
        self.state.borrow_mut().draft = text.into();
    }

    /// Current unsent draft.
    pub fn draft(&self) -> String {
        self.state.borrow().draft.clone()
    }

    /// Current session generation.
    pub fn generation(&self) -> u64 {
        self.state.borrow().generation
    }
}

fn borrow(state: &Rc<RefCell<ChatState>>) -> Result<std::cell::RefMut<'_, ChatState>, ListenerError> {
    state.try_borrow_mut().map_err(|_| ListenerError::Busy { listener: "chat" })
}

fn local_node(room: &RoomStatus) -> Result<Option<NodeId>, ListenerError> {
    match room.joined_room() {
        None => Ok(None),
        Some(room) => room
            .parse()
            .map(Some)
            .map_err(|_| ListenerError::Rejected(format!("room {room} is not a node id"))),
    }
}
