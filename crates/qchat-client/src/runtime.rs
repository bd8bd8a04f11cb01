//! Single-threaded event loop for one chat session.
//!
//! The Runtime owns every piece of I/O and drives the Sans-IO core:
//! - [`Connection`]: lifecycle actions are executed against the [`Transport`]
//!   and the one reconnect timer
//! - [`RoomSession`]: join requests from the handle
//! - [`ChatWorkflow`]: control-plane calls run concurrently as in-flight
//!   futures and complete in any order
//!
//! The runtime is `!Send`. Run it on a current-thread runtime or inside a
//! [`tokio::task::LocalSet`].

use std::{pin::Pin, rc::Rc};

use futures::{StreamExt, future::LocalBoxFuture, stream::FuturesUnordered};
use qchat_core::{
    Connection, ConnectionAction, ConnectionState, Environment, RoomSession, Subscription,
    TimerId, Topic, TransportEvent,
};
use qchat_proto::control::{DecryptResponse, EncryptSendResponse};
use tokio::{
    sync::{mpsc, oneshot},
    time::Sleep,
};

use crate::{
    chat::{ChatWorkflow, DecryptTicket, SendTicket},
    config::ClientConfig,
    control::{ControlError, ControlPlane},
    error::ClientError,
    event::ChatEvent,
    handle::{ChatHandle, Command},
    record::RecordId,
    transport::Transport,
};

/// Finished control-plane call, with the caller waiting for its result.
enum Completion {
    Sent {
        ticket: SendTicket,
        result: Result<EncryptSendResponse, ControlError>,
        reply: oneshot::Sender<Result<RecordId, ClientError>>,
    },
    Decrypted {
        ticket: DecryptTicket,
        result: Result<DecryptResponse, ControlError>,
        reply: oneshot::Sender<Result<String, ClientError>>,
    },
}

/// One unit of work picked by the event loop.
enum Step {
    Command(Option<Command>),
    Transport(Option<TransportEvent>),
    Timer(TimerId),
    Completion(Completion),
}

/// Event loop that owns the transport, the timer and the in-flight calls.
///
/// # Type Parameters
///
/// - `T`: persistent channel I/O
/// - `C`: encrypt/decrypt service
/// - `E`: environment for record timestamps
pub struct Runtime<T, C, E>
where
    T: Transport,
    C: ControlPlane + 'static,
    E: Environment,
{
    connection: Connection,
    room: RoomSession,
    chat: ChatWorkflow<E>,
    transport: T,
    control: Rc<C>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ChatEvent>,
    reconnect: Option<(TimerId, Pin<Box<Sleep>>)>,
    inflight: FuturesUnordered<LocalBoxFuture<'static, Completion>>,
    joined_room: Option<String>,
    frame_trace: Option<Subscription>,
}

impl<T, C, E> Runtime<T, C, E>
where
    T: Transport,
    C: ControlPlane + 'static,
    E: Environment,
{
    /// Create a runtime, the handle that drives it, and its event stream.
    pub fn new(
        config: &ClientConfig,
        transport: T,
        control: C,
        env: E,
    ) -> (Self, ChatHandle, mpsc::UnboundedReceiver<ChatEvent>) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();

        let connection = Connection::new(config.connection_config());
        let room = RoomSession::attach(&connection);
        let chat = ChatWorkflow::attach(&connection, room.status(), env);
        let frame_trace = connection.on(Topic::Any, |frame| {
            tracing::trace!(frame_type = %frame.frame_type(), "frame received");
            Ok(())
        });

        let runtime = Self {
            connection,
            room,
            chat,
            transport,
            control: Rc::new(control),
            commands,
            events,
            reconnect: None,
            inflight: FuturesUnordered::new(),
            joined_room: None,
            frame_trace: Some(frame_trace),
        };
        (runtime, ChatHandle::new(commands_tx), events_rx)
    }

    /// Run until [`ChatHandle::close`] is called, every handle is dropped, or
    /// the transport stops for good.
    ///
    /// Calls still in flight at shutdown are awaited and answered with
    /// [`ClientError::SessionClosed`]; they never touch the log.
    pub async fn run(mut self) -> Result<(), ClientError> {
        let actions = self.connection.connect()?;
        self.execute(actions);
        self.publish();

        loop {
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                event = self.transport.next_event() => Step::Transport(event),
                timer = reconnect_fired(&mut self.reconnect) => Step::Timer(timer),
                Some(completion) = self.inflight.next(), if !self.inflight.is_empty() => {
                    Step::Completion(completion)
                },
            };

            let quit = match step {
                Step::Command(Some(command)) => self.handle_command(command),
                Step::Command(None) => {
                    tracing::debug!("all handles dropped");
                    true
                },
                Step::Transport(Some(event)) => {
                    let actions = self.connection.handle_transport(event);
                    self.execute(actions);
                    false
                },
                Step::Transport(None) => {
                    tracing::warn!("transport stopped");
                    true
                },
                Step::Timer(timer) => {
                    self.reconnect = None;
                    let actions = self.connection.handle_timer(timer);
                    self.execute(actions);
                    false
                },
                Step::Completion(completion) => {
                    self.complete(completion);
                    false
                },
            };

            self.publish();
            if quit {
                break;
            }
        }

        self.shutdown().await;
        Ok(())
    }

    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Join { room, reply } => {
                let dropped = self.connection.dropped_sends();
                let result = match self.room.join(&mut self.connection, room) {
                    Ok(actions) => {
                        self.execute(actions);
                        Ok(())
                    },
                    Err(error) => Err(ClientError::from(error)),
                };
                if self.connection.dropped_sends() > dropped {
                    self.emit(ChatEvent::SendDropped { action: "join" });
                }
                let _ = reply.send(result);
            },
            Command::Send { sender, receiver, text, reply } => {
                match self.chat.begin_send(sender, receiver, &text) {
                    Ok((ticket, request)) => {
                        let control = Rc::clone(&self.control);
                        self.inflight.push(Box::pin(async move {
                            let result = control.encrypt_send(&request).await;
                            Completion::Sent { ticket, result, reply }
                        }));
                    },
                    Err(error) => {
                        let _ = reply.send(Err(error));
                    },
                }
            },
            Command::Decrypt { id, reply } => {
                if let Some(plaintext) = self.chat.plaintext(id) {
                    let _ = reply.send(Ok(plaintext));
                    return false;
                }
                match self.chat.begin_decrypt(id) {
                    Ok((ticket, request)) => {
                        let control = Rc::clone(&self.control);
                        self.inflight.push(Box::pin(async move {
                            let result = control.decrypt(&request).await;
                            Completion::Decrypted { ticket, result, reply }
                        }));
                    },
                    Err(error) => {
                        let _ = reply.send(Err(error));
                    },
                }
            },
            Command::Records { reply } => {
                let _ = reply.send(self.chat.records());
            },
            Command::Close => return true,
        }
        false
    }

    fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::Sent { ticket, result, reply } => {
                let outcome = self.chat.complete_send(ticket, result);
                if let Err(error) = &outcome {
                    tracing::warn!(%error, "send failed");
                }
                let _ = reply.send(outcome);
            },
            Completion::Decrypted { ticket, result, reply } => {
                let id = ticket.record();
                let outcome = self.chat.complete_decrypt(ticket, result);
                if let Err(error) = &outcome {
                    tracing::warn!(%id, %error, "decrypt failed");
                }
                let _ = reply.send(outcome);
            },
        }
    }

    fn execute(&mut self, actions: Vec<ConnectionAction>) {
        for action in actions {
            match action {
                ConnectionAction::Open { endpoint } => self.transport.open(&endpoint),
                ConnectionAction::Transmit(text) => {
                    if let Err(error) = self.transport.send_text(text) {
                        tracing::warn!(%error, "transmit failed");
                    }
                },
                ConnectionAction::Release => self.transport.release(),
                ConnectionAction::ScheduleReconnect { timer, delay } => {
                    self.reconnect = Some((timer, Box::pin(tokio::time::sleep(delay))));
                },
                ConnectionAction::CancelReconnect { timer } => {
                    if self.reconnect.as_ref().is_some_and(|(pending, _)| *pending == timer) {
                        self.reconnect = None;
                    }
                },
                ConnectionAction::StateChanged { from, to } => {
                    tracing::debug!(?from, ?to, "connection state changed");
                    self.emit(ChatEvent::ConnectionChanged { from, to });
                    if from == ConnectionState::Connected && to == ConnectionState::Disconnected {
                        self.room.reset();
                    }
                },
            }
        }
    }

    /// Forward workflow events and room transitions to the event stream.
    fn publish(&mut self) {
        for event in self.chat.take_events() {
            self.emit(event);
        }

        let joined = self.room.status().joined_room();
        if joined != self.joined_room {
            if let Some(room) = self.joined_room.take() {
                self.emit(ChatEvent::RoomLost { room });
            }
            if let Some(room) = &joined {
                self.emit(ChatEvent::RoomJoined { room: room.clone() });
            }
            self.joined_room = joined;
        }
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }

    async fn shutdown(&mut self) {
        let actions = self.connection.close();
        self.execute(actions);
        self.chat.teardown();
        self.room.detach();
        if let Some(trace) = self.frame_trace.take() {
            trace.unsubscribe();
        }
        self.publish();

        while let Some(completion) = self.inflight.next().await {
            self.complete(completion);
        }
        tracing::info!(records = self.chat.len(), "chat session stopped");
    }
}

async fn reconnect_fired(reconnect: &mut Option<(TimerId, Pin<Box<Sleep>>)>) -> TimerId {
    match reconnect {
        Some((timer, sleep)) => {
            sleep.as_mut().await;
            *timer
        },
        None => std::future::pending().await,
    }
}
