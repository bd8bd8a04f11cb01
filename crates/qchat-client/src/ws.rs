//! WebSocket transport.
//!
//! Each socket runs in its own task and talks to the [`WsTransport`] through
//! channels. Every event is tagged with the generation of the socket that
//! produced it, so events from a replaced socket are dropped instead of being
//! mistaken for the current one.

use futures::{SinkExt, StreamExt};
use qchat_core::TransportEvent;
use tokio::{sync::mpsc, task::AbortHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::transport::{Transport, TransportError};

struct Socket {
    outgoing: mpsc::UnboundedSender<String>,
    abort: AbortHandle,
}

/// [`Transport`] over `tokio-tungstenite`.
pub struct WsTransport {
    events_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    events_rx: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    socket: Option<Socket>,
    generation: u64,
}

impl WsTransport {
    /// Create a transport with no socket.
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self { events_tx, events_rx, socket: None, generation: 0 }
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for WsTransport {
    fn open(&mut self, endpoint: &str) {
        if let Some(previous) = self.socket.take() {
            previous.abort.abort();
        }

        self.generation += 1;
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(
            endpoint.to_owned(),
            self.generation,
            outgoing_rx,
            self.events_tx.clone(),
        ));

        tracing::debug!(%endpoint, generation = self.generation, "opening socket");
        self.socket = Some(Socket { outgoing, abort: task.abort_handle() });
    }

    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::NotOpen)?;
        socket.outgoing.send(text).map_err(|_| TransportError::Closed)
    }

    fn release(&mut self) {
        // Dropping the sender lets the socket task send a close frame.
        if self.socket.take().is_some() {
            tracing::debug!(generation = self.generation, "releasing socket");
        }
        self.generation += 1;
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            let (generation, event) = self.events_rx.recv().await?;
            if generation == self.generation {
                return Some(event);
            }
            tracing::trace!(generation, ?event, "dropping event from replaced socket");
        }
    }
}

async fn run_socket(
    endpoint: String,
    generation: u64,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<(u64, TransportEvent)>,
) {
    let emit = |event| {
        let _ = events.send((generation, event));
    };

    let stream = match connect_async(endpoint.as_str()).await {
        Ok((stream, _)) => stream,
        Err(error) => {
            emit(TransportEvent::Error(error.to_string()));
            return;
        },
    };
    emit(TransportEvent::Opened);

    let (mut sink, mut stream) = stream.split();
    loop {
        tokio::select! {
            text = outgoing.recv() => {
                let Some(text) = text else {
                    let _ = sink.close().await;
                    return;
                };
                if let Err(error) = sink.send(Message::text(text)).await {
                    emit(TransportEvent::Error(error.to_string()));
                    return;
                }
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    emit(TransportEvent::Message(text.as_str().as_bytes().to_vec()));
                },
                Some(Ok(Message::Binary(bytes))) => emit(TransportEvent::Message(bytes.to_vec())),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| f.reason.as_str().to_owned());
                    emit(TransportEvent::Closed { reason });
                    return;
                },
                Some(Ok(_)) => {},
                Some(Err(error)) => {
                    emit(TransportEvent::Error(error.to_string()));
                    return;
                },
                None => {
                    emit(TransportEvent::Closed { reason: None });
                    return;
                },
            },
        }
    }
}
