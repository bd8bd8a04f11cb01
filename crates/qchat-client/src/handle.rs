//! Front end to a running [`Runtime`](crate::Runtime).

use qchat_proto::NodeId;
use tokio::sync::{mpsc, oneshot};

use crate::{
    error::ClientError,
    record::{ChatMessageRecord, RecordId},
};

/// Requests from a [`ChatHandle`] to the runtime.
#[derive(Debug)]
pub(crate) enum Command {
    Join {
        room: String,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Send {
        sender: NodeId,
        receiver: NodeId,
        text: String,
        reply: oneshot::Sender<Result<RecordId, ClientError>>,
    },
    Decrypt {
        id: RecordId,
        reply: oneshot::Sender<Result<String, ClientError>>,
    },
    Records {
        reply: oneshot::Sender<Vec<ChatMessageRecord>>,
    },
    Close,
}

/// Cloneable handle for driving a chat session.
///
/// Every method fails with [`ClientError::SessionClosed`] once the runtime has
/// stopped.
#[derive(Debug, Clone)]
pub struct ChatHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ChatHandle {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self { commands }
    }

    /// Request to join `room`.
    ///
    /// Resolves once the request is sent, not when it is acknowledged; watch
    /// for [`ChatEvent::RoomJoined`](crate::ChatEvent::RoomJoined).
    pub async fn join(&self, room: impl Into<String>) -> Result<(), ClientError> {
        let room = room.into();
        self.request(|reply| Command::Join { room, reply }).await?
    }

    /// Encrypt and send a message. Resolves to the id of the sent record.
    pub async fn send_message(
        &self,
        sender: NodeId,
        receiver: NodeId,
        text: impl Into<String>,
    ) -> Result<RecordId, ClientError> {
        let text = text.into();
        self.request(|reply| Command::Send { sender, receiver, text, reply }).await?
    }

    /// Decrypt a received record. Resolves to its plaintext.
    pub async fn decrypt(&self, id: RecordId) -> Result<String, ClientError> {
        self.request(|reply| Command::Decrypt { id, reply }).await?
    }

    /// Snapshot of the message log.
    pub async fn records(&self) -> Result<Vec<ChatMessageRecord>, ClientError> {
        self.request(|reply| Command::Records { reply }).await
    }

    /// Stop the runtime.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// True once the runtime has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ClientError> {
        let (reply, response) = oneshot::channel();
        self.commands.send(command(reply)).map_err(|_| ClientError::SessionClosed)?;
        response.await.map_err(|_| ClientError::SessionClosed)
    }
}
