//! Interactive prompt state.
//!
//! Tracks which node is speaking and who bare text goes to, and turns parsed
//! commands into requests for the chat handle.

use qchat_client::RecordId;
use qchat_proto::NodeId;
use thiserror::Error;

use crate::commands::Command;

/// Work for the chat handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Join(String),
    Send { sender: NodeId, receiver: NodeId, text: String },
    Decrypt(RecordId),
    Log,
    Quit,
}

/// Command that cannot be resolved with the current prompt state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    #[error("no sender: /join <node> first or start with --node")]
    NoSender,

    #[error("no recipient yet: use /send <to> <text>")]
    NoRecipient,
}

#[derive(Debug, Default)]
pub struct Prompt {
    default_node: Option<NodeId>,
    joined: Option<NodeId>,
    target: Option<NodeId>,
}

impl Prompt {
    pub fn new(default_node: Option<NodeId>) -> Self {
        Self { default_node, ..Self::default() }
    }

    pub fn resolve(&mut self, command: Command) -> Result<Request, PromptError> {
        let request = match command {
            Command::Join(room) => {
                if let Ok(node) = room.parse() {
                    self.joined = Some(node);
                }
                Request::Join(room)
            },
            Command::Send { to, text } => {
                let sender = self.sender()?;
                self.target = Some(to);
                Request::Send { sender, receiver: to, text }
            },
            Command::SendAs { sender, to, text } => {
                self.target = Some(to);
                Request::Send { sender, receiver: to, text }
            },
            Command::Say(text) => {
                let receiver = self.target.ok_or(PromptError::NoRecipient)?;
                Request::Send { sender: self.sender()?, receiver, text }
            },
            Command::Decrypt(id) => Request::Decrypt(id),
            Command::Log => Request::Log,
            Command::Quit => Request::Quit,
        };
        Ok(request)
    }

    fn sender(&self) -> Result<NodeId, PromptError> {
        self.joined.or(self.default_node).ok_or(PromptError::NoSender)
    }
}
