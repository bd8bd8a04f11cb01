//! Line command parsing.
//!
//! Lines starting with `/` are commands; anything else is message text for
//! the last `/send` target.

use qchat_client::RecordId;
use qchat_proto::NodeId;
use thiserror::Error;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/join <node>`
    Join(String),
    /// `/send <to> <text>`
    Send { to: NodeId, text: String },
    /// `/as <sender> <to> <text>`
    SendAs { sender: NodeId, to: NodeId, text: String },
    /// `/decrypt <id>`
    Decrypt(RecordId),
    /// `/log`
    Log,
    /// `/quit`
    Quit,
    /// Bare text
    Say(String),
}

/// Input line that is not a valid command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid node id: {0}")]
    InvalidNode(String),

    #[error("invalid record id: {0}")]
    InvalidRecord(String),

    #[error("unknown command: /{0}")]
    Unknown(String),
}

const JOIN_USAGE: &str = "/join <node>";
const SEND_USAGE: &str = "/send <to> <text>";
const AS_USAGE: &str = "/as <sender> <to> <text>";
const DECRYPT_USAGE: &str = "/decrypt <id>";

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let Some(body) = line.strip_prefix('/') else {
        return Ok(Some(Command::Say(line.to_owned())));
    };

    let (name, rest) = split_word(body);
    let command = match name {
        "join" => {
            let (room, extra) = split_word(rest);
            if room.is_empty() || !extra.is_empty() {
                return Err(CommandError::Usage(JOIN_USAGE));
            }
            Command::Join(room.to_owned())
        },
        "send" => {
            let (to, text) = split_word(rest);
            if to.is_empty() || text.is_empty() {
                return Err(CommandError::Usage(SEND_USAGE));
            }
            Command::Send { to: node(to)?, text: text.to_owned() }
        },
        "as" => {
            let (sender, rest) = split_word(rest);
            let (to, text) = split_word(rest);
            if sender.is_empty() || to.is_empty() || text.is_empty() {
                return Err(CommandError::Usage(AS_USAGE));
            }
            Command::SendAs { sender: node(sender)?, to: node(to)?, text: text.to_owned() }
        },
        "decrypt" => {
            let (id, extra) = split_word(rest);
            if id.is_empty() || !extra.is_empty() {
                return Err(CommandError::Usage(DECRYPT_USAGE));
            }
            let id = id.parse::<u64>().map_err(|_| CommandError::InvalidRecord(id.to_owned()))?;
            Command::Decrypt(RecordId::from(id))
        },
        "log" => Command::Log,
        "quit" | "q" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_owned())),
    };
    Ok(Some(command))
}

/// Split off the first whitespace-delimited word; the remainder is trimmed.
fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}

fn node(word: &str) -> Result<NodeId, CommandError> {
    word.parse().map_err(|_| CommandError::InvalidNode(word.to_owned()))
}
