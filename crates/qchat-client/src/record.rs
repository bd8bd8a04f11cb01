//! Ordered chat message log.
//!
//! # Invariants
//!
//! - Record ids are assigned by the log, strictly increasing in append order.
//! - Ciphertext is fixed when a record is created.
//! - Plaintext is set at most once and never overwritten.
//! - Records are never removed.

use std::fmt;

use qchat_proto::NodeId;
use serde::Serialize;

/// Identifies one record within a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RecordId(u64);

impl RecordId {
    /// Raw numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which way a message travelled relative to the local node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Sent by the joined node
    Sent,
    /// Addressed to the joined node
    Received,
}

/// What produced a record.
///
/// A single outgoing message can appear twice: once as [`RecordOrigin::LocalSend`]
/// when the control plane accepts it, and again as
/// [`RecordOrigin::DeliveryReceipt`] when the server confirms the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    /// Appended after a successful encrypt-and-send call
    LocalSend,
    /// Built from a `delivered` push
    DeliveryReceipt,
    /// Built from a `secure_msg` push
    Push,
}

/// One entry of the message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessageRecord {
    /// Log-assigned id
    pub id: RecordId,
    /// Sent or received
    pub direction: Direction,
    /// What produced the record
    pub origin: RecordOrigin,
    /// Sending node
    pub sender: NodeId,
    /// Receiving node
    pub receiver: NodeId,
    /// Hex ciphertext, when the record came from a push frame
    pub ciphertext: Option<String>,
    /// Plaintext, once known
    pub plaintext: Option<String>,
    /// Wall-clock creation time, milliseconds since the Unix epoch
    pub timestamp_ms: u64,
}

impl ChatMessageRecord {
    /// True for a received record whose plaintext has not been recovered yet.
    pub fn needs_decrypt(&self) -> bool {
        self.direction == Direction::Received && self.ciphertext.is_some() && self.plaintext.is_none()
    }
}

/// Record contents before the log assigns an id.
#[derive(Debug, Clone)]
pub(crate) struct NewRecord {
    pub direction: Direction,
    pub origin: RecordOrigin,
    pub sender: NodeId,
    pub receiver: NodeId,
    pub ciphertext: Option<String>,
    pub plaintext: Option<String>,
    pub timestamp_ms: u64,
}

impl NewRecord {
    /// Ciphertext pushed to the joined node.
    pub fn pushed(sender: NodeId, receiver: NodeId, blob_hex: String, timestamp_ms: u64) -> Self {
        Self {
            direction: Direction::Received,
            origin: RecordOrigin::Push,
            sender,
            receiver,
            ciphertext: Some(blob_hex),
            plaintext: None,
            timestamp_ms,
        }
    }

    /// Server confirmation that the joined node's message was relayed.
    pub fn receipt(sender: NodeId, to: NodeId, blob_hex: String, timestamp_ms: u64) -> Self {
        Self {
            direction: Direction::Sent,
            origin: RecordOrigin::DeliveryReceipt,
            sender,
            receiver: to,
            ciphertext: Some(blob_hex),
            plaintext: None,
            timestamp_ms,
        }
    }

    /// Message accepted by the control plane.
    pub fn local_send(sender: NodeId, receiver: NodeId, text: String, timestamp_ms: u64) -> Self {
        Self {
            direction: Direction::Sent,
            origin: RecordOrigin::LocalSend,
            sender,
            receiver,
            ciphertext: None,
            plaintext: Some(text),
            timestamp_ms,
        }
    }
}

/// Outcome of attaching plaintext to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Attach {
    /// Plaintext was stored
    Stored,
    /// Record already had plaintext; it was kept
    Kept(String),
    /// No record with that id
    Unknown,
}

/// Append-only, id-ordered message log.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    records: Vec<ChatMessageRecord>,
    next_id: u64,
}

impl MessageLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[ChatMessageRecord] {
        &self.records
    }

    /// Look up a record by id.
    pub fn get(&self, id: RecordId) -> Option<&ChatMessageRecord> {
        self.position(id).map(|i| &self.records[i])
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the log has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn append(&mut self, record: NewRecord) -> &ChatMessageRecord {
        let id = RecordId(self.next_id);
        self.next_id += 1;

        self.records.push(ChatMessageRecord {
            id,
            direction: record.direction,
            origin: record.origin,
            sender: record.sender,
            receiver: record.receiver,
            ciphertext: record.ciphertext,
            plaintext: record.plaintext,
            timestamp_ms: record.timestamp_ms,
        });
        &self.records[self.records.len() - 1]
    }

    pub(crate) fn attach_plaintext(&mut self, id: RecordId, plaintext: String) -> Attach {
        let Some(index) = self.position(id) else {
            return Attach::Unknown;
        };
        let record = &mut self.records[index];

        match &record.plaintext {
            Some(existing) => Attach::Kept(existing.clone()),
            None => {
                record.plaintext = Some(plaintext);
                Attach::Stored
            },
        }
    }

    fn position(&self, id: RecordId) -> Option<usize> {
        self.records.binary_search_by_key(&id, |r| r.id).ok()
    }
}
