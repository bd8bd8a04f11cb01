//! Text rendering for events and log records.

use qchat_client::{ChatEvent, ChatMessageRecord, Direction};
use qchat_core::ConnectionState;

fn state_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Disconnected => "disconnected",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "connected",
        ConnectionState::Closing => "closed",
    }
}

/// One line for a log record.
pub fn record_line(record: &ChatMessageRecord) -> String {
    let arrow = match record.direction {
        Direction::Sent => format!("{} -> {}", record.sender, record.receiver),
        Direction::Received => format!("{} <- {}", record.receiver, record.sender),
    };
    let body = match (&record.plaintext, &record.ciphertext) {
        (Some(text), _) => text.clone(),
        (None, Some(blob)) => format!("[encrypted {blob}]"),
        (None, None) => String::from("[empty]"),
    };
    format!("#{} {arrow}: {body}", record.id)
}

/// One line for a runtime event, or `None` for events not worth showing.
pub fn event_line(event: &ChatEvent) -> Option<String> {
    let line = match event {
        ChatEvent::ConnectionChanged { to, .. } => format!("* channel {}", state_label(*to)),
        ChatEvent::RoomJoined { room } => format!("* joined room {room}"),
        ChatEvent::RoomLost { room } => format!("* lost room {room}, /join again"),
        ChatEvent::RecordAdded(record) => record_line(record),
        // Printed from the decrypt reply, which also covers cached plaintext.
        ChatEvent::PlaintextAttached { .. } => return None,
        ChatEvent::SendDropped { action } => format!("! {action} dropped: channel not connected"),
        ChatEvent::ServerError { message } => format!("! server: {message}"),
        ChatEvent::Notification { payload } if payload.is_null() => return None,
        ChatEvent::Notification { payload } => format!("* event {payload}"),
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use qchat_client::{RecordId, RecordOrigin};

    use super::*;

    fn record(direction: Direction, plaintext: Option<&str>, ciphertext: Option<&str>) -> ChatMessageRecord {
        ChatMessageRecord {
            id: RecordId::from(4),
            direction,
            origin: RecordOrigin::Push,
            sender: 2,
            receiver: 1,
            ciphertext: ciphertext.map(str::to_owned),
            plaintext: plaintext.map(str::to_owned),
            timestamp_ms: 0,
        }
    }

    #[test]
    fn received_record_shows_ciphertext_until_decrypted() {
        let lines = [
            record_line(&record(Direction::Received, None, Some("ab12"))),
            record_line(&record(Direction::Received, Some("hello"), Some("ab12"))),
            record_line(&record(Direction::Sent, Some("hi"), None)),
        ];
        insta::assert_snapshot!(lines.join("\n"), @r"
        #4 1 <- 2: [encrypted ab12]
        #4 1 <- 2: hello
        #4 2 -> 1: hi
        ");
    }

    #[test]
    fn connection_events_use_lowercase_state() {
        let event = ChatEvent::ConnectionChanged {
            from: ConnectionState::Connecting,
            to: ConnectionState::Connected,
        };
        assert_eq!(event_line(&event).as_deref(), Some("* channel connected"));
    }

    #[test]
    fn null_notifications_are_hidden() {
        let event = ChatEvent::Notification { payload: serde_json::Value::Null };
        assert_eq!(event_line(&event), None);
    }
}
