//! Runtime event loop with a scripted transport and control plane
//!
//! The clock is paused, so reconnect delays and control-plane latency are
//! exact. The runtime and the test script run concurrently on one task via
//! `tokio::join!`; the script always ends by closing the handle.

use std::{cell::RefCell, collections::HashMap, rc::Rc, time::Duration};

use qchat_client::{
    ChatEvent, ChatHandle, ClientConfig, ClientError, ControlError, ControlPlane, Direction,
    Runtime, Transport, TransportError,
};
use qchat_core::{ConnectionState, Environment, RetryPolicy, TransportEvent};
use qchat_proto::control::{DecryptRequest, DecryptResponse, EncryptSendRequest, EncryptSendResponse};
use tokio::{sync::mpsc, time::sleep};

#[derive(Clone)]
struct FixedClock;

impl Environment for FixedClock {
    fn wall_clock_millis(&self) -> u64 {
        7
    }
}

/// What the runtime asked the transport to do.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Wire {
    Open(String),
    Text(String),
    Release,
}

/// Transport whose events are pushed by the test.
struct ScriptedTransport {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    wire: Rc<RefCell<Vec<Wire>>>,
    open: bool,
}

impl Transport for ScriptedTransport {
    fn open(&mut self, endpoint: &str) {
        self.open = true;
        self.wire.borrow_mut().push(Wire::Open(endpoint.to_owned()));
    }

    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        self.wire.borrow_mut().push(Wire::Text(text));
        Ok(())
    }

    fn release(&mut self) {
        self.open = false;
        self.wire.borrow_mut().push(Wire::Release);
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

/// Control plane with fixed latency and a plaintext table.
struct ScriptedControl {
    latency: Duration,
    plaintexts: HashMap<String, String>,
}

impl ControlPlane for ScriptedControl {
    async fn encrypt_send(
        &self,
        _request: &EncryptSendRequest,
    ) -> Result<EncryptSendResponse, ControlError> {
        sleep(self.latency).await;
        Ok(EncryptSendResponse { ok: true })
    }

    async fn decrypt(&self, request: &DecryptRequest) -> Result<DecryptResponse, ControlError> {
        sleep(self.latency).await;
        let plaintext = self.plaintexts.get(&request.blob_hex).cloned();
        Ok(DecryptResponse { ok: plaintext.is_some(), plaintext })
    }
}

struct Harness {
    runtime: Runtime<ScriptedTransport, ScriptedControl, FixedClock>,
    handle: ChatHandle,
    events: mpsc::UnboundedReceiver<ChatEvent>,
    server: mpsc::UnboundedSender<TransportEvent>,
    wire: Rc<RefCell<Vec<Wire>>>,
}

fn harness(latency: Duration) -> Harness {
    let (server, events_rx) = mpsc::unbounded_channel();
    let wire = Rc::new(RefCell::new(Vec::new()));
    let transport = ScriptedTransport { events: events_rx, wire: Rc::clone(&wire), open: false };
    let control = ScriptedControl {
        latency,
        plaintexts: HashMap::from([("ab12".to_owned(), "hello".to_owned())]),
    };
    let config = ClientConfig { ws_url: "ws://qkd.test".into(), ..ClientConfig::default() };

    let (runtime, handle, events) = Runtime::new(&config, transport, control, FixedClock);
    Harness { runtime, handle, events, server, wire }
}

fn frame(value: &serde_json::Value) -> TransportEvent {
    TransportEvent::Message(value.to_string().into_bytes())
}

/// Let the runtime drain everything that is ready without advancing time.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

fn drain(events: &mut mpsc::UnboundedReceiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn opens(wire: &Rc<RefCell<Vec<Wire>>>) -> usize {
    wire.borrow().iter().filter(|w| matches!(w, Wire::Open(_))).count()
}

#[tokio::test(start_paused = true)]
async fn join_receive_and_decrypt() {
    let Harness { runtime, handle, mut events, server, wire } = harness(Duration::from_millis(50));

    let script = async {
        settle().await;
        assert_eq!(*wire.borrow(), vec![Wire::Open("ws://qkd.test/ws".into())]);

        server.send(TransportEvent::Opened).unwrap();
        settle().await;
        handle.join("1").await.unwrap();
        assert_eq!(wire.borrow().last(), Some(&Wire::Text(r#"{"action":"join","room":"1"}"#.into())));

        server.send(frame(&serde_json::json!({"type": "joined", "room": "1"}))).unwrap();
        server
            .send(frame(&serde_json::json!({"type": "secure_msg", "sender": 2, "blob_hex": "ab12"})))
            .unwrap();
        settle().await;

        let records = handle.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].direction, Direction::Received);

        let plaintext = handle.decrypt(records[0].id).await.unwrap();
        assert_eq!(plaintext, "hello");
        assert_eq!(handle.decrypt(records[0].id).await.unwrap(), "hello");

        handle.close();
    };

    let (result, ()) = tokio::join!(runtime.run(), script);
    result.unwrap();

    let events = drain(&mut events);
    assert!(events.contains(&ChatEvent::RoomJoined { room: "1".into() }));
    assert!(events.iter().any(|e| matches!(e, ChatEvent::RecordAdded(r) if r.sender == 2)));
    assert_eq!(
        events.iter().filter(|e| matches!(e, ChatEvent::PlaintextAttached { .. })).count(),
        1
    );
    assert_eq!(wire.borrow().last(), Some(&Wire::Release));
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_retry_delay() {
    let Harness { runtime, handle, mut events, server, wire } = harness(Duration::ZERO);

    let script = async {
        settle().await;
        server.send(TransportEvent::Opened).unwrap();
        settle().await;
        handle.join("1").await.unwrap();
        server.send(frame(&serde_json::json!({"type": "joined", "room": "1"}))).unwrap();
        settle().await;

        server.send(TransportEvent::Closed { reason: Some("restart".into()) }).unwrap();
        settle().await;
        assert_eq!(opens(&wire), 1);

        sleep(Duration::from_millis(1_900)).await;
        assert_eq!(opens(&wire), 1);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(opens(&wire), 2);

        handle.close();
    };

    let (result, ()) = tokio::join!(runtime.run(), script);
    result.unwrap();

    let events = drain(&mut events);
    let transitions: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::ConnectionChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Closing,
        ]
    );
    assert!(events.contains(&ChatEvent::RoomLost { room: "1".into() }));
}

#[tokio::test(start_paused = true)]
async fn custom_retry_policy_is_used() {
    let (server, events_rx) = mpsc::unbounded_channel();
    let wire = Rc::new(RefCell::new(Vec::new()));
    let transport = ScriptedTransport { events: events_rx, wire: Rc::clone(&wire), open: false };
    let control = ScriptedControl { latency: Duration::ZERO, plaintexts: HashMap::new() };
    let config = ClientConfig {
        retry: RetryPolicy::Fixed(Duration::from_millis(500)),
        ..ClientConfig::default()
    };
    let (runtime, handle, _events) = Runtime::new(&config, transport, control, FixedClock);

    let script = async {
        settle().await;
        server.send(TransportEvent::Error("refused".into())).unwrap();
        settle().await;

        sleep(Duration::from_millis(450)).await;
        assert_eq!(opens(&wire), 1);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(opens(&wire), 2);

        handle.close();
    };

    let (result, ()) = tokio::join!(runtime.run(), script);
    result.unwrap();
}

#[tokio::test(start_paused = true)]
async fn join_while_disconnected_is_dropped() {
    let Harness { runtime, handle, mut events, wire, server: _server } = harness(Duration::ZERO);

    let script = async {
        settle().await;
        handle.join("1").await.unwrap();
        handle.close();
    };

    let (result, ()) = tokio::join!(runtime.run(), script);
    result.unwrap();

    assert!(!wire.borrow().iter().any(|w| matches!(w, Wire::Text(_))));
    assert!(drain(&mut events).contains(&ChatEvent::SendDropped { action: "join" }));
}

#[tokio::test(start_paused = true)]
async fn send_completing_after_close_is_discarded() {
    let Harness { runtime, handle, mut events, server, .. } = harness(Duration::from_secs(5));

    let script = async {
        settle().await;
        server.send(TransportEvent::Opened).unwrap();
        settle().await;

        let closer = async {
            sleep(Duration::from_secs(1)).await;
            handle.close();
        };
        let (sent, ()) = tokio::join!(handle.send_message(1, 2, "late"), closer);
        assert_eq!(sent, Err(ClientError::SessionClosed));
    };

    let (result, ()) = tokio::join!(runtime.run(), script);
    result.unwrap();

    assert!(!drain(&mut events).iter().any(|e| matches!(e, ChatEvent::RecordAdded(_))));
    assert_eq!(handle.records().await, Err(ClientError::SessionClosed));
}

#[tokio::test(start_paused = true)]
async fn sends_complete_in_any_order() {
    let Harness { runtime, handle, server, .. } = harness(Duration::from_millis(10));

    let script = async {
        settle().await;
        server.send(TransportEvent::Opened).unwrap();

        let (a, b) = tokio::join!(
            handle.send_message(1, 2, "first"),
            handle.send_message(1, 3, "second"),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a, b);

        let records = handle.records().await.unwrap();
        let texts: Vec<_> = records.iter().map(|r| r.plaintext.clone().unwrap_or_default()).collect();
        assert_eq!(records.len(), 2);
        assert!(texts.contains(&"first".to_owned()));
        assert!(texts.contains(&"second".to_owned()));

        handle.close();
    };

    let (result, ()) = tokio::join!(runtime.run(), script);
    result.unwrap();
}

#[tokio::test(start_paused = true)]
async fn runtime_stops_when_handles_dropped() {
    let Harness { runtime, handle, wire, .. } = harness(Duration::ZERO);
    drop(handle);

    runtime.run().await.unwrap();

    assert_eq!(wire.borrow().last(), Some(&Wire::Release));
}
