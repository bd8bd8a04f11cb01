//! HTTP control plane against a one-shot local responder

use std::time::Duration;

use qchat_client::{ClientConfig, ControlError, ControlPlane, http::HttpControlPlane};
use qchat_proto::control::{DecryptRequest, DecryptResponse, EncryptSendRequest, EncryptSendResponse};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    task::JoinHandle,
};

/// Request line and body seen by the responder.
#[derive(Debug)]
struct Captured {
    request_line: String,
    body: serde_json::Value,
}

/// Accept one connection, answer it with `status` and `body`, and hand back
/// what the client sent.
async fn respond_once(status: &'static str, body: &'static str) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let api_url = format!("http://{}", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut chunk = [0u8; 1024];

        let (head_len, content_length) = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client hung up before sending headers");
            raw.extend_from_slice(&chunk[..n]);
            if let Some(end) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&raw[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .map_or(0, |value| value.trim().parse::<usize>().unwrap());
                break (end + 4, length);
            }
        };
        while raw.len() < head_len + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client hung up before sending body");
            raw.extend_from_slice(&chunk[..n]);
        }

        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();

        let head = String::from_utf8_lossy(&raw[..head_len]).into_owned();
        Captured {
            request_line: head.lines().next().unwrap_or_default().to_owned(),
            body: serde_json::from_slice(&raw[head_len..head_len + content_length]).unwrap(),
        }
    });

    (api_url, server)
}

fn client(api_url: String) -> HttpControlPlane {
    let config = ClientConfig { api_url, request_timeout: Duration::from_secs(5), ..ClientConfig::default() };
    HttpControlPlane::new(&config).unwrap()
}

#[tokio::test]
async fn encrypt_send_posts_json_body() {
    let (api_url, server) = respond_once("200 OK", r#"{"ok":true}"#).await;

    let request = EncryptSendRequest { sender: 0, receiver: 1, message: "hi".into() };
    let response = client(api_url).encrypt_send(&request).await.unwrap();

    assert_eq!(response, EncryptSendResponse { ok: true });
    let captured = server.await.unwrap();
    assert_eq!(captured.request_line, "POST /chat/send HTTP/1.1");
    assert_eq!(captured.body, serde_json::json!({"sender": 0, "receiver": 1, "message": "hi"}));
}

#[tokio::test]
async fn decrypt_returns_plaintext() {
    let (api_url, server) = respond_once("200 OK", r#"{"ok":true,"plaintext":"hello"}"#).await;

    let request = DecryptRequest { owner: 1, peer: 2, blob_hex: "ab12".into() };
    let response = client(api_url).decrypt(&request).await.unwrap();

    assert_eq!(response, DecryptResponse { ok: true, plaintext: Some("hello".into()) });
    let captured = server.await.unwrap();
    assert_eq!(captured.request_line, "POST /chat/decrypt HTTP/1.1");
    assert_eq!(captured.body, serde_json::json!({"owner": 1, "peer": 2, "blob_hex": "ab12"}));
}

#[tokio::test]
async fn error_status_carries_response_body() {
    let (api_url, server) = respond_once("500 Internal Server Error", "key pool exhausted").await;

    let request = EncryptSendRequest { sender: 0, receiver: 1, message: "hi".into() };
    let error = client(api_url).encrypt_send(&request).await.unwrap_err();

    assert_eq!(error, ControlError::Http { status: 500, message: "key pool exhausted".into() });
    assert_eq!(error.to_string(), "key pool exhausted");
    server.await.unwrap();
}

#[tokio::test]
async fn error_status_without_body_uses_status_line() {
    let (api_url, server) = respond_once("503 Service Unavailable", "").await;

    let request = DecryptRequest { owner: 1, peer: 2, blob_hex: "ab12".into() };
    let error = client(api_url).decrypt(&request).await.unwrap_err();

    assert_eq!(error, ControlError::Http { status: 503, message: "HTTP 503".into() });
    server.await.unwrap();
}

#[tokio::test]
async fn unparseable_success_body_is_invalid_response() {
    let (api_url, server) = respond_once("200 OK", "<html>proxy</html>").await;

    let request = EncryptSendRequest { sender: 0, receiver: 1, message: "hi".into() };
    let error = client(api_url).encrypt_send(&request).await.unwrap_err();

    assert!(matches!(error, ControlError::InvalidResponse(_)), "got {error:?}");
    server.await.unwrap();
}

#[tokio::test]
async fn unreachable_service_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let api_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let request = EncryptSendRequest { sender: 0, receiver: 1, message: "hi".into() };
    let error = client(api_url).encrypt_send(&request).await.unwrap_err();

    assert!(matches!(error, ControlError::Transport(_)), "got {error:?}");
}
