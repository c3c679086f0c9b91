//! Relay server end-to-end tests over loopback

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use wsproxy_server::{RelayServer, RelayServerConfig};

/// Start a relay server on an ephemeral port, returning its address
async fn start_relay() -> String {
    let server = RelayServer::new(RelayServerConfig::new("127.0.0.1:0")).unwrap();
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(server.serve(listener));
    addr
}

/// Echo one TCP connection; reports once the peer has half-closed
async fn start_echo() -> (String, oneshot::Receiver<usize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let (mut reader, mut writer) = stream.split();
        let copied = tokio::io::copy(&mut reader, &mut writer).await.unwrap_or(0);
        writer.shutdown().await.ok();
        let _ = done_tx.send(copied as usize);
    });

    (addr, done_rx)
}

#[tokio::test]
async fn test_relays_websocket_to_destination() {
    let relay = start_relay().await;
    let (echo, done_rx) = start_echo().await;

    let url = format!("ws://{}/proxy?dest={}", relay, echo);
    let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

    ws.send(Message::Binary(b"hello relay".to_vec())).await.unwrap();
    match ws.next().await.unwrap().unwrap() {
        Message::Binary(data) => assert_eq!(data, b"hello relay"),
        other => panic!("expected binary message, got {:?}", other),
    }

    ws.send(Message::Close(Some(CloseFrame {
        code: CloseCode::Away,
        reason: "client has closed connection".into(),
    })))
    .await
    .unwrap();

    // The destination sees end-of-stream once the websocket goes away
    let copied = tokio::time::timeout(Duration::from_secs(5), done_rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(copied, 11);
}

#[tokio::test]
async fn test_empty_dest_closes_without_dialing() {
    let relay = start_relay().await;

    for url in [
        format!("ws://{}/proxy?dest=", relay),
        format!("ws://{}/proxy", relay),
    ] {
        let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        match ws.next().await {
            Some(Ok(Message::Close(Some(frame)))) => {
                assert_eq!(frame.code, CloseCode::Error);
                assert_eq!(frame.reason, "Empty dest");
            }
            other => panic!("expected close frame, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_plain_get_is_rejected() {
    let relay = start_relay().await;

    let mut stream = tokio::net::TcpStream::connect(&relay).await.unwrap();
    stream
        .write_all(b"GET /proxy?dest=example.com:80 HTTP/1.1\r\nHost: relay\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 4"), "{}", response);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let relay = start_relay().await;

    let result = tokio_tungstenite::connect_async(format!("ws://{}/other?dest=a:1", relay)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_malformed_query_refuses_upgrade() {
    use tokio_tungstenite::tungstenite::Error;

    let relay = start_relay().await;

    let url = format!("ws://{}/proxy?dest=a:1&dest=b:2", relay);
    match tokio_tungstenite::connect_async(url.as_str()).await {
        Err(Error::Http(response)) => assert_eq!(response.status(), 400),
        other => panic!("expected HTTP 400, got {:?}", other.map(|_| ())),
    }
}
