//! Client → front-end → relay server → destination over loopback

use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use wsproxy_front::{FrontEndConfig, ProxyFrontEnd};
use wsproxy_relay::Destination;
use wsproxy_server::{RelayServer, RelayServerConfig};
use wsproxy_transport_websocket::WebSocketConfig;

/// Echo destination for one connection; reports the bytes it copied once
/// the connection has ended
async fn start_echo() -> (String, oneshot::Receiver<u64>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let (mut reader, mut writer) = stream.split();
        let copied = tokio::io::copy(&mut reader, &mut writer).await.unwrap_or(0);
        writer.shutdown().await.ok();
        let _ = done_tx.send(copied);
    });

    (addr, done_rx)
}

async fn start_relay_server() -> String {
    let server = RelayServer::new(RelayServerConfig::new("127.0.0.1:0")).unwrap();
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(server.serve(listener));
    addr
}

async fn start_front_end(relay_addr: &str) -> String {
    let relay = WebSocketConfig::new(Destination::parse(relay_addr).unwrap()).without_tls();
    let front = ProxyFrontEnd::new(FrontEndConfig::new("127.0.0.1:0", relay)).unwrap();
    let listener = front.bind().await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(front.serve(listener));
    addr
}

/// Address nothing listens on
async fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}

/// Read a response status line and headers, returning them as text
async fn read_head<R: AsyncBufRead + Unpin>(reader: &mut R) -> String {
    let mut head = String::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await.unwrap();
        assert!(n > 0, "connection closed inside response head: {:?}", head);
        head.push_str(&line);
        if line == "\r\n" {
            return head;
        }
    }
}

#[tokio::test]
async fn test_connect_tunnel_end_to_end() {
    let (echo, done_rx) = start_echo().await;
    let relay = start_relay_server().await;
    let front = start_front_end(&relay).await;

    let mut client = BufReader::new(TcpStream::connect(&front).await.unwrap());
    client
        .get_mut()
        .write_all(format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n\r\n", echo).as_bytes())
        .await
        .unwrap();

    let head = read_head(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 200"), "{}", head);

    client.get_mut().write_all(b"ping over the tunnel").await.unwrap();
    let mut echoed = [0u8; 20];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"ping over the tunnel");

    // Client goes away: every leg shuts down and the client sees EOF
    client.get_mut().shutdown().await.unwrap();
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert!(rest.is_empty());

    // The destination connection is closed too
    let copied = tokio::time::timeout(Duration::from_secs(5), done_rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(copied, 20);
}

#[tokio::test]
async fn test_connect_relay_unreachable_is_503() {
    let relay = closed_port().await;
    let front = start_front_end(&relay).await;

    let mut client = BufReader::new(TcpStream::connect(&front).await.unwrap());
    client
        .get_mut()
        .write_all(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n")
        .await
        .unwrap();

    let head = read_head(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 503"), "{}", head);
}

#[tokio::test]
async fn test_connect_without_port_is_400() {
    let front = start_front_end(&closed_port().await).await;

    let mut client = BufReader::new(TcpStream::connect(&front).await.unwrap());
    client
        .get_mut()
        .write_all(b"CONNECT example.com HTTP/1.1\r\nHost: example.com\r\n\r\n")
        .await
        .unwrap();

    let head = read_head(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 400"), "{}", head);
}

#[tokio::test]
async fn test_plain_request_passthrough() {
    let origin = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin_addr = origin.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let (stream, _) = origin.accept().await.unwrap();
        let mut stream = BufReader::new(stream);
        read_head(&mut stream).await;
        stream
            .get_mut()
            .write_all(
                b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nX-Origin: yes\r\nConnection: close\r\n\r\nhello",
            )
            .await
            .unwrap();
    });

    let front = start_front_end(&closed_port().await).await;
    let mut client = TcpStream::connect(&front).await.unwrap();
    client
        .write_all(
            format!(
                "GET http://{0}/index HTTP/1.1\r\nHost: {0}\r\nConnection: close\r\n\r\n",
                origin_addr
            )
            .as_bytes(),
        )
        .await
        .unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
    assert!(response.contains("X-Origin: yes"), "{}", response);
    assert!(response.ends_with("hello"), "{}", response);
}

#[tokio::test]
async fn test_plain_request_unreachable_is_503() {
    let origin = closed_port().await;
    let front = start_front_end(&closed_port().await).await;

    let mut client = BufReader::new(TcpStream::connect(&front).await.unwrap());
    client
        .get_mut()
        .write_all(format!("GET http://{0}/ HTTP/1.1\r\nHost: {0}\r\n\r\n", origin).as_bytes())
        .await
        .unwrap();

    let head = read_head(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 503"), "{}", head);
}
