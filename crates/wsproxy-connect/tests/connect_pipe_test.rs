//! CONNECT client and pipe against a fake proxy on loopback

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use wsproxy_connect::{run_pipe, ConnectClient, HandshakeError, ProxyScheme};
use wsproxy_net::{ClientTlsOptions, ServerAcceptor, TlsIdentity};
use wsproxy_relay::{Destination, RelayConfig, StreamEndpoint};

/// Fake proxy: reads one CONNECT request, answers with `response`, then
/// echoes tunnel bytes when `echo` is set.
async fn spawn_proxy(
    response: Vec<u8>,
    echo: bool,
    acceptor: ServerAcceptor,
) -> (u16, oneshot::Receiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (request_tx, request_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let stream = acceptor.accept(tcp).await.unwrap();
        let mut stream = BufReader::new(stream);

        let mut request = Vec::new();
        loop {
            let mut line = Vec::new();
            if stream.read_until(b'\n', &mut line).await.unwrap() == 0 {
                return;
            }
            request.extend_from_slice(&line);
            if line == b"\r\n" {
                break;
            }
        }
        let _ = request_tx.send(request);

        stream.get_mut().write_all(&response).await.unwrap();
        if !echo {
            stream.get_mut().shutdown().await.ok();
            return;
        }

        let (mut reader, mut writer) = tokio::io::split(stream);
        tokio::io::copy(&mut reader, &mut writer).await.ok();
        writer.shutdown().await.ok();
    });

    (port, request_rx)
}

fn local_proxy(port: u16) -> Destination {
    Destination::from_parts("127.0.0.1", &port.to_string()).unwrap()
}

#[tokio::test]
async fn test_pipe_relays_through_proxy() {
    let (port, request_rx) = spawn_proxy(
        b"HTTP/1.1 200 Connection established\r\n\r\n".to_vec(),
        true,
        ServerAcceptor::plain(),
    )
    .await;

    let client = ConnectClient::new(ProxyScheme::Http, local_proxy(port)).unwrap();
    let dest = Destination::parse("db.internal:5432").unwrap();
    let (local_io, mut user) = tokio::io::duplex(1024);

    let pipe = tokio::spawn(async move {
        run_pipe(
            &client,
            &dest,
            StreamEndpoint::new("stdio", local_io),
            &RelayConfig::default(),
        )
        .await
    });

    user.write_all(b"hello tunnel").await.unwrap();
    let mut echoed = [0u8; 12];
    user.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"hello tunnel");

    assert_eq!(
        request_rx.await.unwrap(),
        b"CONNECT db.internal:5432 HTTP/1.1\r\nHost: db.internal:5432\r\n\r\n"
    );

    user.shutdown().await.unwrap();
    let mut rest = Vec::new();
    user.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    let outcome = pipe.await.unwrap().unwrap();
    assert!(outcome.is_clean());
    assert_eq!(outcome.a_to_b.bytes, 12);
    assert_eq!(outcome.b_to_a.bytes, 12);
}

#[tokio::test]
async fn test_pipe_forbidden_relays_nothing() {
    let (port, _request_rx) = spawn_proxy(
        b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n".to_vec(),
        false,
        ServerAcceptor::plain(),
    )
    .await;

    let client = ConnectClient::new(ProxyScheme::Http, local_proxy(port)).unwrap();
    let dest = Destination::parse("example.com:22").unwrap();
    let (local_io, mut user) = tokio::io::duplex(1024);

    let result = run_pipe(
        &client,
        &dest,
        StreamEndpoint::new("stdio", local_io),
        &RelayConfig::default(),
    )
    .await;

    match result {
        Err(HandshakeError::UpstreamRejected { status, reason }) => {
            assert_eq!(status, 403);
            assert_eq!(reason, "Forbidden");
        }
        other => panic!("expected rejection, got {:?}", other),
    }

    // The local side was dropped untouched
    let mut received = Vec::new();
    user.read_to_end(&mut received).await.unwrap();
    assert!(received.is_empty());
}

#[tokio::test]
async fn test_garbage_response_is_protocol_error() {
    let (port, _request_rx) =
        spawn_proxy(b"hello there\r\n\r\n".to_vec(), false, ServerAcceptor::plain()).await;

    let client = ConnectClient::new(ProxyScheme::Http, local_proxy(port)).unwrap();
    let err = client
        .connect(&Destination::parse("example.com:443").unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, HandshakeError::Protocol(_)), "{:?}", err);
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn test_long_header_lines_are_accepted() {
    let mut response = b"HTTP/1.1 200 OK\r\nX-Padding: ".to_vec();
    response.extend(std::iter::repeat(b'a').take(64 * 1024));
    response.extend_from_slice(b"\r\n\r\n");
    let (port, _request_rx) = spawn_proxy(response, true, ServerAcceptor::plain()).await;

    let client = ConnectClient::new(ProxyScheme::Http, local_proxy(port)).unwrap();
    let (mut tunnel, response) = client
        .connect(&Destination::parse("example.com:443").unwrap())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.headers[0].1.len(), 64 * 1024);

    tunnel.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    tunnel.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");
}

#[tokio::test]
async fn test_https_proxy() {
    let dir = std::env::temp_dir().join(format!("wsproxy-connect-tls-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
    std::fs::write(dir.join("server.pem"), cert.serialize_pem().unwrap()).unwrap();
    std::fs::write(dir.join("server.key"), cert.serialize_private_key_pem()).unwrap();
    let identity = TlsIdentity::new(dir.join("server.pem"), dir.join("server.key"));

    let (port, request_rx) = spawn_proxy(
        b"HTTP/1.1 200 OK\r\n\r\n".to_vec(),
        true,
        ServerAcceptor::new(Some(&identity)).unwrap(),
    )
    .await;

    let proxy = Destination::from_parts("localhost", &port.to_string()).unwrap();
    let client =
        ConnectClient::with_tls_options(ProxyScheme::Https, proxy, &ClientTlsOptions::insecure())
            .unwrap();
    let (mut tunnel, _) = client
        .connect(&Destination::parse("internal:22").unwrap())
        .await
        .unwrap();

    assert!(request_rx
        .await
        .unwrap()
        .starts_with(b"CONNECT internal:22 HTTP/1.1\r\n"));

    tunnel.write_all(b"over tls").await.unwrap();
    let mut buf = [0u8; 8];
    tunnel.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"over tls");

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn test_proxy_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = ConnectClient::new(ProxyScheme::Http, local_proxy(port)).unwrap();
    let err = client
        .connect(&Destination::parse("example.com:443").unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, HandshakeError::Connect { .. }));
    assert_eq!(err.exit_code(), 2);
}
