//! Proxy server: accept loop, CONNECT tunneling and plain HTTP passthrough

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::upgrade::OnUpgrade;
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;
use wsproxy_net::{bind_with_retry, BindError, ServerAcceptor, TlsError};
use wsproxy_relay::{relay, Destination, RelayConfig, StreamEndpoint};
use wsproxy_transport_websocket::{MessageEndpoint, WebSocketConnector, WebSocketError};

use crate::config::FrontEndConfig;

type ProxyBody = BoxBody<Bytes, hyper::Error>;

#[derive(Debug, Error)]
pub enum FrontEndError {
    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("TLS configuration error: {0}")]
    Tls(#[from] TlsError),

    #[error("Relay connector error: {0}")]
    Connector(#[from] WebSocketError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ProxyFrontEnd {
    listen: String,
    acceptor: ServerAcceptor,
    handler: Arc<RequestHandler>,
}

impl ProxyFrontEnd {
    pub fn new(config: FrontEndConfig) -> Result<Self, FrontEndError> {
        let acceptor = ServerAcceptor::new(config.tls.as_ref())?;
        let connector = WebSocketConnector::new(config.relay)?;
        let http_client = Client::builder(TokioExecutor::new()).build_http();

        Ok(Self {
            listen: config.listen,
            acceptor,
            handler: Arc::new(RequestHandler {
                connector,
                http_client,
                relay_config: config.relay_config,
            }),
        })
    }

    pub async fn bind(&self) -> Result<TcpListener, FrontEndError> {
        Ok(bind_with_retry(&self.listen).await?)
    }

    /// Bind the configured address and serve until the process stops
    pub async fn run(self) -> Result<(), FrontEndError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> Result<(), FrontEndError> {
        let addr = listener.local_addr()?;
        let relay = self.handler.connector.config();
        info!(
            "Proxy listening on {}://{}, relaying through {}://{}{}",
            self.acceptor.scheme(),
            addr,
            relay.scheme(),
            relay.relay,
            relay.path
        );

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!("New connection from {}", peer_addr);

                    let acceptor = self.acceptor.clone();
                    let handler = self.handler.clone();
                    tokio::spawn(handle_connection(acceptor, handler, stream, peer_addr));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(
    acceptor: ServerAcceptor,
    handler: Arc<RequestHandler>,
    stream: TcpStream,
    peer_addr: SocketAddr,
) {
    let stream = match acceptor.accept(stream).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("TLS handshake with {} failed: {}", peer_addr, e);
            return;
        }
    };

    let service = service_fn(move |req| {
        let handler = handler.clone();
        async move { Ok::<_, Infallible>(handler.handle(req).await) }
    });

    if let Err(e) = http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades()
        .await
    {
        debug!("Connection from {} ended: {:?}", peer_addr, e);
    }
}

struct RequestHandler {
    connector: WebSocketConnector,
    http_client: Client<HttpConnector, ProxyBody>,
    relay_config: RelayConfig,
}

impl RequestHandler {
    async fn handle(&self, req: Request<Incoming>) -> Response<ProxyBody> {
        debug!("Proxying request: {} {}", req.method(), req.uri());

        if req.method() == Method::CONNECT {
            self.tunnel(req).await
        } else {
            self.passthrough(req).await
        }
    }

    /// Open a relay WebSocket for the CONNECT target, answer 200 and relay
    /// the taken-over client connection against it
    async fn tunnel(&self, mut req: Request<Incoming>) -> Response<ProxyBody> {
        let dest = match req
            .uri()
            .authority()
            .map(|authority| Destination::parse(authority.as_str()))
        {
            Some(Ok(dest)) => dest,
            _ => {
                warn!("CONNECT host is not socket addr: {:?}", req.uri());
                return status_response(
                    StatusCode::BAD_REQUEST,
                    "CONNECT must be to a socket address",
                );
            }
        };

        let Some(on_upgrade) = req.extensions_mut().remove::<OnUpgrade>() else {
            warn!("Hijacking not supported");
            return status_response(StatusCode::INTERNAL_SERVER_ERROR, "Hijacking not supported");
        };

        let ws = match self.connector.connect(&dest).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("Relay connection for {} failed: {}", dest, e);
                return status_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string());
            }
        };

        let relay_config = self.relay_config.clone();
        let span = info_span!("tunnel", id = %Uuid::new_v4(), dest = %dest);
        tokio::spawn(
            async move {
                match on_upgrade.await {
                    Ok(upgraded) => {
                        let outcome = relay(
                            MessageEndpoint::new("relay", ws),
                            StreamEndpoint::new("client", TokioIo::new(upgraded)),
                            &relay_config,
                        )
                        .await;
                        debug!("Done, clean: {}", outcome.is_clean());
                    }
                    Err(e) => warn!("upgrade error: {}", e),
                }
            }
            .instrument(span),
        );

        Response::new(empty())
    }

    /// Forward a non-CONNECT request to its own target
    async fn passthrough(&self, req: Request<Incoming>) -> Response<ProxyBody> {
        let uri = req.uri().clone();
        match self.http_client.request(req.map(|body| body.boxed())).await {
            Ok(response) => response.map(|body| body.boxed()),
            Err(e) => {
                warn!("Passthrough to {} failed: {}", uri, e);
                status_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
        }
    }
}

fn status_response<T: Into<Bytes>>(status: StatusCode, body: T) -> Response<ProxyBody> {
    let mut response = Response::new(full(body));
    *response.status_mut() = status;
    response
}

fn empty() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

fn full<T: Into<Bytes>>(chunk: T) -> ProxyBody {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}
