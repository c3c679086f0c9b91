//! Relay server: accept loop, optional TLS and the upgrade route

use axum::routing::get;
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tower::ServiceExt;
use tracing::{debug, error, info, warn};
use wsproxy_net::{bind_with_retry, BindError, ServerAcceptor, TlsError};

use crate::config::RelayServerConfig;
use crate::session::proxy_handler;

#[derive(Debug, Error)]
pub enum RelayServerError {
    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("TLS configuration error: {0}")]
    Tls(#[from] TlsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct RelayServer {
    config: RelayServerConfig,
    acceptor: ServerAcceptor,
    router: Router,
}

impl RelayServer {
    pub fn new(config: RelayServerConfig) -> Result<Self, RelayServerError> {
        let acceptor = ServerAcceptor::new(config.tls.as_ref())?;
        let router = Router::new()
            .route(&config.path, get(proxy_handler))
            .with_state(Arc::new(config.session()));

        Ok(Self {
            config,
            acceptor,
            router,
        })
    }

    pub fn config(&self) -> &RelayServerConfig {
        &self.config
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn bind(&self) -> Result<TcpListener, RelayServerError> {
        Ok(bind_with_retry(&self.config.addr).await?)
    }

    /// Bind the configured address and serve until the process stops
    pub async fn run(self) -> Result<(), RelayServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> Result<(), RelayServerError> {
        let addr = listener.local_addr()?;
        info!(
            "Relay server listening on {}://{}{}",
            self.acceptor.scheme(),
            addr,
            self.config.path
        );

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!("New connection from {}", peer_addr);

                    let acceptor = self.acceptor.clone();
                    let router = self.router.clone();
                    tokio::spawn(handle_connection(acceptor, router, stream, peer_addr));
                }
                Err(e) => {
                    error!("Failed to accept TCP connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(
    acceptor: ServerAcceptor,
    router: Router,
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

    let service = service_fn(move |req: Request<Incoming>| router.clone().oneshot(req));

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades()
        .await
    {
        debug!("Connection from {} ended: {}", peer_addr, e);
    }
}
