//! Listener helpers: bind with retry and accept with optional TLS

use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::either::Either;
use tracing::{info, warn};

use crate::tls::{TlsError, TlsIdentity};

const BIND_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum BindError {
    #[error("Failed to bind to {address}: {reason}\n\nTroubleshooting:\n  • Check if another process is using this port\n  • Try using a different address or port")]
    Bind { address: String, reason: String },

    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// Bind a TCP listener, retrying while the address is still in use
/// (e.g. a previous instance left it in TIME_WAIT).
pub async fn bind_with_retry(address: &str) -> Result<TcpListener, BindError> {
    for attempt in 1..=BIND_ATTEMPTS {
        match TcpListener::bind(address).await {
            Ok(listener) => {
                if attempt > 1 {
                    info!(
                        "Successfully bound to {} on attempt {}/{}",
                        address, attempt, BIND_ATTEMPTS
                    );
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse && attempt < BIND_ATTEMPTS => {
                warn!(
                    "{} is in use (attempt {}/{}), retrying in 1 second...",
                    address, attempt, BIND_ATTEMPTS
                );
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(e) => {
                return Err(BindError::Bind {
                    address: address.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Err(BindError::Bind {
        address: address.to_string(),
        reason: format!("Address in use after {} retry attempts", BIND_ATTEMPTS),
    })
}

/// An accepted connection, TLS-wrapped when the listener has an identity
pub type ServerStream = Either<TcpStream, tokio_rustls::server::TlsStream<TcpStream>>;

/// Turns accepted TCP connections into [`ServerStream`]s
#[derive(Clone)]
pub struct ServerAcceptor {
    tls: Option<tokio_rustls::TlsAcceptor>,
}

impl std::fmt::Debug for ServerAcceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerAcceptor")
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl ServerAcceptor {
    pub fn plain() -> Self {
        Self { tls: None }
    }

    pub fn new(identity: Option<&TlsIdentity>) -> Result<Self, TlsError> {
        let tls = identity.map(TlsIdentity::build_acceptor).transpose()?;
        Ok(Self { tls })
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    pub fn scheme(&self) -> &'static str {
        if self.is_tls() {
            "https"
        } else {
            "http"
        }
    }

    pub async fn accept(&self, stream: TcpStream) -> io::Result<ServerStream> {
        match &self.tls {
            Some(acceptor) => Ok(Either::Right(acceptor.accept(stream).await?)),
            None => Ok(Either::Left(stream)),
        }
    }
}
