//! Dialing the relay server over `ws://` or `wss://`

use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::WebSocketStream;
use tokio_util::either::Either;
use tracing::{debug, info};
use wsproxy_net::{tls, TlsError};
use wsproxy_relay::Destination;

use crate::config::WebSocketConfig;

/// Transport under a relay WebSocket, TLS-wrapped for `wss://`
pub type RelayStream = Either<TcpStream, tokio_rustls::client::TlsStream<TcpStream>>;

/// An established relay WebSocket
pub type RelaySocket = WebSocketStream<RelayStream>;

#[derive(Debug, Error)]
pub enum WebSocketError {
    #[error("Invalid relay URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("TCP connect to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake with {address} failed: {source}")]
    TlsHandshake {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),
}

/// Opens one relay WebSocket per tunnel
#[derive(Clone)]
pub struct WebSocketConnector {
    config: WebSocketConfig,
    tls_connector: Option<tokio_rustls::TlsConnector>,
}

impl std::fmt::Debug for WebSocketConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnector")
            .field("relay", &self.config.relay)
            .field("path", &self.config.path)
            .field("tls", &self.tls_connector.is_some())
            .finish()
    }
}

impl WebSocketConnector {
    pub fn new(config: WebSocketConfig) -> Result<Self, WebSocketError> {
        let tls_connector = match &config.tls {
            Some(options) => {
                let client_config = options.build_client_config()?;
                Some(tokio_rustls::TlsConnector::from(Arc::clone(&client_config)))
            }
            None => None,
        };

        debug!(
            "WebSocket connector created for {}://{}{}",
            config.scheme(),
            config.relay,
            config.path
        );

        Ok(Self {
            config,
            tls_connector,
        })
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    /// Connect to the relay and ask it to open a tunnel to `dest`
    pub async fn connect(&self, dest: &Destination) -> Result<RelaySocket, WebSocketError> {
        let url = self.config.relay_url(dest)?;
        let address = self.config.relay.as_str();

        debug!("Connecting to relay {}", url);

        let tcp_stream = TcpStream::connect(address)
            .await
            .map_err(|source| WebSocketError::Connect {
                address: address.to_string(),
                source,
            })?;
        tcp_stream.set_nodelay(true).ok();

        let stream = match &self.tls_connector {
            Some(connector) => {
                let server_name = tls::server_name(self.config.relay.host())?;
                let tls_stream = connector
                    .connect(server_name, tcp_stream)
                    .await
                    .map_err(|source| WebSocketError::TlsHandshake {
                        address: address.to_string(),
                        source,
                    })?;
                Either::Right(tls_stream)
            }
            None => Either::Left(tcp_stream),
        };

        let (ws_stream, response) = tokio_tungstenite::client_async(url.as_str(), stream)
            .await
            .map_err(|e| WebSocketError::Handshake(e.to_string()))?;

        info!(
            "Relay WebSocket established to {} for {} ({})",
            address,
            dest,
            response.status()
        );

        Ok(ws_stream)
    }
}
