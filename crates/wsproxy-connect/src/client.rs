//! Proxy connection setup (plain TCP or TLS) and the CONNECT call

use std::fmt;
use std::str::FromStr;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio_util::either::Either;
use tracing::{debug, info};
use wsproxy_net::{tls, ClientTlsOptions};
use wsproxy_relay::Destination;

use crate::error::HandshakeError;
use crate::handshake::{handshake, ConnectResponse};

/// How to reach the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyScheme {
    Http,
    Https,
}

impl FromStr for ProxyScheme {
    type Err = HandshakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(ProxyScheme::Http),
            "https" => Ok(ProxyScheme::Https),
            other => Err(HandshakeError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyScheme::Http => write!(f, "http"),
            ProxyScheme::Https => write!(f, "https"),
        }
    }
}

/// Connection to the proxy, TLS-wrapped for `https`
pub type ProxyStream = Either<TcpStream, tokio_rustls::client::TlsStream<TcpStream>>;

/// An established tunnel. The reader keeps any bytes that arrived together
/// with the CONNECT response.
pub type TunnelStream = BufReader<ProxyStream>;

pub struct ConnectClient {
    scheme: ProxyScheme,
    proxy: Destination,
    tls_connector: Option<tokio_rustls::TlsConnector>,
}

impl fmt::Debug for ConnectClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectClient")
            .field("scheme", &self.scheme)
            .field("proxy", &self.proxy)
            .finish()
    }
}

impl ConnectClient {
    /// Client verifying `https` proxies against the webpki roots
    pub fn new(scheme: ProxyScheme, proxy: Destination) -> Result<Self, HandshakeError> {
        Self::with_tls_options(scheme, proxy, &ClientTlsOptions::default())
    }

    pub fn with_tls_options(
        scheme: ProxyScheme,
        proxy: Destination,
        tls_options: &ClientTlsOptions,
    ) -> Result<Self, HandshakeError> {
        let tls_connector = match scheme {
            ProxyScheme::Http => None,
            ProxyScheme::Https => {
                let config =
                    tls_options
                        .build_client_config()
                        .map_err(|e| HandshakeError::Tls {
                            address: proxy.to_string(),
                            reason: e.to_string(),
                        })?;
                Some(tokio_rustls::TlsConnector::from(config))
            }
        };

        Ok(Self {
            scheme,
            proxy,
            tls_connector,
        })
    }

    pub fn scheme(&self) -> ProxyScheme {
        self.scheme
    }

    pub fn proxy(&self) -> &Destination {
        &self.proxy
    }

    /// Open the transport connection to the proxy
    pub async fn open(&self) -> Result<ProxyStream, HandshakeError> {
        let address = self.proxy.as_str();
        debug!("Connecting to proxy {}://{}", self.scheme, address);

        let tcp_stream =
            TcpStream::connect(address)
                .await
                .map_err(|source| HandshakeError::Connect {
                    address: address.to_string(),
                    source,
                })?;
        tcp_stream.set_nodelay(true).ok();

        match &self.tls_connector {
            None => Ok(Either::Left(tcp_stream)),
            Some(connector) => {
                let server_name =
                    tls::server_name(self.proxy.host()).map_err(|e| HandshakeError::Tls {
                        address: address.to_string(),
                        reason: e.to_string(),
                    })?;
                let tls_stream = connector
                    .connect(server_name, tcp_stream)
                    .await
                    .map_err(|e| HandshakeError::Tls {
                        address: address.to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(Either::Right(tls_stream))
            }
        }
    }

    /// Open a connection to the proxy and CONNECT it to `dest`
    pub async fn connect(
        &self,
        dest: &Destination,
    ) -> Result<(TunnelStream, ConnectResponse), HandshakeError> {
        let stream = self.open().await?;
        let (tunnel, response) = handshake(stream, dest).await?;
        info!(
            "Proxy connection established to {} via {}",
            dest, self.proxy
        );
        Ok((tunnel, response))
    }
}
