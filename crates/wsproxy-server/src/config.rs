//! Relay server configuration

use std::time::Duration;
use wsproxy_net::TlsIdentity;
use wsproxy_relay::RelayConfig;
use wsproxy_transport_websocket::DEFAULT_RELAY_PATH;

use crate::session::SessionConfig;

/// Bound on the outbound TCP dial to a destination
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    /// Listen address (host:port)
    pub addr: String,

    /// Upgrade path
    pub path: String,

    /// Serve over TLS with this certificate and key; plaintext when `None`
    pub tls: Option<TlsIdentity>,

    /// Timeout for connecting to a destination
    pub connect_timeout: Duration,

    pub relay: RelayConfig,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            addr: "localhost:8080".to_string(),
            path: DEFAULT_RELAY_PATH.to_string(),
            tls: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            relay: RelayConfig::default(),
        }
    }
}

impl RelayServerConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        self
    }

    pub fn with_tls(mut self, identity: TlsIdentity) -> Self {
        self.tls = Some(identity);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_relay(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }

    pub(crate) fn session(&self) -> SessionConfig {
        SessionConfig {
            connect_timeout: self.connect_timeout,
            relay: self.relay.clone(),
        }
    }
}
