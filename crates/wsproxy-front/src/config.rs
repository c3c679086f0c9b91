//! Front-end configuration

use wsproxy_net::TlsIdentity;
use wsproxy_relay::RelayConfig;
use wsproxy_transport_websocket::WebSocketConfig;

pub const DEFAULT_LISTEN_ADDR: &str = "localhost:8888";

#[derive(Debug, Clone)]
pub struct FrontEndConfig {
    /// Listen address (host:port)
    pub listen: String,

    /// Serve the proxy itself over TLS; plaintext when `None`
    pub tls: Option<TlsIdentity>,

    /// How to reach the remote relay server
    pub relay: WebSocketConfig,

    pub relay_config: RelayConfig,
}

impl FrontEndConfig {
    pub fn new(listen: impl Into<String>, relay: WebSocketConfig) -> Self {
        Self {
            listen: listen.into(),
            tls: None,
            relay,
            relay_config: RelayConfig::default(),
        }
    }

    pub fn with_tls(mut self, identity: TlsIdentity) -> Self {
        self.tls = Some(identity);
        self
    }

    pub fn with_relay_config(mut self, relay_config: RelayConfig) -> Self {
        self.relay_config = relay_config;
        self
    }
}
