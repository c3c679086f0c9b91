//! WebSocket relay dial configuration

use url::Url;
use wsproxy_net::ClientTlsOptions;
use wsproxy_relay::Destination;

use crate::connector::WebSocketError;

/// Path the relay server upgrades on unless configured otherwise
pub const DEFAULT_RELAY_PATH: &str = "/proxy";

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Relay server address (host:port)
    pub relay: Destination,

    /// Upgrade path on the relay server (e.g., "/proxy")
    pub path: String,

    /// Dial `wss://` with these trust settings; `None` dials plain `ws://`
    pub tls: Option<ClientTlsOptions>,
}

impl WebSocketConfig {
    pub fn new(relay: Destination) -> Self {
        Self {
            relay,
            path: DEFAULT_RELAY_PATH.to_string(),
            tls: Some(ClientTlsOptions::default()),
        }
    }

    /// Set WebSocket path
    pub fn with_path(mut self, path: &str) -> Self {
        self.path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        self
    }

    pub fn with_tls(mut self, tls: ClientTlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn without_tls(mut self) -> Self {
        self.tls = None;
        self
    }

    pub fn scheme(&self) -> &'static str {
        if self.tls.is_some() {
            "wss"
        } else {
            "ws"
        }
    }

    /// Relay URL for one tunnel: `{ws|wss}://{relay}{path}?dest={host:port}`
    pub fn relay_url(&self, dest: &Destination) -> Result<Url, WebSocketError> {
        let base = format!("{}://{}{}", self.scheme(), self.relay, self.path);
        let mut url = Url::parse(&base).map_err(|e| WebSocketError::InvalidUrl {
            url: base.clone(),
            reason: e.to_string(),
        })?;
        url.query_pairs_mut().append_pair("dest", dest.as_str());
        Ok(url)
    }
}
