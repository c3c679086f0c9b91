//! Handshake error taxonomy and process exit codes

use std::io;
use thiserror::Error;

/// Exit code for a tunnel that was established but ended with a relay error
pub const RELAY_FAILURE_EXIT_CODE: u8 = 1;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Unable to connect to the proxy server {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("TLS with the proxy server {address} failed: {reason}")]
    Tls { address: String, reason: String },

    #[error("Unable to {action}: {source}")]
    Io {
        action: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Unable to parse response header: {0}")]
    Protocol(String),

    #[error("Bad response: {status} {reason}")]
    UpstreamRejected { status: u16, reason: String },
}

impl HandshakeError {
    /// Distinct process exit code per error class
    pub fn exit_code(&self) -> u8 {
        match self {
            HandshakeError::Connect { .. } | HandshakeError::Tls { .. } => 2,
            HandshakeError::Protocol(_) => 3,
            HandshakeError::UpstreamRejected { .. } => 4,
            HandshakeError::Io { .. } => 5,
            HandshakeError::UnsupportedScheme(_) => 64,
        }
    }
}
