//! CONNECT handshake client and the stdio tunnel pipe built on it
//!
//! [`ConnectClient`] opens a plain or TLS connection to an HTTP proxy and
//! asks it for a raw tunnel with `CONNECT host:port HTTP/1.1`. Only a `200`
//! response lets the tunnel through; anything else is a terminal
//! [`HandshakeError`]. [`run_pipe`] then relays the tunnel against a local
//! endpoint, normally the process's stdin/stdout.

pub mod client;
pub mod error;
pub mod handshake;
pub mod pipe;

pub use client::{ConnectClient, ProxyScheme, ProxyStream, TunnelStream};
pub use error::{HandshakeError, RELAY_FAILURE_EXIT_CODE};
pub use handshake::{connect_request, handshake, parse_response, ConnectResponse};
pub use pipe::run_pipe;
