//! Local CONNECT proxy front-end
//!
//! An HTTP/1.1 proxy for local applications. `CONNECT host:port` requests
//! are turned into a WebSocket to the remote relay server (the destination
//! rides along as the `dest` query parameter) and the client connection is
//! taken over and relayed against it. Everything else is forwarded as an
//! ordinary HTTP request.
//!
//! HTTP/2 is never offered, so CONNECT takeover always works.

pub mod config;
pub mod proxy;

pub use config::{FrontEndConfig, DEFAULT_LISTEN_ADDR};
pub use proxy::{FrontEndError, ProxyFrontEnd};
