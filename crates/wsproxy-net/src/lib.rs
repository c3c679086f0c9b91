//! Listener and TLS plumbing shared by the wsproxy front-end, relay server
//! and CONNECT client
//!
//! - PEM certificate/key loading and rustls server/client configs
//! - Accepting connections with optional TLS on top of TCP
//! - Binding listeners with a short retry while the port is in TIME_WAIT

pub mod listener;
pub mod tls;

pub use listener::{bind_with_retry, BindError, ServerAcceptor, ServerStream};
pub use tls::{ClientTlsOptions, TlsError, TlsIdentity};
