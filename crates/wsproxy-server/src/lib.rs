//! Remote relay server
//!
//! Accepts WebSocket upgrades on one path (`/proxy` by default) carrying a
//! `dest=host:port` query parameter, dials the destination over TCP and
//! relays the WebSocket against it. Every upgrade is an independent session
//! on its own task.

pub mod config;
pub mod server;
pub mod session;

pub use config::{RelayServerConfig, DEFAULT_CONNECT_TIMEOUT};
pub use server::{RelayServer, RelayServerError};
pub use session::{run_session, ProxyParams, SessionConfig, SessionError};
