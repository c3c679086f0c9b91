//! WebSocket transport for the tunnel relay
//!
//! Adapts WebSocket connections to the relay's message endpoint contract:
//! every inbound message is one read, every outbound chunk is one binary
//! message, and end-of-stream travels as a close frame with a code and a
//! reason.
//!
//! Both WebSocket stacks used in wsproxy are covered: tokio-tungstenite on
//! the dialing side ([`WebSocketConnector`]) and axum on the serving side.

pub mod config;
pub mod connector;
pub mod frame;
pub mod message;

pub use config::{WebSocketConfig, DEFAULT_RELAY_PATH};
pub use connector::{RelaySocket, RelayStream, WebSocketConnector, WebSocketError};
pub use message::{close_reason, MessageEndpoint, WsFrame, CLOSE_WRITE_TIMEOUT};
