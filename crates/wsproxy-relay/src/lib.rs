//! Tunnel relay engine
//!
//! This crate holds the piece every bridging point in wsproxy shares: a
//! bidirectional copy between two duplex endpoints that propagates
//! end-of-stream and errors as close signals and tears both legs down once
//! each direction has run to completion.
//!
//! # Endpoints
//!
//! Two endpoint shapes show up in practice:
//!
//! - **Stream endpoints** ([`StreamEndpoint`]): raw TCP/TLS sockets, upgraded
//!   HTTP connections and process stdio. A close signal becomes a write
//!   shutdown.
//! - **Message endpoints** (implemented by `wsproxy-transport-websocket`):
//!   WebSocket connections. Every inbound message is one read, every
//!   outbound chunk is one binary message, and close signals are
//!   control-close frames with a code and a reason.
//!
//! Both implement [`Endpoint`], so [`relay`] never needs to know which
//! transport it is driving.

pub mod destination;
pub mod endpoint;
pub mod engine;
pub mod policy;
pub mod stream;

pub use destination::{Destination, DestinationError};
pub use endpoint::{CloseSignal, Endpoint, EndpointRead, EndpointWrite, Inbound};
pub use engine::{relay, Direction, DirectionEnd, DirectionReport, RelayConfig, RelayOutcome};
pub use policy::ClosePolicy;
pub use stream::StreamEndpoint;
