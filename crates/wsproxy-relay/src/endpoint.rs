//! Duplex endpoint abstraction
//!
//! An endpoint is split into a read half and a write half so each relay
//! direction owns exactly the handles it drives: the A→B direction reads A
//! and writes B, the B→A direction reads B and writes A.

use async_trait::async_trait;
use bytes::Bytes;
use std::io;

/// Close code sent when the source reached a clean end-of-stream
pub const GOING_AWAY: u16 = 1001;

/// Close code sent when reading the source failed
pub const INTERNAL_ERROR: u16 = 1011;

/// Close code reported for a close frame that carried no status
pub const NO_STATUS: u16 = 1005;

/// A control-close carrying a numeric code and a human-readable reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseSignal {
    pub code: u16,
    pub reason: String,
}

impl CloseSignal {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn going_away(reason: impl Into<String>) -> Self {
        Self::new(GOING_AWAY, reason)
    }

    pub fn internal_error(reason: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, reason)
    }

    pub fn no_status() -> Self {
        Self::new(NO_STATUS, "")
    }
}

/// Result of one read from an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A chunk of bytes (one message for message endpoints)
    Data(Bytes),
    /// Clean end-of-stream
    Eof,
    /// The peer sent a control-close
    Close(CloseSignal),
}

#[async_trait]
pub trait EndpointRead: Send {
    /// Wait for the next chunk, end-of-stream, or close from the endpoint.
    ///
    /// Stream endpoints return at most `max_len` bytes; message endpoints
    /// return one whole message regardless.
    async fn read_chunk(&mut self, max_len: usize) -> io::Result<Inbound>;
}

#[async_trait]
pub trait EndpointWrite: Send {
    /// Write one chunk in full
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Tell the peer no more data follows.
    ///
    /// Only the first signal goes out; later calls are no-ops.
    async fn send_close(&mut self, signal: &CloseSignal) -> io::Result<()>;

    /// Release the endpoint. Calling it again does nothing.
    async fn close(&mut self) -> io::Result<()>;
}

pub trait Endpoint: Send {
    type Read: EndpointRead;
    type Write: EndpointWrite;

    /// Short name used in logs and close reasons ("client", "dest", ...)
    fn label(&self) -> &str;

    fn split(self) -> (Self::Read, Self::Write);
}
