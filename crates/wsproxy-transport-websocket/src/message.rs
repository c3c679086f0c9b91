//! Message endpoint adapter for framed transports (WebSocket)
//!
//! The adapter is generic over any `Stream + Sink` of frames; the concrete
//! transport only has to say how its frames map onto [`Inbound`] and how to
//! build a binary frame and a close frame ([`WsFrame`]).

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::io;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::trace;

use wsproxy_relay::{CloseSignal, Endpoint, EndpointRead, EndpointWrite, Inbound};

/// Deadline for writing a close frame or finishing the closing handshake
pub const CLOSE_WRITE_TIMEOUT: Duration = Duration::from_secs(3);

/// Longest close reason that fits a control frame next to the code
pub const MAX_CLOSE_REASON: usize = 123;

/// `reason` cut to [`MAX_CLOSE_REASON`] bytes on a char boundary
pub fn close_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

/// Mapping between a transport's frame type and relay reads/writes
pub trait WsFrame: Sized + Send + Unpin + 'static {
    /// `None` for frames the relay skips (ping, pong)
    fn into_inbound(self) -> Option<Inbound>;

    fn binary(chunk: &[u8]) -> Self;

    fn close(signal: &CloseSignal) -> Self;
}

pub struct MessageEndpoint<S> {
    label: String,
    socket: S,
}

impl<S> MessageEndpoint<S> {
    pub fn new(label: impl Into<String>, socket: S) -> Self {
        Self {
            label: label.into(),
            socket,
        }
    }

    pub fn into_inner(self) -> S {
        self.socket
    }
}

impl<S> std::fmt::Debug for MessageEndpoint<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageEndpoint")
            .field("label", &self.label)
            .finish()
    }
}

impl<S, M, E> Endpoint for MessageEndpoint<S>
where
    S: Stream<Item = Result<M, E>> + Sink<M, Error = E> + Unpin + Send + 'static,
    M: WsFrame,
    E: std::error::Error + Send + Sync + 'static,
{
    type Read = MessageReader<SplitStream<S>>;
    type Write = MessageWriter<SplitSink<S, M>, M>;

    fn label(&self) -> &str {
        &self.label
    }

    fn split(self) -> (Self::Read, Self::Write) {
        let (sink, stream) = self.socket.split();
        (
            MessageReader { stream },
            MessageWriter {
                label: self.label,
                sink,
                close_sent: false,
                closed: false,
                _frame: PhantomData,
            },
        )
    }
}

pub struct MessageReader<St> {
    stream: St,
}

#[async_trait]
impl<St, M, E> EndpointRead for MessageReader<St>
where
    St: Stream<Item = Result<M, E>> + Unpin + Send,
    M: WsFrame,
    E: std::error::Error + Send + Sync + 'static,
{
    async fn read_chunk(&mut self, _max_len: usize) -> io::Result<Inbound> {
        loop {
            match self.stream.next().await {
                None => return Ok(Inbound::Eof),
                Some(Ok(frame)) => {
                    if let Some(inbound) = frame.into_inbound() {
                        return Ok(inbound);
                    }
                }
                Some(Err(e)) => return Err(io::Error::other(e)),
            }
        }
    }
}

pub struct MessageWriter<Si, M> {
    label: String,
    sink: Si,
    close_sent: bool,
    closed: bool,
    _frame: PhantomData<fn(M)>,
}

#[async_trait]
impl<Si, M> EndpointWrite for MessageWriter<Si, M>
where
    Si: Sink<M> + Unpin + Send,
    Si::Error: std::error::Error + Send + Sync + 'static,
    M: WsFrame,
{
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.sink
            .send(M::binary(chunk))
            .await
            .map_err(io::Error::other)
    }

    async fn send_close(&mut self, signal: &CloseSignal) -> io::Result<()> {
        if self.close_sent {
            return Ok(());
        }
        self.close_sent = true;
        trace!(
            "Sending close {} {:?} to {}",
            signal.code,
            signal.reason,
            self.label
        );

        match tokio::time::timeout(CLOSE_WRITE_TIMEOUT, self.sink.send(M::close(signal))).await {
            Ok(result) => result.map_err(io::Error::other),
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("timed out sending close to {}", self.label),
            )),
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.close_sent = true;

        match tokio::time::timeout(CLOSE_WRITE_TIMEOUT, self.sink.close()).await {
            Ok(result) => result.map_err(io::Error::other),
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("timed out closing {}", self.label),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_reason_fits_control_frame() {
        assert_eq!(close_reason("dest has closed connection"), "dest has closed connection");

        let long = "é".repeat(100);
        let cut = close_reason(&long);
        assert!(cut.len() <= MAX_CLOSE_REASON);
        assert_eq!(cut.len(), 122);
        assert!(long.starts_with(cut));
    }
}
