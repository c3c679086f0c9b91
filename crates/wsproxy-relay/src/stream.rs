//! Stream endpoint adapter for raw byte streams
//!
//! Wraps anything speaking `AsyncRead`/`AsyncWrite`: TCP and TLS sockets,
//! upgraded HTTP connections, and stdin/stdout paired into one channel.
//! Byte streams have no close frame, so a close signal is a write shutdown
//! and the code and reason are only logged.

use async_trait::async_trait;
use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::trace;

use crate::endpoint::{CloseSignal, Endpoint, EndpointRead, EndpointWrite, Inbound};

pub struct StreamEndpoint<R, W> {
    label: String,
    reader: R,
    writer: W,
}

impl<T> StreamEndpoint<ReadHalf<T>, WriteHalf<T>>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(label: impl Into<String>, io: T) -> Self {
        let (reader, writer) = tokio::io::split(io);
        Self::from_halves(label, reader, writer)
    }
}

impl StreamEndpoint<tokio::io::Stdin, tokio::io::Stdout> {
    /// The process's stdin and stdout treated as one duplex channel
    pub fn stdio() -> Self {
        Self::from_halves("stdio", tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> StreamEndpoint<R, W> {
    pub fn from_halves(label: impl Into<String>, reader: R, writer: W) -> Self {
        Self {
            label: label.into(),
            reader,
            writer,
        }
    }
}

impl<R, W> std::fmt::Debug for StreamEndpoint<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEndpoint")
            .field("label", &self.label)
            .finish()
    }
}

impl<R, W> Endpoint for StreamEndpoint<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Read = StreamReader<R>;
    type Write = StreamWriter<W>;

    fn label(&self) -> &str {
        &self.label
    }

    fn split(self) -> (Self::Read, Self::Write) {
        (
            StreamReader {
                reader: self.reader,
            },
            StreamWriter {
                label: self.label,
                writer: self.writer,
                shut_down: false,
                closed: false,
            },
        )
    }
}

pub struct StreamReader<R> {
    reader: R,
}

#[async_trait]
impl<R> EndpointRead for StreamReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_chunk(&mut self, max_len: usize) -> io::Result<Inbound> {
        let mut buf = BytesMut::zeroed(max_len.max(1));
        let n = self.reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(Inbound::Eof);
        }
        buf.truncate(n);
        Ok(Inbound::Data(buf.freeze()))
    }
}

pub struct StreamWriter<W> {
    label: String,
    writer: W,
    shut_down: bool,
    closed: bool,
}

impl<W> StreamWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn shutdown_once(&mut self) -> io::Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        self.writer.shutdown().await
    }
}

#[async_trait]
impl<W> EndpointWrite for StreamWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        if self.shut_down {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("{} is already shut down", self.label),
            ));
        }
        self.writer.write_all(chunk).await?;
        self.writer.flush().await
    }

    async fn send_close(&mut self, signal: &CloseSignal) -> io::Result<()> {
        trace!(
            "Shutting down {} (close {} {:?})",
            self.label,
            signal.code,
            signal.reason
        );
        self.shutdown_once().await
    }

    async fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.shutdown_once().await
    }
}
