//! The CONNECT exchange on an already-open proxy connection

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;
use wsproxy_relay::Destination;

use crate::error::HandshakeError;

/// Parsed status line and headers of a CONNECT response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
}

/// `CONNECT <dest> HTTP/1.1\r\nHost: <dest>\r\n\r\n`
pub fn connect_request(dest: &Destination) -> String {
    format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n\r\n", dest)
}

/// Ask the proxy on `stream` for a tunnel to `dest`.
///
/// Returns the stream wrapped in the reader used for the response header,
/// so tunnel bytes the proxy sent right behind the header are not lost.
pub async fn handshake<S>(
    stream: S,
    dest: &Destination,
) -> Result<(BufReader<S>, ConnectResponse), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);

    let request = connect_request(dest);
    let write = async {
        stream.get_mut().write_all(request.as_bytes()).await?;
        stream.get_mut().flush().await
    };
    write.await.map_err(|source| HandshakeError::Io {
        action: "write request to proxy server",
        source,
    })?;

    let header = read_header(&mut stream).await?;
    let response = parse_response(&header)?;

    if response.status != 200 {
        debug!(
            "Proxy refused CONNECT {}: {} {}",
            dest, response.status, response.reason
        );
        return Err(HandshakeError::UpstreamRejected {
            status: response.status,
            reason: response.reason,
        });
    }

    Ok((stream, response))
}

/// Read the response header block line by line, up to and including the
/// blank line. Lines of any length are accepted; every line is stored with
/// a `\r\n` ending.
async fn read_header<R>(reader: &mut R) -> Result<Vec<u8>, HandshakeError>
where
    R: AsyncBufRead + Unpin,
{
    let mut header = Vec::with_capacity(1024);
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(|source| HandshakeError::Io {
                action: "read response header",
                source,
            })?;
        if n == 0 {
            return Err(HandshakeError::Protocol(
                "connection closed before the end of the response header".to_string(),
            ));
        }

        let content = trim_line_ending(&line);
        header.extend_from_slice(content);
        header.extend_from_slice(b"\r\n");

        if content.is_empty() {
            return Ok(header);
        }
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Parse a complete response header block.
///
/// Any number of headers is accepted, and obsolete folded header lines are
/// joined to the header they continue.
pub fn parse_response(header: &[u8]) -> Result<ConnectResponse, HandshakeError> {
    // Every header takes at least one line
    let lines = header.iter().filter(|&&b| b == b'\n').count();
    let mut headers = vec![httparse::EMPTY_HEADER; lines.max(1)];
    let mut response = httparse::Response::new(&mut headers);

    let mut config = httparse::ParserConfig::default();
    config.allow_obsolete_multiline_headers_in_responses(true);

    match config.parse_response(&mut response, header) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(HandshakeError::Protocol(
                "incomplete response header".to_string(),
            ))
        }
        Err(e) => return Err(HandshakeError::Protocol(e.to_string())),
    }

    let status = response
        .code
        .ok_or_else(|| HandshakeError::Protocol("missing status code".to_string()))?;
    let reason = response.reason.unwrap_or("").to_string();
    let headers = response
        .headers
        .iter()
        .map(|h| (h.name.to_string(), unfold(h.value)))
        .collect();

    Ok(ConnectResponse {
        status,
        reason,
        headers,
    })
}

/// Header value with folded continuation lines joined by a single space
fn unfold(value: &[u8]) -> String {
    String::from_utf8_lossy(value)
        .lines()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
