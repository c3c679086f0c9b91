//! One relay session per accepted WebSocket upgrade

use axum::extract::ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures_util::{Sink, SinkExt, Stream};
use serde::Deserialize;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;
use wsproxy_relay::{
    relay, CloseSignal, Destination, DestinationError, RelayConfig, RelayOutcome, StreamEndpoint,
};
use wsproxy_transport_websocket::{MessageEndpoint, WsFrame, CLOSE_WRITE_TIMEOUT};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Empty dest")]
    EmptyDestination,

    #[error("Invalid dest: {0}")]
    InvalidDestination(DestinationError),

    #[error("Timed out connecting to {dest} after {timeout:?}")]
    DialTimeout { dest: String, timeout: Duration },

    #[error("Failed to connect to {dest}: {source}")]
    Dial {
        dest: String,
        #[source]
        source: io::Error,
    },
}

/// Per-session settings shared by every upgrade on a server
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    pub relay: RelayConfig,
}

/// Query parameters of the upgrade request
#[derive(Debug, Deserialize)]
pub struct ProxyParams {
    #[serde(default)]
    pub dest: String,
}

pub(crate) async fn proxy_handler(
    State(config): State<Arc<SessionConfig>>,
    query: Result<Query<ProxyParams>, QueryRejection>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => {
            warn!("upgrade: {}", rejection);
            return rejection.into_response();
        }
    };

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!("upgrade: {}", rejection);
            return rejection.into_response();
        }
    };

    let span = info_span!("session", id = %Uuid::new_v4(), dest = %params.dest);
    ws.on_failed_upgrade(|e| warn!("upgrade: {}", e))
        .on_upgrade(move |socket| {
            async move {
                if let Ok(outcome) = run_session(socket, &params.dest, &config).await {
                    debug!("Session finished, clean: {}", outcome.is_clean());
                }
            }
            .instrument(span)
        })
}

/// Dial `dest` and relay the upgraded `socket` against it.
///
/// An empty or malformed `dest` is refused without dialing. When the
/// session cannot start, the socket gets an internal-error close carrying
/// the reason.
pub async fn run_session<S, M, E>(
    socket: S,
    dest: &str,
    config: &SessionConfig,
) -> Result<RelayOutcome, SessionError>
where
    S: Stream<Item = Result<M, E>> + Sink<M, Error = E> + Unpin + Send + 'static,
    M: WsFrame,
    E: std::error::Error + Send + Sync + 'static,
{
    let dest = match Destination::parse(dest) {
        Ok(dest) => dest,
        Err(DestinationError::Empty) => {
            return Err(refuse(socket, SessionError::EmptyDestination).await)
        }
        Err(e) => {
            return Err(refuse(socket, SessionError::InvalidDestination(e)).await)
        }
    };

    let stream = match dial(&dest, config.connect_timeout).await {
        Ok(stream) => stream,
        Err(e) => return Err(refuse(socket, e).await),
    };
    info!("Connected to {}", dest);

    Ok(relay(
        MessageEndpoint::new("websocket", socket),
        StreamEndpoint::new("dest", stream),
        &config.relay,
    )
    .await)
}

async fn dial(dest: &Destination, timeout: Duration) -> Result<TcpStream, SessionError> {
    match tokio::time::timeout(timeout, TcpStream::connect(dest.as_str())).await {
        Ok(Ok(stream)) => {
            stream.set_nodelay(true).ok();
            Ok(stream)
        }
        Ok(Err(source)) => Err(SessionError::Dial {
            dest: dest.to_string(),
            source,
        }),
        Err(_) => Err(SessionError::DialTimeout {
            dest: dest.to_string(),
            timeout,
        }),
    }
}

/// Close the upgraded connection without relaying
async fn refuse<S, M, E>(mut socket: S, err: SessionError) -> SessionError
where
    S: Sink<M, Error = E> + Unpin,
    M: WsFrame,
    E: std::error::Error,
{
    warn!("{}", err);

    let signal = CloseSignal::internal_error(err.to_string());
    let close = async {
        socket.send(M::close(&signal)).await?;
        socket.close().await
    };
    match tokio::time::timeout(CLOSE_WRITE_TIMEOUT, close).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Error closing websocket: {}", e),
        Err(_) => debug!("Timed out closing websocket"),
    }

    err
}
