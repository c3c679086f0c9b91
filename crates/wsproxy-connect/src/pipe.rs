//! Tunnel pipe: CONNECT through a proxy, then relay against a local endpoint

use tracing::info;
use wsproxy_relay::{relay, Destination, Endpoint, RelayConfig, RelayOutcome, StreamEndpoint};

use crate::client::ConnectClient;
use crate::error::HandshakeError;

/// Establish the tunnel and relay it against `local` until both directions
/// end. Handshake failures come back before any byte is relayed.
pub async fn run_pipe<E>(
    client: &ConnectClient,
    dest: &Destination,
    local: E,
    config: &RelayConfig,
) -> Result<RelayOutcome, HandshakeError>
where
    E: Endpoint,
{
    let (tunnel, response) = client.connect(dest).await?;
    info!(
        "Tunnel to {} open ({} {})",
        dest, response.status, response.reason
    );

    let outcome = relay(local, StreamEndpoint::new("proxy", tunnel), config).await;
    if let Some(failure) = outcome.failure() {
        info!(
            "Tunnel to {} ended with {:?} on {}",
            dest, failure.end, failure.source
        );
    }
    Ok(outcome)
}
