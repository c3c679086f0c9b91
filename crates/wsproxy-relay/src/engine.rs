//! The bidirectional relay
//!
//! [`relay`] runs the A→B and B→A copies concurrently and returns only once
//! both have ended on their own: a full drain rather than first-error-wins,
//! so data still flowing one way is not cut off when the other way stops.
//! An optional linger window bounds how long the second direction may keep
//! running after the first has finished.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::endpoint::{CloseSignal, Endpoint, EndpointRead, EndpointWrite, Inbound};
use crate::policy::ClosePolicy;

/// Read size for stream endpoints
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Upper bound on bytes taken from a stream endpoint per read
    pub chunk_size: usize,

    /// How long the remaining direction may run once the other has ended.
    /// `None` waits for both directions indefinitely.
    pub linger: Option<Duration>,

    /// Close codes treated as a clean peer shutdown
    pub close_policy: ClosePolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            linger: None,
            close_policy: ClosePolicy::default(),
        }
    }
}

impl RelayConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = Some(linger);
        self
    }

    pub fn with_close_policy(mut self, close_policy: ClosePolicy) -> Self {
        self.close_policy = close_policy;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    AToB,
    BToA,
}

/// Why one direction stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectionEnd {
    /// The source reached end-of-stream
    Eof,
    /// The source sent a close whose code the policy accepts as clean
    PeerClosed(CloseSignal),
    /// The source sent a close with any other code
    CloseReceived(CloseSignal),
    ReadError(String),
    WriteError(String),
    /// Abandoned when the linger window ran out
    Lingered,
}

impl DirectionEnd {
    pub fn is_clean(&self) -> bool {
        matches!(self, DirectionEnd::Eof | DirectionEnd::PeerClosed(_))
    }
}

#[derive(Debug, Clone)]
pub struct DirectionReport {
    pub direction: Direction,
    /// Label of the endpoint this direction read from
    pub source: String,
    pub end: DirectionEnd,
    /// Bytes delivered to the sink
    pub bytes: u64,
    pub finished_at: Instant,
}

/// Termination cause of a whole relay session
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    pub a_to_b: DirectionReport,
    pub b_to_a: DirectionReport,
}

impl RelayOutcome {
    pub fn is_clean(&self) -> bool {
        self.a_to_b.end.is_clean() && self.b_to_a.end.is_clean()
    }

    /// The direction that ended first, i.e. the side that started shutdown
    pub fn initiator(&self) -> &DirectionReport {
        if self.b_to_a.finished_at < self.a_to_b.finished_at {
            &self.b_to_a
        } else {
            &self.a_to_b
        }
    }

    /// The first non-clean end observed, if any
    pub fn failure(&self) -> Option<&DirectionReport> {
        match (self.a_to_b.end.is_clean(), self.b_to_a.end.is_clean()) {
            (true, true) => None,
            (false, true) => Some(&self.a_to_b),
            (true, false) => Some(&self.b_to_a),
            (false, false) => Some(self.initiator()),
        }
    }
}

/// Bridge two endpoints until both directions have ended, then close both.
///
/// Each endpoint is closed exactly once, whichever side started shutdown.
pub async fn relay<A, B>(a: A, b: B, config: &RelayConfig) -> RelayOutcome
where
    A: Endpoint,
    B: Endpoint,
{
    let a_label = a.label().to_string();
    let b_label = b.label().to_string();
    let (mut a_read, mut a_write) = a.split();
    let (mut b_read, mut b_write) = b.split();

    debug!("Relaying {} <-> {}", a_label, b_label);

    let a_to_b_bytes = AtomicU64::new(0);
    let b_to_a_bytes = AtomicU64::new(0);

    let (a_to_b, b_to_a) = {
        let forward = pump(
            &a_label,
            &b_label,
            &mut a_read,
            &mut b_write,
            &a_to_b_bytes,
            config,
        );
        let backward = pump(
            &b_label,
            &a_label,
            &mut b_read,
            &mut a_write,
            &b_to_a_bytes,
            config,
        );
        join_directions(forward, backward, config.linger).await
    };

    drop(a_read);
    drop(b_read);
    if let Err(e) = a_write.close().await {
        debug!("Error closing {}: {}", a_label, e);
    }
    if let Err(e) = b_write.close().await {
        debug!("Error closing {}: {}", b_label, e);
    }

    let outcome = RelayOutcome {
        a_to_b: DirectionReport {
            direction: Direction::AToB,
            source: a_label,
            end: a_to_b.0,
            bytes: a_to_b_bytes.load(Ordering::Relaxed),
            finished_at: a_to_b.1,
        },
        b_to_a: DirectionReport {
            direction: Direction::BToA,
            source: b_label,
            end: b_to_a.0,
            bytes: b_to_a_bytes.load(Ordering::Relaxed),
            finished_at: b_to_a.1,
        },
    };

    info!(
        "Relay done: {} -> {} {} bytes ({:?}), {} -> {} {} bytes ({:?})",
        outcome.a_to_b.source,
        outcome.b_to_a.source,
        outcome.a_to_b.bytes,
        outcome.a_to_b.end,
        outcome.b_to_a.source,
        outcome.a_to_b.source,
        outcome.b_to_a.bytes,
        outcome.b_to_a.end
    );

    outcome
}

async fn join_directions<F, G>(
    forward: F,
    backward: G,
    linger: Option<Duration>,
) -> ((DirectionEnd, Instant), (DirectionEnd, Instant))
where
    F: Future<Output = (DirectionEnd, Instant)>,
    G: Future<Output = (DirectionEnd, Instant)>,
{
    let Some(linger) = linger else {
        return tokio::join!(forward, backward);
    };

    tokio::pin!(forward);
    tokio::pin!(backward);

    tokio::select! {
        first = &mut forward => {
            let second = finish_within(linger, backward).await;
            (first, second)
        }
        second = &mut backward => {
            let first = finish_within(linger, forward).await;
            (first, second)
        }
    }
}

async fn finish_within<F>(linger: Duration, direction: F) -> (DirectionEnd, Instant)
where
    F: Future<Output = (DirectionEnd, Instant)>,
{
    match tokio::time::timeout(linger, direction).await {
        Ok(end) => end,
        Err(_) => {
            debug!("Linger of {:?} elapsed, abandoning direction", linger);
            (DirectionEnd::Lingered, Instant::now())
        }
    }
}

/// Copy one direction until the source ends, forwarding the end as a close
async fn pump<R, W>(
    source_label: &str,
    sink_label: &str,
    source: &mut R,
    sink: &mut W,
    bytes: &AtomicU64,
    config: &RelayConfig,
) -> (DirectionEnd, Instant)
where
    R: EndpointRead,
    W: EndpointWrite,
{
    let end = loop {
        match source.read_chunk(config.chunk_size).await {
            Ok(Inbound::Data(chunk)) => {
                if chunk.is_empty() {
                    continue;
                }
                if let Err(e) = sink.write_chunk(&chunk).await {
                    warn!("Can not write to {}: {}", sink_label, e);
                    break DirectionEnd::WriteError(e.to_string());
                }
                bytes.fetch_add(chunk.len() as u64, Ordering::Relaxed);
            }
            Ok(Inbound::Eof) => {
                debug!("{} has closed connection", source_label);
                let reason = format!("{} has closed connection", source_label);
                send_close(sink, sink_label, CloseSignal::going_away(reason)).await;
                break DirectionEnd::Eof;
            }
            Ok(Inbound::Close(signal)) if config.close_policy.is_clean(signal.code) => {
                debug!(
                    "{} is closed ({} {:?})",
                    source_label, signal.code, signal.reason
                );
                let reason = format!("{} has closed connection", source_label);
                send_close(sink, sink_label, CloseSignal::going_away(reason)).await;
                break DirectionEnd::PeerClosed(signal);
            }
            Ok(Inbound::Close(signal)) => {
                warn!(
                    "{} closed with code {}: {:?}",
                    source_label, signal.code, signal.reason
                );
                let reason = format!("{} closed with code {}", source_label, signal.code);
                send_close(sink, sink_label, CloseSignal::internal_error(reason)).await;
                break DirectionEnd::CloseReceived(signal);
            }
            Err(e) => {
                warn!("Can not read from {}: {}", source_label, e);
                let reason = format!("Can not read from {}", source_label);
                send_close(sink, sink_label, CloseSignal::internal_error(reason)).await;
                break DirectionEnd::ReadError(e.to_string());
            }
        }
    };

    (end, Instant::now())
}

async fn send_close<W: EndpointWrite>(sink: &mut W, sink_label: &str, signal: CloseSignal) {
    // Best-effort: the direction ends either way
    if let Err(e) = sink.send_close(&signal).await {
        debug!("Failed to send close to {}: {}", sink_label, e);
    }
}
