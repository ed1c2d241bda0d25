//! Transport boundary consumed by the ingestion core.
//!
//! A transport delivers `(bytes, arrival timestamp, optional packet token)`
//! and, for zero-copy backends, a release operation for tokens the core has
//! finished with. The core makes no assumption about framing alignment
//! within a delivered buffer.

use std::time::Duration;

use thiserror::Error;

/// Opaque handle to a transport-owned packet buffer.
///
/// Created by the transport on reception; must be passed back to
/// [`PacketRelease::release`] exactly once after the parser has fully
/// consumed the buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketToken(pub u64);

/// One delivered packet.
#[derive(Clone, Copy, Debug)]
pub struct PacketView<'a> {
    /// Raw bytes; framing may straddle packet boundaries.
    pub data: &'a [u8],
    /// Arrival timestamp, nanoseconds on the shared monotonic clock.
    pub rx_ts_ns: u64,
    /// Present only for zero-copy transports whose buffer outlives the
    /// delivery call until released.
    pub token: Option<PacketToken>,
}

/// Outcome of one transport pump.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    /// The stream is still delivering.
    Open,
    /// The peer closed the stream; no more data will arrive.
    Closed,
}

/// Transport errors. Initialization and connection failures are fatal for
/// the feed; mid-stream I/O errors end the worker and are reported to the
/// feed monitor.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint address {0}")]
    Addr(String),
    #[error("transport initialization failed: {0}")]
    Init(String),
    #[error("transport i/o error")]
    Io(#[from] std::io::Error),
    #[error("transport is not connected")]
    NotConnected,
}

/// Release side-effect for zero-copy packet tokens.
///
/// Handed off to the consumer thread, so it must be shareable.
pub trait PacketRelease: Send + Sync {
    fn release(&self, token: PacketToken);
}

/// Release object for transports that copy on delivery and own no packet
/// buffers.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRelease;

impl PacketRelease for NoopRelease {
    #[inline(always)]
    fn release(&self, _token: PacketToken) {}
}

/// A byte-stream source feeding the ingestion core.
///
/// The pump is step-based: `poll_step` waits at most `timeout` for data and
/// delivers every available packet through the callback, so a driving loop
/// can interleave other work (forwarding, stop checks) between steps.
pub trait Transport: Send {
    type Releaser: PacketRelease + 'static;

    /// One-time backend setup. Default: nothing to do.
    fn initialize(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Establish the stream.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Tear the stream down. Idempotent.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Pump once: deliver all packets that arrive within `timeout`.
    ///
    /// Returns [`TransportState::Closed`] on orderly end-of-stream and
    /// `Err` on a mid-stream failure.
    fn poll_step(
        &mut self,
        timeout: Duration,
        on_packet: &mut dyn FnMut(PacketView<'_>),
    ) -> Result<TransportState, TransportError>;

    /// The release operation for this transport's packet tokens.
    fn releaser(&self) -> Self::Releaser;
}
