//! Ingestion client: transport -> parser -> ring, plus zero-copy release.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{error, info};

use pulse_proto::Slot;
use pulse_ring::SpscRing;
use pulse_stats::IngestStats;

use crate::parser::StreamParser;
use crate::pending::PendingPacketRing;
use crate::transport::{Transport, TransportState};
use crate::TransportError;

const POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// Binds a transport to the parser, ring and statistics.
///
/// `start` moves the transport onto a dedicated reception thread; the
/// consumer thread keeps popping the ring and periodically calls
/// [`drain_pending`](Self::drain_pending) so zero-copy packet tokens are
/// released once parsed. `stop` tears the reception thread down and
/// releases every remaining token.
pub struct IngestClient<T: Transport> {
    transport: Option<T>,
    releaser: T::Releaser,
    pending: Arc<PendingPacketRing>,
    stop: Arc<AtomicBool>,
    stream_open: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl<T: Transport + 'static> IngestClient<T> {
    pub fn new(transport: T) -> Self {
        let releaser = transport.releaser();
        Self {
            transport: Some(transport),
            releaser,
            pending: Arc::new(PendingPacketRing::new()),
            stop: Arc::new(AtomicBool::new(false)),
            stream_open: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }

    /// Backend setup passthrough. Call before `start`.
    pub fn initialize(&mut self) -> Result<(), TransportError> {
        self.transport
            .as_mut()
            .ok_or(TransportError::NotConnected)?
            .initialize()
    }

    /// Connection passthrough. Call before `start`.
    pub fn connect(&mut self) -> Result<(), TransportError> {
        self.transport
            .as_mut()
            .ok_or(TransportError::NotConnected)?
            .connect()
    }

    /// Disconnect passthrough for a client that was never started.
    pub fn disconnect(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            transport.disconnect();
        }
    }

    /// Spawn the reception thread: poll the transport, parse every packet
    /// into `ring`, and defer zero-copy tokens onto the pending ring.
    pub fn start(
        &mut self,
        ring: Arc<SpscRing<Slot>>,
        stats: Arc<IngestStats>,
    ) -> Result<(), TransportError> {
        let mut transport = self.transport.take().ok_or(TransportError::NotConnected)?;

        let stop = Arc::clone(&self.stop);
        let stream_open = Arc::clone(&self.stream_open);
        let pending = Arc::clone(&self.pending);
        let releaser = transport.releaser();
        stream_open.store(true, Ordering::Release);

        let reader = std::thread::Builder::new()
            .name("pulse-rx".into())
            .spawn(move || {
                let mut parser = StreamParser::new();

                while !stop.load(Ordering::Acquire) {
                    let mut deliver = |pkt: crate::PacketView<'_>| {
                        stats.record_bytes_received(pkt.data.len() as u64);
                        match pkt.token {
                            Some(token) => {
                                parser.parse_zero_copy(pkt.data, &ring, &stats);
                                pending.defer_or_release(token, &releaser, &stats);
                            }
                            None => parser.parse(pkt.data, &ring, &stats),
                        }
                    };

                    match transport.poll_step(POLL_TIMEOUT, &mut deliver) {
                        Ok(TransportState::Open) => {}
                        Ok(TransportState::Closed) => {
                            info!("feed stream closed");
                            break;
                        }
                        Err(err) => {
                            error!("feed stream error: {err}");
                            break;
                        }
                    }
                }

                transport.disconnect();
                stream_open.store(false, Ordering::Release);
            })?;

        self.reader = Some(reader);
        Ok(())
    }

    /// `true` while the reception thread is delivering.
    pub fn is_stream_open(&self) -> bool {
        self.stream_open.load(Ordering::Acquire)
    }

    /// Release every token the parser has finished with. Consumer thread.
    pub fn drain_pending(&self) -> u64 {
        self.pending.drain(&self.releaser)
    }

    /// Stop the transport, join the reception thread, then release every
    /// remaining pending token.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.pending.drain(&self.releaser);
    }
}

impl<T: Transport> Drop for IngestClient<T> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.pending.drain(&self.releaser);
    }
}
