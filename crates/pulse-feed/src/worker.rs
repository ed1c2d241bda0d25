//! Feed worker: one thread per upstream source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info};

use pulse_ingest::{PacketRelease, StreamParser, Transport, TransportState};
use pulse_proto::{FeedSlot, Slot, WIRE_SIZE};
use pulse_ring::{MpscRing, RingError, SpscRing};
use pulse_stats::{clock, IngestStats};

use crate::config::FeedConfig;
use crate::monitor::FeedMonitor;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Feed worker startup errors.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed ring construction failed: {0}")]
    Ring(#[from] RingError),
    #[error("failed to spawn feed worker thread")]
    Spawn(#[from] std::io::Error),
}

/// One feed's reader and forwarder.
///
/// The worker thread interleaves two steps: pump the transport through the
/// parser into the feed's local SPSC ring, then drain the local ring into
/// the shared fan-in MPSC as [`FeedSlot`]s. A rejected fan-in push is
/// counted and dropped; the reader is never blocked. A transport failure
/// marks the monitor `Failed` and ends the worker.
pub struct FeedWorker {
    monitor: Arc<FeedMonitor>,
    stats: Arc<IngestStats>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FeedWorker {
    /// Spawn the worker thread for `config`, forwarding into `fan_in`.
    pub fn spawn<T: Transport + 'static>(
        config: FeedConfig,
        mut transport: T,
        fan_in: Arc<MpscRing<FeedSlot>>,
    ) -> Result<Self, FeedError> {
        let local: Arc<SpscRing<Slot>> = Arc::new(SpscRing::with_capacity(config.buffer_capacity)?);
        let monitor = Arc::new(FeedMonitor::new(config.clone()));
        let stats = Arc::new(IngestStats::new());
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let monitor = Arc::clone(&monitor);
            let stats = Arc::clone(&stats);
            let stop = Arc::clone(&stop);

            std::thread::Builder::new()
                .name(format!("pulse-feed-{}", config.name))
                .spawn(move || {
                    if let Err(err) = transport.initialize().and_then(|_| transport.connect()) {
                        error!("feed {}: connect failed: {err}", config.name);
                        monitor.record_connection_failed();
                        return;
                    }
                    monitor.record_connection_established();
                    info!("feed {}: connected to {}:{}", config.name, config.host, config.port);

                    let releaser = transport.releaser();
                    let mut parser = StreamParser::new();
                    let mut open = true;

                    while open && !stop.load(Ordering::Acquire) {
                        let mut deliver = |pkt: pulse_ingest::PacketView<'_>| {
                            stats.record_bytes_received(pkt.data.len() as u64);
                            match pkt.token {
                                Some(token) => {
                                    parser.parse_zero_copy(pkt.data, &local, &stats);
                                    // The parser copied everything it needs
                                    // within this same thread, so the token
                                    // can be released right away.
                                    releaser.release(token);
                                }
                                None => parser.parse(pkt.data, &local, &stats),
                            }
                        };

                        match transport.poll_step(POLL_INTERVAL, &mut deliver) {
                            Ok(TransportState::Open) => {}
                            Ok(TransportState::Closed) => {
                                info!("feed {}: stream closed", config.name);
                                open = false;
                            }
                            Err(err) => {
                                error!("feed {}: stream error: {err}", config.name);
                                monitor.record_connection_failed();
                                open = false;
                            }
                        }

                        forward(&local, &fan_in, &monitor, config.origin_id);
                    }

                    // Final drain so nothing parsed before shutdown is lost.
                    forward(&local, &fan_in, &monitor, config.origin_id);
                    transport.disconnect();
                })?
        };

        Ok(Self {
            monitor,
            stats,
            stop,
            handle: Some(handle),
        })
    }

    pub fn monitor(&self) -> &Arc<FeedMonitor> {
        &self.monitor
    }

    /// Per-feed parse statistics (received/dropped on the local ring).
    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }

    /// `true` while the worker thread is alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the worker and wait for it to exit.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FeedWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drain the local ring into the fan-in ring.
///
/// Single-shot MPSC pushes: a rejected push (full ring or CAS contention)
/// drops the message and counts it, keeping the reader wait-free.
fn forward(
    local: &SpscRing<Slot>,
    fan_in: &MpscRing<FeedSlot>,
    monitor: &FeedMonitor,
    origin_id: u32,
) {
    while let Some(slot) = local.try_pop() {
        monitor.record_message(&slot.raw, WIRE_SIZE as u64);

        let feed_slot = FeedSlot::new(slot, origin_id, slot.raw.seq, clock::now_ns());
        if !fan_in.try_push(feed_slot) {
            monitor.record_forward_drop();
        }
    }
}
