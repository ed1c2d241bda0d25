//! Single-feed ingestion run loop.

use std::sync::Arc;

use tracing::info;

use pulse_proto::Slot;
use pulse_ring::{RingError, SpscRing};
use pulse_stats::IngestStats;

use crate::client::IngestClient;
use crate::tcp::TcpSource;
use crate::transport::{Transport, TransportError};

/// Configuration for a single-feed ingestion run.
#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub host: String,
    pub port: u16,
    /// Ring capacity in slots; must be a power of two.
    pub buffer_capacity: u64,
    /// Stop after this many wall seconds.
    pub max_seconds: Option<u64>,
    /// Stop after this many processed messages.
    pub max_messages: Option<u64>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9001,
            buffer_capacity: 65_536,
            max_seconds: None,
            max_messages: None,
        }
    }
}

/// A complete single-feed run: reception thread feeding the ring, consumer
/// loop on the calling thread, drain and final report on shutdown.
pub struct IngestSession {
    config: IngestConfig,
    ring: Arc<SpscRing<Slot>>,
    stats: Arc<IngestStats>,
}

impl IngestSession {
    pub fn new(config: IngestConfig) -> Result<Self, RingError> {
        let ring = Arc::new(SpscRing::with_capacity(config.buffer_capacity)?);
        Ok(Self {
            config,
            ring,
            stats: Arc::new(IngestStats::new()),
        })
    }

    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }

    /// A TCP source for this session's endpoint.
    pub fn tcp_source(&self) -> Result<TcpSource, TransportError> {
        TcpSource::new(&self.config.host, self.config.port)
    }

    /// Run the session over `transport` until an exit condition is met:
    /// `max_seconds` elapsed, `max_messages` processed, or the stream
    /// closed. Emits the final report before returning.
    pub fn run<T: Transport + 'static>(&self, transport: T) -> Result<(), TransportError> {
        info!(
            "ingesting from {}:{} (ring capacity {})",
            self.config.host, self.config.port, self.config.buffer_capacity
        );

        let mut client = IngestClient::new(transport);
        client.initialize()?;
        client.connect()?;
        client.start(Arc::clone(&self.ring), Arc::clone(&self.stats))?;

        while self.should_continue(&client) {
            match self.ring.try_pop_with_prefetch() {
                Some(slot) => self.stats.record_processed(&slot),
                None => std::hint::spin_loop(),
            }
            client.drain_pending();
            self.stats.maybe_flush();
        }

        client.stop();

        // Everything the reception thread committed before the stop is
        // still accounted for.
        while let Some(slot) = self.ring.try_pop() {
            self.stats.record_processed(&slot);
        }

        self.stats.report();
        info!("ring high-water mark: {}", self.ring.high_water_mark());
        Ok(())
    }

    fn should_continue<T: Transport + 'static>(&self, client: &IngestClient<T>) -> bool {
        if let Some(max_seconds) = self.config.max_seconds {
            if self.stats.elapsed_seconds() >= max_seconds as f64 {
                return false;
            }
        }
        if let Some(max_messages) = self.config.max_messages {
            if self.stats.processed() >= max_messages {
                return false;
            }
        }
        client.is_stream_open() || !self.ring.is_empty()
    }
}
