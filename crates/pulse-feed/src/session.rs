//! Multi-feed ingestion run loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use pulse_ingest::{Transport, TransportError};
use pulse_stats::IngestStats;

use crate::config::{ConfigError, MultiFeedConfig};
use crate::dispatcher::FanInDispatcher;
use crate::FeedConfig;

const HEALTH_SUMMARY_INTERVAL: Duration = Duration::from_secs(5);

/// A complete multi-feed run: dispatcher plus the consumer loop.
///
/// The consumer pops [`FeedSlot`](pulse_proto::FeedSlot)s from the fan-in
/// ring and records latency; sequence gaps are tracked per feed by the
/// monitors. Shutdown order: stop flag, join workers (each drains its local
/// ring), drain the fan-in ring, final report.
pub struct MultiFeedSession {
    config: MultiFeedConfig,
    dispatcher: FanInDispatcher,
    stats: Arc<IngestStats>,
}

impl MultiFeedSession {
    pub fn new(config: MultiFeedConfig) -> Result<Self, ConfigError> {
        let dispatcher = FanInDispatcher::new(config.clone())?;
        Ok(Self {
            config,
            dispatcher,
            stats: Arc::new(IngestStats::new()),
        })
    }

    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }

    pub fn dispatcher(&self) -> &FanInDispatcher {
        &self.dispatcher
    }

    /// Run over TCP transports until an exit condition is met.
    pub fn run(&mut self) {
        self.run_with(|feed: &FeedConfig| pulse_ingest::TcpSource::new(&feed.host, feed.port));
    }

    /// Run with a custom transport per feed (used by tests and benchmarks).
    pub fn run_with<T, F>(&mut self, make_transport: F)
    where
        T: Transport + 'static,
        F: FnMut(&FeedConfig) -> Result<T, TransportError>,
    {
        info!("starting multi-feed ingestion with {} feeds", self.config.feeds.len());
        self.dispatcher.start_with(make_transport);

        let mut last_summary = Instant::now();
        while self.should_continue() {
            match self.dispatcher.try_consume() {
                Some(feed_slot) => self.stats.record_processed_unordered(&feed_slot.slot),
                None => std::hint::spin_loop(),
            }
            self.stats.maybe_flush();

            if last_summary.elapsed() >= HEALTH_SUMMARY_INTERVAL {
                self.dispatcher.log_health_summary();
                last_summary = Instant::now();
            }
        }

        self.dispatcher.stop();

        // Workers drained their local rings on the way out; empty the
        // fan-in ring before reporting.
        while let Some(feed_slot) = self.dispatcher.try_consume() {
            self.stats.record_processed_unordered(&feed_slot.slot);
        }

        info!(
            "total messages received across feeds: {}",
            self.dispatcher.total_messages_received()
        );
        self.stats.report();
        self.dispatcher.log_health_summary();
    }

    fn should_continue(&self) -> bool {
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
        self.dispatcher.any_worker_running() || self.dispatcher.fan_in().size() > 0
    }
}
