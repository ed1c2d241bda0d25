//! Ingestion statistics collector.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use pulse_proto::Slot;
use tracing::info;

use crate::clock;
use crate::histogram::LatencyHistogram;

/// Statistics shared between the reception and consumer threads.
///
/// The counter block is written from both sides with relaxed atomics. The
/// sequence-gap bookkeeping, the latency histogram and the periodic flush
/// are single-writer: only the consumer thread calls
/// [`record_processed`](Self::record_processed) and
/// [`maybe_flush`](Self::maybe_flush).
pub struct IngestStats {
    // Core counters.
    received: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
    bytes_received: AtomicU64,
    partial_overflows: AtomicU64,
    pending_spills: AtomicU64,

    // Sequence tracking (consumer-only).
    first_seen: AtomicBool,
    expected_seq: AtomicU64,
    gap_count: AtomicU64,

    // Latency histogram (consumer-only writer).
    histogram: LatencyHistogram,

    // Timing.
    start: Instant,
    last_flush_ms: AtomicU64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            partial_overflows: AtomicU64::new(0),
            pending_spills: AtomicU64::new(0),
            first_seen: AtomicBool::new(false),
            expected_seq: AtomicU64::new(0),
            gap_count: AtomicU64::new(0),
            histogram: LatencyHistogram::new(),
            start: Instant::now(),
            last_flush_ms: AtomicU64::new(0),
        }
    }

    /// Count raw bytes delivered by the transport.
    #[inline(always)]
    pub fn record_bytes_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Count one message committed to the ring.
    #[inline(always)]
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one message dropped on ring-full.
    #[inline(always)]
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one partial-buffer overflow (frame alignment was reset).
    #[inline(always)]
    pub fn record_partial_overflow(&self) {
        self.partial_overflows.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one zero-copy packet released early because the pending ring
    /// was full.
    #[inline(always)]
    pub fn record_pending_spill(&self) {
        self.pending_spills.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one popped slot: sequence-gap tracking plus the latency
    /// histogram. Consumer thread only.
    pub fn record_processed(&self, slot: &Slot) {
        self.processed.fetch_add(1, Ordering::Relaxed);

        let seq = slot.raw.seq;
        if !self.first_seen.load(Ordering::Relaxed) {
            self.first_seen.store(true, Ordering::Relaxed);
        } else if seq != self.expected_seq.load(Ordering::Relaxed) {
            self.gap_count.fetch_add(1, Ordering::Relaxed);
        }
        self.expected_seq.store(seq + 1, Ordering::Relaxed);

        let latency_ns = clock::now_ns().saturating_sub(slot.rx_ts);
        self.histogram.record_us(latency_ns / 1000);
    }

    /// Record one popped slot without sequence tracking. For the fan-in
    /// consumer, where interleaving makes a global sequence meaningless and
    /// gaps are tracked per feed instead.
    pub fn record_processed_unordered(&self, slot: &Slot) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        let latency_ns = clock::now_ns().saturating_sub(slot.rx_ts);
        self.histogram.record_us(latency_ns / 1000);
    }

    /// Emit the periodic report line if a wall-second has passed since the
    /// last one. Best-effort; call from the consumer loop.
    pub fn maybe_flush(&self) {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        let last = self.last_flush_ms.load(Ordering::Relaxed);
        if elapsed_ms - last < 1000 {
            return;
        }
        self.last_flush_ms.store(elapsed_ms, Ordering::Relaxed);

        let elapsed = self.elapsed_seconds();
        let recv = self.received();
        let proc = self.processed();
        let drop = self.dropped();
        let bytes = self.bytes_received();
        info!(
            "T+{:6.1}s | recv {:>10} | proc {:>10} | drop {:>7} | rate {:>9.0} msg/s | bw {:6.2} MB/s",
            elapsed,
            recv,
            proc,
            drop,
            recv as f64 / elapsed,
            bytes as f64 / elapsed / 1024.0 / 1024.0,
        );
    }

    /// Emit the final report: totals, rates and latency percentiles.
    pub fn report(&self) {
        let elapsed = self.elapsed_seconds();
        let recv = self.received();
        let bytes = self.bytes_received();

        info!("=== Final Statistics ===");
        info!("duration: {:.2}s", elapsed);
        info!("messages received:  {}", recv);
        info!("messages processed: {}", self.processed());
        info!("messages dropped:   {}", self.dropped());
        info!("sequence gaps:      {}", self.gap_count());
        info!("partial overflows:  {}", self.partial_overflows());
        info!("pending spills:     {}", self.pending_spills());
        info!(
            "bytes received:     {} ({:.2} MB)",
            bytes,
            bytes as f64 / 1024.0 / 1024.0
        );
        info!("average rate:       {:.0} msg/s", recv as f64 / elapsed);
        info!(
            "average bandwidth:  {:.2} MB/s",
            bytes as f64 / elapsed / 1024.0 / 1024.0
        );

        if self.histogram.count() > 0 {
            info!("latency percentiles:");
            info!("  p50:   {}", LatencyHistogram::format_percentile(self.histogram.p50()));
            info!("  p90:   {}", LatencyHistogram::format_percentile(self.histogram.p90()));
            info!("  p95:   {}", LatencyHistogram::format_percentile(self.histogram.p95()));
            info!("  p99:   {}", LatencyHistogram::format_percentile(self.histogram.p99()));
            info!("  p99.9: {}", LatencyHistogram::format_percentile(self.histogram.p999()));
        }
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn gap_count(&self) -> u64 {
        self.gap_count.load(Ordering::Relaxed)
    }

    pub fn partial_overflows(&self) -> u64 {
        self.partial_overflows.load(Ordering::Relaxed)
    }

    pub fn pending_spills(&self) -> u64 {
        self.pending_spills.load(Ordering::Relaxed)
    }

    /// Next expected sequence number (consumer view).
    pub fn expected_seq(&self) -> u64 {
        self.expected_seq.load(Ordering::Relaxed)
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn histogram(&self) -> &LatencyHistogram {
        &self.histogram
    }
}

impl Default for IngestStats {
    fn default() -> Self {
        Self::new()
    }
}
