//! Fixed-bucket microsecond latency histogram.

use core::sync::atomic::{AtomicU64, Ordering};

/// Bucket index that absorbs all latencies of one millisecond or more.
pub const OVERFLOW_BUCKET_US: u64 = 1000;

const BUCKETS: usize = OVERFLOW_BUCKET_US as usize + 1;

/// Latency histogram: one bucket per microsecond from 0 to 999, plus an
/// overflow bucket for everything at or above 1000 µs.
///
/// Recording is a relaxed atomic increment; the consumer is the only
/// writer, readers only see advisory snapshots.
pub struct LatencyHistogram {
    buckets: Box<[AtomicU64]>,
    total: AtomicU64,
}

impl LatencyHistogram {
    /// Create an empty histogram. The bucket array is the only allocation
    /// and happens here, once.
    pub fn new() -> Self {
        Self {
            buckets: (0..BUCKETS).map(|_| AtomicU64::new(0)).collect(),
            total: AtomicU64::new(0),
        }
    }

    /// Record one latency sample in microseconds, saturating into the
    /// overflow bucket.
    #[inline(always)]
    pub fn record_us(&self, latency_us: u64) {
        let bucket = latency_us.min(OVERFLOW_BUCKET_US) as usize;
        self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of recorded samples.
    #[inline]
    pub fn count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Samples recorded into one bucket.
    #[inline]
    pub fn bucket_count(&self, bucket_us: u64) -> u64 {
        self.buckets[bucket_us.min(OVERFLOW_BUCKET_US) as usize].load(Ordering::Relaxed)
    }

    /// Latency value (µs) at percentile `p` in `(0.0, 1.0]`.
    ///
    /// Cumulative scan: returns the smallest bucket whose cumulative count
    /// reaches `ceil(p * samples)`. A result of [`OVERFLOW_BUCKET_US`]
    /// means "at or above one millisecond". Returns 0 with no samples.
    pub fn percentile(&self, p: f64) -> u64 {
        let total = self.count();
        if total == 0 {
            return 0;
        }

        let target = ((p * total as f64).ceil() as u64).max(1);
        let mut cumulative = 0u64;
        for bucket in 0..BUCKETS {
            cumulative += self.buckets[bucket].load(Ordering::Relaxed);
            if cumulative >= target {
                return bucket as u64;
            }
        }
        OVERFLOW_BUCKET_US
    }

    /// Median latency.
    pub fn p50(&self) -> u64 {
        self.percentile(0.50)
    }

    pub fn p90(&self) -> u64 {
        self.percentile(0.90)
    }

    pub fn p95(&self) -> u64 {
        self.percentile(0.95)
    }

    pub fn p99(&self) -> u64 {
        self.percentile(0.99)
    }

    pub fn p999(&self) -> u64 {
        self.percentile(0.999)
    }

    /// Render a percentile for reports: the overflow bucket prints as a
    /// lower bound.
    pub fn format_percentile(value_us: u64) -> String {
        if value_us >= OVERFLOW_BUCKET_US {
            format!(">= {} us", OVERFLOW_BUCKET_US)
        } else {
            format!("{} us", value_us)
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_sample_median() {
        let h = LatencyHistogram::new();
        h.record_us(37);

        assert_eq!(h.count(), 1);
        assert_eq!(h.bucket_count(37), 1);
        assert_eq!(h.p50(), 37);
        assert_eq!(h.p999(), 37);
    }

    #[test]
    fn test_percentiles_over_uniform_samples() {
        let h = LatencyHistogram::new();
        for us in 1..=100 {
            h.record_us(us);
        }

        // Smallest bucket whose cumulative count reaches ceil(p * 100).
        assert_eq!(h.p50(), 50);
        assert_eq!(h.p90(), 90);
        assert_eq!(h.p95(), 95);
        assert_eq!(h.p99(), 99);
        assert_eq!(h.percentile(1.0), 100);
    }

    #[test]
    fn test_ceiling_target() {
        let h = LatencyHistogram::new();
        h.record_us(10);
        h.record_us(20);
        h.record_us(30);

        // ceil(0.5 * 3) = 2 -> second sample.
        assert_eq!(h.p50(), 20);
        // ceil(0.34 * 3) = 2 as well.
        assert_eq!(h.percentile(0.34), 20);
        // ceil(0.33 * 3) = 1 -> first sample.
        assert_eq!(h.percentile(0.33), 10);
    }

    #[test]
    fn test_overflow_saturation() {
        let h = LatencyHistogram::new();
        h.record_us(999);
        h.record_us(1000);
        h.record_us(250_000);

        assert_eq!(h.bucket_count(999), 1);
        assert_eq!(h.bucket_count(OVERFLOW_BUCKET_US), 2);
        assert_eq!(h.p999(), OVERFLOW_BUCKET_US);
        assert_eq!(
            LatencyHistogram::format_percentile(h.p999()),
            ">= 1000 us"
        );
    }

    #[test]
    fn test_empty_histogram() {
        let h = LatencyHistogram::new();
        assert_eq!(h.count(), 0);
        assert_eq!(h.p50(), 0);
    }
}
