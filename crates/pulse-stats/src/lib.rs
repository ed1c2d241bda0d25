//! Ingestion statistics with nanosecond-precision latency measurement.
//!
//! Provides the monotonic timestamp source, a fixed-bucket microsecond
//! latency histogram, and the atomic counter block shared between the
//! reception and consumer threads.

pub mod clock;
pub mod histogram;
mod stats;

pub use clock::{now_ns, MonotonicClock};
pub use histogram::{LatencyHistogram, OVERFLOW_BUCKET_US};
pub use stats::IngestStats;
