//! Monotonic nanosecond timestamp source.
//!
//! Receive timestamps are stamped on the reception thread and subtracted on
//! the consumer thread, so both sides must share one epoch: a process-wide
//! clock anchor behind a one-shot latch. The anchor is off the data path;
//! steady-state reads are a raw counter read plus a scale.

use std::sync::OnceLock;

/// Monotonic clock anchored at its construction instant.
pub struct MonotonicClock {
    clock: quanta::Clock,
    anchor: u64,
}

impl MonotonicClock {
    /// Create a clock anchored at now.
    pub fn new() -> Self {
        let clock = quanta::Clock::new();
        let anchor = clock.raw();
        Self { clock, anchor }
    }

    /// Nanoseconds elapsed since the anchor. Non-decreasing.
    #[inline(always)]
    pub fn now_ns(&self) -> u64 {
        let raw = self.clock.raw();
        self.clock.delta_as_nanos(self.anchor, raw)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_CLOCK: OnceLock<MonotonicClock> = OnceLock::new();

/// Process-wide monotonic timestamp in nanoseconds.
///
/// All `rx_ts` stamps and latency computations go through this function so
/// producer and consumer share the same epoch.
#[inline(always)]
pub fn now_ns() -> u64 {
    GLOBAL_CLOCK.get_or_init(MonotonicClock::new).now_ns()
}
