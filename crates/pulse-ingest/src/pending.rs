//! Pending-packet ring for zero-copy release.
//!
//! Zero-copy transports hand the parser a borrowed buffer plus a token; the
//! token may only be released after the parser has finished reading. Tokens
//! flow through a fixed SPSC ring from the reception thread to the consumer
//! thread, which keeps the reception path lock-free. A full ring spills:
//! the token is released immediately (giving up zero-copy for that packet)
//! rather than leaked.

use pulse_ring::SpscRing;
use pulse_stats::IngestStats;

use crate::transport::{PacketRelease, PacketToken};

/// Fixed capacity of the pending-token ring.
pub const PENDING_CAPACITY: u64 = 1024;

/// SPSC ring of in-flight zero-copy packet tokens.
pub struct PendingPacketRing {
    ring: SpscRing<PacketToken>,
}

impl PendingPacketRing {
    pub fn new() -> Self {
        Self {
            ring: SpscRing::with_capacity(PENDING_CAPACITY)
                .expect("PENDING_CAPACITY is a power of two"),
        }
    }

    /// Defer the token for later release, or release it immediately when
    /// the ring is full. Reception thread only.
    #[inline(always)]
    pub fn defer_or_release<R: PacketRelease>(
        &self,
        token: PacketToken,
        releaser: &R,
        stats: &IngestStats,
    ) {
        if !self.ring.try_push(token) {
            releaser.release(token);
            stats.record_pending_spill();
        }
    }

    /// Release every deferred token. Consumer thread only.
    pub fn drain<R: PacketRelease>(&self, releaser: &R) -> u64 {
        let mut released = 0;
        while let Some(token) = self.ring.try_pop() {
            releaser.release(token);
            released += 1;
        }
        released
    }

    /// Tokens currently awaiting release.
    pub fn len(&self) -> u64 {
        self.ring.size()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl Default for PendingPacketRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRelease {
        released: Mutex<Vec<u64>>,
        count: AtomicU64,
    }

    impl PacketRelease for RecordingRelease {
        fn release(&self, token: PacketToken) {
            self.released.lock().unwrap().push(token.0);
            self.count.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_defer_then_drain_releases_in_order() {
        let pending = PendingPacketRing::new();
        let releaser = RecordingRelease::default();
        let stats = IngestStats::new();

        for token in 0..5 {
            pending.defer_or_release(PacketToken(token), &releaser, &stats);
        }
        assert_eq!(pending.len(), 5);
        assert_eq!(releaser.count.load(Ordering::Relaxed), 0);

        assert_eq!(pending.drain(&releaser), 5);
        assert!(pending.is_empty());
        assert_eq!(*releaser.released.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(stats.pending_spills(), 0);
    }

    #[test]
    fn test_full_ring_spills_immediately() {
        let pending = PendingPacketRing::new();
        let releaser = RecordingRelease::default();
        let stats = IngestStats::new();

        for token in 0..PENDING_CAPACITY {
            pending.defer_or_release(PacketToken(token), &releaser, &stats);
        }
        assert_eq!(pending.len(), PENDING_CAPACITY);

        // The next token cannot be deferred and must not leak.
        pending.defer_or_release(PacketToken(9999), &releaser, &stats);
        assert_eq!(stats.pending_spills(), 1);
        assert_eq!(releaser.count.load(Ordering::Relaxed), 1);
        assert_eq!(*releaser.released.lock().unwrap(), vec![9999]);

        assert_eq!(pending.drain(&releaser), PENDING_CAPACITY);
    }
}
