//! Incremental byte-stream parser.
//!
//! Transport reads land on arbitrary byte boundaries; the parser carries the
//! trailing partial frame across calls in a bounded, preallocated buffer and
//! stamps every committed message individually. One timestamp per read would
//! collapse hundreds of messages onto a single instant and destroy the tail
//! of the latency distribution.

use arrayvec::ArrayVec;

use pulse_proto::{Message, Slot, WIRE_SIZE};
use pulse_ring::SpscRing;
use pulse_stats::{clock, IngestStats};

/// Partial-frame carry-over bound.
pub const MAX_PARTIAL_BYTES: usize = 65_536;

/// Incremental decoder from byte chunks to ring slots.
///
/// Owned by exactly one reception thread; the partial buffer is allocated
/// inline at construction and never grows.
pub struct StreamParser {
    partial: ArrayVec<u8, MAX_PARTIAL_BYTES>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self {
            partial: ArrayVec::new(),
        }
    }

    /// Bytes currently carried over from previous calls. Always < 20
    /// between calls, except transiently while a call is in progress.
    pub fn partial_len(&self) -> usize {
        self.partial.len()
    }

    /// Parse a chunk, pushing every complete message onto `ring`.
    ///
    /// Committed messages count into `stats.record_received`; messages that
    /// find the ring full count into `stats.record_dropped`. Leftover bytes
    /// (always fewer than one frame) are carried to the next call.
    pub fn parse(&mut self, bytes: &[u8], ring: &SpscRing<Slot>, stats: &IngestStats) {
        if self.partial.is_empty() {
            let consumed = drain_frames(bytes, ring, stats);
            self.stash(&bytes[consumed..]);
            return;
        }

        if self.partial.len() + bytes.len() > MAX_PARTIAL_BYTES {
            // Bounded carry-over: discard the stale partial, count the
            // overflow, and re-establish frame alignment by treating the
            // incoming chunk as boundary-aligned.
            stats.record_partial_overflow();
            self.partial.clear();
            let consumed = drain_frames(bytes, ring, stats);
            self.stash(&bytes[consumed..]);
            return;
        }

        self.partial
            .try_extend_from_slice(bytes)
            .expect("combined size checked against MAX_PARTIAL_BYTES");

        let consumed = drain_frames(&self.partial, ring, stats);
        let len = self.partial.len();
        self.partial.as_mut_slice().copy_within(consumed..len, 0);
        self.partial.truncate(len - consumed);
    }

    /// Zero-copy variant: identical observable semantics.
    ///
    /// The caller guarantees `bytes` outlives this call (the transport holds
    /// the packet until its token is released), so decoding may read the
    /// delivered buffer directly. No allocation either way.
    #[inline]
    pub fn parse_zero_copy(&mut self, bytes: &[u8], ring: &SpscRing<Slot>, stats: &IngestStats) {
        self.parse(bytes, ring, stats);
    }

    fn stash(&mut self, rest: &[u8]) {
        debug_assert!(rest.len() < WIRE_SIZE);
        self.partial
            .try_extend_from_slice(rest)
            .expect("remainder is smaller than one frame");
    }
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode and push every whole frame in `buf`; returns bytes consumed.
///
/// Each message gets its own `rx_ts`, stamped at the moment the frame is
/// committed.
fn drain_frames(buf: &[u8], ring: &SpscRing<Slot>, stats: &IngestStats) -> usize {
    let mut offset = 0;
    while offset + WIRE_SIZE <= buf.len() {
        let msg = Message::read_from(&buf[offset..]);
        let slot = Slot::new(msg, clock::now_ns());

        if ring.try_push(slot) {
            stats.record_received();
        } else {
            stats.record_dropped();
        }
        offset += WIRE_SIZE;
    }
    offset
}
