//! Binary quote message and ring slot layouts.
//!
//! The wire frame is exactly 20 bytes, little-endian throughout, so a frame
//! decodes with a single unaligned byte copy.

use bytemuck::{Pod, Zeroable};
use core::fmt;
use core::mem::{align_of, size_of};

/// Target cache-line size for slot isolation.
pub const CACHE_LINE: usize = 64;

/// Size of one wire frame in bytes.
pub const WIRE_SIZE: usize = size_of::<Message>();

/// Core quote message - the fundamental unit of market data.
///
/// Layout is a wire invariant: `seq(u64) | px(f64) | qty(i32)`, packed,
/// little-endian. The sign of `qty` encodes side (positive = buy,
/// negative = sell, zero = invalid).
#[derive(Clone, Copy, Debug, Default)]
#[repr(C, packed)]
pub struct Message {
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// Price (IEEE-754, little-endian).
    pub px: f64,
    /// Signed quantity; sign encodes side.
    pub qty: i32,
}

const _: () = assert!(size_of::<Message>() == 20);

// SAFETY: Message is repr(C, packed) with only Pod fields and no padding.
unsafe impl Pod for Message {}
unsafe impl Zeroable for Message {}

/// Order side derived from the quantity sign.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
    Invalid,
}

impl Message {
    /// Create a new message.
    pub const fn new(seq: u64, px: f64, qty: i32) -> Self {
        Self { seq, px, qty }
    }

    /// Check message validity: `seq > 0`, `px > 0`, `qty != 0`.
    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        // Copy fields out of the packed struct before use.
        let seq = self.seq;
        let px = self.px;
        let qty = self.qty;
        seq > 0 && px > 0.0 && qty != 0
    }

    /// Side encoded in the quantity sign.
    #[inline(always)]
    pub fn side(&self) -> Side {
        let qty = self.qty;
        if qty > 0 {
            Side::Buy
        } else if qty < 0 {
            Side::Sell
        } else {
            Side::Invalid
        }
    }

    /// Decode one message from the first [`WIRE_SIZE`] bytes of `buf`.
    ///
    /// The copy is unaligned-safe; `buf` may point anywhere in a stream.
    ///
    /// # Panics
    /// Panics if `buf` is shorter than [`WIRE_SIZE`] (callers check first).
    #[inline(always)]
    pub fn read_from(buf: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(&buf[..WIRE_SIZE])
    }

    /// View the message as its wire bytes.
    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seq = self.seq;
        let px = self.px;
        let qty = self.qty;
        write!(f, "Msg{{seq={}, px={}, qty={}}}", seq, px, qty)
    }
}

/// One ring buffer entry: a parsed message plus its receive timestamp.
///
/// Cache-line aligned and padded to exactly one cache line so adjacent
/// slots never share a line between the producer and consumer cores.
#[derive(Clone, Copy, Debug, Default)]
#[repr(C, align(64))]
pub struct Slot {
    /// The parsed message.
    pub raw: Message,
    /// Receive timestamp, nanoseconds from the monotonic-raw clock,
    /// captured when the parser committed the message.
    pub rx_ts: u64,
}

const _: () = assert!(size_of::<Slot>() == CACHE_LINE);
const _: () = assert!(align_of::<Slot>() == CACHE_LINE);

impl Slot {
    /// Create a slot from a message and its receive timestamp.
    #[inline(always)]
    pub const fn new(raw: Message, rx_ts: u64) -> Self {
        Self { raw, rx_ts }
    }
}

/// Fan-in ring entry: a slot tagged with its feed of origin.
#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
pub struct FeedSlot {
    /// The slot as produced by the feed's local ring.
    pub slot: Slot,
    /// Feed origin identifier, unique across feeds of one run.
    pub origin_id: u32,
    /// Per-feed sequence number.
    pub feed_seq: u64,
    /// Nanosecond timestamp when the slot was forwarded into the fan-in ring.
    pub arrival_ts: u64,
}

const _: () = assert!(size_of::<FeedSlot>() == 2 * CACHE_LINE);

impl FeedSlot {
    /// Tag a slot with its origin.
    #[inline(always)]
    pub fn new(slot: Slot, origin_id: u32, feed_seq: u64, arrival_ts: u64) -> Self {
        Self {
            slot,
            origin_id,
            feed_seq,
            arrival_ts,
        }
    }
}
