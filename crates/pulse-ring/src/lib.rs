//! Lock-free ring buffers for market-data fan-in.
//!
//! This crate implements the two queue shapes the ingestion path needs:
//! a single-producer/single-consumer ring ([`SpscRing`]) with cache-line
//! isolated cursors, and a multi-producer/single-consumer fan-in ring
//! ([`MpscRing`]) whose write cursor is claimed by compare-and-swap.
//!
//! Both rings preallocate their storage at construction and perform no
//! allocation afterwards. "Full" and "empty" are normal outcomes, not
//! errors; the only failure mode is an invalid capacity at construction.

use core::fmt;
use core::sync::atomic::AtomicU64;

mod mpsc;
mod spsc;

pub use mpsc::MpscRing;
pub use spsc::SpscRing;

/// Maximum supported ring capacity (2^32 slots).
pub const MAX_CAPACITY: u64 = 1 << 32;

/// Padded atomic counter to prevent false sharing.
///
/// Uses 128-byte alignment so each cursor occupies its own cache line
/// (and its prefetch pair on architectures that fetch two lines).
#[repr(C, align(128))]
pub(crate) struct PaddedAtomicU64 {
    pub(crate) value: AtomicU64,
}

impl PaddedAtomicU64 {
    pub(crate) const fn new(v: u64) -> Self {
        Self {
            value: AtomicU64::new(v),
        }
    }
}

/// Ring construction errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RingError {
    /// Capacity is zero, not a power of two, or exceeds [`MAX_CAPACITY`].
    InvalidCapacity(u64),
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingError::InvalidCapacity(cap) => write!(
                f,
                "ring capacity must be a nonzero power of two <= 2^32, got {}",
                cap
            ),
        }
    }
}

impl std::error::Error for RingError {}

/// Policy applied when a push finds the ring full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackPressure {
    /// Drop the message (the caller counts it).
    #[default]
    Drop,
    /// Retry with cooperative yielding until space frees or a deadline passes.
    Block,
}

/// Validate a ring capacity.
pub(crate) fn validate_capacity(capacity: u64) -> Result<(), RingError> {
    if capacity == 0 || !capacity.is_power_of_two() || capacity > MAX_CAPACITY {
        return Err(RingError::InvalidCapacity(capacity));
    }
    Ok(())
}

/// Prefetch hint for the slot at `ptr`.
///
/// No-op on platforms without a prefetch primitive.
#[inline(always)]
pub(crate) fn prefetch_read<T>(ptr: *const T) {
    #[cfg(target_arch = "x86_64")]
    // SAFETY: prefetch is a hint; it never faults, even on invalid addresses.
    unsafe {
        core::arch::x86_64::_mm_prefetch(ptr as *const i8, core::arch::x86_64::_MM_HINT_T0);
    }
    #[cfg(not(target_arch = "x86_64"))]
    let _ = ptr;
}
