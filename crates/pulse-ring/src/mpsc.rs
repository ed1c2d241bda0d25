//! Multi-producer/single-consumer fan-in ring buffer.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::{validate_capacity, PaddedAtomicU64, RingError};

/// One fan-in slot: the value plus its publish sequence.
///
/// `seq` moves to `pos + 1` (release) once the claiming producer has
/// finished writing `value`; the consumer only reads a slot whose sequence
/// matches its read position. Without this marker the consumer could
/// observe a claimed-but-unwritten slot, since `write_pos` advances at
/// claim time, before the value is stored.
struct MpscSlot<T> {
    seq: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Multi-producer/single-consumer lock-free ring buffer.
///
/// Same geometry as [`SpscRing`](crate::SpscRing), but the write cursor is
/// claimed by a single-shot compare-and-swap: on CAS failure another
/// producer won the slot and `try_push` returns `false`, so the caller
/// drops and counts the message rather than spinning. Producers that
/// observe a full ring return `false` without attempting the CAS.
///
/// Ordering is only guaranteed per producer; cross-producer interleaving
/// reflects CAS success order. Exactly one thread may pop.
pub struct MpscRing<T: Copy> {
    /// Write cursor, claimed by CAS (shared among producers).
    write_pos: PaddedAtomicU64,
    /// Read cursor (owned by the consumer).
    read_pos: PaddedAtomicU64,
    /// Maximum observed occupancy since construction (advisory).
    high_water_mark: PaddedAtomicU64,
    slots: Box<[MpscSlot<T>]>,
    capacity: u64,
    mask: u64,
}

// SAFETY: slot values are handed off through the per-slot publish sequence
// (release store by the claiming producer, acquire load by the consumer);
// cursors are atomic.
unsafe impl<T: Copy + Send> Send for MpscRing<T> {}
unsafe impl<T: Copy + Send> Sync for MpscRing<T> {}

impl<T: Copy> MpscRing<T> {
    /// Create a ring with `capacity` slots.
    ///
    /// Fails with [`RingError::InvalidCapacity`] unless `capacity` is a
    /// nonzero power of two no larger than 2^32.
    pub fn with_capacity(capacity: u64) -> Result<Self, RingError> {
        validate_capacity(capacity)?;

        let slots = (0..capacity)
            .map(|_| MpscSlot {
                seq: AtomicU64::new(0),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        Ok(Self {
            write_pos: PaddedAtomicU64::new(0),
            read_pos: PaddedAtomicU64::new(0),
            high_water_mark: PaddedAtomicU64::new(0),
            slots,
            capacity,
            mask: capacity - 1,
        })
    }

    /// Attempt to push one value. Safe to call from many threads.
    ///
    /// Single-shot semantics: returns `false` both when the ring is full
    /// (checked before the CAS) and when another producer wins the claim.
    #[inline(always)]
    pub fn try_push(&self, value: T) -> bool {
        let write = self.write_pos.value.load(Ordering::Relaxed);
        let read = self.read_pos.value.load(Ordering::Acquire);

        if write - read >= self.capacity {
            return false;
        }

        if self
            .write_pos
            .value
            .compare_exchange(write, write + 1, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        let slot = &self.slots[(write & self.mask) as usize];
        // SAFETY: the CAS gave this producer exclusive ownership of the slot
        // at `write`; the capacity check (against a read cursor that only
        // advances after the consumer's copy) rules out a concurrent reader.
        unsafe {
            (*slot.value.get()).write(value);
        }
        // Publish: positions are unique, so `write + 1` is an unambiguous
        // ready marker for this lap.
        slot.seq.store(write + 1, Ordering::Release);

        // Advisory; may race with other producers.
        let mut hwm = self.high_water_mark.value.load(Ordering::Relaxed);
        let occupancy = (write + 1) - read;
        while occupancy > hwm {
            match self.high_water_mark.value.compare_exchange_weak(
                hwm,
                occupancy,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => hwm = current,
            }
        }

        true
    }

    /// Attempt to pop one value. Single consumer only.
    ///
    /// Returns `None` when the ring is empty or when the head slot is
    /// claimed but not yet published.
    #[inline(always)]
    pub fn try_pop(&self) -> Option<T> {
        let read = self.read_pos.value.load(Ordering::Relaxed);
        let slot = &self.slots[(read & self.mask) as usize];

        if slot.seq.load(Ordering::Acquire) != read + 1 {
            return None;
        }

        // SAFETY: the sequence match proves the producer's write to this
        // slot happened-before this load; only this thread pops.
        let value = unsafe { (*slot.value.get()).assume_init_read() };

        self.read_pos.value.store(read + 1, Ordering::Release);
        Some(value)
    }

    /// Current occupancy. Approximate: may transiently include slots that
    /// are claimed but not yet published.
    #[inline]
    pub fn size(&self) -> u64 {
        let write = self.write_pos.value.load(Ordering::Acquire);
        let read = self.read_pos.value.load(Ordering::Acquire);
        write - read
    }

    /// Maximum observed occupancy since construction.
    #[inline]
    pub fn high_water_mark(&self) -> u64 {
        self.high_water_mark.value.load(Ordering::Acquire)
    }

    /// Total slot count.
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Occupancy as a fraction of capacity.
    #[inline]
    pub fn load_factor(&self) -> f64 {
        self.size() as f64 / self.capacity as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_push_pop_round_trip() {
        let ring: MpscRing<u64> = MpscRing::with_capacity(4).unwrap();

        assert!(ring.try_push(7));
        assert_eq!(ring.size(), 1);
        assert_eq!(ring.try_pop(), Some(7));
        assert_eq!(ring.try_pop(), None);
    }

    #[test]
    fn test_invalid_capacity() {
        assert_eq!(
            MpscRing::<u64>::with_capacity(12).err(),
            Some(RingError::InvalidCapacity(12))
        );
    }

    #[test]
    fn test_full_returns_false_without_claim() {
        let ring: MpscRing<u64> = MpscRing::with_capacity(2).unwrap();

        assert!(ring.try_push(1));
        assert!(ring.try_push(2));

        let write_before = ring.size();
        assert!(!ring.try_push(3));
        // A rejected push must not have advanced the claim cursor.
        assert_eq!(ring.size(), write_before);

        assert_eq!(ring.try_pop(), Some(1));
        assert!(ring.try_push(3));
    }

    #[test]
    fn test_wrap_around() {
        let ring: MpscRing<u64> = MpscRing::with_capacity(4).unwrap();

        for round in 0..10u64 {
            let base = round * 4;
            for i in 0..4 {
                assert!(ring.try_push(base + i));
            }
            for i in 0..4 {
                assert_eq!(ring.try_pop(), Some(base + i));
            }
        }
    }

    #[test]
    fn test_per_producer_fifo_under_contention() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 20_000;

        let ring = Arc::new(MpscRing::<(u64, u64)>::with_capacity(256).unwrap());
        let pushed: Arc<Vec<AtomicU64>> =
            Arc::new((0..PRODUCERS).map(|_| AtomicU64::new(0)).collect());

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|origin| {
                let ring = Arc::clone(&ring);
                let pushed = Arc::clone(&pushed);
                std::thread::spawn(move || {
                    for seq in 0..PER_PRODUCER {
                        // Single-shot push: retry at the call site, counting
                        // every accepted message exactly once.
                        while !ring.try_push((origin, seq)) {
                            std::hint::spin_loop();
                        }
                        pushed[origin as usize].fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        let mut next_seq = vec![0u64; PRODUCERS as usize];
        let mut total = 0u64;
        while total < PRODUCERS * PER_PRODUCER {
            if let Some((origin, seq)) = ring.try_pop() {
                // Per-origin sub-sequence must equal that producer's order.
                assert_eq!(seq, next_seq[origin as usize]);
                next_seq[origin as usize] += 1;
                total += 1;
            } else {
                std::hint::spin_loop();
            }
        }

        for handle in handles {
            handle.join().unwrap();
        }
        for counter in pushed.iter() {
            assert_eq!(counter.load(Ordering::Relaxed), PER_PRODUCER);
        }
        assert_eq!(ring.try_pop(), None);
    }

    #[test]
    fn test_claimed_unpublished_slot_is_not_popped() {
        // A rejected single-shot push leaves no half-published state behind:
        // pops only ever return values that were fully written.
        let ring = Arc::new(MpscRing::<u64>::with_capacity(2).unwrap());

        let writers: Vec<_> = (0..2)
            .map(|base| {
                let ring = Arc::clone(&ring);
                std::thread::spawn(move || {
                    let mut accepted = 0u64;
                    for i in 0..10_000u64 {
                        if ring.try_push(base * 1_000_000 + i) {
                            accepted += 1;
                        }
                    }
                    accepted
                })
            })
            .collect();

        let mut popped = 0u64;
        loop {
            if let Some(v) = ring.try_pop() {
                assert!(v % 1_000_000 < 10_000);
                popped += 1;
            } else if writers.iter().all(|w| w.is_finished()) {
                break;
            }
        }

        let accepted: u64 = writers.into_iter().map(|w| w.join().unwrap()).sum();
        // Drain anything that landed between the last pop and the check.
        while ring.try_pop().is_some() {
            popped += 1;
        }
        assert_eq!(popped, accepted);
    }
}
