//! Single-producer/single-consumer lock-free ring buffer.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{fence, Ordering};
use std::time::Instant;

use crate::{prefetch_read, validate_capacity, BackPressure, PaddedAtomicU64, RingError};

/// Single-producer/single-consumer lock-free ring buffer.
///
/// The memory-ordering contract is load-bearing and must not be weakened:
/// - the producer publishes slot data with a release store of `write_pos`;
///   the consumer observes that data only after an acquire load of
///   `write_pos`;
/// - the consumer reclaims space with a release store of `read_pos`; the
///   producer observes freed space only after an acquire load of `read_pos`.
///
/// Exactly one thread may push and exactly one thread may pop for the
/// lifetime of the ring. Slots are uninitialized at construction and only
/// valid after a successful push; a popped entry is a bitwise copy and the
/// in-ring original is logically dead once `read_pos` advances past it.
pub struct SpscRing<T: Copy> {
    /// Write cursor (owned by the producer).
    write_pos: PaddedAtomicU64,
    /// Read cursor (owned by the consumer).
    read_pos: PaddedAtomicU64,
    /// Maximum observed occupancy since construction (advisory).
    high_water_mark: PaddedAtomicU64,
    /// Preallocated slot storage.
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    capacity: u64,
    mask: u64,
}

// SAFETY: the ring is designed for one producer thread and one consumer
// thread; the cursor release/acquire protocol synchronizes slot access.
unsafe impl<T: Copy + Send> Send for SpscRing<T> {}
unsafe impl<T: Copy + Send> Sync for SpscRing<T> {}

impl<T: Copy> SpscRing<T> {
    /// Create a ring with `capacity` slots.
    ///
    /// Fails with [`RingError::InvalidCapacity`] unless `capacity` is a
    /// nonzero power of two no larger than 2^32. Storage is allocated once
    /// here; no allocation happens on any later operation.
    pub fn with_capacity(capacity: u64) -> Result<Self, RingError> {
        validate_capacity(capacity)?;

        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
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

    #[inline(always)]
    fn slot_ptr(&self, pos: u64) -> *mut MaybeUninit<T> {
        self.slots[(pos & self.mask) as usize].get()
    }

    /// Raise the advisory high-water mark to `occupancy` if it is higher.
    ///
    /// Relaxed CAS loop; updates may race on multi-producer variants but
    /// the value is advisory only.
    #[inline]
    fn update_high_water_mark(&self, occupancy: u64) {
        let mut hwm = self.high_water_mark.value.load(Ordering::Relaxed);
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
    }

    /// Attempt to push one value.
    ///
    /// Returns `false` if the ring is full. Never blocks, never allocates.
    #[inline(always)]
    pub fn try_push(&self, value: T) -> bool {
        let write = self.write_pos.value.load(Ordering::Relaxed);
        let read = self.read_pos.value.load(Ordering::Acquire);

        if write - read >= self.capacity {
            return false;
        }

        // SAFETY: single producer; the capacity check guarantees the slot at
        // `write` is not concurrently read by the consumer.
        unsafe {
            (*self.slot_ptr(write)).write(value);
        }

        fence(Ordering::Release);
        self.write_pos.value.store(write + 1, Ordering::Release);

        self.update_high_water_mark((write + 1) - read);
        true
    }

    /// Attempt to pop one value.
    ///
    /// Returns `None` if the ring is empty.
    #[inline(always)]
    pub fn try_pop(&self) -> Option<T> {
        let read = self.read_pos.value.load(Ordering::Relaxed);
        let write = self.write_pos.value.load(Ordering::Acquire);

        if read == write {
            return None;
        }

        fence(Ordering::Acquire);
        // SAFETY: single consumer; `read < write` means the producer has
        // fully published the slot at `read`.
        let value = unsafe { (*self.slot_ptr(read)).assume_init_read() };

        self.read_pos.value.store(read + 1, Ordering::Release);
        Some(value)
    }

    /// Push up to `src.len()` values with a single cursor update.
    ///
    /// Copies `min(src.len(), free)` values in order, wrapping at the mask,
    /// and returns how many were pushed.
    pub fn try_push_bulk(&self, src: &[T]) -> u64 {
        let write = self.write_pos.value.load(Ordering::Relaxed);
        let read = self.read_pos.value.load(Ordering::Acquire);

        let free = self.capacity - (write - read);
        let count = (src.len() as u64).min(free);
        if count == 0 {
            return 0;
        }

        for (i, value) in src[..count as usize].iter().enumerate() {
            // SAFETY: every position in `write..write + count` is free per
            // the capacity check above, and only the producer writes slots.
            unsafe {
                (*self.slot_ptr(write + i as u64)).write(*value);
            }
        }

        fence(Ordering::Release);
        self.write_pos.value.store(write + count, Ordering::Release);

        self.update_high_water_mark((write + count) - read);
        count
    }

    /// Pop up to `dst.len()` values with a single cursor update.
    ///
    /// Copies `min(dst.len(), used)` values in order into the front of `dst`
    /// and returns how many were popped.
    pub fn try_pop_bulk(&self, dst: &mut [T]) -> u64 {
        let read = self.read_pos.value.load(Ordering::Relaxed);
        let write = self.write_pos.value.load(Ordering::Acquire);

        let used = write - read;
        let count = (dst.len() as u64).min(used);
        if count == 0 {
            return 0;
        }

        fence(Ordering::Acquire);
        for (i, out) in dst[..count as usize].iter_mut().enumerate() {
            // SAFETY: every position in `read..read + count` was published
            // by the producer, and only the consumer reads slots.
            *out = unsafe { (*self.slot_ptr(read + i as u64)).assume_init_read() };
        }

        self.read_pos.value.store(read + count, Ordering::Release);
        count
    }

    /// [`try_push`](Self::try_push) plus a prefetch hint for the next slot.
    #[inline(always)]
    pub fn try_push_with_prefetch(&self, value: T) -> bool {
        let write = self.write_pos.value.load(Ordering::Relaxed);
        prefetch_read(self.slot_ptr(write + 1) as *const MaybeUninit<T>);
        self.try_push(value)
    }

    /// [`try_pop`](Self::try_pop) plus a prefetch hint for the next slot.
    #[inline(always)]
    pub fn try_pop_with_prefetch(&self) -> Option<T> {
        let read = self.read_pos.value.load(Ordering::Relaxed);
        prefetch_read(self.slot_ptr(read + 1) as *const MaybeUninit<T>);
        self.try_pop()
    }

    /// Push with an explicit back-pressure policy.
    ///
    /// With [`BackPressure::Drop`] this is `try_push_with_prefetch`. With
    /// [`BackPressure::Block`] it retries with cooperative yields; when
    /// `timeout_ns > 0` it gives up once the elapsed monotonic time reaches
    /// the timeout (granularity is one yield, not a precise sleep).
    pub fn try_push_or_block(&self, value: T, timeout_ns: u64, mode: BackPressure) -> bool {
        match mode {
            BackPressure::Drop => self.try_push_with_prefetch(value),
            BackPressure::Block => {
                let deadline = (timeout_ns > 0).then(Instant::now);
                loop {
                    if self.try_push_with_prefetch(value) {
                        return true;
                    }
                    if let Some(start) = deadline {
                        if start.elapsed().as_nanos() as u64 >= timeout_ns {
                            return false;
                        }
                    }
                    std::thread::yield_now();
                }
            }
        }
    }

    /// Current occupancy. Approximate while both sides are running.
    #[inline]
    pub fn size(&self) -> u64 {
        let write = self.write_pos.value.load(Ordering::Acquire);
        let read = self.read_pos.value.load(Ordering::Acquire);
        write - read
    }

    /// `true` when no message is resident.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
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
    fn test_single_message_round_trip() {
        let ring: SpscRing<u64> = SpscRing::with_capacity(4).unwrap();

        assert_eq!(ring.size(), 0);
        assert!(ring.try_push(42));
        assert_eq!(ring.size(), 1);
        assert_eq!(ring.try_pop(), Some(42));
        assert_eq!(ring.size(), 0);
        assert_eq!(ring.try_pop(), None);
    }

    #[test]
    fn test_invalid_capacity() {
        assert_eq!(
            SpscRing::<u64>::with_capacity(0).err(),
            Some(RingError::InvalidCapacity(0))
        );
        assert_eq!(
            SpscRing::<u64>::with_capacity(6).err(),
            Some(RingError::InvalidCapacity(6))
        );
    }

    #[test]
    fn test_full_ring_rejects_push() {
        let ring: SpscRing<u64> = SpscRing::with_capacity(2).unwrap();

        assert!(ring.try_push(1));
        assert!(ring.try_push(2));
        assert!(!ring.try_push(3));
        assert_eq!(ring.size(), 2);
    }

    #[test]
    fn test_wrap_around() {
        let ring: SpscRing<u64> = SpscRing::with_capacity(4).unwrap();

        // Push 7 while popping to keep at most 4 resident.
        let mut popped = Vec::new();
        let mut next = 1u64;
        while popped.len() < 7 {
            while next <= 7 && ring.try_push(next) {
                next += 1;
            }
            if let Some(v) = ring.try_pop() {
                popped.push(v);
            }
        }
        assert_eq!(popped, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_bulk_push_pop_wraps() {
        let ring: SpscRing<u64> = SpscRing::with_capacity(8).unwrap();

        // Advance the cursors so the bulk copy straddles the wrap point.
        for i in 0..6 {
            assert!(ring.try_push(i));
        }
        let mut drain = [0u64; 6];
        assert_eq!(ring.try_pop_bulk(&mut drain), 6);

        let src: Vec<u64> = (100..108).collect();
        assert_eq!(ring.try_push_bulk(&src), 8);
        assert_eq!(ring.try_push_bulk(&src), 0);

        let mut dst = [0u64; 8];
        assert_eq!(ring.try_pop_bulk(&mut dst), 8);
        assert_eq!(&dst[..], &src[..]);
    }

    #[test]
    fn test_bulk_push_partial_when_nearly_full() {
        let ring: SpscRing<u64> = SpscRing::with_capacity(4).unwrap();
        assert!(ring.try_push(0));

        let src = [1u64, 2, 3, 4, 5];
        assert_eq!(ring.try_push_bulk(&src), 3);
        assert_eq!(ring.size(), 4);
    }

    #[test]
    fn test_high_water_mark() {
        let ring: SpscRing<u64> = SpscRing::with_capacity(8).unwrap();
        assert_eq!(ring.high_water_mark(), 0);

        ring.try_push(1);
        ring.try_push(2);
        ring.try_push(3);
        assert_eq!(ring.high_water_mark(), 3);

        ring.try_pop();
        ring.try_pop();
        ring.try_push(4);
        // HWM never decreases.
        assert_eq!(ring.high_water_mark(), 3);
    }

    #[test]
    fn test_prefetch_variants_match_plain_semantics() {
        let ring: SpscRing<u64> = SpscRing::with_capacity(2).unwrap();

        assert!(ring.try_push_with_prefetch(1));
        assert!(ring.try_push_with_prefetch(2));
        assert!(!ring.try_push_with_prefetch(3));
        assert_eq!(ring.try_pop_with_prefetch(), Some(1));
        assert_eq!(ring.try_pop_with_prefetch(), Some(2));
        assert_eq!(ring.try_pop_with_prefetch(), None);
    }

    #[test]
    fn test_block_mode_times_out() {
        let ring: SpscRing<u64> = SpscRing::with_capacity(1).unwrap();
        assert!(ring.try_push(1));

        // 1ms deadline against a full ring with no consumer.
        assert!(!ring.try_push_or_block(2, 1_000_000, BackPressure::Block));
    }

    #[test]
    fn test_block_mode_succeeds_when_drained() {
        let ring = Arc::new(SpscRing::<u64>::with_capacity(1).unwrap());
        assert!(ring.try_push(1));

        let consumer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(5));
                ring.try_pop()
            })
        };

        assert!(ring.try_push_or_block(2, 1_000_000_000, BackPressure::Block));
        assert_eq!(consumer.join().unwrap(), Some(1));
        assert_eq!(ring.try_pop(), Some(2));
    }

    #[test]
    fn test_drop_mode_is_plain_push() {
        let ring: SpscRing<u64> = SpscRing::with_capacity(1).unwrap();
        assert!(ring.try_push_or_block(1, 0, BackPressure::Drop));
        assert!(!ring.try_push_or_block(2, 0, BackPressure::Drop));
    }

    #[test]
    fn test_cache_line_aligned_payloads_stay_aligned() {
        #[repr(C, align(64))]
        #[derive(Clone, Copy)]
        struct Aligned([u8; 64]);

        let ring: SpscRing<Aligned> = SpscRing::with_capacity(8).unwrap();
        for pos in 0..ring.capacity() {
            let addr = ring.slots[pos as usize].get() as usize;
            assert_eq!(addr % 64, 0);
        }

        assert!(ring.try_push(Aligned([7; 64])));
        assert_eq!(ring.try_pop().unwrap().0[0], 7);
    }

    #[test]
    fn test_threaded_fifo_order() {
        const COUNT: u64 = 200_000;
        let ring = Arc::new(SpscRing::<u64>::with_capacity(1024).unwrap());

        let producer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                for i in 0..COUNT {
                    while !ring.try_push(i) {
                        std::hint::spin_loop();
                    }
                }
            })
        };

        let mut expected = 0u64;
        while expected < COUNT {
            if let Some(v) = ring.try_pop() {
                assert_eq!(v, expected);
                expected += 1;
            } else {
                std::hint::spin_loop();
            }
        }

        producer.join().unwrap();
        assert!(ring.is_empty());
        assert!(ring.high_water_mark() <= ring.capacity());
    }
}
