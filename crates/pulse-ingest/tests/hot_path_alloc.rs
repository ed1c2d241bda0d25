//! Zero-allocation probe for the steady-state data path.
//!
//! Every buffer is sized at construction; after warm-up, a full
//! parse -> push -> pop -> record cycle must not touch the allocator.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU64, Ordering};

use pulse_ingest::StreamParser;
use pulse_proto::{Message, Slot};
use pulse_ring::SpscRing;
use pulse_stats::IngestStats;

struct CountingAllocator;

static ALLOCATIONS: AtomicU64 = AtomicU64::new(0);

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
        System.realloc(ptr, layout, new_size)
    }
}

#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator;

#[test]
fn steady_state_data_path_does_not_allocate() {
    let ring: SpscRing<Slot> = SpscRing::with_capacity(256).unwrap();
    let stats = IngestStats::new();
    let mut parser = StreamParser::new();

    let mut wire = Vec::new();
    for seq in 1..=64u64 {
        wire.extend_from_slice(Message::new(seq, 10.0, 1).as_bytes());
    }

    // Warm up: first timestamps initialize the process-wide clock.
    parser.parse(&wire, &ring, &stats);
    while let Some(slot) = ring.try_pop() {
        stats.record_processed(&slot);
    }

    let before = ALLOCATIONS.load(Ordering::Relaxed);

    for _ in 0..1000 {
        // Fragmented feed, so the partial buffer is exercised too.
        for chunk in wire.chunks(37) {
            parser.parse(chunk, &ring, &stats);
        }
        while let Some(slot) = ring.try_pop() {
            stats.record_processed(&slot);
        }
    }

    let after = ALLOCATIONS.load(Ordering::Relaxed);
    assert_eq!(
        after - before,
        0,
        "steady-state data path performed heap allocations"
    );
}
