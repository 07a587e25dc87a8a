//! Allocation audit for the locking fast and slow paths.
//!
//! Uses a counting global allocator to verify that uncontended lock and
//! unlock never touch the heap, and that the control block and pegs
//! allocated under contention are all given back once the mutex
//! quiesces.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::thread;
use std::time::Duration;

use skinnylock::raw::yields::Mutex;

/// A thin wrapper around the system allocator that counts allocations and
/// deallocations via atomic counters.
struct CountingAllocator;

static ALLOCS: AtomicU64 = AtomicU64::new(0);
static DEALLOCS: AtomicU64 = AtomicU64::new(0);

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        ALLOCS.fetch_add(1, Ordering::Relaxed);
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        DEALLOCS.fetch_add(1, Ordering::Relaxed);
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

/// Serializes the measurement windows, so concurrently running tests do
/// not contaminate each other's counter deltas.
static AUDIT_GUARD: StdMutex<()> = StdMutex::new(());

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    allocs: u64,
    deallocs: u64,
}

impl Snapshot {
    fn take() -> Self {
        Self {
            allocs: ALLOCS.load(Ordering::SeqCst),
            deallocs: DEALLOCS.load(Ordering::SeqCst),
        }
    }

    fn allocs_since(&self, before: &Self) -> u64 {
        self.allocs - before.allocs
    }

    fn deallocs_since(&self, before: &Self) -> u64 {
        self.deallocs - before.deallocs
    }
}

#[test]
fn uncontended_lock_unlock_does_not_allocate() {
    let _serial = AUDIT_GUARD.lock().unwrap_or_else(PoisonError::into_inner);
    let mutex = Mutex::new(0u32);

    // Warm up whatever the surrounding machinery allocates lazily.
    for _ in 0..8 {
        *mutex.lock() += 1;
    }

    let before = Snapshot::take();
    for _ in 0..1_000 {
        *mutex.lock() += 1;
        assert!(mutex.try_lock().is_some());
    }
    let after = Snapshot::take();

    assert_eq!(after.allocs_since(&before), 0, "fast path must not allocate");
    assert_eq!(*mutex.lock(), 1_008);
}

/// Rounds of forced contention: a worker takes the lock and signals, the
/// main thread then locks while the worker provably still holds it.
#[test]
fn contention_allocations_are_reclaimed_on_quiesce() {
    const WARMUP: usize = 2;
    const ROUNDS: usize = 5;
    const TOTAL: usize = WARMUP + ROUNDS;

    let _serial = AUDIT_GUARD.lock().unwrap_or_else(PoisonError::into_inner);

    let mutex = Arc::new(Mutex::new(0u32));
    let holds = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));
    let exit = Arc::new(AtomicUsize::new(0));

    let worker = {
        let (mutex, holds) = (Arc::clone(&mutex), Arc::clone(&holds));
        let (done, exit) = (Arc::clone(&done), Arc::clone(&exit));
        thread::spawn(move || {
            for round in 1..=TOTAL {
                let mut guard = mutex.lock();
                *guard += 1;
                holds.store(round, Ordering::SeqCst);
                // Give the main thread the whole window to observe a held
                // word and take the slow path.
                thread::sleep(Duration::from_millis(10));
                drop(guard);
                while done.load(Ordering::SeqCst) < round {
                    std::hint::spin_loop();
                }
            }
            // Thread teardown releases lazily allocated thread state;
            // hold off until the measurement window has closed.
            while exit.load(Ordering::SeqCst) == 0 {
                std::hint::spin_loop();
            }
        })
    };

    let mut before = Snapshot::take();
    for round in 1..=TOTAL {
        while holds.load(Ordering::SeqCst) < round {
            std::hint::spin_loop();
        }
        // The worker holds the lock right now, so this is the slow path:
        // it promotes the word to a control block and parks.
        *mutex.lock() += 1;
        done.store(round, Ordering::SeqCst);
        if round == WARMUP {
            // Lazily allocated thread-parking state now exists on both
            // threads; measure only the rounds after it.
            before = Snapshot::take();
        }
    }
    let after = Snapshot::take();
    exit.store(1, Ordering::SeqCst);
    worker.join().expect("contending worker failed");

    let allocs = after.allocs_since(&before);
    let deallocs = after.deallocs_since(&before);
    assert_eq!(allocs, deallocs, "every control block and peg must be freed");
    assert!(allocs > 0, "contended rounds must have inflated the mutex");
    // Each round costs one control block plus a handful of pegs.
    assert!(allocs <= (ROUNDS as u64) * 8, "unexpected allocation volume: {allocs}");

    assert_eq!(*mutex.lock(), 2 * TOTAL as u32);
}
