use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

use loom::cell::{ConstPtr, MutPtr, UnsafeCell};

/// A trait for guard types that hold exclusive access to the underlying
/// data behind Loom's [`UnsafeCell`].
///
/// # Safety
///
/// Must guarantee that an instance of the guard holds exclusive access to
/// its underlying data through all its lifetime.
pub unsafe trait Guard: Sized {
    /// The target type after dereferencing [`GuardDeref`] or
    /// [`GuardDerefMut`].
    type Target: ?Sized;

    /// Returns a shared reference to the underlying [`UnsafeCell`].
    fn get(&self) -> &UnsafeCell<Self::Target>;

    /// Get a Loom immutable pointer bounded by this guard lifetime.
    fn deref(&self) -> GuardDeref<'_, Self> {
        GuardDeref::new(self)
    }

    /// Get a Loom mutable pointer bounded by this guard lifetime.
    fn deref_mut(&self) -> GuardDerefMut<'_, Self> {
        GuardDerefMut::new(self)
    }
}

/// A Loom immutable pointer borrowed from a guard instance.
pub struct GuardDeref<'a, G: Guard> {
    ptr: ConstPtr<G::Target>,
    marker: PhantomData<(&'a G::Target, &'a G)>,
}

impl<G: Guard> GuardDeref<'_, G> {
    fn new(guard: &G) -> Self {
        let ptr = guard.get().get();
        Self { ptr, marker: PhantomData }
    }
}

impl<G: Guard> Deref for GuardDeref<'_, G> {
    type Target = G::Target;

    fn deref(&self) -> &Self::Target {
        // SAFETY: Our lifetime is bounded by the guard borrow.
        unsafe { self.ptr.deref() }
    }
}

/// A Loom mutable pointer borrowed from a guard instance.
pub struct GuardDerefMut<'a, G: Guard> {
    ptr: MutPtr<G::Target>,
    marker: PhantomData<(&'a G::Target, &'a G)>,
}

impl<G: Guard> GuardDerefMut<'_, G> {
    fn new(guard: &G) -> Self {
        let ptr = guard.get().get_mut();
        Self { ptr, marker: PhantomData }
    }
}

impl<G: Guard> Deref for GuardDerefMut<'_, G> {
    type Target = G::Target;

    fn deref(&self) -> &Self::Target {
        // SAFETY: Our lifetime is bounded by the guard borrow.
        unsafe { self.ptr.deref() }
    }
}

impl<G: Guard> DerefMut for GuardDerefMut<'_, G> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: Our lifetime is bounded by the guard borrow.
        unsafe { self.ptr.deref() }
    }
}

pub mod models {
    use core::array;

    use loom::sync::Arc;
    use loom::{model, thread};

    use crate::loom::Guard;
    use crate::test::{LockThen, TryLockThen};

    type Int = usize;
    const LOCKS: Int = 3;

    /// Increments a shared integer.
    fn inc<L: LockThen<Target = Int>>(lock: &Arc<L>) {
        lock.lock_then(|guard| *guard.deref_mut() += 1);
    }

    /// Get the shared integer.
    fn get<L: LockThen<Target = Int>>(lock: &Arc<L>) -> Int {
        lock.lock_then(|guard| *guard.deref())
    }

    /// Evaluates that concurrent `lock` calls will serialize all mutations
    /// against the shared data, therefore no data races.
    pub fn lock_join<L: LockThen<Target = Int> + 'static>() {
        model(|| {
            const RUNS: Int = LOCKS;
            let data = Arc::new(L::new(0));
            let handles: [_; RUNS] = array::from_fn(|_| {
                let data = Arc::clone(&data);
                thread::spawn(move || inc(&data))
            });
            for handle in handles {
                handle.join().unwrap();
            }
            let data = get(&data);
            assert_eq!(RUNS, data);
        });
    }

    /// Evaluates that a lock attempt that refuses to wait either gets the
    /// mutex or leaves it entirely untouched, never corrupting the data.
    pub fn try_lock_join<L: TryLockThen<Target = Int> + 'static>() {
        model(|| {
            let data = Arc::new(L::new(0));
            let locker = {
                let data = Arc::clone(&data);
                thread::spawn(move || inc(&data))
            };
            let try_locker = {
                let data = Arc::clone(&data);
                thread::spawn(move || {
                    data.try_lock_then(|guard| match guard {
                        Some(guard) => *guard.deref_mut() += 1,
                        None => (),
                    });
                })
            };
            locker.join().unwrap();
            try_locker.join().unwrap();
            let value = get(&data);
            assert!(value == 1 || value == 2);
        });
    }

    /// Evaluates that transferring a hold from one mutex to another leaves
    /// both reclaimable and never loses the handoff.
    pub fn transfer_handoff() {
        use crate::raw::yields::Mutex;

        model(|| {
            let a = Arc::new(Mutex::new(0));
            let b = Arc::new(Mutex::new(0));
            let guard_b = b.lock();

            let transferrer = {
                let (a, b) = (Arc::clone(&a), Arc::clone(&b));
                thread::spawn(move || {
                    let guard_a = a.lock();
                    // Nothing vetoes in this model.
                    let guard_b = guard_a.transfer(&b).unwrap();
                    drop(guard_b);
                })
            };

            drop(guard_b);
            transferrer.join().unwrap();

            assert!(a.try_lock().is_some());
            assert!(b.try_lock().is_some());
        });
    }
}
