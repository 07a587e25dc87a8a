//! Type aliases and small shims that select between the regular runtime
//! types and their Loom counterparts when running under `--cfg loom`.

pub(crate) mod atomic {
    #[cfg(all(loom, test))]
    pub(crate) use loom::sync::atomic::{AtomicPtr, AtomicU8};

    #[cfg(not(all(loom, test)))]
    pub(crate) use core::sync::atomic::{AtomicPtr, AtomicU8};

    /// A trait for atomic loads that skip synchronization entirely.
    pub(crate) trait UnsyncLoad {
        /// The type of the value stored by the atomic.
        type Target;

        /// Loads the value without any synchronization.
        ///
        /// # Safety
        ///
        /// Caller must guarantee there are no concurrent writers while the
        /// load takes place, eg. by holding exclusive access over the
        /// atomic value.
        unsafe fn load_unsynced(&self) -> *mut Self::Target;
    }

    impl<T> UnsyncLoad for AtomicPtr<T> {
        type Target = T;

        #[cfg(all(loom, test))]
        unsafe fn load_unsynced(&self) -> *mut T {
            // SAFETY: Caller guaranteed exclusive access.
            unsafe { self.unsync_load() }
        }

        #[cfg(not(all(loom, test)))]
        unsafe fn load_unsynced(&self) -> *mut T {
            self.load(core::sync::atomic::Ordering::Relaxed)
        }
    }
}

pub(crate) mod cell {
    #[cfg(not(all(loom, test)))]
    pub(crate) use core::cell::{Cell, UnsafeCell};

    #[cfg(all(loom, test))]
    pub(crate) use loom::cell::UnsafeCell;

    /// A `Cell` stand-in backed by Loom's `UnsafeCell`, so that plain
    /// get/set accesses stay visible to the model checker.
    #[cfg(all(loom, test))]
    pub(crate) struct Cell<T> {
        inner: UnsafeCell<T>,
    }

    #[cfg(all(loom, test))]
    impl<T: Copy> Cell<T> {
        pub(crate) fn new(value: T) -> Self {
            Self { inner: UnsafeCell::new(value) }
        }

        pub(crate) fn get(&self) -> T {
            // SAFETY: Protocol invariants guarantee the cell is only ever
            // written before publication, while no reader can reach it.
            self.inner.with(|ptr| unsafe { *ptr })
        }

        pub(crate) fn set(&self, value: T) {
            // SAFETY: Same as `get`.
            self.inner.with_mut(|ptr| unsafe { *ptr = value });
        }
    }

    /// A trait for running closures against the data behind a shared
    /// reference to an `UnsafeCell`.
    pub(crate) trait UnsafeCellWith<T: ?Sized> {
        /// Runs `f` against a shared reference to the underlying data.
        ///
        /// # Safety
        ///
        /// Caller must guarantee there are no mutable accesses to the
        /// underlying data for the duration of the call.
        unsafe fn with_unchecked<F, Ret>(&self, f: F) -> Ret
        where
            F: FnOnce(&T) -> Ret;
    }

    #[cfg(not(all(loom, test)))]
    impl<T: ?Sized> UnsafeCellWith<T> for UnsafeCell<T> {
        unsafe fn with_unchecked<F, Ret>(&self, f: F) -> Ret
        where
            F: FnOnce(&T) -> Ret,
        {
            // SAFETY: Caller guaranteed there are no mutable accesses.
            f(unsafe { &*self.get() })
        }
    }

    #[cfg(all(loom, test))]
    impl<T: ?Sized> UnsafeCellWith<T> for UnsafeCell<T> {
        unsafe fn with_unchecked<F, Ret>(&self, f: F) -> Ret
        where
            F: FnOnce(&T) -> Ret,
        {
            // SAFETY: Caller guaranteed there are no mutable accesses.
            self.with(|ptr| f(unsafe { &*ptr }))
        }
    }
}

pub(crate) mod hint {
    #[cfg(all(loom, test))]
    pub(crate) use loom::hint::spin_loop;

    #[cfg(not(all(loom, test)))]
    pub(crate) use core::hint::spin_loop;
}

pub(crate) mod thread {
    #[cfg(all(loom, test))]
    pub(crate) use loom::thread::yield_now;

    #[cfg(not(all(loom, test)))]
    pub(crate) use std::thread::yield_now;
}

/// Blocking mutex and condition variable used inside the control block.
///
/// The two backends differ in surface (parking_lot waits through
/// `&mut guard`, Loom consumes and returns the guard), so both are
/// normalised to the consume-and-return style here.
pub(crate) mod sync {
    #[cfg(not(all(loom, test)))]
    pub(crate) use parking_lot::{Mutex, MutexGuard};

    use std::time::Instant;

    /// A condition variable paired with the [`Mutex`] of this module.
    #[cfg(not(all(loom, test)))]
    pub(crate) struct Condvar {
        inner: parking_lot::Condvar,
    }

    #[cfg(not(all(loom, test)))]
    impl Condvar {
        pub(crate) fn new() -> Self {
            Self { inner: parking_lot::Condvar::new() }
        }

        pub(crate) fn wait<'a, T>(&self, mut guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
            self.inner.wait(&mut guard);
            guard
        }

        /// Waits until notified or until `deadline`; the second component
        /// reports whether the deadline was reached.
        pub(crate) fn wait_until<'a, T>(
            &self,
            mut guard: MutexGuard<'a, T>,
            deadline: Instant,
        ) -> (MutexGuard<'a, T>, bool) {
            let result = self.inner.wait_until(&mut guard, deadline);
            (guard, result.timed_out())
        }

        pub(crate) fn notify_one(&self) {
            self.inner.notify_one();
        }

        pub(crate) fn notify_all(&self) {
            self.inner.notify_all();
        }
    }

    /// A mutex stand-in backed by Loom's `Mutex`, with lock poisoning
    /// folded away: a poisoning panic already fails the model.
    #[cfg(all(loom, test))]
    pub(crate) struct Mutex<T> {
        inner: loom::sync::Mutex<T>,
    }

    #[cfg(all(loom, test))]
    pub(crate) type MutexGuard<'a, T> = loom::sync::MutexGuard<'a, T>;

    #[cfg(all(loom, test))]
    impl<T> Mutex<T> {
        pub(crate) fn new(value: T) -> Self {
            Self { inner: loom::sync::Mutex::new(value) }
        }

        pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
            self.inner.lock().expect("loom mutex poisoned")
        }
    }

    /// A condition variable stand-in backed by Loom's `Condvar`.
    #[cfg(all(loom, test))]
    pub(crate) struct Condvar {
        inner: loom::sync::Condvar,
    }

    #[cfg(all(loom, test))]
    impl Condvar {
        pub(crate) fn new() -> Self {
            Self { inner: loom::sync::Condvar::new() }
        }

        pub(crate) fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
            self.inner.wait(guard).expect("loom mutex poisoned")
        }

        /// Loom models have no clock; a timed wait is modelled as a plain
        /// wait that never times out.
        pub(crate) fn wait_until<'a, T>(
            &self,
            guard: MutexGuard<'a, T>,
            _deadline: Instant,
        ) -> (MutexGuard<'a, T>, bool) {
            (self.wait(guard), false)
        }

        pub(crate) fn notify_one(&self) {
            self.inner.notify_one();
        }

        pub(crate) fn notify_all(&self) {
            self.inner.notify_all();
        }
    }
}
