//! Skinny lock implementation.
//!
//! A mutex in this module is one pointer-sized word. Uncontended lock and
//! unlock resolve with a single compare-and-swap and never allocate. The
//! first contended operation attaches a heap-allocated control block that
//! carries the blocking apparatus; the block is shared by all contending
//! threads and reclaimed as soon as the mutex goes back to being unheld
//! and uncontended.
//!
//! Beyond lock, try-lock and unlock, a held mutex supports two more
//! operations: waiting on an external [`Condvar`] bound to it, and
//! [`transfer`]ring the hold to another mutex with no foreign acquirer
//! able to slip in between. A holder can abort pending transfers into its
//! mutex with [`veto_transfer`].
//!
//! The lock is held for as long as its associated RAII guard is in scope.
//! Once the guard is dropped, the mutex is freed. Mutex guards are
//! returned by the [`lock`] and [`try_lock`] methods, and are also
//! accessible as the closure argument for the [`lock_then`] method.
//!
//! This Mutex is generic over the relax policy applied between word-level
//! CAS retries. Users may choose a policy as long as it implements the
//! [`Relax`] trait. The following modules provide type aliases for
//! [`Mutex`] and [`MutexGuard`] associated with a relax policy. See their
//! documentation for more information.
//!
//! [`lock`]: Mutex::lock
//! [`try_lock`]: Mutex::try_lock
//! [`lock_then`]: Mutex::lock_then
//! [`transfer`]: MutexGuard::transfer
//! [`veto_transfer`]: Mutex::veto_transfer
//! [`Relax`]: crate::relax::Relax

mod condvar;
mod mutex;

pub use condvar::{Condvar, WaitTimeoutResult};
pub use mutex::{Mutex, MutexGuard, TransferError};

/// A skinny lock that implements a `spin` relax policy.
///
/// While a word-level race is retried, this lock spins while signaling the
/// processor that it is running a busy-wait spin-loop.
pub mod spins {
    use super::mutex;
    use crate::relax::Spin;

    /// A [`raw::Mutex`] that implements the [`Spin`] relax policy.
    ///
    /// # Example
    ///
    /// ```
    /// use skinnylock::raw::spins::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// let guard = mutex.lock();
    /// assert_eq!(*guard, 0);
    /// ```
    /// [`raw::Mutex`]: mutex::Mutex
    pub type Mutex<T> = mutex::Mutex<T, Spin>;

    /// A [`raw::MutexGuard`] that implements the [`Spin`] relax policy.
    ///
    /// [`raw::MutexGuard`]: mutex::MutexGuard
    pub type MutexGuard<'a, T> = mutex::MutexGuard<'a, T, Spin>;

    /// A skinny lock that implements a `spin with backoff` relax policy.
    ///
    /// While a word-level race is retried, this lock will perform
    /// exponential backoff while spinning, signaling the processor that it
    /// is running a busy-wait spin-loop.
    pub mod backoff {
        use super::mutex;
        use crate::relax::SpinBackoff;

        /// A [`raw::Mutex`] that implements the [`SpinBackoff`] relax
        /// policy.
        ///
        /// # Example
        ///
        /// ```
        /// use skinnylock::raw::spins::backoff::Mutex;
        ///
        /// let mutex = Mutex::new(0);
        /// let guard = mutex.lock();
        /// assert_eq!(*guard, 0);
        /// ```
        /// [`raw::Mutex`]: mutex::Mutex
        pub type Mutex<T> = mutex::Mutex<T, SpinBackoff>;

        /// A [`raw::MutexGuard`] that implements the [`SpinBackoff`]
        /// relax policy.
        ///
        /// [`raw::MutexGuard`]: mutex::MutexGuard
        pub type MutexGuard<'a, T> = mutex::MutexGuard<'a, T, SpinBackoff>;
    }
}

/// A skinny lock that implements a `yield` relax policy.
///
/// While a word-level race is retried, this lock will yield the current
/// time slice to the OS scheduler.
pub mod yields {
    use super::mutex;
    use crate::relax::Yield;

    /// A [`raw::Mutex`] that implements the [`Yield`] relax policy.
    ///
    /// # Example
    ///
    /// ```
    /// use skinnylock::raw::yields::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// let guard = mutex.lock();
    /// assert_eq!(*guard, 0);
    /// ```
    /// [`raw::Mutex`]: mutex::Mutex
    pub type Mutex<T> = mutex::Mutex<T, Yield>;

    /// A [`raw::MutexGuard`] that implements the [`Yield`] relax policy.
    ///
    /// [`raw::MutexGuard`]: mutex::MutexGuard
    pub type MutexGuard<'a, T> = mutex::MutexGuard<'a, T, Yield>;

    /// A skinny lock that implements a `yield with backoff` relax policy.
    ///
    /// While a word-level race is retried, this lock will perform
    /// exponential backoff while spinning, up to a threshold, then yields
    /// back to the OS scheduler.
    pub mod backoff {
        use super::mutex;
        use crate::relax::YieldBackoff;

        /// A [`raw::Mutex`] that implements the [`YieldBackoff`] relax
        /// policy.
        ///
        /// # Example
        ///
        /// ```
        /// use skinnylock::raw::yields::backoff::Mutex;
        ///
        /// let mutex = Mutex::new(0);
        /// let guard = mutex.lock();
        /// assert_eq!(*guard, 0);
        /// ```
        /// [`raw::Mutex`]: mutex::Mutex
        pub type Mutex<T> = mutex::Mutex<T, YieldBackoff>;

        /// A [`raw::MutexGuard`] that implements the [`YieldBackoff`]
        /// relax policy.
        ///
        /// [`raw::MutexGuard`]: mutex::MutexGuard
        pub type MutexGuard<'a, T> = mutex::MutexGuard<'a, T, YieldBackoff>;
    }
}

/// A skinny lock that implements a `loop` relax policy.
///
/// While a word-level race is retried, this lock will rapidly spin without
/// telling the CPU to do any power down.
pub mod loops {
    use super::mutex;
    use crate::relax::Loop;

    /// A [`raw::Mutex`] that implements the [`Loop`] relax policy.
    ///
    /// # Example
    ///
    /// ```
    /// use skinnylock::raw::loops::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// let guard = mutex.lock();
    /// assert_eq!(*guard, 0);
    /// ```
    /// [`raw::Mutex`]: mutex::Mutex
    pub type Mutex<T> = mutex::Mutex<T, Loop>;

    /// A [`raw::MutexGuard`] that implements the [`Loop`] relax policy.
    ///
    /// [`raw::MutexGuard`]: mutex::MutexGuard
    pub type MutexGuard<'a, T> = mutex::MutexGuard<'a, T, Loop>;
}
