use core::fmt::{self, Debug, Display, Formatter};

use crate::error::Error;
use crate::inner::raw as inner;
use crate::relax::Relax;

#[cfg(not(all(loom, test)))]
use core::ops::{Deref, DerefMut};

#[cfg(test)]
use crate::test::{LockNew, LockThen, TryLockThen};

/// A mutual exclusion primitive useful for protecting shared data.
///
/// The mutex itself is a single pointer-sized word. Acquiring or releasing
/// it without contention is one compare-and-swap and allocates nothing; the
/// first contended operation attaches a shared, heap-allocated control
/// block that is reclaimed once the mutex is unheld and uncontended again.
///
/// This mutex will block threads waiting for the lock to become available.
/// Each mutex has a type parameter which represents the data that it is
/// protecting. The data can only be accessed through the RAII guards
/// returned by [`lock`] and [`try_lock`], which guarantees that the data is
/// only ever accessed when the mutex is locked.
///
/// # Examples
///
/// ```
/// use std::sync::mpsc::channel;
/// use std::sync::Arc;
/// use std::thread;
///
/// use skinnylock::raw;
/// use skinnylock::relax::Spin;
///
/// type Mutex<T> = raw::Mutex<T, Spin>;
///
/// const N: usize = 10;
///
/// // Spawn a few threads to increment a shared variable (non-atomically),
/// // and let the main thread know once all increments are done.
/// //
/// // Here we're using an Arc to share memory among threads, and the data
/// // inside the Arc is protected with a mutex.
/// let data = Arc::new(Mutex::new(0));
///
/// let (tx, rx) = channel();
/// for _ in 0..N {
///     let (data, tx) = (data.clone(), tx.clone());
///     thread::spawn(move || {
///         // The shared state can only be accessed once the lock is held.
///         // Our non-atomic increment is safe because we're the only
///         // thread which can access the shared state when the lock is
///         // held.
///         let mut data = data.lock();
///         *data += 1;
///         if *data == N {
///             tx.send(()).unwrap();
///         }
///         // the lock is unlocked here when `data` goes out of scope.
///     });
/// }
///
/// rx.recv().unwrap();
/// ```
/// [`lock`]: Mutex::lock
/// [`try_lock`]: Mutex::try_lock
pub struct Mutex<T: ?Sized, R> {
    pub(super) inner: inner::Mutex<T, R>,
}

// Same unsafe impls as `crate::inner::raw::Mutex`.
unsafe impl<T: ?Sized + Send, R> Send for Mutex<T, R> {}
unsafe impl<T: ?Sized + Send, R> Sync for Mutex<T, R> {}

impl<T, R> Mutex<T, R> {
    /// Creates a new mutex in an unlocked state ready for use.
    ///
    /// # Examples
    ///
    /// ```
    /// use skinnylock::raw;
    /// use skinnylock::relax::Spin;
    ///
    /// type Mutex<T> = raw::Mutex<T, Spin>;
    ///
    /// let mutex = Mutex::new(0);
    /// ```
    #[inline]
    pub fn new(value: T) -> Self {
        Self { inner: inner::Mutex::new(value) }
    }
}

impl<T: ?Sized, R: Relax> Mutex<T, R> {
    /// Acquires this mutex, blocking the current thread until it is able
    /// to do so.
    ///
    /// This function will block the local thread until it is available to
    /// acquire the mutex. Upon returning, the thread is the only thread
    /// with the lock held. An RAII guard is returned to allow scoped
    /// unlock of the lock. When the guard goes out of scope, the mutex
    /// will be unlocked.
    ///
    /// Uncontended acquisition is a single compare-and-swap on the mutex
    /// word and performs no heap allocation.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use std::thread;
    ///
    /// use skinnylock::raw::spins::Mutex;
    ///
    /// let mutex = Arc::new(Mutex::new(0));
    /// let c_mutex = Arc::clone(&mutex);
    ///
    /// thread::spawn(move || {
    ///     *c_mutex.lock() = 10;
    /// })
    /// .join().expect("thread::spawn failed");
    ///
    /// assert_eq!(*mutex.lock(), 10);
    /// ```
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, T, R> {
        self.inner.lock().into()
    }

    /// Attempts to acquire this mutex without blocking on other holders.
    ///
    /// If the mutex is held this returns `None` without ever becoming a
    /// waiter; otherwise an RAII guard is returned. The lock will be
    /// unlocked when the guard is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use skinnylock::raw::spins::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    ///
    /// let guard = mutex.try_lock().expect("mutex is free");
    /// assert!(mutex.try_lock().is_none());
    /// drop(guard);
    /// assert!(mutex.try_lock().is_some());
    /// ```
    #[inline]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T, R>> {
        self.inner.try_lock().map(Into::into)
    }

    /// Acquires this mutex and then runs the closure against its guard.
    ///
    /// This function will block the local thread until it is available to
    /// acquire the mutex. Upon acquiring the mutex, the user provided
    /// closure will be executed against the mutex guard. Once the guard
    /// goes out of scope, it will unlock the mutex.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use std::thread;
    ///
    /// use skinnylock::raw::spins::Mutex;
    ///
    /// let mutex = Arc::new(Mutex::new(0));
    /// let c_mutex = Arc::clone(&mutex);
    ///
    /// thread::spawn(move || {
    ///     c_mutex.lock_then(|mut guard| *guard = 10);
    /// })
    /// .join().expect("thread::spawn failed");
    ///
    /// assert_eq!(mutex.lock_then(|guard| *guard), 10);
    /// ```
    ///
    /// Compile fail: borrows of the guard or its data cannot escape the
    /// given closure:
    ///
    /// ```compile_fail,E0515
    /// use skinnylock::raw::spins::Mutex;
    ///
    /// let mutex = Mutex::new(1);
    /// let data = mutex.lock_then(|guard| &*guard);
    /// ```
    #[inline]
    pub fn lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(MutexGuard<'_, T, R>) -> Ret,
    {
        f(self.lock())
    }

    /// Makes every transfer currently blocked on this mutex give up and
    /// report failure to its caller.
    ///
    /// This is meant to be called by the thread holding the mutex, for
    /// example ahead of tearing down the resource the mutex protects.
    /// Against an unheld mutex it fails with [`Error::NotPermitted`] and
    /// causes no state change.
    ///
    /// # Examples
    ///
    /// ```
    /// use skinnylock::error::Error;
    /// use skinnylock::raw::spins::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// assert_eq!(mutex.veto_transfer(), Err(Error::NotPermitted));
    ///
    /// let guard = mutex.lock();
    /// assert_eq!(mutex.veto_transfer(), Ok(()));
    /// drop(guard);
    /// ```
    #[inline]
    pub fn veto_transfer(&self) -> Result<(), Error> {
        self.inner.veto_transfer()
    }
}

impl<T: ?Sized, R> Mutex<T, R> {
    /// Returns a mutable reference to the underlying data.
    ///
    /// Since this call borrows the `Mutex` mutably, no actual locking
    /// needs to take place - the mutable borrow statically guarantees no
    /// locks exist.
    ///
    /// # Examples
    ///
    /// ```
    /// use skinnylock::raw::spins::Mutex;
    ///
    /// let mut mutex = Mutex::new(0);
    /// *mutex.get_mut() = 10;
    ///
    /// assert_eq!(*mutex.lock(), 10);
    /// ```
    #[cfg(not(all(loom, test)))]
    #[inline(always)]
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

impl<T: Default, R> Default for Mutex<T, R> {
    /// Creates a `Mutex<T, R>`, with the `Default` value for `T`.
    #[inline]
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl<T, R> From<T> for Mutex<T, R> {
    /// Creates a `Mutex<T, R>` from a instance of `T`.
    #[inline]
    fn from(data: T) -> Self {
        Self::new(data)
    }
}

impl<T: ?Sized + Debug, R: Relax> Debug for Mutex<T, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

#[cfg(test)]
impl<T: ?Sized, R> LockNew for Mutex<T, R> {
    type Target = T;

    fn new(value: Self::Target) -> Self
    where
        Self::Target: Sized,
    {
        Self::new(value)
    }
}

#[cfg(test)]
impl<T: ?Sized, R: Relax> LockThen for Mutex<T, R> {
    type Guard<'a> = MutexGuard<'a, Self::Target, R>
    where
        Self: 'a,
        Self::Target: 'a;

    fn lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(MutexGuard<'_, T, R>) -> Ret,
    {
        self.lock_then(f)
    }
}

#[cfg(test)]
impl<T: ?Sized, R: Relax> TryLockThen for Mutex<T, R> {
    fn try_lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(Option<MutexGuard<'_, T, R>>) -> Ret,
    {
        f(self.try_lock())
    }
}

#[cfg(all(not(loom), test))]
impl<T: ?Sized, R: Relax> crate::test::LockData for Mutex<T, R> {
    fn get_mut(&mut self) -> &mut Self::Target {
        self.get_mut()
    }
}

/// An RAII implementation of a "scoped lock" of a mutex. When this
/// structure is dropped (falls out of scope), the lock will be unlocked.
///
/// The data protected by the mutex can be access through this guard via
/// its [`Deref`] and [`DerefMut`] implementations.
///
/// This structure is returned by the [`lock`] and [`try_lock`] methods on
/// [`Mutex`]. It is also given as closure argument by the [`lock_then`]
/// method.
///
/// [`Deref`]: core::ops::Deref
/// [`DerefMut`]: core::ops::DerefMut
/// [`lock`]: Mutex::lock
/// [`try_lock`]: Mutex::try_lock
/// [`lock_then`]: Mutex::lock_then
#[must_use = "if unused the Mutex will immediately unlock"]
pub struct MutexGuard<'a, T: ?Sized, R: Relax> {
    inner: inner::MutexGuard<'a, T, R>,
}

// Unlike `std::sync::MutexGuard`, this guard is Send: the protocol never
// records an owning thread, so the mutex may be released or transferred
// from any thread. Same unsafe Sync impl as `std::sync::MutexGuard`.
unsafe impl<T: ?Sized + Send, R: Relax> Send for MutexGuard<'_, T, R> {}
unsafe impl<T: ?Sized + Sync, R: Relax> Sync for MutexGuard<'_, T, R> {}

impl<'a, T: ?Sized, R: Relax> MutexGuard<'a, T, R> {
    /// Atomically releases this guard's mutex and acquires `target`.
    ///
    /// No other thread can acquire `target` between the release of this
    /// mutex and the acquisition observed by the caller, except another
    /// thread that is itself transferring into `target`.
    ///
    /// A concurrent [`veto_transfer`] on `target` aborts the transfer. In
    /// that case the returned [`TransferError`] hands back a guard for
    /// this mutex: the caller's original hold has been restored before
    /// the error is reported.
    ///
    /// # Examples
    ///
    /// ```
    /// use skinnylock::raw::spins::Mutex;
    ///
    /// let a = Mutex::new('a');
    /// let b = Mutex::new('b');
    ///
    /// let guard = a.lock();
    /// let guard = guard.transfer(&b).expect("nothing can veto here");
    /// assert_eq!(*guard, 'b');
    ///
    /// // The hold moved from `a` to `b`.
    /// assert!(a.try_lock().is_some());
    /// ```
    /// [`veto_transfer`]: Mutex::veto_transfer
    pub fn transfer<'t, U: ?Sized>(
        self,
        target: &'t Mutex<U, R>,
    ) -> Result<MutexGuard<'t, U, R>, TransferError<'a, T, R>> {
        let source = self.inner.into_mutex();
        match source.transfer(&target.inner) {
            Ok(()) => Ok(inner::MutexGuard::adopt(&target.inner).into()),
            Err(err) => {
                debug_assert_eq!(err, Error::Vetoed);
                Err(TransferError { guard: inner::MutexGuard::adopt(source).into() })
            }
        }
    }
}

#[doc(hidden)]
impl<'a, T: ?Sized, R: Relax> From<inner::MutexGuard<'a, T, R>> for MutexGuard<'a, T, R> {
    #[inline(always)]
    fn from(inner: inner::MutexGuard<'a, T, R>) -> Self {
        Self { inner }
    }
}

impl<'a, T: ?Sized, R: Relax> MutexGuard<'a, T, R> {
    pub(super) fn inner(&self) -> &inner::MutexGuard<'a, T, R> {
        &self.inner
    }
}

impl<T: ?Sized + Debug, R: Relax> Debug for MutexGuard<'_, T, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl<T: ?Sized + Display, R: Relax> Display for MutexGuard<'_, T, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

#[cfg(not(all(loom, test)))]
impl<T: ?Sized, R: Relax> Deref for MutexGuard<'_, T, R> {
    type Target = T;

    /// Dereferences the guard to access the underlying data.
    #[inline(always)]
    fn deref(&self) -> &T {
        &self.inner
    }
}

#[cfg(not(all(loom, test)))]
impl<T: ?Sized, R: Relax> DerefMut for MutexGuard<'_, T, R> {
    /// Mutably dereferences the guard to access the underlying data.
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

/// SAFETY: A guard instance holds the lock locked, with exclusive access
/// to the underlying data.
#[cfg(all(loom, test))]
#[cfg(not(tarpaulin_include))]
unsafe impl<T: ?Sized, R: Relax> crate::loom::Guard for MutexGuard<'_, T, R> {
    type Target = T;

    fn get(&self) -> &loom::cell::UnsafeCell<Self::Target> {
        crate::loom::Guard::get(&self.inner)
    }
}

/// A failed [`transfer`]; the source mutex is once again held by the
/// caller.
///
/// The only way a transfer can fail through the guard API is a concurrent
/// [`veto_transfer`] on the target. The error owns a guard for the source
/// mutex, recoverable through [`into_guard`].
///
/// [`transfer`]: MutexGuard::transfer
/// [`veto_transfer`]: Mutex::veto_transfer
/// [`into_guard`]: TransferError::into_guard
pub struct TransferError<'a, T: ?Sized, R: Relax> {
    guard: MutexGuard<'a, T, R>,
}

impl<'a, T: ?Sized, R: Relax> TransferError<'a, T, R> {
    /// Recovers the guard for the source mutex, still held by the caller.
    #[must_use = "if unused the source Mutex will immediately unlock"]
    pub fn into_guard(self) -> MutexGuard<'a, T, R> {
        self.guard
    }
}

impl<T: ?Sized, R: Relax> Debug for TransferError<'_, T, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferError").finish_non_exhaustive()
    }
}

impl<T: ?Sized, R: Relax> Display for TransferError<'_, T, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt("transfer was vetoed", f)
    }
}

impl<T: ?Sized, R: Relax> std::error::Error for TransferError<'_, T, R> {}

#[cfg(all(not(loom), test))]
mod test {
    use std::sync::mpsc::channel;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use crate::raw::yields::Mutex;
    use crate::test::tests;

    #[test]
    fn lots_and_lots_lock() {
        tests::lots_and_lots_lock::<Mutex<_>>();
    }

    #[test]
    fn smoke() {
        tests::smoke::<Mutex<_>>();
    }

    #[test]
    fn test_try_lock() {
        tests::test_try_lock::<Mutex<_>>();
    }

    #[test]
    fn test_try_lock_contended() {
        tests::test_try_lock_contended::<Mutex<_>>();
    }

    #[test]
    fn test_guard_debug_display() {
        tests::test_guard_debug_display::<Mutex<_>>();
    }

    #[test]
    fn test_mutex_debug() {
        tests::test_mutex_debug::<Mutex<_>>();
    }

    #[test]
    fn test_mutex_from() {
        tests::test_mutex_from::<Mutex<_>>();
    }

    #[test]
    fn test_mutex_default() {
        tests::test_mutex_default::<Mutex<_>>();
    }

    #[test]
    fn test_get_mut() {
        tests::test_get_mut::<Mutex<_>>();
    }

    #[test]
    fn test_lock_arc_nested() {
        tests::test_lock_arc_nested::<Mutex<_>, Mutex<_>>();
    }

    #[test]
    fn test_acquire_more_than_one_lock() {
        tests::test_acquire_more_than_one_lock::<Mutex<_>>();
    }

    #[test]
    fn test_lock_arc_access_in_unwind() {
        tests::test_lock_arc_access_in_unwind::<Mutex<_>>();
    }

    #[test]
    fn test_lock_unsized() {
        tests::test_lock_unsized::<Mutex<_>>();
    }

    #[test]
    fn transfer_to_free_mutex() {
        let a = Mutex::new('a');
        let b = Mutex::new('b');
        let guard = a.lock();
        let guard = guard.transfer(&b).expect("no veto possible");
        assert_eq!(*guard, 'b');
        assert!(a.try_lock().is_some());
        drop(guard);
        assert!(b.try_lock().is_some());
    }

    #[test]
    fn transfer_blocks_until_target_unlocks() {
        let a = Arc::new(Mutex::new(()));
        let b = Arc::new(Mutex::new(0));
        let guard_b = b.lock();

        let (tx, rx) = channel();
        let handle = {
            let (a, b) = (Arc::clone(&a), Arc::clone(&b));
            thread::spawn(move || {
                let guard_a = a.lock();
                tx.send(()).unwrap();
                let mut guard_b = guard_a.transfer(&b).expect("veto is never called");
                *guard_b += 1;
            })
        };

        // Only release `b` once the transfer is underway (or about to be).
        rx.recv().unwrap();
        thread::sleep(Duration::from_millis(50));
        drop(guard_b);

        handle.join().expect("transferring thread failed");
        assert_eq!(*b.lock(), 1);
        assert!(a.try_lock().is_some());
    }

    #[test]
    fn veto_aborts_blocked_transfer() {
        let a = Arc::new(Mutex::new(()));
        let b = Arc::new(Mutex::new(()));
        let guard_b = b.lock();

        let (tx, rx) = channel();
        let handle = {
            let (a, b) = (Arc::clone(&a), Arc::clone(&b));
            thread::spawn(move || {
                let guard_a = a.lock();
                tx.send(()).unwrap();
                match guard_a.transfer(&b) {
                    Ok(_) => panic!("transfer must be vetoed"),
                    // The caller is re-holding `a`.
                    Err(err) => drop(err.into_guard()),
                }
            })
        };

        rx.recv().unwrap();
        // Keep vetoing until the transfer has observed it and given up;
        // the holder of `b` never lets go.
        while !handle.is_finished() {
            b.veto_transfer().expect("`b` is held");
            thread::yield_now();
        }
        handle.join().expect("transferring thread failed");

        drop(guard_b);
        assert!(a.try_lock().is_some());
        assert!(b.try_lock().is_some());
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::raw::yields::Mutex;

    #[test]
    fn lock_join() {
        models::lock_join::<Mutex<_>>();
    }

    #[test]
    fn try_lock_join() {
        models::try_lock_join::<Mutex<_>>();
    }

    #[test]
    fn transfer_handoff() {
        models::transfer_handoff();
    }
}
