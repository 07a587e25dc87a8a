use core::fmt::{self, Debug, Formatter};
use std::time::{Duration, Instant};

use crate::cfg::sync as blocking;
use crate::error::Error;
use crate::raw::MutexGuard;
use crate::relax::Relax;

/// A type indicating whether a timed wait on a condition variable returned
/// due to a time out or not.
///
/// It is returned by the [`wait_until`] and [`wait_for`] methods.
///
/// [`wait_until`]: Condvar::wait_until
/// [`wait_for`]: Condvar::wait_for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimeoutResult {
    timed_out: bool,
}

impl WaitTimeoutResult {
    /// Returns `true` if the wait was known to have timed out.
    #[must_use]
    pub const fn timed_out(&self) -> bool {
        self.timed_out
    }
}

/// A condition variable bound to [`Mutex`] at wait time.
///
/// Condition variables represent the ability to block a thread such that
/// it consumes no CPU time while waiting for an event to occur. The
/// functions in this module will atomically release the mutex and suspend
/// the thread; when the wait returns, the mutex is held again, on the
/// timeout path as well.
///
/// Waiting keeps the mutex's control block pinned, so a mutex with
/// sleepers never loses its blocking apparatus underneath them.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
///
/// use skinnylock::raw::{spins::Mutex, Condvar};
///
/// let pair = Arc::new((Mutex::new(false), Condvar::new()));
/// let pair2 = Arc::clone(&pair);
///
/// // Inside of our lock, spawn a new thread, and then wait for it to
/// // start.
/// thread::spawn(move || {
///     let (lock, cvar) = &*pair2;
///     let mut started = lock.lock();
///     *started = true;
///     // We notify the condvar that the value has changed.
///     cvar.notify_one();
/// });
///
/// // Wait for the thread to start up.
/// let (lock, cvar) = &*pair;
/// let mut started = lock.lock();
/// while !*started {
///     cvar.wait(&mut started);
/// }
/// ```
/// [`Mutex`]: crate::raw::Mutex
pub struct Condvar {
    inner: blocking::Condvar,
}

impl Condvar {
    /// Creates a new condition variable which is ready to be waited on and
    /// notified.
    ///
    /// # Examples
    ///
    /// ```
    /// use skinnylock::raw::Condvar;
    ///
    /// let condvar = Condvar::new();
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self { inner: blocking::Condvar::new() }
    }

    /// Blocks the current thread until this condition variable receives a
    /// notification.
    ///
    /// The mutex associated with `guard` is released while the thread is
    /// suspended, letting other threads acquire it, and held again by the
    /// time this function returns.
    ///
    /// Note that spurious wakeups are permitted: a wait should always sit
    /// in a loop re-checking its condition.
    pub fn wait<T: ?Sized, R: Relax>(&self, guard: &mut MutexGuard<'_, T, R>) {
        let waited = guard.inner().mutex().cond_wait(&self.inner, None);
        // The guard proves the mutex is held, and no deadline was given.
        debug_assert!(waited.is_ok());
    }

    /// Waits on this condition variable for a notification, timing out
    /// once `deadline` is reached.
    ///
    /// The semantics of this function are equivalent to [`wait`] except
    /// that the thread will be woken up once `deadline` has passed. The
    /// mutex is held again by the time this function returns, on the
    /// timeout path too.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::{Duration, Instant};
    ///
    /// use skinnylock::raw::{spins::Mutex, Condvar};
    ///
    /// let mutex = Mutex::new(());
    /// let condvar = Condvar::new();
    ///
    /// let mut guard = mutex.lock();
    /// let deadline = Instant::now() + Duration::from_millis(10);
    /// let result = condvar.wait_until(&mut guard, deadline);
    /// assert!(result.timed_out());
    /// ```
    /// [`wait`]: Condvar::wait
    pub fn wait_until<T: ?Sized, R: Relax>(
        &self,
        guard: &mut MutexGuard<'_, T, R>,
        deadline: Instant,
    ) -> WaitTimeoutResult {
        let waited = guard.inner().mutex().cond_wait(&self.inner, Some(deadline));
        debug_assert!(matches!(waited, Ok(()) | Err(Error::TimedOut)));
        WaitTimeoutResult { timed_out: waited == Err(Error::TimedOut) }
    }

    /// Waits on this condition variable for a notification, timing out
    /// after the specified duration.
    ///
    /// Equivalent to [`wait_until`] with a deadline of now plus
    /// `duration`.
    ///
    /// [`wait_until`]: Condvar::wait_until
    pub fn wait_for<T: ?Sized, R: Relax>(
        &self,
        guard: &mut MutexGuard<'_, T, R>,
        duration: Duration,
    ) -> WaitTimeoutResult {
        self.wait_until(guard, Instant::now() + duration)
    }

    /// Wakes up one blocked thread on this condvar.
    ///
    /// If there is a blocked thread on this condition variable, then it
    /// will be woken up from its call to [`wait`]. Calls to `notify_one`
    /// are not buffered in any way.
    ///
    /// [`wait`]: Condvar::wait
    pub fn notify_one(&self) {
        self.inner.notify_one();
    }

    /// Wakes up all blocked threads on this condvar.
    ///
    /// This method will ensure that any current waiters on the condition
    /// variable are awoken. Calls to `notify_all()` are not buffered in
    /// any way.
    pub fn notify_all(&self) {
        self.inner.notify_all();
    }
}

impl Default for Condvar {
    /// Creates a `Condvar`, ready to be waited on and notified.
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Condvar {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condvar").finish_non_exhaustive()
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use std::sync::mpsc::channel;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::Condvar;
    use crate::raw::yields::Mutex;

    #[test]
    fn smoke() {
        let condvar = Condvar::new();
        condvar.notify_one();
        condvar.notify_all();
    }

    #[test]
    fn notify_one_wakes_waiter() {
        let pair = Arc::new((Mutex::new(false), Condvar::new()));
        let pair2 = Arc::clone(&pair);

        let handle = thread::spawn(move || {
            let (mutex, condvar) = &*pair2;
            let mut ready = mutex.lock();
            while !*ready {
                condvar.wait(&mut ready);
            }
        });

        {
            let (mutex, condvar) = &*pair;
            // The waiter has released the mutex while suspended, so this
            // lock goes through.
            let mut ready = mutex.lock();
            *ready = true;
            condvar.notify_one();
        }
        handle.join().expect("waiting thread failed");
    }

    #[test]
    fn notify_all_wakes_every_waiter() {
        const WAITERS: usize = 4;

        let pair = Arc::new((Mutex::new(false), Condvar::new()));
        let (tx, rx) = channel();

        let handles: Vec<_> = (0..WAITERS)
            .map(|_| {
                let pair = Arc::clone(&pair);
                let tx = tx.clone();
                thread::spawn(move || {
                    let (mutex, condvar) = &*pair;
                    let mut ready = mutex.lock();
                    tx.send(()).unwrap();
                    while !*ready {
                        condvar.wait(&mut ready);
                    }
                })
            })
            .collect();

        // All waiters are registered once each has locked the mutex once.
        for _ in 0..WAITERS {
            rx.recv().unwrap();
        }

        let (mutex, condvar) = &*pair;
        let mut ready = mutex.lock();
        *ready = true;
        condvar.notify_all();
        drop(ready);

        for handle in handles {
            handle.join().expect("waiting thread failed");
        }
    }

    #[test]
    fn waiter_releases_the_mutex_while_suspended() {
        let pair = Arc::new((Mutex::new(0), Condvar::new()));
        let pair2 = Arc::clone(&pair);

        let handle = thread::spawn(move || {
            let (mutex, condvar) = &*pair2;
            let mut value = mutex.lock();
            while *value == 0 {
                condvar.wait(&mut value);
            }
            // Upon signal the waiter is re-holding the mutex.
            *value += 1;
        });

        let (mutex, condvar) = &*pair;
        loop {
            // Keep re-acquiring; this only ever succeeds while the waiter
            // is suspended or finished.
            let mut value = mutex.lock();
            if *value == 0 {
                *value = 1;
                condvar.notify_one();
            } else if *value == 2 {
                break;
            }
            drop(value);
            thread::yield_now();
        }
        handle.join().expect("waiting thread failed");
    }

    #[test]
    fn timed_out_wait_reholds_the_mutex() {
        let mutex = Mutex::new(());
        let condvar = Condvar::new();

        let mut guard = mutex.lock();
        let deadline = Instant::now() + Duration::from_millis(10);
        let result = condvar.wait_until(&mut guard, deadline);
        assert!(result.timed_out());

        // Still held: release happens through the guard, and only once.
        assert!(mutex.try_lock().is_none());
        drop(guard);
        assert!(mutex.try_lock().is_some());
    }

    #[test]
    fn wait_for_is_wait_until_with_a_relative_deadline() {
        let mutex = Mutex::new(());
        let condvar = Condvar::new();
        let mut guard = mutex.lock();
        let result = condvar.wait_for(&mut guard, Duration::from_millis(5));
        assert!(result.timed_out());
    }
}
