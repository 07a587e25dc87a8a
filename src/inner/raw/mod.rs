//! The word-sized lock protocol.
//!
//! A mutex is a single atomic pointer-sized word. While uncontended it
//! holds one of two scalar values: null for unheld, a sentinel for held.
//! Those states resolve with a single compare-and-swap and no allocation.
//!
//! The first operation that cannot finish on the scalars attaches a
//! heap-allocated control block carrying the blocking apparatus: an OS
//! mutex, a condition variable, the held flag, a waiter count, a refcount
//! and the transfer bookkeeping. The block is shared by every contending
//! thread and reclaimed as soon as nothing references it.
//!
//! Reclamation is the delicate part: one thread may be freeing the block
//! while another has just read its address from the word. Instead of
//! hazard pointers, accessing threads pin the block by publishing a small
//! peg node in front of it, forming a singly-linked chain rooted at the
//! word:
//!
//! ```text
//! word ──> peg ──> peg ──> control block
//! ```
//!
//! While any chain rooted at the word reaches the block, it cannot be
//! freed. Retiring a peg swaps the block's address back into the word,
//! which can orphan the old chain; such secondary chains keep the block
//! pinned through the refcount until their pegs drain. The refcount
//! counts waiters, condvar sleepers, secondary chains, and a pseudo
//! reference for the holder, offset by -1 so that zero means "only the
//! primary chain remains".

use core::fmt::{self, Debug, Display, Formatter};
use core::marker::PhantomData;
use core::sync::atomic::Ordering::{AcqRel, SeqCst};
use std::time::Instant;

use crate::cfg::atomic::{AtomicPtr, AtomicU8, UnsyncLoad};
use crate::cfg::cell::{Cell, UnsafeCell, UnsafeCellWith};
use crate::cfg::sync::{Condvar, Mutex as BlockingMutex, MutexGuard as BlockingGuard};
use crate::error::{recover, Error};
use crate::relax::Relax;

/// Discriminates the two node types a chain can hold.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
enum NodeKind {
    /// The control block terminating every chain.
    Block = 0,
    /// An ephemeral peg pinning the control block during one access.
    Peg = 1,
}

/// Common header of pegs and control blocks, read while walking a chain.
#[repr(C)]
struct Header {
    kind: NodeKind,
}

/// Scalar encodings of the mutex word.
mod word {
    use super::Header;

    /// Unheld and uncontended; no control block exists.
    pub(super) fn unheld() -> *mut Header {
        core::ptr::null_mut()
    }

    /// Held and uncontended; no control block exists.
    ///
    /// A sentinel address that is never dereferenced.
    pub(super) fn held() -> *mut Header {
        1 as *mut Header
    }

    /// Whether the value points at a chain head rather than holding one
    /// of the two scalar states.
    pub(super) fn is_chain(value: *mut Header) -> bool {
        value as usize > 1
    }
}

/// An ephemeral chain node that pins the control block while one thread
/// walks to it and blocks on its inner mutex.
#[repr(C)]
struct Peg {
    header: Header,
    /// Never exceeds 2: one reference from the installing thread and one
    /// from whichever chain currently reaches the peg.
    refcount: AtomicU8,
    /// The previous chain head: the next peg, or the control block.
    ///
    /// Written only before the peg is published to the word.
    next: Cell<*mut Header>,
}

impl Peg {
    fn new(next: *mut Header) -> Self {
        Self {
            header: Header { kind: NodeKind::Peg },
            refcount: AtomicU8::new(2),
            next: Cell::new(next),
        }
    }
}

/// State guarded by the control block's inner mutex.
struct State {
    /// Whether the user-visible mutex is currently held.
    held: bool,
    /// Threads suspended on the inner condvar, waiting to acquire or
    /// waiting inside a transfer.
    waiters: usize,
    /// References pinning the block, offset by -1 for the primary chain:
    /// zero means only the primary chain still reaches the block.
    refcount: usize,
    /// Bumped by every veto; transfers abort once it moves past their
    /// snapshot.
    transfer_gen: u64,
    /// Threads inside the blocking phase of a transfer into this mutex.
    transfers: usize,
}

/// The lazily allocated control block carrying the blocking apparatus for
/// a contended word.
#[repr(C)]
struct FatMutex {
    header: Header,
    state: BlockingMutex<State>,
    cond: Condvar,
}

impl FatMutex {
    fn new(held: bool) -> Self {
        Self {
            header: Header { kind: NodeKind::Block },
            state: BlockingMutex::new(State {
                held,
                waiters: 0,
                // The holder pins the block through a pseudo reference.
                refcount: usize::from(held),
                transfer_gen: 0,
                transfers: 0,
            }),
            cond: Condvar::new(),
        }
    }
}

/// A control block with its inner mutex held.
///
/// Every path that obtains a block goes through this carrier, so promote
/// and peg hand over the inner lock under one discipline.
struct Locked<'a> {
    fat: *mut FatMutex,
    state: BlockingGuard<'a, State>,
}

impl<'a> Locked<'a> {
    fn cond(&self) -> &'a Condvar {
        // SAFETY: The holder of a `Locked` is accounted for on the chain
        // or in the refcount, so the block stays alive at least as long.
        unsafe { &(*self.fat).cond }
    }

    /// Blocks on the inner condvar, giving up the inner mutex while
    /// suspended.
    fn wait(self) -> Locked<'a> {
        let Locked { fat, state } = self;
        // SAFETY: Same as `cond`.
        let state = unsafe { (*fat).cond.wait(state) };
        Locked { fat, state }
    }

    /// Waits until the mutex is unheld, then takes it, consuming the
    /// inner lock.
    ///
    /// The calling thread must already be accounted for in the refcount;
    /// that reference becomes the holder's pseudo reference.
    fn acquire(mut self) {
        if self.state.held {
            self.state.waiters += 1;
            while self.state.held {
                self = self.wait();
            }
            self.state.waiters -= 1;
        }
        self.state.held = true;
    }
}

/// A mutual exclusion primitive whose uncontended representation is one
/// pointer-sized word, useful for protecting shared data.
pub struct Mutex<T: ?Sized, R> {
    word: AtomicPtr<Header>,
    relax: PhantomData<R>,
    data: UnsafeCell<T>,
}

// Same unsafe impls as `std::sync::Mutex`.
unsafe impl<T: ?Sized + Send, R> Send for Mutex<T, R> {}
unsafe impl<T: ?Sized + Send, R> Sync for Mutex<T, R> {}

impl<T, R> Mutex<T, R> {
    /// Creates a new mutex in an unlocked state ready for use.
    pub fn new(value: T) -> Self {
        Self {
            word: AtomicPtr::new(word::unheld()),
            relax: PhantomData,
            data: UnsafeCell::new(value),
        }
    }
}

impl<T: ?Sized, R> Mutex<T, R> {
    /// Swaps the word from unheld to held, the no-allocation fast path.
    fn try_acquire_word(&self) -> bool {
        let (unheld, held) = (word::unheld(), word::held());
        self.word.compare_exchange(unheld, held, SeqCst, SeqCst).is_ok()
    }

    /// Swaps the word from held to unheld, the no-allocation fast path.
    fn try_release_word(&self) -> bool {
        let (unheld, held) = (word::unheld(), word::held());
        self.word.compare_exchange(held, unheld, SeqCst, SeqCst).is_ok()
    }

    /// Lazily creates the control block, transcribing the scalar word
    /// state into it, and installs it with its inner mutex already held.
    ///
    /// Returns `None` if the word moved and the whole operation must be
    /// retried.
    fn promote(&self, head: *mut Header) -> Option<Locked<'_>> {
        debug_assert!(!word::is_chain(head));
        let fat = Box::into_raw(Box::new(FatMutex::new(head == word::held())));
        // SAFETY: Freshly allocated and not yet published.
        let state = unsafe { (*fat).state.lock() };
        if self.word.compare_exchange(head, fat.cast(), SeqCst, SeqCst).is_ok() {
            return Some(Locked { fat, state });
        }
        // The word moved under us; tear the unpublished block back down.
        drop(state);
        // SAFETY: The CAS failed, so no other thread ever saw the block.
        drop(unsafe { Box::from_raw(fat) });
        None
    }

    /// Pins the control block at the tail of the chain starting at
    /// `head`, locks its inner mutex, then retires the peg used for the
    /// pinning while repairing the chain refcounts.
    ///
    /// Returns `None` if the word stopped holding a chain, in which case
    /// the block may already be reclaimed and the caller must retry.
    fn peg_block(&self, mut head: *mut Header) -> Option<Locked<'_>> {
        debug_assert!(word::is_chain(head));
        let peg = Box::into_raw(Box::new(Peg::new(head)));

        // Publish the peg in front of the chain. Once the CAS lands,
        // nothing past the peg can be reclaimed.
        while self.word.compare_exchange(head, peg.cast(), SeqCst, SeqCst).is_err() {
            head = self.word.load(SeqCst);
            if !word::is_chain(head) {
                // No control block left to pin.
                // SAFETY: The CAS failed, so the peg was never published.
                drop(unsafe { Box::from_raw(peg) });
                return None;
            }
            // SAFETY: Not yet published; no other thread can reach the
            // peg.
            unsafe { (*peg).next.set(head) };
        }

        // Walk to the control block and take its inner mutex. The peg
        // keeps the whole chain alive across the blocking call.
        let mut node = head;
        // SAFETY: Every node on a pinned chain stays allocated, and
        // `next` of a published peg is never written again.
        while unsafe { (*node).kind } == NodeKind::Peg {
            node = unsafe { (*node.cast::<Peg>()).next.get() };
        }
        let fat = node.cast::<FatMutex>();
        // SAFETY: The chain tail is always a live control block.
        let mut state = unsafe { (*fat).state.lock() };

        // Point the word back at the control block. Whatever chain this
        // displaces is detached and must have its references unwound;
        // this thread's own peg is somewhere on it, unless another thread
        // already retired it from there.
        let displaced = self.word.swap(fat.cast(), SeqCst);

        // The swap manufactured a fresh reference from the word. It may
        // turn out not to be real, in which case it is taken back below.
        state.refcount += 1;

        // How much of our own peg's count dies in the second walk: both
        // references at once when the peg shows up as the detached root,
        // otherwise only the thread's own.
        let own_decrement: u8;

        let mut node = displaced;
        loop {
            if node == peg.cast::<Header>() {
                own_decrement = 2;
                break;
            }
            if node == fat.cast::<Header>() {
                // The detached chain was the bare block; the manufactured
                // reference was not real after all.
                state.refcount -= 1;
                own_decrement = 1;
                break;
            }
            let chain_peg = node.cast::<Peg>();
            // SAFETY: Still reachable from the detached chain, so alive.
            if unsafe { (*chain_peg).refcount.fetch_sub(1, AcqRel) } != 1 {
                // Its installing thread still references it; the rest of
                // the chain survives as a secondary chain.
                own_decrement = 1;
                break;
            }
            // SAFETY: The count reached zero; nobody else can see the
            // peg.
            node = unsafe { (*chain_peg).next.get() };
            drop(unsafe { Box::from_raw(chain_peg) });
        }

        // Retire our own peg, and whatever the chain behind it uncovers
        // once it goes.
        let mut own = peg;
        let mut decrement = own_decrement;
        loop {
            // SAFETY: This thread still counts as a reference, so the peg
            // is alive.
            if unsafe { (*own).refcount.fetch_sub(decrement, AcqRel) } != decrement {
                // A secondary chain still reaches it; whoever drains that
                // chain frees it.
                break;
            }
            // SAFETY: The count reached zero; this thread is the last one
            // that can see the peg.
            let next = unsafe { (*own).next.get() };
            drop(unsafe { Box::from_raw(own) });
            if next == fat.cast::<Header>() {
                // The freed peg was pinning the block directly.
                state.refcount -= 1;
                break;
            }
            own = next.cast::<Peg>();
            decrement = 1;
        }

        Some(Locked { fat, state })
    }

    /// Obtains the locked control block for the current word, creating it
    /// if the word is still scalar.
    fn get_block(&self, head: *mut Header) -> Option<Locked<'_>> {
        if word::is_chain(head) {
            self.peg_block(head)
        } else {
            self.promote(head)
        }
    }

    /// Drops one reference to the block, reclaiming it when it was the
    /// last and the word can be returned to the unheld state.
    fn release(&self, locked: Locked<'_>) {
        let Locked { fat, mut state } = locked;
        state.refcount -= 1;
        // Zero only says no secondary chain, waiter or holder pins the
        // block; the CAS additionally proves the primary chain is bare,
        // and detaches the block so no new peg can reach it.
        let reclaim = state.refcount == 0
            && self
                .word
                .compare_exchange(fat.cast(), word::unheld(), SeqCst, SeqCst)
                .is_ok();
        drop(state);
        if reclaim {
            // SAFETY: Detached from the word with no references left, and
            // allocated through the Box API.
            drop(unsafe { Box::from_raw(fat) });
        }
    }
}

impl<T: ?Sized, R: Relax> Mutex<T, R> {
    /// Acquires this mutex, blocking the current thread until it is able
    /// to do so.
    pub fn lock(&self) -> MutexGuard<'_, T, R> {
        if !self.try_acquire_word() {
            self.lock_slow();
        }
        MutexGuard::new(self)
    }

    /// Lock path for a word that is held, contended, or moving between
    /// the two.
    fn lock_slow(&self) {
        let mut relax = R::new();
        loop {
            let head = self.word.load(SeqCst);
            if head == word::unheld() {
                if self.try_acquire_word() {
                    return;
                }
            } else if let Some(mut locked) = self.get_block(head) {
                // Account for this thread's wait while the inner mutex is
                // still held.
                locked.state.refcount += 1;
                locked.acquire();
                return;
            }
            relax.relax();
        }
    }

    /// Attempts to acquire this mutex without blocking on other holders.
    ///
    /// A held mutex is reported by returning `None`, without this thread
    /// ever becoming a waiter.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T, R>> {
        let mut relax = R::new();
        loop {
            let head = self.word.load(SeqCst);
            if head == word::unheld() {
                if self.try_acquire_word() {
                    return Some(MutexGuard::new(self));
                }
            } else if head == word::held() {
                return None;
            } else if let Some(mut locked) = self.peg_block(head) {
                if locked.state.held {
                    // This thread never took a reference, so there is
                    // nothing to give back; just drop the inner lock.
                    return None;
                }
                locked.state.held = true;
                // The holder's pseudo reference.
                locked.state.refcount += 1;
                return Some(MutexGuard::new(self));
            }
            relax.relax();
        }
    }

    /// Releases this mutex.
    ///
    /// Fails with [`Error::NotPermitted`] against an unheld mutex. Misuse
    /// by a thread that never held the mutex is only detected while a
    /// control block exists.
    pub(crate) fn unlock(&self) -> Result<(), Error> {
        if self.try_release_word() {
            return Ok(());
        }
        self.unlock_slow()
    }

    fn unlock_slow(&self) -> Result<(), Error> {
        let mut locked = self.get_block_held()?;
        locked.state.held = false;
        if locked.state.waiters > 0 {
            // Wake a single waiter.
            locked.cond().notify_one();
        }
        self.release(locked);
        Ok(())
    }

    /// Obtains the locked control block when the calling thread expects
    /// the mutex to be held.
    fn get_block_held(&self) -> Result<Locked<'_>, Error> {
        let mut relax = R::new();
        loop {
            let head = self.word.load(SeqCst);
            if head == word::unheld() {
                return Err(Error::NotPermitted);
            }
            if let Some(locked) = self.get_block(head) {
                if locked.state.held {
                    return Ok(locked);
                }
                // Not held after all: drop the inner lock untouched; this
                // thread never took a reference.
                drop(locked);
                return Err(Error::NotPermitted);
            }
            relax.relax();
        }
    }

    /// Releases this mutex, waits on `cond`, and re-acquires the mutex
    /// before returning, deadline or not.
    ///
    /// While suspended, the reference that pinned the block for the
    /// holder keeps pinning it for the sleeper.
    pub(crate) fn cond_wait(
        &self,
        cond: &Condvar,
        deadline: Option<Instant>,
    ) -> Result<(), Error> {
        let mut locked = self.get_block_held()?;
        if locked.state.waiters > 0 {
            // Releasing the mutex below may hand it to a waiter.
            locked.cond().notify_one();
        }
        locked.state.held = false;
        let Locked { fat, state } = locked;
        let (state, timed_out) = match deadline {
            Some(deadline) => cond.wait_until(state, deadline),
            None => (cond.wait(state), false),
        };
        // Re-acquire on every exit path, so the caller always sees the
        // mutex held again.
        Locked { fat, state }.acquire();
        if timed_out {
            Err(Error::TimedOut)
        } else {
            Ok(())
        }
    }

    /// Atomically releases this mutex and acquires `target`, with no
    /// foreign acquirer able to slip between the two points except
    /// another transfer.
    ///
    /// On failure the caller's hold on this mutex has been restored.
    pub(crate) fn transfer<U: ?Sized>(&self, target: &Mutex<U, R>) -> Result<(), Error> {
        let mut relax = R::new();
        let mut locked = loop {
            let head = target.word.load(SeqCst);
            if head == word::unheld() {
                if !target.try_acquire_word() {
                    relax.relax();
                    continue;
                }
                // Target taken the easy way; release this mutex, undoing
                // the target if that fails.
                return match self.unlock() {
                    Ok(()) => Ok(()),
                    err => recover(err, target.unlock()),
                };
            }
            match target.get_block(head) {
                Some(locked) => break locked,
                None => relax.relax(),
            }
        };

        locked.state.refcount += 1;
        let transfer_gen = locked.state.transfer_gen;

        // Release this mutex before blocking on the target. Entering this
        // mutex's slow release while holding the target's inner lock
        // risks deadlock, so the inner lock is dropped around it; the
        // reference taken above keeps the target block pinned meanwhile.
        if !self.try_release_word() {
            let Locked { fat, state } = locked;
            drop(state);
            let released = self.unlock_slow();
            // SAFETY: Pinned by the reference taken above.
            let state = unsafe { (*fat).state.lock() };
            locked = Locked { fat, state };
            if let Err(err) = released {
                target.release(locked);
                return Err(err);
            }
        }

        locked.state.transfers += 1;
        locked.state.waiters += 1;

        let err = loop {
            if !locked.state.held {
                locked.state.transfers -= 1;
                locked.state.waiters -= 1;
                locked.state.held = true;
                // The reference taken above becomes the holder's pseudo
                // reference.
                return Ok(());
            }
            if locked.state.transfer_gen != transfer_gen {
                break Error::Vetoed;
            }
            locked = locked.wait();
        };

        locked.state.transfers -= 1;
        locked.state.waiters -= 1;
        target.release(locked);
        // Restore the caller's original hold before reporting the abort.
        if !self.try_acquire_word() {
            self.lock_slow();
        }
        Err(err)
    }

    /// Makes every transfer currently blocked on this mutex give up and
    /// report [`Error::Vetoed`].
    ///
    /// Fails with [`Error::NotPermitted`] against an unheld mutex.
    pub(crate) fn veto_transfer(&self) -> Result<(), Error> {
        let mut relax = R::new();
        let mut locked = loop {
            let head = self.word.load(SeqCst);
            if head == word::held() {
                // Held with no control block: nothing can be waiting to
                // transfer in.
                return Ok(());
            }
            if head == word::unheld() {
                return Err(Error::NotPermitted);
            }
            if let Some(locked) = self.peg_block(head) {
                break locked;
            }
            relax.relax();
        };
        if !locked.state.held {
            return Err(Error::NotPermitted);
        }
        locked.state.transfer_gen += 1;
        if locked.state.transfers > 0 {
            locked.cond().notify_all();
        }
        Ok(())
    }
}

impl<T: ?Sized, R> Mutex<T, R> {
    /// Returns a mutable reference to the underlying data.
    #[cfg(not(all(loom, test)))]
    pub fn get_mut(&mut self) -> &mut T {
        // SAFETY: We hold exclusive access to the Mutex data.
        unsafe { &mut *self.data.get() }
    }

    /// Whether the word currently points at a control block.
    #[cfg(all(test, not(loom)))]
    pub(crate) fn is_inflated(&self) -> bool {
        word::is_chain(self.word.load(SeqCst))
    }

    /// Whether the word is back to the unheld scalar with no control
    /// block attached.
    #[cfg(all(test, not(loom)))]
    pub(crate) fn is_unheld_and_deflated(&self) -> bool {
        self.word.load(SeqCst) == word::unheld()
    }
}

impl<T: ?Sized, R> Drop for Mutex<T, R> {
    fn drop(&mut self) {
        // SAFETY: Exclusive access; no thread can be mid-operation.
        let head = unsafe { self.word.load_unsynced() };
        if word::is_chain(head) {
            // A quiescent chain carries no pegs: every peg is retired by
            // the end of the operation that installed it.
            debug_assert!(unsafe { (*head).kind } == NodeKind::Block);
            // SAFETY: The chain tail is the live control block, allocated
            // through the Box API, and nothing else references it.
            drop(unsafe { Box::from_raw(head.cast::<FatMutex>()) });
        }
    }
}

impl<T: ?Sized + Debug, R: Relax> Debug for Mutex<T, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Mutex");
        self.lock().with(|data| d.field("data", &data));
        d.finish()
    }
}

/// An RAII implementation of a "scoped lock" of a mutex. When this
/// structure is dropped (falls out of scope), the lock will be unlocked.
#[must_use = "if unused the Mutex will immediately unlock"]
pub struct MutexGuard<'a, T: ?Sized, R: Relax> {
    lock: &'a Mutex<T, R>,
}

// A guard does not record an owning thread, so it may release or transfer
// the mutex from any thread. Same unsafe Sync impl as
// `std::sync::MutexGuard`.
unsafe impl<T: ?Sized + Send, R: Relax> Send for MutexGuard<'_, T, R> {}
unsafe impl<T: ?Sized + Sync, R: Relax> Sync for MutexGuard<'_, T, R> {}

impl<'a, T: ?Sized, R: Relax> MutexGuard<'a, T, R> {
    const fn new(lock: &'a Mutex<T, R>) -> Self {
        Self { lock }
    }

    /// Runs `f` against a shared reference pointing to the underlying
    /// data.
    pub(crate) fn with<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(&T) -> Ret,
    {
        // SAFETY: A guard instance holds the lock locked.
        unsafe { self.lock.data.with_unchecked(f) }
    }

    /// Consumes the guard without releasing the mutex, returning the lock
    /// it was holding.
    pub(crate) fn into_mutex(self) -> &'a Mutex<T, R> {
        let lock = self.lock;
        core::mem::forget(self);
        lock
    }

    /// Wraps a mutex that is already known to be held by the caller.
    pub(crate) const fn adopt(lock: &'a Mutex<T, R>) -> Self {
        Self::new(lock)
    }

    /// The mutex this guard is holding.
    pub(crate) fn mutex(&self) -> &'a Mutex<T, R> {
        self.lock
    }
}

impl<T: ?Sized, R: Relax> Drop for MutexGuard<'_, T, R> {
    fn drop(&mut self) {
        // A guard exists only while the mutex is held, so the release
        // cannot report misuse.
        let unlocked = self.lock.unlock();
        debug_assert!(unlocked.is_ok());
    }
}

impl<T: ?Sized + Debug, R: Relax> Debug for MutexGuard<'_, T, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.with(|data| data.fmt(f))
    }
}

impl<T: ?Sized + Display, R: Relax> Display for MutexGuard<'_, T, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.with(|data| data.fmt(f))
    }
}

#[cfg(not(all(loom, test)))]
impl<T: ?Sized, R: Relax> core::ops::Deref for MutexGuard<'_, T, R> {
    type Target = T;

    /// Dereferences the guard to access the underlying data.
    fn deref(&self) -> &T {
        // SAFETY: A guard instance holds the lock locked.
        unsafe { &*self.lock.data.get() }
    }
}

#[cfg(not(all(loom, test)))]
impl<T: ?Sized, R: Relax> core::ops::DerefMut for MutexGuard<'_, T, R> {
    /// Mutably dereferences the guard to access the underlying data.
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: A guard instance holds the lock locked.
        unsafe { &mut *self.lock.data.get() }
    }
}

/// SAFETY: A guard instance holds the lock locked, with exclusive access
/// to the underlying data.
#[cfg(all(loom, test))]
#[cfg(not(tarpaulin_include))]
unsafe impl<T: ?Sized, R: Relax> crate::loom::Guard for MutexGuard<'_, T, R> {
    type Target = T;

    fn get(&self) -> &UnsafeCell<Self::Target> {
        &self.lock.data
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use std::time::Instant;

    use super::Mutex;
    use crate::cfg::sync::Condvar;
    use crate::error::Error;
    use crate::relax::Yield;

    type M<T> = Mutex<T, Yield>;

    #[test]
    fn uncontended_word_trace() {
        let mutex = M::new(0);
        assert!(mutex.is_unheld_and_deflated());
        let guard = mutex.lock();
        assert!(!mutex.is_inflated());
        assert!(!mutex.is_unheld_and_deflated());
        drop(guard);
        assert!(mutex.is_unheld_and_deflated());
    }

    #[test]
    fn unlock_of_unheld_is_not_permitted() {
        let mutex = M::new(());
        assert_eq!(mutex.unlock(), Err(Error::NotPermitted));
        assert!(mutex.is_unheld_and_deflated());
    }

    #[test]
    fn try_lock_never_queues() {
        let mutex = M::new(());
        let guard = mutex.lock();
        assert!(mutex.try_lock().is_none());
        // Still the scalar held state: no control block was created.
        assert!(!mutex.is_inflated());
        drop(guard);
        assert!(mutex.try_lock().is_some());
    }

    #[test]
    fn veto_on_unheld_is_not_permitted() {
        let mutex = M::new(());
        assert_eq!(mutex.veto_transfer(), Err(Error::NotPermitted));
        assert!(mutex.is_unheld_and_deflated());
    }

    #[test]
    fn veto_on_scalar_held_is_trivially_ok() {
        let mutex = M::new(());
        let guard = mutex.lock();
        assert_eq!(mutex.veto_transfer(), Ok(()));
        assert!(!mutex.is_inflated());
        drop(guard);
    }

    #[test]
    fn timed_wait_promotes_and_release_reclaims() {
        let mutex = M::new(());
        let cond = Condvar::new();
        let guard = mutex.lock();
        // The deadline is already gone, so this promotes, runs the
        // timeout path, and re-acquires before returning.
        let res = mutex.cond_wait(&cond, Some(Instant::now()));
        assert_eq!(res, Err(Error::TimedOut));
        assert!(mutex.is_inflated());
        // The slow release drains the last reference and frees the block.
        drop(guard);
        assert!(mutex.is_unheld_and_deflated());
    }

    #[test]
    fn wait_on_unheld_is_not_permitted() {
        let mutex = M::new(());
        let cond = Condvar::new();
        assert_eq!(mutex.cond_wait(&cond, None), Err(Error::NotPermitted));
    }

    #[test]
    fn transfer_by_non_holder_is_not_permitted() {
        let a = M::new(());
        let b = M::new(());
        // Neither mutex held: the target is taken the easy way, then the
        // source release fails and the target is handed back.
        assert_eq!(a.transfer(&b), Err(Error::NotPermitted));
        assert!(a.is_unheld_and_deflated());
        assert!(b.is_unheld_and_deflated());
    }

    #[test]
    fn transfer_by_non_holder_against_held_target() {
        let a = M::new(());
        let b = M::new(());
        let guard_b = b.lock();
        assert_eq!(a.transfer(&b), Err(Error::NotPermitted));
        assert!(a.is_unheld_and_deflated());
        // The failed transfer inflated the target, but its hold survives
        // untouched and release still reclaims the block.
        drop(guard_b);
        assert!(b.is_unheld_and_deflated());
    }

    #[test]
    fn transfer_to_free_target() {
        let a = M::new(());
        let b = M::new(());
        a.lock().into_mutex();
        assert_eq!(a.transfer(&b), Ok(()));
        assert!(a.is_unheld_and_deflated());
        assert_eq!(b.unlock(), Ok(()));
        assert!(b.is_unheld_and_deflated());
    }

    #[test]
    fn guard_adoption_releases_on_drop() {
        let mutex = M::new(());
        mutex.lock().into_mutex();
        let guard = super::MutexGuard::adopt(&mutex);
        drop(guard);
        assert!(mutex.is_unheld_and_deflated());
    }
}
