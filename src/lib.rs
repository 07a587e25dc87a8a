//! A space-optimized mutual exclusion primitive, referred to as a skinny
//! lock.
//!
//! An uncontended skinny lock is a single pointer-sized word: locking and
//! unlocking it are one compare-and-swap each, with no heap allocation and
//! no other state. The primitive only grows a conventional blocking
//! apparatus - an OS mutex, a condition variable, waiter and reference
//! counts - when contention actually shows up. That control block is
//! allocated lazily, shared by all contending threads, and reclaimed as
//! soon as the mutex is unheld and uncontended again. The main properties
//! of this mechanism are:
//!
//! - a memory footprint of one machine word per mutex while uncontended;
//! - zero allocation on the uncontended lock/unlock fast paths;
//! - OS-assisted blocking under contention, never unbounded spinning;
//! - lock transfer between mutexes with no foreign acquirer able to
//!   interleave, and a veto operation to abort pending transfers.
//!
//! ## Control block reclamation
//!
//! Freeing the control block while unrelated threads may be about to
//! dereference it is the delicate part of the design. Instead of hazard
//! pointers, an accessing thread pins the block by atomically prepending a
//! small *peg* node in front of it, forming a chain rooted at the mutex
//! word; a block with any chain reaching it is never freed. Pegs live only
//! for the duration of one access, and a staged refcount discipline keeps
//! the accounting exact while chains are detached and drained. See the
//! [`raw`] module documentation for the full picture.
//!
//! ## Locking with a skinny lock
//!
//! The lock is held for as long as its associated RAII guard is in scope;
//! dropping the guard frees the mutex. Guards also expose the two advanced
//! operations: waiting on an external [condition variable] bound to the
//! mutex, and [transferring] the hold to another mutex.
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//!
//! // `spins::Mutex` retries raced word updates with a spin hint.
//! use skinnylock::raw::spins::Mutex;
//!
//! let mutex = Arc::new(Mutex::new(0));
//! let c_mutex = Arc::clone(&mutex);
//!
//! thread::spawn(move || {
//!     *c_mutex.lock() = 10;
//! })
//! .join().expect("thread::spawn failed");
//!
//! assert_eq!(*mutex.lock(), 10);
//! ```
//!
//! ## Relax policies
//!
//! The word-level protocol occasionally loses a compare-and-swap race and
//! must re-read and retry. The mutex is generic over the [`Relax`] policy
//! applied between such retries; the [`raw`] module provides type aliases
//! for the provided policies. Blocking waits are not affected: a thread
//! that has to wait for the lock always parks on the OS primitives inside
//! the control block.
//!
//! [condition variable]: crate::raw::Condvar
//! [transferring]: crate::raw::MutexGuard::transfer
//! [`Relax`]: crate::relax::Relax

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::inline_always)]
#![allow(clippy::doc_markdown)]
#![warn(rust_2021_compatibility)]
#![warn(missing_docs)]

pub mod error;
pub mod raw;
pub mod relax;

pub(crate) mod cfg;
pub(crate) mod inner;

#[cfg(test)]
pub(crate) mod test;

#[cfg(all(loom, test))]
#[cfg(not(tarpaulin))]
pub(crate) mod loom;
