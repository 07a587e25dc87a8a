//! Error kinds reported by mutex operations.
//!
//! Operations report at most one error. When a cleanup step fails while an
//! earlier error is already being propagated, the two results are combined
//! with [`recover`]: a lone error wins over a success, and two stacked
//! errors are treated as corrupted post-cleanup state that the process must
//! not continue from.

use thiserror::Error;

/// An error returned by a mutex operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The operation requires the mutex to be held, but it is not.
    ///
    /// Returned by release, veto and wait operations issued against an
    /// unheld mutex. Misuse by a thread that never held the mutex is only
    /// detectable while a control block exists; the primitive does not
    /// track which thread holds it.
    #[error("mutex is not held")]
    NotPermitted,

    /// The mutex is held by some thread.
    ///
    /// Returned by lock attempts that refuse to wait.
    #[error("mutex is already locked")]
    Busy,

    /// A transfer into this mutex was aborted by a concurrent veto.
    #[error("transfer was vetoed")]
    Vetoed,

    /// A timed wait reached its deadline before being notified.
    #[error("wait timed out")]
    TimedOut,
}

/// Combines a primary result with the result of a recovery step.
///
/// If either side succeeded, the other is returned. If both failed, the
/// post-cleanup state cannot be trusted any more (continuing would risk
/// leaking or double-freeing a control block), so the process terminates
/// with a diagnostic rather than discarding either error.
pub(crate) fn recover(primary: Result<(), Error>, secondary: Result<(), Error>) -> Result<(), Error> {
    match (primary, secondary) {
        (primary, Ok(())) => primary,
        (Ok(()), secondary) => secondary,
        (Err(first), Err(second)) => {
            log::error!("got error \"{second}\" while recovering from \"{first}\"");
            std::process::abort();
        }
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use super::{recover, Error};

    #[test]
    fn recover_passes_through_success() {
        assert_eq!(recover(Ok(()), Ok(())), Ok(()));
    }

    #[test]
    fn recover_keeps_primary_error() {
        assert_eq!(recover(Err(Error::Busy), Ok(())), Err(Error::Busy));
    }

    #[test]
    fn recover_surfaces_secondary_error() {
        assert_eq!(recover(Ok(()), Err(Error::Vetoed)), Err(Error::Vetoed));
    }

    #[test]
    fn display_names_the_condition() {
        assert_eq!(Error::NotPermitted.to_string(), "mutex is not held");
        assert_eq!(Error::Busy.to_string(), "mutex is already locked");
    }
}
