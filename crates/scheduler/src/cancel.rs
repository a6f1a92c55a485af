//! Cancellation token for fetch tasks
//!
//! Every fetch task carries a token that flips when the task is cancelled.
//! Cancellation is cooperative: anything holding a clone, such as a
//! transport streaming a large body, can poll it and stop early. The task's
//! own publish decision is made on its state machine.

use std::fmt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token for cooperative task cancellation
///
/// Multiple clones share the same underlying flag. Once set the flag stays
/// set; there is no way to un-cancel a task.
///
/// # Example
///
/// ```
/// use photowall_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// assert!(token.cancel());
/// assert!(!token.cancel()); // already cancelled
/// assert!(worker_token.is_cancelled());
/// ```
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel this token and every clone of it.
    ///
    /// Idempotent and callable from any thread. Returns `true` only for the
    /// call that actually flipped the flag.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    /// Check whether `cancel()` has been called on this token or any clone
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
