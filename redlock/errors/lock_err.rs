use error_stack::Context;

use crate::quorum::LockAttempt;

/// Errors raised by lock operations.
///
/// Per-server failures are never raised on their own: they are collected
/// into [`LockAttempt`] records and only surface here once a whole operation
/// has run out of attempts.
#[derive(Debug)]
pub enum LockErr {
    /// The caller passed something unusable: an empty resource set, an empty
    /// key, a zero or sub-millisecond ttl, or an operation on a handle that
    /// was already released. Raised before any network I/O.
    InvalidArgument,
    /// The operation exhausted its attempt budget without ever holding a
    /// quorum inside the validity window. Carries the full ordered vote
    /// history for diagnostics.
    Execution {
        /// One record per attempt, in dispatch order.
        attempts: Vec<LockAttempt>,
    },
}

impl std::fmt::Display for LockErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockErr::InvalidArgument => write!(f, "Invalid argument"),
            LockErr::Execution { attempts } => write!(
                f,
                "Lock operation failed after {} attempt{}",
                attempts.len(),
                if attempts.len() == 1 { "" } else { "s" }
            ),
        }
    }
}

impl Context for LockErr {}
