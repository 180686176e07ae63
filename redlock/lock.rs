use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::{manager::LockManager, prelude::*, quorum::LockAttempt, settings::LockSettings};

/// A held distributed lock.
///
/// Clones share the same underlying state: an extend through any clone moves
/// the expiration every clone observes. A handle should still only be driven
/// from one task at a time, the expiration accounting would race otherwise.
///
/// There is no drop glue, an unreleased handle simply expires server-side.
#[derive(Clone, Debug)]
pub struct Lock {
    manager: LockManager,
    inner: Arc<LockInner>,
}

#[derive(Debug)]
struct LockInner {
    resources: Vec<String>,
    value: Vec<u8>,
    settings: LockSettings,
    expiration: Mutex<Instant>,
    attempts: Vec<LockAttempt>,
    released: AtomicBool,
}

impl Lock {
    pub(crate) fn new(
        manager: LockManager,
        resources: Vec<String>,
        value: Vec<u8>,
        expiration: Instant,
        attempts: Vec<LockAttempt>,
        settings: LockSettings,
    ) -> Self {
        Self {
            manager,
            inner: Arc::new(LockInner {
                resources,
                value,
                settings,
                expiration: Mutex::new(expiration),
                attempts,
                released: AtomicBool::new(false),
            }),
        }
    }

    /// The deduplicated resource keys this lock covers.
    pub fn resources(&self) -> &[String] {
        &self.inner.resources
    }

    /// The random token stored under every key, identifying this holder.
    pub fn value(&self) -> &[u8] {
        &self.inner.value
    }

    /// The instant up to which the lock may safely be assumed held.
    pub fn expiration(&self) -> Instant {
        *self.inner.expiration.lock()
    }

    /// Time left until [`Self::expiration`], zero once passed or released.
    pub fn time_remaining(&self) -> Duration {
        if self.inner.released.load(Ordering::Acquire) {
            return Duration::ZERO;
        }
        self.expiration().saturating_duration_since(Instant::now())
    }

    /// Whether the lock is still inside its validity window.
    pub fn is_valid(&self) -> bool {
        !self.time_remaining().is_zero()
    }

    /// The per-server vote history of the acquisition, for diagnostics.
    pub fn attempts(&self) -> &[LockAttempt] {
        &self.inner.attempts
    }

    /// Push the lock's deadline out to `ttl` from now on every server.
    ///
    /// The token is kept stable, only the expiration moves, and only ever
    /// forward: a quorum success that would not advance the deadline counts
    /// as a failed attempt. On success the new expiration is returned and
    /// every clone of this handle observes it.
    pub async fn extend(&self, ttl: Duration) -> RResult<Instant, LockErr> {
        if self.inner.released.load(Ordering::Acquire) {
            return Err(err!(
                LockErr::InvalidArgument,
                "The lock was already released."
            ));
        }
        let current = self.expiration();
        let expiration = self
            .manager
            .extend_lock(
                &self.inner.resources,
                &self.inner.value,
                ttl,
                current,
                &self.inner.settings,
            )
            .await?;
        *self.inner.expiration.lock() = expiration;
        Ok(expiration)
    }

    /// Drop the lock on every server holding this token.
    ///
    /// The handle is terminal afterwards whatever the outcome, an
    /// unconfirmed release is left to the server-side ttls. Further calls on
    /// a released handle fail without any I/O.
    pub async fn release(&self) -> RResult<(), LockErr> {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return Err(err!(
                LockErr::InvalidArgument,
                "The lock was already released."
            ));
        }
        self.manager
            .release_lock(&self.inner.resources, &self.inner.value, &self.inner.settings)
            .await
    }
}
