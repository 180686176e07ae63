use std::{
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use futures::FutureExt;
use parking_lot::Mutex;

use crate::{lock::Lock, manager::LockManager, prelude::*, settings::LockSettings};

/// The cooperative "your lock is gone" channel between the scoped helper's
/// renewal task and the user routine.
///
/// The routine is never forcibly terminated. It should poll
/// [`Self::aborted`] (or await [`Self::cancelled`]) wherever losing mutual
/// exclusion matters, and wind down on its own.
#[derive(Clone, Debug)]
pub struct LockSignal {
    inner: Arc<SignalInner>,
}

#[derive(Debug)]
struct SignalInner {
    aborted: AtomicBool,
    error: Mutex<Option<Report<LockErr>>>,
    notify: tokio::sync::Notify,
}

impl LockSignal {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                aborted: AtomicBool::new(false),
                error: Mutex::new(None),
                notify: tokio::sync::Notify::new(),
            }),
        }
    }

    /// True once the renewal task could not keep the lock alive.
    pub fn aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::Acquire)
    }

    /// The extension error that caused the abort, if any. Moves the report
    /// out, so later calls return None.
    pub fn take_error(&self) -> Option<Report<LockErr>> {
        self.inner.error.lock().take()
    }

    /// Resolves once the signal aborts. Pending forever while the lock stays
    /// healthy, intended for `select!`-style use inside the routine.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.aborted() {
                return;
            }
            notified.await;
        }
    }

    fn abort_with(&self, error: Report<LockErr>) {
        *self.inner.error.lock() = Some(error);
        self.inner.aborted.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }
}

impl LockManager {
    /// Run `routine` under a lock on `resources`, auto-extending the lock in
    /// the background for as long as the routine runs.
    ///
    /// The lock is acquired first; on acquisition failure the error
    /// propagates and the routine never runs. A renewal task then re-extends
    /// by `ttl` whenever the remaining validity drops to the automatic
    /// extension threshold. If an extension fails the routine is told
    /// through its [`LockSignal`] and keeps running, consulting the signal
    /// is its responsibility. Once the routine settles the renewal task is
    /// stopped and the lock released, on every exit path, panics included.
    pub async fn using<R, F, Fut, T>(
        &self,
        resources: &[R],
        ttl: Duration,
        routine: F,
    ) -> RResult<T, LockErr>
    where
        R: AsRef<str>,
        F: FnOnce(LockSignal) -> Fut,
        Fut: Future<Output = T>,
    {
        self.using_with(resources, ttl, self.settings().clone(), routine)
            .await
    }

    /// [`Self::using`] with per-call settings.
    pub async fn using_with<R, F, Fut, T>(
        &self,
        resources: &[R],
        ttl: Duration,
        settings: LockSettings,
        routine: F,
    ) -> RResult<T, LockErr>
    where
        R: AsRef<str>,
        F: FnOnce(LockSignal) -> Fut,
        Fut: Future<Output = T>,
    {
        let threshold = settings.automatic_extension_threshold;
        let lock = self.acquire_with(resources, ttl, settings).await?;
        let signal = LockSignal::new();

        let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
        let renewal = tokio::spawn(extend_until_stopped(
            lock.clone(),
            ttl,
            threshold,
            signal.clone(),
            stop_rx,
        ));

        let outcome = AssertUnwindSafe(routine(signal.clone())).catch_unwind().await;

        // The renewal task fully stops before the release goes out, the two
        // must never race.
        let _ = stop_tx.send(true);
        let _ = renewal.await;

        let released = lock.release().await;
        match outcome {
            Ok(value) => {
                match released {
                    Ok(()) => {}
                    // Once the lock was declared lost the trailing release is
                    // expected to find nothing left to delete, that failure
                    // carries no news. Anything transport-shaped still does.
                    Err(e) if signal.aborted() && release_found_nothing(&e) => {
                        debug!("Release after a lost lock found nothing to delete, as expected: {e:?}");
                    }
                    Err(e) => return Err(e),
                }
                Ok(value)
            }
            Err(panic) => {
                if let Err(e) = released {
                    warn!("Suppressing a release failure while propagating the routine's panic: {e:?}");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}

/// Whether a failed trailing release only ever saw script-level refusals,
/// i.e. every server answered and simply had nothing stored under this token
/// any more. A transport failure in any attempt means real news: connectivity
/// broke during the release itself, not just an already-lost lock.
fn release_found_nothing(error: &Report<LockErr>) -> bool {
    match error.current_context() {
        LockErr::Execution { attempts } => attempts
            .iter()
            .all(|attempt| attempt.votes_against.values().all(|e| !e.is_transport())),
        LockErr::InvalidArgument => false,
    }
}

/// The scoped helper's renewal task: sleep until the remaining validity hits
/// the threshold (immediately, if it already has), extend by the original
/// ttl, reschedule against the new expiration. Stops on the helper's say-so
/// or on the first failed extend.
async fn extend_until_stopped(
    lock: Lock,
    ttl: Duration,
    threshold: Duration,
    signal: LockSignal,
    mut stop: tokio::sync::watch::Receiver<bool>,
) {
    loop {
        let fire_at = lock
            .expiration()
            .checked_sub(threshold)
            .unwrap_or_else(Instant::now);
        tokio::select! {
            _ = stop.changed() => return,
            _ = tokio::time::sleep_until(fire_at.into()) => {
                if let Err(e) = lock.extend(ttl).await {
                    signal.abort_with(e);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::quorum::{LockAttempt, NodeErr};

    fn execution_err(node_err: NodeErr) -> Report<LockErr> {
        let mut votes_against = HashMap::new();
        votes_against.insert("redis://localhost:1".to_string(), node_err);
        err!(LockErr::Execution {
            attempts: vec![LockAttempt {
                membership_size: 1,
                quorum_size: 1,
                votes_for: vec![],
                votes_against,
            }],
        })
    }

    #[test]
    fn test_release_suppression_gating() {
        // Servers answered but held nothing under the token any more, the
        // expected shape after a lost lock:
        assert!(release_found_nothing(&execution_err(NodeErr::Conflicted)));
        // A server that couldn't be reached during the release is a real
        // problem and must not be swallowed:
        assert!(!release_found_nothing(&execution_err(NodeErr::Transport(
            "connection refused".to_string()
        ))));
        assert!(!release_found_nothing(&err!(LockErr::InvalidArgument)));
    }

    #[tokio::test]
    async fn test_signal_abort_wakes_waiters() {
        let signal = LockSignal::new();
        assert!(!signal.aborted());

        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        signal.abort_with(err!(LockErr::InvalidArgument));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        assert!(signal.aborted());
        assert!(signal.take_error().is_some());
        // The report moves out on first take:
        assert!(signal.take_error().is_none());
    }

    #[tokio::test]
    async fn test_signal_cancelled_resolves_when_already_aborted() {
        let signal = LockSignal::new();
        signal.abort_with(err!(LockErr::InvalidArgument));
        tokio::time::timeout(Duration::from_millis(100), signal.cancelled())
            .await
            .unwrap();
    }
}
