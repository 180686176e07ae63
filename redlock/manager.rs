use std::{
    collections::HashSet,
    sync::{Arc, LazyLock},
    time::{Duration, Instant},
};

use futures::future::join_all;
use rand::{thread_rng, Rng};

use crate::{
    lock::Lock,
    node::RedisNode,
    prelude::*,
    quorum::{self, LockAttempt},
    script::RedisScript,
    settings::LockSettings,
};

static ACQUIRE_SCRIPT: LazyLock<RedisScript> =
    LazyLock::new(|| RedisScript::new(include_str!("lua_scripts/acquire.lua")));
static EXTEND_SCRIPT: LazyLock<RedisScript> =
    LazyLock::new(|| RedisScript::new(include_str!("lua_scripts/extend.lua")));
static RELEASE_SCRIPT: LazyLock<RedisScript> =
    LazyLock::new(|| RedisScript::new(include_str!("lua_scripts/release.lua")));

/// The entrypoint: a fixed set of independent server endpoints plus default
/// [`LockSettings`].
///
/// Mutual exclusion comes from a majority vote across the servers, so no
/// single server is a point of failure once `N >= 3`. Cheap to clone, all
/// clones share the same pools and settings.
#[derive(Clone, Debug)]
pub struct LockManager {
    inner: Arc<ManagerInner>,
}

#[derive(Debug)]
struct ManagerInner {
    nodes: Vec<RedisNode>,
    settings: LockSettings,
}

impl LockManager {
    /// Create a manager over the given server URLs (like
    /// `redis://127.0.0.1:6379`) with default settings.
    ///
    /// The servers must be independent masters, not replicas of each other.
    /// For clustered servers it is the caller's responsibility that all keys
    /// of one lock hash to the same slot.
    pub fn new<S: AsRef<str>>(servers: impl IntoIterator<Item = S>) -> RResult<Self, LockErr> {
        Self::with_settings(servers, LockSettings::default())
    }

    /// Create a manager with explicit default settings.
    pub fn with_settings<S: AsRef<str>>(
        servers: impl IntoIterator<Item = S>,
        settings: LockSettings,
    ) -> RResult<Self, LockErr> {
        let nodes = servers
            .into_iter()
            .map(|server| RedisNode::new(server.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if nodes.is_empty() {
            return Err(err!(
                LockErr::InvalidArgument,
                "At least one server must be configured."
            ));
        }
        Ok(Self {
            inner: Arc::new(ManagerInner { nodes, settings }),
        })
    }

    /// Number of configured servers.
    pub fn membership(&self) -> usize {
        self.inner.nodes.len()
    }

    /// Votes needed for any operation to succeed: `membership / 2 + 1`.
    pub fn quorum(&self) -> usize {
        quorum::quorum_size(self.inner.nodes.len())
    }

    /// The manager's default settings.
    pub fn settings(&self) -> &LockSettings {
        &self.inner.settings
    }

    pub(crate) fn nodes(&self) -> &[RedisNode] {
        &self.inner.nodes
    }

    /// True if a quorum of servers currently answers PING, i.e. locking can
    /// be expected to work.
    pub async fn ping(&self) -> bool {
        let ups = join_all(self.inner.nodes.iter().map(|node| node.ping())).await;
        ups.into_iter().filter(|up| *up).count() >= self.quorum()
    }

    /// Take a lock over the given resources, held for `ttl` unless extended
    /// or released earlier.
    ///
    /// Each attempt generates a fresh random token and asks every server to
    /// set it under every key atomically. The attempt succeeds when a quorum
    /// accepted and `ttl - elapsed - drift` still leaves a positive validity
    /// window. A failed attempt is rolled back best-effort on all servers
    /// and retried with jitter, up to the configured budget.
    pub async fn acquire<R: AsRef<str>>(
        &self,
        resources: &[R],
        ttl: Duration,
    ) -> RResult<Lock, LockErr> {
        self.acquire_with(resources, ttl, self.inner.settings.clone())
            .await
    }

    /// [`Self::acquire`] with per-call settings. The returned handle
    /// remembers them for its own extends and releases.
    pub async fn acquire_with<R: AsRef<str>>(
        &self,
        resources: &[R],
        ttl: Duration,
        settings: LockSettings,
    ) -> RResult<Lock, LockErr> {
        let resources = normalize_resources(resources)?;
        let ttl_ms = check_ttl(ttl)?;

        let mut attempts: Vec<LockAttempt> = vec![];
        loop {
            let value = quorum::unique_lock_value();
            let args = [value.clone(), ttl_ms.to_string().into_bytes()];

            let start = Instant::now();
            let attempt =
                quorum::script_round(self.nodes(), &ACQUIRE_SCRIPT, &resources, &args).await;

            match expiration_for(start, ttl, settings.drift_factor, &attempt) {
                Some(expiration) => {
                    attempts.push(attempt);
                    return Ok(Lock::new(
                        self.clone(),
                        resources,
                        value,
                        expiration,
                        attempts,
                        settings,
                    ));
                }
                None => {
                    // A server may have accepted while its acknowledgement got
                    // lost, so undo on every server, not just the voters.
                    let rollback =
                        quorum::script_round(self.nodes(), &RELEASE_SCRIPT, &resources, &args[..1])
                            .await;
                    if !rollback.quorum_met() {
                        debug!(
                            "Rollback after a failed acquire attempt was not confirmed by a quorum, the ttl will clean up any leftovers."
                        );
                    }
                    attempts.push(attempt);
                }
            }

            if attempts.len() > settings.retry_count as usize {
                return Err(err!(
                    LockErr::Execution { attempts },
                    "Could not acquire the lock, attempt budget exhausted."
                ));
            }
            retry_pause(&settings).await;
        }
    }

    /// The extend half of the quorum engine, driven through
    /// [`Lock::extend`].
    ///
    /// Same accounting as acquire, with elapsed time measured from each
    /// attempt's own dispatch. An attempt only counts when the recomputed
    /// expiration lands strictly after `current_expiration`: an extension
    /// that cannot move the deadline forward means the lock can no longer be
    /// trusted. No rollback is issued on failure, the prior state stands
    /// server-side.
    pub(crate) async fn extend_lock(
        &self,
        resources: &[String],
        value: &[u8],
        ttl: Duration,
        current_expiration: Instant,
        settings: &LockSettings,
    ) -> RResult<Instant, LockErr> {
        let ttl_ms = check_ttl(ttl)?;
        let args = [value.to_vec(), ttl_ms.to_string().into_bytes()];

        let mut attempts: Vec<LockAttempt> = vec![];
        loop {
            let start = Instant::now();
            let attempt =
                quorum::script_round(self.nodes(), &EXTEND_SCRIPT, resources, &args).await;
            match expiration_for(start, ttl, settings.drift_factor, &attempt) {
                Some(expiration) if expiration > current_expiration => return Ok(expiration),
                _ => attempts.push(attempt),
            }

            if attempts.len() > settings.retry_count as usize {
                return Err(err!(
                    LockErr::Execution { attempts },
                    "Could not extend the lock, attempt budget exhausted."
                ));
            }
            retry_pause(settings).await;
        }
    }

    /// The release half of the quorum engine, driven through
    /// [`Lock::release`].
    ///
    /// A server votes for the release when it deleted at least one of the
    /// keys under this token. Exhaustion is surfaced as a diagnostic like
    /// any other operation, but an unconfirmed release is not dangerous:
    /// whatever was left behind expires with its ttl.
    pub(crate) async fn release_lock(
        &self,
        resources: &[String],
        value: &[u8],
        settings: &LockSettings,
    ) -> RResult<(), LockErr> {
        let args = [value.to_vec()];

        let mut attempts: Vec<LockAttempt> = vec![];
        loop {
            let attempt =
                quorum::script_round(self.nodes(), &RELEASE_SCRIPT, resources, &args).await;
            if attempt.quorum_met() {
                return Ok(());
            }
            attempts.push(attempt);

            if attempts.len() > settings.retry_count as usize {
                return Err(err!(
                    LockErr::Execution { attempts },
                    "Could not confirm the release on a quorum of servers, the ttl will expire the lock regardless."
                ));
            }
            retry_pause(settings).await;
        }
    }
}

/// Expiration of a successful round: `start + ttl - elapsed - drift`.
/// None when quorum failed or that window has already gone.
fn expiration_for(
    start: Instant,
    ttl: Duration,
    drift_factor: f32,
    attempt: &LockAttempt,
) -> Option<Instant> {
    if !attempt.quorum_met() {
        return None;
    }
    let budget = start.elapsed() + quorum::drift(ttl, drift_factor);
    let validity = ttl.checked_sub(budget)?;
    if validity.is_zero() {
        return None;
    }
    Some(start + validity)
}

/// Keys must be non-empty and the set must not be empty. Duplicates are
/// collapsed keeping first-seen order.
pub(crate) fn normalize_resources<R: AsRef<str>>(resources: &[R]) -> RResult<Vec<String>, LockErr> {
    if resources.is_empty() {
        return Err(err!(
            LockErr::InvalidArgument,
            "At least one resource key is required."
        ));
    }
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(resources.len());
    for resource in resources {
        let resource = resource.as_ref();
        if resource.is_empty() {
            return Err(err!(
                LockErr::InvalidArgument,
                "Resource keys must be non-empty."
            ));
        }
        if seen.insert(resource.to_string()) {
            out.push(resource.to_string());
        }
    }
    Ok(out)
}

/// Server ttls are whole milliseconds, anything else is a caller bug caught
/// before any I/O.
pub(crate) fn check_ttl(ttl: Duration) -> RResult<u64, LockErr> {
    if ttl.is_zero() || ttl.subsec_nanos() % 1_000_000 != 0 {
        return Err(err!(
            LockErr::InvalidArgument,
            "Lock ttls must be a positive whole number of milliseconds, got {:?}.",
            ttl
        ));
    }
    Ok(ttl.as_millis() as u64)
}

async fn retry_pause(settings: &LockSettings) {
    let jitter_budget = settings.retry_jitter.as_millis() as u64;
    let jitter = if jitter_budget == 0 {
        0
    } else {
        thread_rng().gen_range(0..jitter_budget)
    };
    tokio::time::sleep(settings.retry_delay + Duration::from_millis(jitter)).await;
}
