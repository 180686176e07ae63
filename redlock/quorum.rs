use std::{collections::HashMap, time::Duration};

use futures::future::join_all;
use rand::{thread_rng, RngCore};

use crate::{node::RedisNode, script::RedisScript};

/// Why a single server voted against an operation.
///
/// These are collected into [`LockAttempt`]s, never raised on their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeErr {
    /// The script ran but refused: a key is already held under another
    /// token, or nothing was left for this token to extend or release.
    Conflicted,
    /// The server could not be reached or errored below the script level.
    /// Carries the underlying client error text verbatim.
    Transport(String),
}

impl NodeErr {
    /// True for transport-level failures, false for script-level refusals.
    pub fn is_transport(&self) -> bool {
        matches!(self, NodeErr::Transport(_))
    }
}

impl std::fmt::Display for NodeErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeErr::Conflicted => write!(f, "Conflicted"),
            NodeErr::Transport(e) => write!(f, "Transport: {e}"),
        }
    }
}

/// One full fan-out-and-tally cycle across all servers.
#[derive(Debug, Clone)]
pub struct LockAttempt {
    /// Number of configured servers at dispatch time.
    pub membership_size: usize,
    /// Votes needed for the attempt to count: `membership_size / 2 + 1`.
    pub quorum_size: usize,
    /// Addresses of the servers that accepted the operation.
    pub votes_for: Vec<String>,
    /// Failure per address for the servers that did not.
    pub votes_against: HashMap<String, NodeErr>,
}

impl LockAttempt {
    /// Whether enough servers voted for the operation.
    pub fn quorum_met(&self) -> bool {
        self.votes_for.len() >= self.quorum_size
    }
}

// Quorum is defined to be N/2+1, with N being the number of configured servers.
pub(crate) fn quorum_size(membership_size: usize) -> usize {
    membership_size / 2 + 1
}

/// Clock drift allowance for one acquisition window: the ttl scaled by the
/// drift factor, rounded down, plus 2ms for redis' own expiry precision.
pub(crate) fn drift(ttl: Duration, drift_factor: f32) -> Duration {
    Duration::from_millis((ttl.as_millis() as f32 * drift_factor) as u64 + 2)
}

/// Get 20 random bytes from the pseudorandom interface, the token stored
/// under every key of one lock.
pub(crate) fn unique_lock_value() -> Vec<u8> {
    let mut buf = [0u8; 20];
    thread_rng().fill_bytes(&mut buf);
    buf.to_vec()
}

/// Dispatch one script invocation to every node concurrently and tally the
/// votes.
///
/// Always waits for all responses, stragglers included: the caller's
/// elapsed-time accounting has to cover the slowest server or validity would
/// be over-estimated.
pub(crate) async fn script_round(
    nodes: &[RedisNode],
    script: &RedisScript,
    keys: &[String],
    args: &[Vec<u8>],
) -> LockAttempt {
    let replies = join_all(nodes.iter().map(|node| async move {
        let mut invoker = script.invoker();
        for key in keys {
            invoker = invoker.key(key.as_str());
        }
        for arg in args {
            invoker = invoker.arg(arg.as_slice());
        }
        (node.address(), node.eval_vote(&invoker).await)
    }))
    .await;

    let mut votes_for = vec![];
    let mut votes_against = HashMap::new();
    for (address, reply) in replies {
        match reply {
            Ok(accepted) if accepted > 0 => votes_for.push(address.to_string()),
            Ok(_) => {
                votes_against.insert(address.to_string(), NodeErr::Conflicted);
            }
            Err(e) => {
                votes_against.insert(address.to_string(), e);
            }
        }
    }
    LockAttempt {
        membership_size: nodes.len(),
        quorum_size: quorum_size(nodes.len()),
        votes_for,
        votes_against,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_size() {
        for (n, q) in [(1, 1), (2, 2), (3, 2), (4, 3), (5, 3), (7, 4)] {
            assert_eq!(quorum_size(n), q);
        }
    }

    #[test]
    fn test_drift_budget() {
        assert_eq!(drift(Duration::from_millis(1_000), 0.01), Duration::from_millis(12));
        assert_eq!(drift(Duration::from_millis(500), 0.01), Duration::from_millis(7));
        // Sub-millisecond scale rounds down to just the fixed allowance:
        assert_eq!(drift(Duration::from_millis(50), 0.01), Duration::from_millis(2));
    }

    #[test]
    fn test_unique_lock_values() {
        let id1 = unique_lock_value();
        let id2 = unique_lock_value();
        assert_eq!(id1.len(), 20);
        assert_eq!(id2.len(), 20);
        assert_ne!(id1, id2);
    }
}
