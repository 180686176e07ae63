#![allow(clippy::module_inception)]
#![allow(clippy::type_complexity)]
#![warn(clippy::disallowed_types)]
#![warn(missing_docs)]

//! redlock - Client-side distributed locks over a set of independent redis servers.
//!
//! Mutual exclusion comes from a majority vote: a lock is held once a quorum
//! (`N/2 + 1`) of the configured servers stored this holder's random token
//! under every requested key, and only for the validity window left after
//! subtracting network time and a clock drift allowance from the ttl.
//! Failed attempts are rolled back and retried with jitter. The scoped
//! [`LockManager::using`] helper additionally keeps a lock alive in the
//! background while a user routine runs, telling the routine through a
//! [`LockSignal`] if the lock could not be kept.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use redlock::{LockErr, LockManager};
//!
//! # async fn demo() -> error_stack::Result<(), LockErr> {
//! let manager = LockManager::new([
//!     "redis://127.0.0.1:6380",
//!     "redis://127.0.0.1:6381",
//!     "redis://127.0.0.1:6382",
//! ])?;
//!
//! // Explicit handle management:
//! let lock = manager
//!     .acquire(&["orders:1234"], Duration::from_secs(30))
//!     .await?;
//! // ... critical section ...
//! lock.release().await?;
//!
//! // Or scoped, auto-extending for as long as the routine runs:
//! manager
//!     .using(&["orders:1234"], Duration::from_secs(5), |signal| async move {
//!         while !signal.aborted() {
//!             // ... make progress ...
//!             # break;
//!         }
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

// When docs auto created for docs.rs, will include features, given docs.rs uses nightly by default:
#![cfg_attr(all(doc, CHANNEL_NIGHTLY), feature(doc_auto_cfg))]

mod prelude;

/// Error handling utilities.
pub mod errors;
mod lock;
mod manager;
mod node;
mod quorum;
mod script;
mod settings;
mod standalone;
mod using;

pub use errors::LockErr;
pub use lock::Lock;
pub use manager::LockManager;
pub use quorum::{LockAttempt, NodeErr};
pub use script::{RedisScript, RedisScriptInvoker};
pub use settings::LockSettings;
pub use standalone::RedisStandalone;
pub use using::LockSignal;
// Re-exporting redis and deadpool_redis to be used outside if needed:
pub use deadpool_redis;
pub use redis;

#[cfg(test)]
mod testing;
