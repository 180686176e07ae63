use deadpool_redis::{Config, Runtime};
use error_stack::ResultExt;

use crate::{errors::LockErr, quorum::NodeErr, script::RedisScriptInvoker};

/// One configured server endpoint: an address plus its own connection pool.
///
/// Nodes are asked to vote independently, a node that cannot be reached
/// simply votes against with the transport error, it never takes the whole
/// operation down.
pub(crate) struct RedisNode {
    address: String,
    pool: deadpool_redis::Pool,
}

impl std::fmt::Debug for RedisNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisNode")
            .field("address", &self.address)
            .finish()
    }
}

impl RedisNode {
    pub(crate) fn new(conn_str: &str) -> error_stack::Result<Self, LockErr> {
        let pool = Config::from_url(conn_str)
            .create_pool(Some(Runtime::Tokio1))
            .change_context(LockErr::InvalidArgument)
            .attach_printable_lazy(|| {
                format!("Could not build a connection pool for '{conn_str}'.")
            })?;
        Ok(Self {
            address: conn_str.to_string(),
            pool,
        })
    }

    pub(crate) fn address(&self) -> &str {
        &self.address
    }

    /// Run the invocation on this node and return the script's integer reply.
    ///
    /// `EVALSHA` is tried first. On a NOSCRIPT reply the source is loaded
    /// and the call re-issued once on this node. Failures below the script
    /// level become a [`NodeErr::Transport`] vote carrying the client error
    /// text verbatim.
    pub(crate) async fn eval_vote(&self, invoker: &RedisScriptInvoker<'_>) -> Result<i64, NodeErr> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| NodeErr::Transport(e.to_string()))?;
        match invoker.eval_cmd().query_async::<i64>(&mut conn).await {
            Ok(reply) => Ok(reply),
            Err(e) if e.kind() == redis::ErrorKind::NoScriptError => {
                tracing::debug!(
                    "Script '{}' not cached on '{}', loading and re-running. Probably a redis restart during this program's execution.",
                    invoker.script.hash,
                    self.address
                );
                invoker
                    .script
                    .load_cmd()
                    .query_async::<redis::Value>(&mut conn)
                    .await
                    .map_err(|e| NodeErr::Transport(e.to_string()))?;
                invoker
                    .eval_cmd()
                    .query_async::<i64>(&mut conn)
                    .await
                    .map_err(|e| NodeErr::Transport(e.to_string()))
            }
            Err(e) => Err(NodeErr::Transport(e.to_string())),
        }
    }

    /// Ping the node, returning true if it's up.
    pub(crate) async fn ping(&self) -> bool {
        match self.pool.get().await {
            Ok(mut conn) => redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .is_ok(),
            Err(_) => false,
        }
    }
}
