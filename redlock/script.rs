use redis::{Cmd, ToRedisArgs};

/// Similar to [`redis::Script`], but keeps the digest accessible so callers
/// can dispatch over the `EVALSHA` fast path and reload the source on a
/// server that doesn't have it cached.
///
/// The digest is the script's stable identity: changing the source changes
/// the digest, which servers treat as a brand new script.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RedisScript {
    pub(crate) hash: String,
    code: String,
}

impl RedisScript {
    /// Create a new script from its Lua source. This object should be reused.
    pub fn new(code: &str) -> Self {
        let mut hash = sha1_smol::Sha1::new();
        hash.update(code.as_bytes());
        Self {
            hash: hash.digest().to_string(),
            code: code.to_string(),
        }
    }

    /// The hex sha1 digest of the source, as used by `EVALSHA`.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Get an invoker that keys/args can be added to before dispatch.
    pub fn invoker(&self) -> RedisScriptInvoker<'_> {
        RedisScriptInvoker {
            script: self,
            keys: vec![],
            args: vec![],
        }
    }

    /// The `SCRIPT LOAD` command that caches this script on a server.
    pub(crate) fn load_cmd(&self) -> Cmd {
        let mut cmd = redis::cmd("SCRIPT");
        cmd.arg("LOAD").arg(self.code.as_bytes());
        cmd
    }
}

/// Builds up the keys and args for one invocation of a [`RedisScript`].
pub struct RedisScriptInvoker<'a> {
    pub(crate) script: &'a RedisScript,
    keys: Vec<Vec<u8>>,
    args: Vec<Vec<u8>>,
}

impl<'a> RedisScriptInvoker<'a> {
    /// Add a key to the invocation.
    pub fn key(mut self, key: impl ToRedisArgs) -> Self {
        self.keys.extend(key.to_redis_args());
        self
    }

    /// Add a normal arg to the invocation.
    pub fn arg(mut self, arg: impl ToRedisArgs) -> Self {
        self.args.extend(arg.to_redis_args());
        self
    }

    /// The `EVALSHA` command for this invocation.
    pub(crate) fn eval_cmd(&self) -> Cmd {
        let mut cmd = redis::cmd("EVALSHA");
        cmd.arg(self.script.hash.as_str()).arg(self.keys.len());
        for key in &self.keys {
            cmd.arg(key.as_slice());
        }
        for arg in &self.args {
            cmd.arg(arg.as_slice());
        }
        cmd
    }
}
