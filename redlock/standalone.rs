use std::time::{Duration, Instant};

use crate::{node::RedisNode, prelude::*};

/// Standalone redis server process running on a unique free port.
/// Useful for testing.
pub struct RedisStandalone {
    /// The port the redis server is running on.
    pub port: u16,
    child: std::process::Child,
}

impl RedisStandalone {
    /// Find an unused port to run the standalone redis server on.
    pub fn find_unused_port() -> RResult<u16, AnyErr> {
        portpicker::pick_unused_port()
            .ok_or_else(|| anyerr!("Could not find a free port to run RedisStandalone on."))
    }

    /// Start a standalone redis server process with the given port and extra
    /// arguments. This process will be killed on drop.
    pub async fn new_with_opts(port: u16, extra_args: Option<&[&str]>) -> RResult<Self, AnyErr> {
        let mut cmd = std::process::Command::new("redis-server");
        cmd.arg("--port").arg(port.to_string());
        if let Some(extra_args) = extra_args {
            for arg in extra_args {
                cmd.arg(arg);
            }
        }
        let child = cmd.spawn().change_context(AnyErr)?;

        // Wait for redis to come up, raising if waited for 10 seconds.
        let node =
            RedisNode::new(&format!("redis://localhost:{port}")).change_context(AnyErr)?;
        let started = Instant::now();
        let mut up = false;
        while !up && started.elapsed() < Duration::from_secs(10) {
            up = node.ping().await;
            if !up {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
        if up {
            Ok(Self { port, child })
        } else {
            Err(anyerr!("RedisStandalone process not ready in 10 seconds."))
        }
    }

    /// Start a standalone redis server process on an unused port.
    /// This process will be killed on drop.
    pub async fn new() -> RResult<Self, AnyErr> {
        RedisStandalone::new_with_opts(Self::find_unused_port()?, None).await
    }

    /// Start a standalone redis server process on an unused port.
    /// This process will be killed on drop.
    ///
    /// Default config contains persistence, which gets in the way during
    /// testing, this turns both aof and rdb file saving off.
    pub async fn new_no_persistence() -> RResult<Self, AnyErr> {
        RedisStandalone::new_with_opts(
            Self::find_unused_port()?,
            Some(&["--appendonly", "no", "--save", "\"\""]),
        )
        .await
    }

    /// Get the connection string needed to connect as a client to this
    /// locally running redis instance.
    pub fn client_conn_str(&self) -> String {
        format!("redis://localhost:{}", self.port)
    }

    /// Kill the server, will be automatically called when dropped.
    pub fn kill(mut self) {
        self.kill_inner()
    }

    fn kill_inner(&mut self) {
        if let Err(e) = self.child.kill() {
            warn!("Could not kill the standalone redis child process: {e:?}");
        }
    }
}

impl Drop for RedisStandalone {
    fn drop(&mut self) {
        self.kill_inner()
    }
}
