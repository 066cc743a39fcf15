use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::engine::ReachabilityProbe;

/// Default wait for a single echo reply.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(1);

/// Reachability probe backed by the system `ping` binary.
///
/// Runs `ping -c 1 -W <timeout> <ip>`; any failure, including a missing
/// binary, counts as unreachable.
#[derive(Debug, Clone)]
pub struct PingProbe {
    program: String,
    timeout: Duration,
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PING_TIMEOUT)
    }
}

impl PingProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "ping".to_string(),
            timeout,
        }
    }

    /// Use a different executable with the same arguments
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self, ip_address: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-c")
            .arg("1")
            .arg("-W")
            .arg(self.timeout.as_secs().max(1).to_string())
            .arg(ip_address)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ReachabilityProbe for PingProbe {
    async fn is_reachable(&self, ip_address: &str) -> bool {
        // Hard cap in case the binary ignores -W.
        let deadline = self.timeout + Duration::from_secs(1);
        let status = tokio::time::timeout(deadline, self.command(ip_address).status()).await;

        let reachable = matches!(status, Ok(Ok(s)) if s.success());
        debug!(ip_address, reachable, "ping finished");
        reachable
    }
}
