//! Waiting for started roles to become ready.

use perfnet_remote::RemoteGateway;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::config::{SettleConfig, SettleMode};

/// How waiting for a role ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The role is listening on its port.
    Listening,
    /// The fixed delay elapsed.
    Delayed,
    /// The probe did not succeed in time.
    ProbeTimedOut,
}

/// Shell command succeeding once a TCP socket listens on the given port.
pub fn probe_command(port: u16) -> String {
    format!(
        "ss -Hltn 'sport = :{port}' 2>/dev/null | grep -q . || \
         netstat -ltn 2>/dev/null | grep -q '[:.]{port} '"
    )
}

/// Wait until a role started on the gateway's host is ready.
///
/// With a known listening port the port is probed, otherwise the fixed delay is used.
/// Never waits past the deadline.
pub async fn wait_ready(
    gateway: &dyn RemoteGateway,
    port: Option<u16>,
    config: &SettleConfig,
    deadline: Instant,
) -> Readiness {
    let port = match (config.mode, port) {
        (SettleMode::Probe, Some(port)) => port,
        _ => {
            time::sleep_until(deadline.min(Instant::now() + config.delay)).await;
            return Readiness::Delayed;
        }
    };
    let command = probe_command(port);
    let probe_deadline = deadline.min(Instant::now() + config.probe_timeout);
    loop {
        match gateway.execute(&command, probe_deadline).await {
            Ok(output) if output.success() => {
                debug!(port, "port is listening");
                return Readiness::Listening;
            }
            Ok(_) => {}
            Err(error) => debug!(port, "readiness probe failed: {error}"),
        }
        let next = Instant::now() + config.probe_interval;
        if next >= probe_deadline {
            warn!(port, "port is not listening, proceeding anyway");
            return Readiness::ProbeTimedOut;
        }
        time::sleep_until(next).await;
    }
}
