//! Execution of shell commands on remote hosts.
//!
//! The [`RemoteGateway`] trait abstracts over a connection to a single host. The SSH
//! implementation lives in [`ssh`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

pub mod config;
pub mod error;
pub mod ssh;

pub use config::SshConfig;
pub use error::GatewayError;
pub use ssh::{SshConnector, SshGateway};

/// Output of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output and error interleaved in arrival order.
    pub output: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Connection to a single remote host.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Establish the connection unless it is already established.
    async fn connect(&self, deadline: Instant) -> Result<(), GatewayError>;

    /// Run a shell command and wait for it to exit.
    ///
    /// A non-zero exit code is not an error. If the deadline expires first, the remote
    /// command is terminated and [`GatewayError::TimedOut`] is returned. Dropping the
    /// returned future terminates the remote command as well.
    async fn execute(&self, command: &str, deadline: Instant)
        -> Result<CommandOutput, GatewayError>;

    /// Close the connection. Closing a closed connection does nothing.
    async fn close(&self) -> Result<(), GatewayError>;
}

/// Factory opening gateways to configured hosts.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        host_id: &str,
        config: &SshConfig,
        deadline: Instant,
    ) -> Result<Arc<dyn RemoteGateway>, GatewayError>;
}
