//! Connection settings of a host.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// SSH connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SshConfig {
    /// Management address of the host.
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default, alias = "key_path")]
    pub key_path: Option<PathBuf>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(
        default = "default_connect_timeout",
        alias = "connect_timeout",
        with = "humantime_serde"
    )]
    pub connect_timeout: Duration,
}

impl SshConfig {
    /// Configuration with default port and timeout.
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            user: user.into(),
            key_path: None,
            password: None,
            connect_timeout: default_connect_timeout(),
        }
    }

    /// Address in `host:port` form.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether any authentication method is configured.
    pub fn has_auth_method(&self) -> bool {
        self.key_path.is_some() || self.password.as_ref().is_some_and(|pw| !pw.is_empty())
    }
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}
