//! Error types of the coordinator.

use std::error::Error;
use std::fmt::Write;
use std::io;
use std::path::PathBuf;

use perfnet_remote::GatewayError;
use perfnet_runner::{RegistryError, ValidationError};
use thiserror::Error;

use crate::topology::RoleSlot;

/// Result type for configuration handling.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Invalid or unreadable configuration. Fatal for the whole run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read configuration file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to parse configuration")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("invalid topology of test `{test}`: {reason}")]
    Topology { test: String, reason: &'static str },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// Failure to open connections to the configured hosts.
#[derive(Debug, Error)]
#[error("unable to connect to {}", describe_hosts(failures))]
pub struct ConnectError {
    pub failures: Vec<(String, GatewayError)>,
}

fn describe_hosts(failures: &[(String, GatewayError)]) -> String {
    failures
        .iter()
        .map(|(host, error)| format!("host `{host}` ({})", error_chain(error)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure preventing a scenario from being executed.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("host `{0}` is not configured")]
    UnknownHost(String),
    #[error("host `{0}` is not connected")]
    NotConnected(String),
    #[error("no runner available for the {0} role")]
    MissingRunner(RoleSlot),
    #[error("invalid configuration for the {slot} role")]
    Validation {
        slot: RoleSlot,
        #[source]
        source: ValidationError,
    },
    #[error("executable `{executable}` not found or not executable on {slot} host `{host}`")]
    MissingExecutable {
        slot: RoleSlot,
        host: String,
        executable: String,
    },
    #[error("unable to check executable `{executable}` on host `{host}`")]
    ExecutableCheck {
        host: String,
        executable: String,
        #[source]
        source: GatewayError,
    },
}

/// Render an error with all its sources.
pub fn error_chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = write!(message, ": {cause}");
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use perfnet_params::Role;

    use super::*;

    #[test]
    fn test_error_chain() {
        let error = ScenarioError::Validation {
            slot: RoleSlot::Client,
            source: ValidationError::MissingTarget { role: Role::Client },
        };
        assert_eq!(
            error_chain(&error),
            "invalid configuration for the client role: \
             `target-host` or `host` is required for the client role"
        );
    }

    #[test]
    fn test_connect_error() {
        let error = ConnectError {
            failures: vec![("b".to_owned(), GatewayError::NotConnected)],
        };
        assert_eq!(
            error.to_string(),
            "unable to connect to host `b` (SSH session is not connected)"
        );
    }
}
