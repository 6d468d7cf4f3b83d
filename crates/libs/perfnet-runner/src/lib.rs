//! Pluggable strategies for building benchmark commands and parsing their output.
//!
//! A [`Runner`] knows how to drive a single benchmark tool. Runners are created by name
//! through a [`RunnerRegistry`].

use std::fmt;

use perfnet_params::{EffectiveConfig, Role};

pub mod command;
pub mod error;
pub mod ib_send_bw;
pub mod iperf3;
pub mod rates;
pub mod registry;
pub mod result;
pub mod testpmd;

pub use error::{MetricsError, RegistryError, ValidationError};
pub use registry::RunnerRegistry;
pub use result::{MetricValue, Metrics, RoleResult};

/// Strategy for a single benchmark tool.
pub trait Runner: fmt::Debug + Send + Sync {
    /// Registered name of the runner.
    fn name(&self) -> &'static str;

    /// Whether the runner can play the given role.
    fn supports_role(&self, role: Role) -> bool;

    /// Check that the configuration can be turned into a command.
    fn validate(&self, config: &EffectiveConfig) -> Result<(), ValidationError>;

    /// Build the shell command for the configured role.
    ///
    /// The same configuration always yields the same command.
    fn build_command(&self, config: &EffectiveConfig) -> String;

    /// Extract metrics from the captured output into the result.
    ///
    /// Metrics found before an error occurred are kept.
    fn parse_metrics(&self, result: &mut RoleResult) -> Result<(), MetricsError>;

    /// Executable that must be present on the host playing the given role.
    fn executable(&self, role: Role) -> &str;

    /// Port the given role listens on once it is ready to accept connections.
    fn listen_port(&self, config: &EffectiveConfig) -> Option<u16> {
        let _ = config;
        None
    }
}

/// Checks shared by all runners.
///
/// The role must be supported and roles connecting downstream need a target.
pub fn validate_common(
    runner: &dyn Runner,
    config: &EffectiveConfig,
) -> Result<(), ValidationError> {
    if !runner.supports_role(config.role) {
        return Err(ValidationError::UnsupportedRole {
            runner: runner.name(),
            role: config.role,
        });
    }
    if config.role.needs_target() && config.target().is_none() {
        return Err(ValidationError::MissingTarget { role: config.role });
    }
    Ok(())
}
