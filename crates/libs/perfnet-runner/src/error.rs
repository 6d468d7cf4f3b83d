//! Error types of runners and the registry.

use perfnet_params::Role;
use thiserror::Error;

/// Invalid configuration for a runner.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("runner `{runner}` does not support the {role} role")]
    UnsupportedRole { runner: &'static str, role: Role },
    #[error("`target-host` or `host` is required for the {role} role")]
    MissingTarget { role: Role },
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParam { name: &'static str, reason: String },
}

impl ValidationError {
    pub(crate) fn invalid_param(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            name,
            reason: reason.into(),
        }
    }
}

/// Runner lookup failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("runner `{name}` not found, available runners: {}", available.join(", "))]
    NotFound {
        name: String,
        available: Vec<&'static str>,
    },
}

/// Failure to extract metrics from captured output.
///
/// Never fatal for a test. Metrics that could be extracted are kept.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("malformed JSON report")]
    Json(#[from] serde_json::Error),
    #[error("malformed result table: {0}")]
    Table(String),
}
