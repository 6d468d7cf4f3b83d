//! Outcome of a single role execution.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Metric name to value.
pub type Metrics = BTreeMap<String, MetricValue>;

/// Value of an extracted metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetricValue {
    /// Numeric value as float, if the metric is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Result of executing a role's command.
///
/// Populated once when the command completes or fails. Metrics are filled in by the
/// runner afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleResult {
    pub success: bool,
    /// Combined standard output and error of the command.
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Exit code of the command, `-1` if there is none.
    pub exit_code: i32,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: Metrics,
}

impl RoleResult {
    /// Result of a command that ran to completion.
    pub fn completed(output: String, exit_code: i32, duration: Duration) -> Self {
        let success = exit_code == 0;
        Self {
            success,
            output,
            error: (!success).then(|| format!("command exited with code {exit_code}")),
            exit_code,
            duration,
            metrics: Metrics::new(),
        }
    }

    /// Result of a command that could not be run to completion.
    pub fn failed(error: String, output: String, duration: Duration) -> Self {
        Self {
            success: false,
            output,
            error: Some(error),
            exit_code: -1,
            duration,
            metrics: Metrics::new(),
        }
    }

    /// Numeric value of the given metric.
    pub fn metric_f64(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).and_then(MetricValue::as_f64)
    }

    /// Record a metric unless it has already been recorded.
    pub fn record(&mut self, name: impl Into<String>, value: impl Into<MetricValue>) {
        self.metrics.entry(name.into()).or_insert_with(|| value.into());
    }
}
