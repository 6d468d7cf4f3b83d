//! Orchestration of network benchmarks across multiple hosts.
//!
//! A [`BenchConfig`] names the hosts and the tests to run between them. The
//! [`Coordinator`] connects to all hosts and runs every test, each of which is executed
//! by an [`Executor`] starting the roles of the test in order.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod settle;
pub mod topology;

pub use config::{BenchConfig, HostConfig, SettleConfig, SettleMode, TestScenario};
pub use coordinator::{Coordinator, RunnerSet};
pub use error::{ConfigError, ConfigResult, ConnectError, ScenarioError};
pub use executor::{Executor, Phase, TestResult};
pub use topology::{RoleSlot, Topology};
