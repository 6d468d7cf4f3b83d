//! Connections to all hosts and execution of all tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use futures::future::join_all;
use perfnet_params::Role;
use perfnet_remote::{Connector, RemoteGateway};
use perfnet_runner::{Runner, RunnerRegistry};
use tokio::time::{self, Instant};
use tracing::{info, warn};

use crate::config::{BenchConfig, TestScenario};
use crate::error::{error_chain, ConfigError, ConfigResult, ConnectError};
use crate::executor::{Executor, TestResult};

/// Runner instance for every role.
#[derive(Debug, Clone)]
pub struct RunnerSet {
    client: Arc<dyn Runner>,
    server: Arc<dyn Runner>,
    intermediate: Option<Arc<dyn Runner>>,
}

impl RunnerSet {
    /// Create the runners named by the configuration.
    ///
    /// The intermediate runner is only created if a test uses intermediates.
    pub fn from_config(config: &BenchConfig, registry: &RunnerRegistry) -> ConfigResult<Self> {
        let create = |role: Role| -> ConfigResult<Arc<dyn Runner>> {
            let name = config.runner_for(role).ok_or_else(|| {
                ConfigError::invalid(format!("no runner configured for the {role} role"))
            })?;
            let runner = registry.create(name, config.binary_path(name))?;
            if !runner.supports_role(role) {
                return Err(ConfigError::invalid(format!(
                    "runner `{name}` does not support the {role} role"
                )));
            }
            Ok(runner)
        };
        Ok(Self {
            client: create(Role::Client)?,
            server: create(Role::Server)?,
            intermediate: if config.needs_intermediate() {
                Some(create(Role::Intermediate)?)
            } else {
                None
            },
        })
    }

    pub fn get(&self, role: Role) -> Option<&Arc<dyn Runner>> {
        match role {
            Role::Client => Some(&self.client),
            Role::Server => Some(&self.server),
            Role::Intermediate => self.intermediate.as_ref(),
        }
    }
}

/// Runs the configured tests over connections to all hosts.
pub struct Coordinator {
    config: BenchConfig,
    runners: RunnerSet,
    connector: Arc<dyn Connector>,
    gateways: BTreeMap<String, Arc<dyn RemoteGateway>>,
}

impl Coordinator {
    /// Prepare the runners of a validated configuration.
    pub fn new(
        config: BenchConfig,
        registry: &RunnerRegistry,
        connector: Arc<dyn Connector>,
    ) -> ConfigResult<Self> {
        let runners = RunnerSet::from_config(&config, registry)?;
        if config.has_mixed_runners() {
            info!(
                client = %runners.client.name(),
                server = %runners.server.name(),
                intermediate = %runners.intermediate.as_ref().map_or("-", |runner| runner.name()),
                "using mixed runners"
            );
        }
        Ok(Self {
            config,
            runners,
            connector,
            gateways: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Whether a connection to the given host is open.
    pub fn is_connected(&self, host: &str) -> bool {
        self.gateways.contains_key(host)
    }

    /// Connect to all configured hosts in parallel.
    ///
    /// If any connection fails, the connections that succeeded are closed again.
    pub async fn connect_all(&mut self) -> Result<(), ConnectError> {
        let connector = self.connector.as_ref();
        let attempts = self.config.hosts.iter().map(|(id, host)| async move {
            info!(host = %id, address = %host.ssh.address(), "connecting");
            let deadline = Instant::now() + host.ssh.connect_timeout;
            (id.clone(), connector.connect(id, &host.ssh, deadline).await)
        });
        let mut failures = Vec::new();
        for (id, attempt) in join_all(attempts).await {
            match attempt {
                Ok(gateway) => {
                    self.gateways.insert(id, gateway);
                }
                Err(error) => {
                    warn!(host = %id, "connection failed: {}", error_chain(&error));
                    failures.push((id, error));
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            self.cleanup().await;
            Err(ConnectError { failures })
        }
    }

    /// Run a single scenario once.
    ///
    /// Scenarios that cannot be started yield a failed result.
    pub async fn run_scenario(&self, scenario: &TestScenario, iteration: u32) -> TestResult {
        let started_at = SystemTime::now();
        let executor = Executor::new(&self.config, &self.runners, &self.gateways);
        match executor.execute(scenario, iteration).await {
            Ok(result) => result,
            Err(error) => {
                warn!(scenario = %scenario.name, "scenario failed: {}", error_chain(&error));
                TestResult::aborted(scenario, iteration, started_at, &error)
            }
        }
    }

    /// Run every test as often as configured, appending the results.
    ///
    /// Results are appended as soon as they are available, so dropping the future keeps
    /// the results of the runs that finished.
    pub async fn run_all(&self, results: &mut Vec<TestResult>) {
        for scenario in &self.config.tests {
            let repetitions = scenario.repetitions();
            for iteration in 1..=repetitions {
                results.push(self.run_scenario(scenario, iteration).await);
                if iteration < repetitions && !scenario.delay.is_zero() {
                    time::sleep(scenario.delay).await;
                }
            }
        }
    }

    /// Close all connections. Failures are logged and otherwise ignored.
    pub async fn cleanup(&mut self) {
        for (id, gateway) in std::mem::take(&mut self.gateways) {
            if let Err(error) = gateway.close().await {
                warn!(host = %id, "unable to close connection: {}", error_chain(&error));
            }
        }
    }
}
