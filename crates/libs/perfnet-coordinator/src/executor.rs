//! Execution of a single test scenario.
//!
//! Roles are started from the server towards the client. Every role runs in its own
//! task, waiting for its command on the remote host to exit. Listening roles are given
//! time to become ready before the next role is started. Once the client exited, the
//! server and the intermediates are collected.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use perfnet_params::{merge_layers, EffectiveConfig};
use perfnet_remote::{GatewayError, RemoteGateway};
use perfnet_runner::command::quote;
use perfnet_runner::result::RoleResult;
use perfnet_runner::Runner;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::config::{BenchConfig, TestScenario};
use crate::error::{error_chain, ScenarioError};
use crate::settle::wait_ready;
use crate::topology::{startup_order, RoleSlot, Topology};
use crate::RunnerSet;

/// Error recorded when the scenario exceeds its deadline.
pub const TIMED_OUT: &str = "test timed out";

/// Phase of a scenario execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Idle,
    ServerStarting,
    IntermediateStarting,
    ClientRunning,
    Collecting,
    Completed,
    Failed,
    TimedOut,
}

impl Phase {
    /// Whether the execution may move from this phase to the next one.
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Idle, ServerStarting)
                | (ServerStarting, IntermediateStarting | ClientRunning)
                | (IntermediateStarting, IntermediateStarting | ClientRunning)
                | (ClientRunning, Collecting)
                | (Collecting, Completed | Failed | TimedOut)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

/// Result of a single run of a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub scenario: String,
    pub topology: Topology,
    /// Run of the scenario, starting at one.
    pub iteration: u32,
    pub success: bool,
    #[serde(with = "humantime_serde")]
    pub started_at: SystemTime,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Results of the roles that finished.
    pub results: BTreeMap<RoleSlot, RoleResult>,
    /// Command issued for every role.
    pub commands: BTreeMap<RoleSlot, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub outcome: Phase,
}

impl TestResult {
    fn new(scenario: &TestScenario, topology: Topology, iteration: u32) -> Self {
        Self {
            scenario: scenario.name.clone(),
            topology,
            iteration,
            success: false,
            started_at: SystemTime::now(),
            duration: Duration::ZERO,
            results: BTreeMap::new(),
            commands: BTreeMap::new(),
            error: None,
            outcome: Phase::Idle,
        }
    }

    /// Failed result for a scenario that could not be executed.
    pub fn aborted(
        scenario: &TestScenario,
        iteration: u32,
        started_at: SystemTime,
        error: &ScenarioError,
    ) -> Self {
        Self {
            scenario: scenario.name.clone(),
            topology: Topology::classify(scenario).unwrap_or(Topology::TwoNode),
            iteration,
            success: false,
            started_at,
            duration: started_at.elapsed().unwrap_or_default(),
            results: BTreeMap::new(),
            commands: BTreeMap::new(),
            error: Some(error_chain(error)),
            outcome: Phase::Failed,
        }
    }

    /// Client finished, every finished role succeeded, and nothing else went wrong.
    pub fn aggregate_success(&self) -> bool {
        self.results.contains_key(&RoleSlot::Client)
            && self.results.values().all(|result| result.success)
            && self.error.is_none()
    }

    /// Record an error unless an earlier one has been recorded.
    fn fail(&mut self, error: impl Into<String>) {
        self.error.get_or_insert_with(|| error.into());
    }
}

/// Phase bookkeeping of an execution.
#[derive(Debug)]
struct Progress<'s> {
    scenario: &'s str,
    phase: Phase,
}

impl<'s> Progress<'s> {
    fn new(scenario: &'s str) -> Self {
        Self {
            scenario,
            phase: Phase::Idle,
        }
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "invalid phase transition from {:?} to {next:?}",
            self.phase
        );
        debug!(scenario = %self.scenario, "phase {:?} -> {next:?}", self.phase);
        self.phase = next;
    }
}

/// Role of a scenario, ready to be started.
struct PlannedRole<'s> {
    slot: RoleSlot,
    host: &'s str,
    gateway: Arc<dyn RemoteGateway>,
    runner: Arc<dyn Runner>,
    config: EffectiveConfig,
    command: String,
}

/// What a role task produced.
#[derive(Debug)]
struct RoleOutcome {
    result: RoleResult,
    /// Transport failure preventing the command from completing.
    failure: Option<GatewayError>,
}

/// Task running a role's command. Dropping it aborts the task.
struct RoleTask {
    slot: RoleSlot,
    started: Instant,
    handle: JoinHandle<RoleOutcome>,
}

impl RoleTask {
    fn spawn(role: &PlannedRole<'_>, deadline: Instant) -> Self {
        let slot = role.slot;
        let gateway = role.gateway.clone();
        let runner = role.runner.clone();
        let command = role.command.clone();
        info!(role = %slot, host = %role.host, "starting {}", runner.name());
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            match gateway.execute(&command, deadline).await {
                Ok(output) => {
                    let mut result =
                        RoleResult::completed(output.output, output.exit_code, started.elapsed());
                    if let Err(error) = runner.parse_metrics(&mut result) {
                        warn!(role = %slot, "unable to parse metrics: {}", error_chain(&error));
                    }
                    RoleOutcome {
                        result,
                        failure: None,
                    }
                }
                Err(error) => RoleOutcome {
                    result: RoleResult::failed(
                        error_chain(&error),
                        String::new(),
                        started.elapsed(),
                    ),
                    failure: Some(error),
                },
            }
        });
        Self {
            slot,
            started: Instant::now(),
            handle,
        }
    }

    /// Result of a task stopped at the deadline before reporting back.
    fn timed_out(&self) -> RoleResult {
        RoleResult::failed(TIMED_OUT.to_owned(), String::new(), self.started.elapsed())
    }

    async fn join(&mut self) -> RoleOutcome {
        match (&mut self.handle).await {
            Ok(outcome) => outcome,
            Err(error) => {
                let error = GatewayError::Other(format!("role task failed: {error}"));
                RoleOutcome {
                    result: RoleResult::failed(error.to_string(), String::new(), Duration::ZERO),
                    failure: Some(error),
                }
            }
        }
    }
}

impl Drop for RoleTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Executor of scenarios over established connections.
pub struct Executor<'c> {
    config: &'c BenchConfig,
    runners: &'c RunnerSet,
    gateways: &'c BTreeMap<String, Arc<dyn RemoteGateway>>,
}

impl<'c> Executor<'c> {
    pub fn new(
        config: &'c BenchConfig,
        runners: &'c RunnerSet,
        gateways: &'c BTreeMap<String, Arc<dyn RemoteGateway>>,
    ) -> Self {
        Self {
            config,
            runners,
            gateways,
        }
    }

    /// Run the given scenario once.
    ///
    /// Failures of individual roles are recorded in the returned result. An error is
    /// returned only if the scenario could not be started at all.
    pub async fn execute(
        &self,
        scenario: &TestScenario,
        iteration: u32,
    ) -> Result<TestResult, ScenarioError> {
        let topology = Topology::classify(scenario)?;
        let plan = self.plan(scenario)?;
        let mut result = TestResult::new(scenario, topology, iteration);
        result.commands = plan
            .iter()
            .map(|role| (role.slot, role.command.clone()))
            .collect();
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        for role in &plan {
            verify_executable(role, deadline).await?;
        }
        info!(scenario = %scenario.name, topology = %topology, iteration, "running scenario");
        let mut progress = Progress::new(&scenario.name);
        let Some((client, listeners)) = plan.split_last() else {
            return Err(ScenarioError::MissingRunner(RoleSlot::Client));
        };

        let mut server = None;
        let mut intermediates = Vec::new();
        for role in listeners {
            progress.advance(match role.slot {
                RoleSlot::Server => Phase::ServerStarting,
                _ => Phase::IntermediateStarting,
            });
            let task = RoleTask::spawn(role, deadline);
            match role.slot {
                RoleSlot::Server => server = Some(task),
                _ => intermediates.push(task),
            }
            let port = role.runner.listen_port(&role.config);
            wait_ready(role.gateway.as_ref(), port, &self.config.settle, deadline).await;
        }

        progress.advance(Phase::ClientRunning);
        let mut client_task = RoleTask::spawn(client, deadline);
        let joined = time::timeout_at(deadline, client_task.join()).await;
        match joined {
            Ok(outcome) => {
                match &outcome.failure {
                    Some(GatewayError::TimedOut) => result.fail(TIMED_OUT),
                    Some(error) => {
                        result.fail(format!("client execution failed: {}", error_chain(error)))
                    }
                    None => {}
                }
                result.results.insert(RoleSlot::Client, outcome.result);
            }
            Err(_) => {
                result.fail(TIMED_OUT);
                result.results.insert(RoleSlot::Client, client_task.timed_out());
            }
        }
        drop(client_task);

        progress.advance(Phase::Collecting);
        let client_succeeded = result
            .results
            .get(&RoleSlot::Client)
            .is_some_and(|client| client.success);
        let grace = self.config.settle.intermediate_grace;
        if let Some(mut task) = server {
            // A failed client may never have reached the server.
            let until = if client_succeeded {
                deadline
            } else {
                deadline.min(Instant::now() + grace)
            };
            let joined = time::timeout_at(until, task.join()).await;
            match joined {
                Ok(outcome) => {
                    match &outcome.failure {
                        Some(GatewayError::TimedOut) => result.fail(TIMED_OUT),
                        Some(error) => result
                            .fail(format!("server execution failed: {}", error_chain(error))),
                        None => {}
                    }
                    result.results.insert(RoleSlot::Server, outcome.result);
                }
                Err(_) if client_succeeded => {
                    warn!(scenario = %scenario.name, "server did not exit before the deadline");
                    result.fail(TIMED_OUT);
                    result.results.insert(RoleSlot::Server, task.timed_out());
                }
                Err(_) => warn!(scenario = %scenario.name, "server did not exit, stopping it"),
            }
        }
        // All intermediates share one grace period.
        let until = Instant::now() + grace;
        for mut task in intermediates {
            let joined = time::timeout_at(until, task.join()).await;
            match joined {
                Ok(RoleOutcome {
                    failure: Some(GatewayError::TimedOut),
                    ..
                })
                | Err(_) => {
                    warn!(role = %task.slot, "intermediate did not exit in time, stopping it");
                }
                Ok(outcome) => {
                    if let Some(error) = &outcome.failure {
                        result.fail(format!(
                            "intermediate execution failed: {}",
                            error_chain(error)
                        ));
                    }
                    result.results.insert(task.slot, outcome.result);
                }
            }
        }

        result.success = result.aggregate_success();
        result.duration = started.elapsed();
        result.outcome = if result.success {
            Phase::Completed
        } else if result.error.as_deref() == Some(TIMED_OUT) {
            Phase::TimedOut
        } else {
            Phase::Failed
        };
        progress.advance(result.outcome);
        info!(
            scenario = %scenario.name,
            success = result.success,
            duration = ?result.duration,
            "scenario finished"
        );
        Ok(result)
    }

    /// Resolve hosts, runners, and commands of all roles in startup order.
    fn plan<'s>(&self, scenario: &'s TestScenario) -> Result<Vec<PlannedRole<'s>>, ScenarioError> {
        let hops = startup_order(scenario)?;
        let mut plan = Vec::with_capacity(hops.len());
        for (index, hop) in hops.iter().enumerate() {
            let host = self
                .config
                .hosts
                .get(hop.host)
                .ok_or_else(|| ScenarioError::UnknownHost(hop.host.to_owned()))?;
            let gateway = self
                .gateways
                .get(hop.host)
                .ok_or_else(|| ScenarioError::NotConnected(hop.host.to_owned()))?
                .clone();
            let role = hop.slot.role();
            let runner = self
                .runners
                .get(role)
                .ok_or(ScenarioError::MissingRunner(hop.slot))?
                .clone();
            let mut config =
                merge_layers(host.runner.as_ref(), scenario.config.as_ref()).resolve(role);
            // Every role connects to the hop started right before it.
            if let Some(downstream) = index.checked_sub(1).map(|prev| hops[prev]) {
                let downstream = self
                    .config
                    .hosts
                    .get(downstream.host)
                    .ok_or_else(|| ScenarioError::UnknownHost(downstream.host.to_owned()))?;
                config.host = Some(downstream.ssh.host.clone());
                if config.target_host.as_deref().unwrap_or_default().is_empty() {
                    config.target_host = Some(downstream.target_address().to_owned());
                }
            }
            runner
                .validate(&config)
                .map_err(|source| ScenarioError::Validation {
                    slot: hop.slot,
                    source,
                })?;
            let command = runner.build_command(&config);
            debug!(role = %hop.slot, host = %hop.host, "command: {command}");
            plan.push(PlannedRole {
                slot: hop.slot,
                host: hop.host,
                gateway,
                runner,
                config,
                command,
            });
        }
        Ok(plan)
    }
}

/// Check that the role's executable exists on its host and log its version.
async fn verify_executable(role: &PlannedRole<'_>, deadline: Instant) -> Result<(), ScenarioError> {
    let executable = role.runner.executable(role.slot.role());
    let quoted = quote(executable);
    let check = format!(
        "command -v {quoted} >/dev/null 2>&1 && test -x \"$(command -v {quoted})\""
    );
    let output = role
        .gateway
        .execute(&check, deadline)
        .await
        .map_err(|source| ScenarioError::ExecutableCheck {
            host: role.host.to_owned(),
            executable: executable.to_owned(),
            source,
        })?;
    if !output.success() {
        return Err(ScenarioError::MissingExecutable {
            slot: role.slot,
            host: role.host.to_owned(),
            executable: executable.to_owned(),
        });
    }
    let version = format!("{quoted} --version 2>/dev/null | head -1 || echo 'version unknown'");
    match role.gateway.execute(&version, deadline).await {
        Ok(output) => {
            let version = output.output.trim();
            let version = if version.is_empty() {
                "version unknown"
            } else {
                version
            };
            info!(host = %role.host, "{executable}: {version}");
        }
        Err(error) => debug!(host = %role.host, "unable to query version of {executable}: {error}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions() {
        use Phase::*;
        let two_node = [Idle, ServerStarting, ClientRunning, Collecting, Completed];
        let four_node = [
            Idle,
            ServerStarting,
            IntermediateStarting,
            IntermediateStarting,
            ClientRunning,
            Collecting,
            TimedOut,
        ];
        for sequence in [&two_node[..], &four_node[..]] {
            for pair in sequence.windows(2) {
                assert!(pair[0].can_advance_to(pair[1]), "{pair:?}");
            }
        }
        assert!(!Idle.can_advance_to(ClientRunning));
        assert!(!ClientRunning.can_advance_to(Completed));
        assert!(!Completed.can_advance_to(Idle));
        assert!(Failed.is_terminal());
        assert!(!Collecting.is_terminal());
    }

    #[test]
    fn test_aggregate_success() {
        let scenario = TestScenario::new("t", "a", "b");
        let mut result = TestResult::new(&scenario, Topology::TwoNode, 1);
        assert!(!result.aggregate_success());
        let ok = RoleResult::completed(String::new(), 0, Duration::ZERO);
        result.results.insert(RoleSlot::Client, ok.clone());
        assert!(result.aggregate_success());
        result.results.insert(
            RoleSlot::Server,
            RoleResult::completed(String::new(), 1, Duration::ZERO),
        );
        assert!(!result.aggregate_success());
        result.results.insert(RoleSlot::Server, ok);
        result.fail(TIMED_OUT);
        result.fail("later error");
        assert_eq!(result.error.as_deref(), Some(TIMED_OUT));
        assert!(!result.aggregate_success());
    }
}
