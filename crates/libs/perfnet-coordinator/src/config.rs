//! Benchmark configuration file.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use perfnet_params::{Role, RoleConfig};
use perfnet_remote::SshConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::topology::{startup_order, Topology};

/// Complete benchmark configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BenchConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Runner used for every role without a per-role override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner: Option<String>,
    /// Per-role runner overrides.
    #[serde(default)]
    pub runners: RoleRunners,
    /// Deadline of a single scenario.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default)]
    pub settle: SettleConfig,
    /// Executable overrides by runner name.
    #[serde(default, alias = "binary_paths")]
    pub binary_paths: BTreeMap<String, String>,
    #[serde(default)]
    pub hosts: BTreeMap<String, HostConfig>,
    #[serde(default)]
    pub tests: Vec<TestScenario>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(600)
}

/// Runner names overriding [`BenchConfig::runner`] for individual roles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleRunners {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intermediate: Option<String>,
}

impl RoleRunners {
    pub fn get(&self, role: Role) -> Option<&str> {
        match role {
            Role::Client => self.client.as_deref(),
            Role::Server => self.server.as_deref(),
            Role::Intermediate => self.intermediate.as_deref(),
        }
        .filter(|name| !name.is_empty())
    }
}

/// How to wait for a started role to become ready.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettleMode {
    /// Poll the listening port, falling back to the fixed delay.
    #[default]
    Probe,
    /// Always sleep for the fixed delay.
    Fixed,
}

/// Timing of the startup sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SettleConfig {
    pub mode: SettleMode,
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
    #[serde(with = "humantime_serde")]
    pub probe_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    /// Time intermediates get to exit after the server finished.
    #[serde(with = "humantime_serde")]
    pub intermediate_grace: Duration,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            mode: SettleMode::default(),
            delay: Duration::from_secs(2),
            probe_interval: Duration::from_millis(250),
            probe_timeout: Duration::from_secs(10),
            intermediate_grace: Duration::from_secs(5),
        }
    }
}

/// A host taking part in tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HostConfig {
    pub ssh: SshConfig,
    /// Data-plane address other hosts connect to.
    #[serde(default, alias = "data_address", skip_serializing_if = "Option::is_none")]
    pub data_address: Option<String>,
    /// Role the host is meant for, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Host-level runner configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner: Option<RoleConfig>,
}

impl HostConfig {
    /// Address downstream roles connect to.
    pub fn target_address(&self) -> &str {
        self.data_address
            .as_deref()
            .filter(|address| !address.is_empty())
            .unwrap_or(&self.ssh.host)
    }
}

/// A single test between hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestScenario {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intermediate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intermediate1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intermediate2: Option<String>,
    /// Test-level runner configuration, overriding the hosts' configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<RoleConfig>,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    /// Pause between repetitions.
    #[serde(default, with = "humantime_serde")]
    pub delay: Duration,
}

fn default_repeat() -> u32 {
    1
}

impl TestScenario {
    /// Two-node test between the given hosts.
    pub fn new(name: &str, client: &str, server: &str) -> Self {
        Self {
            name: name.to_owned(),
            description: None,
            client: client.to_owned(),
            server: server.to_owned(),
            intermediate: None,
            intermediate1: None,
            intermediate2: None,
            config: None,
            repeat: default_repeat(),
            delay: Duration::ZERO,
        }
    }

    pub fn intermediate(&self) -> Option<&str> {
        non_empty(&self.intermediate)
    }

    pub fn intermediate1(&self) -> Option<&str> {
        non_empty(&self.intermediate1)
    }

    pub fn intermediate2(&self) -> Option<&str> {
        non_empty(&self.intermediate2)
    }

    /// Number of runs, at least one.
    pub fn repetitions(&self) -> u32 {
        self.repeat.max(1)
    }

    /// Whether the test forwards traffic through intermediates.
    pub fn has_intermediates(&self) -> bool {
        self.intermediate().is_some()
            || self.intermediate1().is_some()
            || self.intermediate2().is_some()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

impl BenchConfig {
    /// Load and validate the configuration from a file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        debug!(path = %path.display(), "loading configuration");
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&source)
    }

    /// Parse and validate the configuration.
    pub fn from_toml(source: &str) -> ConfigResult<Self> {
        let config = toml::from_str::<Self>(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Name of the runner for the given role.
    pub fn runner_for(&self, role: Role) -> Option<&str> {
        self.runners
            .get(role)
            .or_else(|| self.runner.as_deref().filter(|name| !name.is_empty()))
    }

    /// Whether different roles are played by different runners.
    pub fn has_mixed_runners(&self) -> bool {
        let names = Role::ALL
            .into_iter()
            .filter_map(|role| self.runner_for(role))
            .collect::<BTreeSet<_>>();
        names.len() > 1
    }

    /// Executable override for the given runner.
    pub fn binary_path(&self, runner: &str) -> Option<&str> {
        self.binary_paths
            .get(runner)
            .map(String::as_str)
            .filter(|path| !path.is_empty())
    }

    /// Whether any test forwards traffic through intermediates.
    pub fn needs_intermediate(&self) -> bool {
        self.tests.iter().any(TestScenario::has_intermediates)
    }

    /// Check the structure of the configuration.
    ///
    /// Runner names are resolved later against a registry.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.is_empty() {
            return Err(ConfigError::invalid("`name` is required"));
        }
        for role in [Role::Client, Role::Server] {
            if self.runner_for(role).is_none() {
                return Err(ConfigError::invalid(format!(
                    "no runner configured for the {role} role"
                )));
            }
        }
        if self.needs_intermediate() && self.runner_for(Role::Intermediate).is_none() {
            return Err(ConfigError::invalid(
                "no runner configured for the intermediate role",
            ));
        }
        if self.hosts.is_empty() {
            return Err(ConfigError::invalid("at least one host is required"));
        }
        if self.tests.is_empty() {
            return Err(ConfigError::invalid("at least one test is required"));
        }
        for (id, host) in &self.hosts {
            validate_host(id, host)?;
        }
        for (index, test) in self.tests.iter().enumerate() {
            self.validate_test(index, test)?;
        }
        Ok(())
    }

    fn validate_test(&self, index: usize, test: &TestScenario) -> ConfigResult<()> {
        if test.name.is_empty() {
            return Err(ConfigError::invalid(format!("test {index}: `name` is required")));
        }
        let name = &test.name;
        if test.client.is_empty() {
            return Err(ConfigError::invalid(format!(
                "test `{name}`: `client` is required"
            )));
        }
        if test.server.is_empty() {
            return Err(ConfigError::invalid(format!(
                "test `{name}`: `server` is required"
            )));
        }
        Topology::classify(test)?;
        let mut seen = BTreeSet::new();
        for hop in startup_order(test)? {
            if !self.hosts.contains_key(hop.host) {
                return Err(ConfigError::invalid(format!(
                    "test `{name}`: {} host `{}` is not defined",
                    hop.slot, hop.host
                )));
            }
            if !seen.insert(hop.host) {
                return Err(ConfigError::invalid(format!(
                    "test `{name}`: host `{}` is used more than once",
                    hop.host
                )));
            }
        }
        Ok(())
    }
}

fn validate_host(id: &str, host: &HostConfig) -> ConfigResult<()> {
    if host.ssh.host.is_empty() {
        return Err(ConfigError::invalid(format!(
            "host `{id}`: SSH host is required"
        )));
    }
    if host.ssh.user.is_empty() {
        return Err(ConfigError::invalid(format!(
            "host `{id}`: SSH user is required"
        )));
    }
    if !host.ssh.has_auth_method() {
        return Err(ConfigError::invalid(format!(
            "host `{id}`: either `key-path` or `password` is required"
        )));
    }
    Ok(())
}
