//! Role configuration before and after resolution.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resolve::resolve;
use crate::role::Role;
use crate::value::{EnvMap, ParamMap, ParamValue};

/// Runner configuration as written at host or test level.
///
/// The role overlays (`server-args`, `client-args`, `server-env`, `client-env`) are kept
/// next to the general maps and only applied by [`RoleConfig::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RoleConfig {
    /// Duration of the benchmark.
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    /// General parameters.
    pub args: ParamMap,
    /// General environment variables.
    pub env: EnvMap,
    /// Parameters overriding `args` for the server role.
    #[serde(alias = "server_args")]
    pub server_args: ParamMap,
    /// Parameters overriding `args` for the client role.
    #[serde(alias = "client_args")]
    pub client_args: ParamMap,
    /// Environment variables overriding `env` for the server role.
    #[serde(alias = "server_env")]
    pub server_env: EnvMap,
    /// Environment variables overriding `env` for the client role.
    #[serde(alias = "client_env")]
    pub client_env: EnvMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Management address of the host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Data-plane address to connect to, takes precedence over `host`.
    #[serde(alias = "target_host", skip_serializing_if = "Option::is_none")]
    pub target_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl RoleConfig {
    /// Parameter and environment overlays for the given role.
    ///
    /// The intermediate role has no overlays.
    pub fn overlays(&self, role: Role) -> (Option<&ParamMap>, Option<&EnvMap>) {
        match role {
            Role::Client => (Some(&self.client_args), Some(&self.client_env)),
            Role::Server => (Some(&self.server_args), Some(&self.server_env)),
            Role::Intermediate => (None, None),
        }
    }

    /// Resolve the effective configuration for the given role.
    pub fn resolve(&self, role: Role) -> EffectiveConfig {
        let (overlay_args, overlay_env) = self.overlays(role);
        let (args, env) = resolve(role, &self.args, &self.env, overlay_args, overlay_env);
        EffectiveConfig {
            role,
            duration: self.duration,
            args,
            env,
            host: self.host.clone(),
            target_host: self.target_host.clone(),
            port: self.port,
        }
    }
}

/// Fully resolved configuration of a single role.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub role: Role,
    pub duration: Option<Duration>,
    /// Parameters after applying the role overlay.
    pub args: ParamMap,
    /// Environment after applying the role overlay.
    pub env: EnvMap,
    /// Management address of the downstream host.
    pub host: Option<String>,
    /// Data-plane address of the downstream host.
    pub target_host: Option<String>,
    pub port: Option<u16>,
}

impl EffectiveConfig {
    /// Empty configuration for the given role.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            duration: None,
            args: ParamMap::new(),
            env: EnvMap::new(),
            host: None,
            target_host: None,
            port: None,
        }
    }

    /// Address to connect to, preferring the data-plane address.
    pub fn target(&self) -> Option<&str> {
        self.target_host
            .as_deref()
            .filter(|target| !target.is_empty())
            .or_else(|| self.host.as_deref().filter(|host| !host.is_empty()))
    }

    /// Configured port, ignoring zero.
    pub fn port(&self) -> Option<u16> {
        self.port.filter(|port| *port > 0)
    }

    /// Benchmark duration in whole seconds, ignoring zero.
    pub fn duration_secs(&self) -> Option<u64> {
        self.duration
            .map(|duration| duration.as_secs())
            .filter(|secs| *secs > 0)
    }

    /// Effective value of the given parameter.
    pub fn arg(&self, name: &str) -> Option<&ParamValue> {
        self.args.get(name)
    }

    /// Set a parameter, returning `self` for chaining.
    pub fn with_arg(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.args.insert(name.to_owned(), value.into());
        self
    }

    /// Set an environment variable, returning `self` for chaining.
    pub fn with_env(mut self, name: &str, value: &str) -> Self {
        self.env.insert(name.to_owned(), value.to_owned());
        self
    }
}
