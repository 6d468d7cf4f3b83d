//! Merging of layered parameter maps.

use std::collections::BTreeMap;

use crate::config::RoleConfig;
use crate::role::Role;
use crate::value::{EnvMap, ParamMap};

/// Resolve the effective parameters and environment of a role.
///
/// Entries of the overlay replace entries of the general map key by key. Missing maps
/// are treated as empty. The intermediate role has no overlay, so its general maps are
/// returned unchanged.
pub fn resolve(
    role: Role,
    general_args: &ParamMap,
    general_env: &EnvMap,
    overlay_args: Option<&ParamMap>,
    overlay_env: Option<&EnvMap>,
) -> (ParamMap, EnvMap) {
    let (overlay_args, overlay_env) = match role {
        Role::Intermediate => (None, None),
        Role::Client | Role::Server => (overlay_args, overlay_env),
    };
    (
        overlay(general_args, overlay_args),
        overlay(general_env, overlay_env),
    )
}

/// Merge host-level defaults with test-level overrides.
///
/// Scalars of the test layer win when they are set and non-empty. Maps are merged key
/// by key with the test layer winning.
pub fn merge_layers(host: Option<&RoleConfig>, test: Option<&RoleConfig>) -> RoleConfig {
    let (host, test) = match (host, test) {
        (None, None) => return RoleConfig::default(),
        (Some(host), None) => return host.clone(),
        (None, Some(test)) => return test.clone(),
        (Some(host), Some(test)) => (host, test),
    };
    RoleConfig {
        duration: test
            .duration
            .filter(|duration| !duration.is_zero())
            .or(host.duration),
        args: overlay(&host.args, Some(&test.args)),
        env: overlay(&host.env, Some(&test.env)),
        server_args: overlay(&host.server_args, Some(&test.server_args)),
        client_args: overlay(&host.client_args, Some(&test.client_args)),
        server_env: overlay(&host.server_env, Some(&test.server_env)),
        client_env: overlay(&host.client_env, Some(&test.client_env)),
        role: test.role.or(host.role),
        host: non_empty(&test.host).or_else(|| host.host.clone()),
        target_host: non_empty(&test.target_host).or_else(|| host.target_host.clone()),
        port: test.port.filter(|port| *port > 0).or(host.port),
    }
}

fn overlay<V: Clone>(
    base: &BTreeMap<String, V>,
    overlay: Option<&BTreeMap<String, V>>,
) -> BTreeMap<String, V> {
    let mut merged = base.clone();
    if let Some(overlay) = overlay {
        merged.extend(
            overlay
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
    }
    merged
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|value| !value.is_empty()).cloned()
}
