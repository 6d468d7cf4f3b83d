//! Named runner constructors.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::ib_send_bw::IbSendBw;
use crate::iperf3::Iperf3;
use crate::testpmd::Testpmd;
use crate::Runner;

/// Constructor of a runner, taking an optional executable override.
pub type RunnerConstructor = fn(Option<&str>) -> Arc<dyn Runner>;

/// Registry mapping runner names to constructors.
#[derive(Debug, Clone, Default)]
pub struct RunnerRegistry {
    constructors: BTreeMap<&'static str, RunnerConstructor>,
}

impl RunnerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all runners shipped with this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Iperf3::NAME, |path| Arc::new(Iperf3::new(path)));
        registry.register(IbSendBw::NAME, |path| Arc::new(IbSendBw::new(path)));
        registry.register(Testpmd::NAME, |path| Arc::new(Testpmd::new(path)));
        registry
    }

    /// Register a constructor, replacing any previous one of the same name.
    pub fn register(&mut self, name: &'static str, constructor: RunnerConstructor) {
        self.constructors.insert(name, constructor);
    }

    /// Create a fresh runner, optionally overriding its executable.
    pub fn create(
        &self,
        name: &str,
        executable: Option<&str>,
    ) -> Result<Arc<dyn Runner>, RegistryError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_owned(),
                available: self.names().collect(),
            })?;
        Ok(constructor(executable.filter(|path| !path.is_empty())))
    }

    /// Whether a runner of the given name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Names of all registered runners in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use perfnet_params::Role;

    use super::*;

    #[test]
    fn test_builtin_runners() {
        let registry = RunnerRegistry::with_builtin();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            ["ib_send_bw", "iperf3", "testpmd"]
        );
        let runner = registry.create("iperf3", None).unwrap();
        assert_eq!(runner.name(), "iperf3");
        assert_eq!(runner.executable(Role::Client), "iperf3");
    }

    #[test]
    fn test_executable_override() {
        let registry = RunnerRegistry::with_builtin();
        let runner = registry
            .create("testpmd", Some("/opt/dpdk/bin/dpdk-testpmd"))
            .unwrap();
        assert_eq!(runner.executable(Role::Server), "/opt/dpdk/bin/dpdk-testpmd");
        let runner = registry.create("testpmd", Some("")).unwrap();
        assert_eq!(runner.executable(Role::Server), "dpdk-testpmd");
    }

    #[test]
    fn test_not_found() {
        let registry = RunnerRegistry::with_builtin();
        let error = registry.create("netperf", None).unwrap_err();
        assert_eq!(
            error.to_string(),
            "runner `netperf` not found, available runners: ib_send_bw, iperf3, testpmd"
        );
    }
}
