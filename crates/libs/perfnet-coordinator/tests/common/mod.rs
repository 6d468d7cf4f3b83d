//! Scripted in-memory hosts.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use perfnet_remote::{CommandOutput, Connector, GatewayError, RemoteGateway, SshConfig};
use tokio::time::{self, Instant};

/// How a scripted host answers a command.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Exit with the given code and output after some time.
    Exit {
        output: String,
        code: i32,
        after: Duration,
    },
    /// Never exit.
    Hang,
    /// Fail with a transport error.
    Fail(String),
}

impl Reply {
    pub fn ok() -> Self {
        Self::exit("", 0, Duration::ZERO)
    }

    pub fn exit(output: &str, code: i32, after: Duration) -> Self {
        Self::Exit {
            output: output.to_owned(),
            code,
            after,
        }
    }
}

/// Command executed on a scripted host.
#[derive(Debug, Clone)]
pub struct Call {
    pub host: String,
    pub command: String,
    pub at: Instant,
}

type Script = Box<dyn Fn(&str) -> Reply + Send + Sync>;

/// Host answering commands according to a script.
pub struct MockGateway {
    host: String,
    script: Script,
    calls: Arc<Mutex<Vec<Call>>>,
    closed: AtomicUsize,
}

impl MockGateway {
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteGateway for MockGateway {
    async fn connect(&self, _: Instant) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn execute(
        &self,
        command: &str,
        deadline: Instant,
    ) -> Result<CommandOutput, GatewayError> {
        self.calls.lock().unwrap().push(Call {
            host: self.host.clone(),
            command: command.to_owned(),
            at: Instant::now(),
        });
        match (self.script)(command) {
            Reply::Exit {
                output,
                code,
                after,
            } => {
                let done = Instant::now() + after;
                if done > deadline {
                    time::sleep_until(deadline).await;
                    return Err(GatewayError::TimedOut);
                }
                time::sleep_until(done).await;
                Ok(CommandOutput {
                    output,
                    exit_code: code,
                })
            }
            Reply::Hang => {
                time::sleep_until(deadline).await;
                Err(GatewayError::TimedOut)
            }
            Reply::Fail(message) => Err(GatewayError::Other(message)),
        }
    }

    async fn close(&self) -> Result<(), GatewayError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Answers to the executable checks, version queries, and readiness probes.
pub fn housekeeping(command: &str) -> Option<Reply> {
    if command.starts_with("command -v") || command.starts_with("ss -Hltn") {
        Some(Reply::ok())
    } else if command.contains("--version") {
        Some(Reply::exit("iperf 3.16\n", 0, Duration::ZERO))
    } else {
        None
    }
}

/// Set of scripted hosts sharing a call log.
#[derive(Default)]
pub struct Lab {
    gateways: BTreeMap<String, Arc<MockGateway>>,
    unreachable: BTreeSet<String>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Lab {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host answering runner commands with the given script.
    pub fn host(self, id: &str, script: impl Fn(&str) -> Reply + Send + Sync + 'static) -> Self {
        self.raw_host(id, move |command| {
            housekeeping(command).unwrap_or_else(|| script(command))
        })
    }

    /// Add a host with a custom script for every command.
    pub fn raw_host(
        mut self,
        id: &str,
        script: impl Fn(&str) -> Reply + Send + Sync + 'static,
    ) -> Self {
        let gateway = MockGateway {
            host: id.to_owned(),
            script: Box::new(script),
            calls: self.calls.clone(),
            closed: AtomicUsize::new(0),
        };
        self.gateways.insert(id.to_owned(), Arc::new(gateway));
        self
    }

    /// Mark a host as unreachable.
    pub fn unreachable(mut self, id: &str) -> Self {
        self.unreachable.insert(id.to_owned());
        self
    }

    pub fn gateway(&self, id: &str) -> &Arc<MockGateway> {
        &self.gateways[id]
    }

    /// All calls so far in order of execution.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Runner commands, skipping checks and probes.
    pub fn runner_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| housekeeping(&call.command).is_none())
            .collect()
    }
}

#[async_trait]
impl Connector for Lab {
    async fn connect(
        &self,
        host_id: &str,
        _: &SshConfig,
        _: Instant,
    ) -> Result<Arc<dyn RemoteGateway>, GatewayError> {
        if self.unreachable.contains(host_id) {
            return Err(GatewayError::Other(format!("{host_id} is unreachable")));
        }
        self.gateways
            .get(host_id)
            .map(|gateway| gateway.clone() as Arc<dyn RemoteGateway>)
            .ok_or(GatewayError::NotConnected)
    }
}
