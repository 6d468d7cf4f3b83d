//! Perfnet executable.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use perfnet_coordinator::error::error_chain;
use perfnet_coordinator::{BenchConfig, ConfigError, ConnectError, Coordinator};
use perfnet_remote::SshConnector;
use perfnet_runner::RunnerRegistry;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::args::Args;

pub mod args;
pub mod logging;
pub mod report;

/// Error running perfnet.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error("no test named {}", .0.join(", "))]
    UnknownTests(Vec<String>),
    #[error("unable to install interrupt handler")]
    Interrupt(#[from] ctrlc::Error),
    #[error("unable to render results")]
    Render(#[from] serde_json::Error),
}

/// Exit status after an interruption.
const INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init_logging(args.verbose);
    match run(args).await {
        Ok(status) => status,
        Err(error) => {
            error!("{}", error_chain(&error));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode, CliError> {
    info!("loading configuration from {}", args.config.display());
    let mut config = BenchConfig::load(&args.config)?;
    if let Some(timeout) = args.timeout {
        config.timeout = timeout;
    }
    select_tests(&mut config, &args.tests)?;
    info!(
        name = %config.name,
        hosts = config.hosts.len(),
        tests = config.tests.len(),
        "loaded configuration"
    );
    if let Some(description) = &config.description {
        info!("{description}");
    }

    let (interrupt, mut interrupted) = watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = interrupt.send(true);
    })?;

    let registry = RunnerRegistry::with_builtin();
    let mut coordinator = Coordinator::new(config, &registry, Arc::new(SshConnector))?;
    let connected = tokio::select! {
        connected = coordinator.connect_all() => Some(connected),
        _ = interrupted.changed() => None,
    };
    match connected {
        Some(connected) => connected?,
        None => {
            warn!("interrupted, closing connections");
            coordinator.cleanup().await;
            return Ok(ExitCode::from(INTERRUPTED));
        }
    }

    let started = Instant::now();
    let mut results = Vec::new();
    let finished = tokio::select! {
        _ = coordinator.run_all(&mut results) => true,
        _ = interrupted.changed() => false,
    };
    if !finished {
        warn!("interrupted, closing connections");
    }
    coordinator.cleanup().await;
    let duration = started.elapsed();
    info!("finished {} runs in {duration:?}", results.len());

    if args.json {
        println!("{}", report::render_json(&results, duration)?);
    } else {
        print!("{}", report::render_text(&results, duration));
    }
    if !finished {
        Ok(ExitCode::from(INTERRUPTED))
    } else if results.iter().all(|result| result.success) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Keep only the tests with the given names, keeping all if none are given.
fn select_tests(config: &mut BenchConfig, names: &[String]) -> Result<(), CliError> {
    if names.is_empty() {
        return Ok(());
    }
    let unknown = names
        .iter()
        .filter(|name| !config.tests.iter().any(|test| &test.name == *name))
        .cloned()
        .collect::<Vec<_>>();
    if !unknown.is_empty() {
        return Err(CliError::UnknownTests(unknown));
    }
    config.tests.retain(|test| names.contains(&test.name));
    Ok(())
}
