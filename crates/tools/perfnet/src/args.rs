//! Definition of the command line arguments.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use humantime_serde::re::humantime;

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(author, version, about = None, long_about = None)]
pub struct Args {
    /// Path to the benchmark configuration file.
    #[clap(long, short, default_value = "perfnet.toml")]
    pub config: PathBuf,
    /// Deadline of every test, overriding the configuration (e.g. `5m`).
    #[clap(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
    /// Run only the tests with the given names.
    #[clap(long = "test", value_name = "NAME")]
    pub tests: Vec<String>,
    /// Print results as JSON.
    #[clap(long)]
    pub json: bool,
    /// Enable debug logging.
    #[clap(long, short)]
    pub verbose: bool,
}
