//! Runner for the `ib_send_bw` RDMA bandwidth test of perftest.

use std::sync::LazyLock;

use perfnet_params::{EffectiveConfig, Role};
use regex::Regex;

use crate::command::{CommandLine, Flag};
use crate::error::{MetricsError, ValidationError};
use crate::rates::{record_in_unit, scan_rates};
use crate::result::RoleResult;
use crate::{validate_common, Runner};

const FLAGS: &[Flag] = &[
    Flag::spaced("size", "-s"),
    Flag::spaced("iterations", "-n"),
    Flag::spaced("tx_depth", "-t"),
    Flag::spaced("rx_depth", "-r"),
    Flag::spaced("mtu", "-m"),
    Flag::spaced("qp", "-q"),
    Flag::spaced("connection", "-c"),
    Flag::spaced("inline", "-I"),
    Flag::spaced("gid_index", "-x"),
    Flag::spaced("sl", "-S"),
    Flag::spaced("cpu_freq", "-F"),
    Flag::spaced("ib_dev", "-d"),
    Flag::spaced("use_event", "-e"),
    Flag::spaced("bidirectional", "-b"),
    Flag::spaced("report_cycles", "-C"),
    Flag::spaced("report_histogram", "-H"),
    Flag::spaced("odp", "-o"),
    Flag::spaced("report_gbits", "-R"),
];

/// Bracketed column of the result table header, e.g. `peak[MB/sec]`.
static COLUMN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)\[([^\]]+)\]").expect("column pattern must be valid"));

static INFO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*(Connection type|MTU|Message size|Number of qps)\s*:\s*(\S+)")
        .expect("info pattern must be valid")
});

/// Runner for `ib_send_bw`.
#[derive(Debug, Clone)]
pub struct IbSendBw {
    executable: String,
}

impl IbSendBw {
    pub const NAME: &'static str = "ib_send_bw";

    /// Port the server listens on when none is configured.
    pub const DEFAULT_PORT: u16 = 18515;

    pub fn new(executable: Option<&str>) -> Self {
        Self {
            executable: executable.unwrap_or(Self::NAME).to_owned(),
        }
    }

    /// Parse the result table, returning `false` if there is none.
    fn parse_table(&self, output: &str, result: &mut RoleResult) -> Result<bool, MetricsError> {
        let mut lines = output.lines();
        let Some(header) = lines
            .by_ref()
            .find(|line| line.contains("#bytes") && line.contains("BW"))
        else {
            return Ok(false);
        };
        let data = lines
            .map(str::trim)
            .find(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('-'))
            .ok_or_else(|| MetricsError::Table("missing data row".to_owned()))?;
        let fields = data
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| MetricsError::Table(format!("non-numeric data row {data:?}")))?;
        if fields.len() < 2 {
            return Err(MetricsError::Table(format!("short data row {data:?}")));
        }
        result.record("bytes", fields[0] as i64);
        result.record("iterations", fields[1] as i64);
        for (captures, value) in COLUMN_RE.captures_iter(header).zip(&fields[2..]) {
            let prefix = match &captures[1] {
                "peak" => "bandwidth_peak",
                "average" => "bandwidth_average",
                "MsgRate" => "message_rate",
                _ => continue,
            };
            record_in_unit(result, prefix, &captures[2], *value);
            if prefix == "bandwidth_average" {
                record_in_unit(result, "bandwidth", &captures[2], *value);
            }
        }
        Ok(true)
    }

    fn parse_info(&self, output: &str, result: &mut RoleResult) {
        for captures in INFO_RE.captures_iter(output) {
            let value = &captures[2];
            let key = match captures[1].to_ascii_lowercase().as_str() {
                "connection type" => {
                    result.record("connection_type", value);
                    continue;
                }
                "mtu" => "mtu",
                "message size" => "message_size",
                _ => "num_qps",
            };
            // Values may carry a unit suffix such as `4096[B]`.
            let digits = value.trim_end_matches(|c: char| !c.is_ascii_digit());
            if let Ok(value) = digits.parse::<i64>() {
                result.record(key, value);
            }
        }
    }
}

impl Runner for IbSendBw {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn supports_role(&self, role: Role) -> bool {
        matches!(role, Role::Client | Role::Server)
    }

    fn validate(&self, config: &EffectiveConfig) -> Result<(), ValidationError> {
        validate_common(self, config)
    }

    fn build_command(&self, config: &EffectiveConfig) -> String {
        let mut command = CommandLine::new(&config.env, &self.executable);
        if config.role == Role::Client {
            command.arg(config.target().unwrap_or_default());
        }
        if let Some(port) = config.port() {
            command.arg_value("-p", port);
        }
        if let Some(secs) = config.duration_secs() {
            command.arg_value("-D", secs);
        }
        command.flags(FLAGS, &config.args).finish()
    }

    fn parse_metrics(&self, result: &mut RoleResult) -> Result<(), MetricsError> {
        let output = result.output.clone();
        self.parse_info(&output, result);
        let parsed = self.parse_table(&output, result);
        if !matches!(parsed, Ok(true)) {
            scan_rates(&output, "bandwidth", "message_rate", result);
        }
        parsed.map(|_| ())
    }

    fn executable(&self, _: Role) -> &str {
        &self.executable
    }

    fn listen_port(&self, config: &EffectiveConfig) -> Option<u16> {
        match config.role {
            Role::Server => Some(config.port().unwrap_or(Self::DEFAULT_PORT)),
            Role::Client | Role::Intermediate => None,
        }
    }
}
