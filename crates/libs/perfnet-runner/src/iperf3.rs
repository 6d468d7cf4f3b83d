//! Runner for `iperf3` bandwidth tests.
//!
//! The intermediate role relays the iperf3 connection with `socat`.

use std::sync::LazyLock;

use perfnet_params::{EffectiveConfig, ParamValue, Role};
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::command::{CommandLine, Flag};
use crate::error::{MetricsError, ValidationError};
use crate::rates::scan_rates;
use crate::result::RoleResult;
use crate::{validate_common, Runner};

/// Flags understood by both the client and the server.
const COMMON_FLAGS: &[Flag] = &[
    Flag::spaced("interval", "-i"),
    Flag::spaced("ipv6", "-6"),
    Flag::spaced("ipv4", "-4"),
    Flag::spaced("bind_address", "-B"),
    Flag::spaced("verbose", "-V"),
];

/// Flags only understood by the client.
const CLIENT_FLAGS: &[Flag] = &[
    Flag::spaced("parallel_streams", "-P"),
    Flag::spaced("window_size", "-w"),
    Flag::spaced("reverse", "-R"),
    Flag::spaced("bitrate", "-b"),
    Flag::spaced("omit_seconds", "-O"),
    Flag::spaced("buffer_length", "-l"),
];

static RETRANSMITS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"bits/sec\s+(\d+)\s+(?:\d+(?:\.\d+)?\s*[KMG]?Bytes|sender)")
        .expect("retransmits pattern must be valid")
});

/// Runner for `iperf3`.
#[derive(Debug, Clone)]
pub struct Iperf3 {
    executable: String,
}

impl Iperf3 {
    pub const NAME: &'static str = "iperf3";

    /// Port iperf3 listens on when none is configured.
    pub const DEFAULT_PORT: u16 = 5201;

    /// Relay used for the intermediate role.
    pub const RELAY: &'static str = "socat";

    pub fn new(executable: Option<&str>) -> Self {
        Self {
            executable: executable.unwrap_or(Self::NAME).to_owned(),
        }
    }

    fn build_relay(&self, config: &EffectiveConfig) -> String {
        let port = config.port().unwrap_or(Self::DEFAULT_PORT);
        let target = config.target().unwrap_or_default();
        CommandLine::new(&config.env, Self::RELAY)
            .arg(format!("TCP-LISTEN:{port},fork"))
            .arg(format!("TCP:{target}:{port}"))
            .finish()
    }

    fn parse_report(&self, json: &str, result: &mut RoleResult) -> Result<(), MetricsError> {
        let report = serde_json::from_str::<Report>(json)?;
        if let Some(error) = report.error {
            result.record("iperf3_error", error);
        }
        let end = report.end.unwrap_or_default();
        let received = end.sum_received.unwrap_or_default();
        let sent = end.sum_sent.unwrap_or_default();
        let sum = end.sum.unwrap_or_default();
        let bits_per_second = received
            .bits_per_second
            .or(sent.bits_per_second)
            .or(sum.bits_per_second)
            .filter(|bps| *bps > 0.0);
        if let Some(bps) = bits_per_second {
            result.record("bandwidth_bps", bps);
            result.record("bandwidth_mbps", bps / 1e6);
            result.record("bandwidth_gbps", bps / 1e9);
        }
        if let Some(retransmits) = sent.retransmits {
            result.record("retransmits", retransmits);
        }
        if let Some(seconds) = sent.seconds.or(sum.seconds).filter(|secs| *secs > 0.0) {
            result.record("actual_duration", seconds);
        }
        if let Some(jitter) = sum.jitter_ms {
            result.record("jitter_ms", jitter);
        }
        if let Some(lost) = sum.lost_percent {
            result.record("lost_percent", lost);
        }
        let streams = report
            .start
            .and_then(|start| start.test_start)
            .and_then(|test_start| test_start.num_streams)
            .filter(|streams| *streams > 0);
        if let Some(streams) = streams {
            result.record("parallel_streams", streams);
        }
        Ok(())
    }

    fn parse_text(&self, output: &str, result: &mut RoleResult) {
        // Interval lines come first, prefer the final summary when there is one.
        let summary = output
            .lines()
            .filter(|line| line.contains("sender") || line.contains("receiver"))
            .collect::<Vec<_>>()
            .join("\n");
        let text = if summary.is_empty() { output } else { &summary };
        scan_rates(text, "bandwidth", "packet_rate", result);
        let retransmits = RETRANSMITS_RE
            .captures(text)
            .and_then(|captures| captures[1].parse::<i64>().ok());
        if let Some(retransmits) = retransmits {
            result.record("retransmits", retransmits);
        }
    }
}

impl Runner for Iperf3 {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn supports_role(&self, _: Role) -> bool {
        true
    }

    fn validate(&self, config: &EffectiveConfig) -> Result<(), ValidationError> {
        validate_common(self, config)?;
        if let Some(streams) = config.arg("parallel_streams") {
            match streams {
                ParamValue::Int(streams) if *streams > 0 => {}
                ParamValue::Int(_) => {
                    return Err(ValidationError::invalid_param(
                        "parallel_streams",
                        "must be greater than 0",
                    ));
                }
                other => {
                    return Err(ValidationError::invalid_param(
                        "parallel_streams",
                        format!("expected integer, found {}", other.type_name()),
                    ));
                }
            }
        }
        Ok(())
    }

    fn build_command(&self, config: &EffectiveConfig) -> String {
        let mut command = CommandLine::new(&config.env, &self.executable);
        match config.role {
            Role::Intermediate => return self.build_relay(config),
            Role::Server => {
                command.arg("-s").arg("-1");
            }
            Role::Client => {
                command.arg_value("-c", config.target().unwrap_or_default());
            }
        }
        if let Some(port) = config.port() {
            command.arg_value("-p", port);
        }
        if config.role == Role::Client {
            if let Some(secs) = config.duration_secs() {
                command.arg_value("-t", secs);
            }
        }
        command.arg("-J");
        let is_udp = config
            .arg("protocol")
            .and_then(ParamValue::as_str)
            .is_some_and(|protocol| protocol.eq_ignore_ascii_case("udp"));
        if config.role == Role::Client && is_udp {
            command.arg("-u");
        }
        command.flags(COMMON_FLAGS, &config.args);
        if config.role == Role::Client {
            command.flags(CLIENT_FLAGS, &config.args);
        }
        command.finish()
    }

    fn parse_metrics(&self, result: &mut RoleResult) -> Result<(), MetricsError> {
        let output = result.output.clone();
        let json = output
            .find('{')
            .zip(output.rfind('}'))
            .filter(|(start, end)| start < end)
            .map(|(start, end)| &output[start..=end])
            .filter(|json| json.contains(r#""start""#) && json.contains(r#""end""#));
        match json {
            Some(json) => self.parse_report(json, result).inspect_err(|error| {
                debug!("falling back to text output: {error}");
                self.parse_text(&output, result);
            }),
            None => {
                self.parse_text(&output, result);
                Ok(())
            }
        }
    }

    fn executable(&self, role: Role) -> &str {
        match role {
            Role::Intermediate => Self::RELAY,
            Role::Client | Role::Server => &self.executable,
        }
    }

    fn listen_port(&self, config: &EffectiveConfig) -> Option<u16> {
        match config.role {
            Role::Server | Role::Intermediate => {
                Some(config.port().unwrap_or(Self::DEFAULT_PORT))
            }
            Role::Client => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Report {
    start: Option<Start>,
    end: Option<End>,
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Start {
    test_start: Option<TestStart>,
}

#[derive(Debug, Default, Deserialize)]
struct TestStart {
    num_streams: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct End {
    sum_sent: Option<Summary>,
    sum_received: Option<Summary>,
    /// Summary of UDP tests.
    sum: Option<Summary>,
}

#[derive(Debug, Default, Deserialize)]
struct Summary {
    seconds: Option<f64>,
    bits_per_second: Option<f64>,
    retransmits: Option<i64>,
    jitter_ms: Option<f64>,
    lost_percent: Option<f64>,
}
