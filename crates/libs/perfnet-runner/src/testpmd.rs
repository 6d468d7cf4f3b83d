//! Runner for the DPDK `testpmd` packet forwarder.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use perfnet_params::{EffectiveConfig, ParamValue, Role};
use regex::Regex;

use crate::command::{CommandLine, Flag};
use crate::error::{MetricsError, ValidationError};
use crate::rates::scan_rates;
use crate::result::RoleResult;
use crate::{validate_common, Runner};

/// Flags of the environment abstraction layer, placed before `--`.
const EAL_FLAGS: &[Flag] = &[
    Flag::spaced("memory_channels", "-n"),
    Flag::spaced("hugepage_dir", "--huge-dir"),
    Flag::spaced("file_prefix", "--file-prefix"),
    Flag::repeated("allow_pci", "-a"),
    Flag::repeated("block_pci", "-b"),
    Flag::repeated("vdev", "--vdev"),
];

/// Flags of the application, placed after `--`.
const APP_FLAGS: &[Flag] = &[
    Flag::assigned("ports", "--portlist"),
    Flag::assigned("rx_queues", "--rxq"),
    Flag::assigned("tx_queues", "--txq"),
    Flag::assigned("rx_descriptors", "--rxd"),
    Flag::assigned("tx_descriptors", "--txd"),
    Flag::assigned("burst_size", "--burst"),
    Flag::assigned("forward_mode", "--forward-mode"),
    Flag::spaced("auto_start", "--auto-start"),
    Flag::assigned("stats_period", "--stats-period"),
    Flag::assigned("forward_cores", "--coremask"),
    Flag::assigned("flow_control", "--flow-control"),
    Flag::spaced("hw_vlan", "--enable-hw-vlan"),
    Flag::spaced("crc_strip", "--crc-strip"),
    Flag::spaced("disable_rss", "--disable-rss"),
];

/// Forwarding modes accepted for the intermediate role.
pub const FORWARD_MODES: &[&str] = &[
    "io", "mac", "macswap", "flowgen", "rxonly", "txonly", "csum", "icmpecho", "ieee1588", "tm",
];

static COUNTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(RX|TX)-(packets|errors|bytes|dropped|missed):\s*(\d+)")
        .expect("counter pattern must be valid")
});

static PORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"statistics for port (\d+)").expect("port pattern must be valid")
});

/// Runner for `testpmd`.
#[derive(Debug, Clone)]
pub struct Testpmd {
    executable: String,
}

impl Testpmd {
    pub const NAME: &'static str = "testpmd";

    pub const DEFAULT_EXECUTABLE: &'static str = "dpdk-testpmd";

    pub fn new(executable: Option<&str>) -> Self {
        Self {
            executable: executable.unwrap_or(Self::DEFAULT_EXECUTABLE).to_owned(),
        }
    }
}

/// Core list given either verbatim or as a number of cores starting at zero.
fn core_list(cores: &ParamValue) -> Option<String> {
    match cores {
        ParamValue::Int(count) => Some(
            (0..*count)
                .map(|core| core.to_string())
                .collect::<Vec<_>>()
                .join(","),
        ),
        ParamValue::Str(list) if !list.is_empty() => Some(list.clone()),
        _ => None,
    }
}

fn validate_ports(ports: &ParamValue) -> Result<(), ValidationError> {
    match ports {
        ParamValue::Str(spec) if !spec.contains([',', '-']) && spec.parse::<u32>().is_err() => {
            Err(ValidationError::invalid_param(
                "ports",
                format!("invalid port specification {spec:?}"),
            ))
        }
        ParamValue::List(items) if items.is_empty() => Err(ValidationError::invalid_param(
            "ports",
            "list must not be empty",
        )),
        _ => Ok(()),
    }
}

impl Runner for Testpmd {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn supports_role(&self, _: Role) -> bool {
        true
    }

    fn validate(&self, config: &EffectiveConfig) -> Result<(), ValidationError> {
        validate_common(self, config)?;
        if let Some(ParamValue::Int(cores)) = config.arg("cores") {
            if *cores <= 0 {
                return Err(ValidationError::invalid_param(
                    "cores",
                    "must be greater than 0",
                ));
            }
        }
        if let Some(ParamValue::Int(channels)) = config.arg("memory_channels") {
            if !(1..=8).contains(channels) {
                return Err(ValidationError::invalid_param(
                    "memory_channels",
                    "must be between 1 and 8",
                ));
            }
        }
        if let Some(ports) = config.arg("ports") {
            validate_ports(ports)?;
        }
        if config.role == Role::Intermediate {
            if let Some(ParamValue::Str(mode)) = config.arg("forward_mode") {
                if !FORWARD_MODES.contains(&mode.as_str()) {
                    return Err(ValidationError::invalid_param(
                        "forward_mode",
                        format!("{mode:?} is not one of {}", FORWARD_MODES.join(", ")),
                    ));
                }
            }
        }
        Ok(())
    }

    fn build_command(&self, config: &EffectiveConfig) -> String {
        let mut command = CommandLine::new(&config.env, &self.executable);
        if let Some(cores) = config.arg("cores").and_then(core_list) {
            command.arg_value("-l", cores);
        }
        command.flags(EAL_FLAGS, &config.args).arg("--");
        let interactive = config
            .arg("interactive")
            .and_then(ParamValue::as_bool)
            .unwrap_or(config.role == Role::Intermediate);
        if interactive {
            command.arg("-i");
        }
        command.flags(APP_FLAGS, &config.args).finish()
    }

    fn parse_metrics(&self, result: &mut RoleResult) -> Result<(), MetricsError> {
        let output = result.output.clone();
        let ports = PORT_RE
            .captures_iter(&output.to_ascii_lowercase())
            .filter_map(|captures| captures[1].parse::<i64>().ok())
            .collect::<BTreeSet<_>>();
        if !ports.is_empty() {
            result.record("ports", ports.len() as i64);
        }
        for captures in COUNTER_RE.captures_iter(&output) {
            if let Ok(count) = captures[3].parse::<i64>() {
                let key = format!("{}_{}", captures[1].to_ascii_lowercase(), &captures[2]);
                result.record(key, count);
            }
        }
        scan_rates(&output, "throughput", "throughput", result);
        Ok(())
    }

    fn executable(&self, _: Role) -> &str {
        &self.executable
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::result::MetricValue;

    use super::*;

    fn intermediate() -> EffectiveConfig {
        let mut config = EffectiveConfig::new(Role::Intermediate);
        config.host = Some("10.0.0.2".to_owned());
        config
    }

    #[test]
    fn test_basic_command() {
        let config = intermediate()
            .with_arg("cores", "0-3")
            .with_arg("memory_channels", 4)
            .with_arg("ports", "0,1")
            .with_arg("forward_mode", "io");
        assert_eq!(
            Testpmd::new(None).build_command(&config),
            "dpdk-testpmd -l 0-3 -n 4 -- -i --portlist=0,1 --forward-mode=io"
        );
    }

    #[test]
    fn test_comprehensive_command() {
        let config = intermediate()
            .with_arg("cores", 4)
            .with_arg("memory_channels", 4)
            .with_arg("hugepage_dir", "/mnt/huge")
            .with_arg("file_prefix", "testpmd")
            .with_arg("allow_pci", vec!["0000:01:00.0", "0000:01:00.1"])
            .with_arg("vdev", vec!["net_tap0,iface=tap0"])
            .with_arg("ports", vec![0, 1])
            .with_arg("rx_queues", 2)
            .with_arg("burst_size", 32)
            .with_arg("auto_start", true)
            .with_arg("stats_period", 5)
            .with_env("RTE_SDK", "/opt/dpdk");
        assert_eq!(
            Testpmd::new(None).build_command(&config),
            "RTE_SDK=/opt/dpdk dpdk-testpmd -l 0,1,2,3 -n 4 --huge-dir /mnt/huge \
             --file-prefix testpmd -a 0000:01:00.0 -a 0000:01:00.1 --vdev net_tap0,iface=tap0 \
             -- -i --portlist=0,1 --rxq=2 --burst=32 --auto-start --stats-period=5"
        );
    }

    #[test]
    fn test_client_not_interactive() {
        let mut config = EffectiveConfig::new(Role::Client)
            .with_arg("cores", "0-3")
            .with_arg("allow_pci", "0000:01:00.0")
            .with_arg("ports", "0")
            .with_arg("forward_mode", "flowgen");
        config.target_host = Some("192.168.0.2".to_owned());
        assert_eq!(
            Testpmd::new(Some("/usr/bin/dpdk-testpmd")).build_command(&config),
            "/usr/bin/dpdk-testpmd -l 0-3 -a 0000:01:00.0 -- --portlist=0 --forward-mode=flowgen"
        );
        let config = intermediate().with_arg("interactive", false);
        assert_eq!(Testpmd::new(None).build_command(&config), "dpdk-testpmd --");
    }

    #[test]
    fn test_validate() {
        let runner = Testpmd::new(None);
        assert!(runner.validate(&intermediate().with_arg("cores", 2)).is_ok());
        for config in [
            intermediate().with_arg("cores", 0),
            intermediate().with_arg("memory_channels", 9),
            intermediate().with_arg("ports", "eth0"),
            intermediate().with_arg("ports", ParamValue::List(Vec::new())),
            intermediate().with_arg("forward_mode", "bogus"),
        ] {
            assert!(matches!(
                runner.validate(&config),
                Err(ValidationError::InvalidParam { .. })
            ));
        }
        assert!(runner.validate(&intermediate().with_arg("ports", "0-3")).is_ok());
        let server = EffectiveConfig::new(Role::Server).with_arg("forward_mode", "bogus");
        assert!(runner.validate(&server).is_ok());
    }

    #[test]
    fn test_parse_statistics() {
        let mut result = RoleResult {
            output: indoc! {"
                Statistics for port 0:
                RX-packets: 1000000  RX-errors: 0  RX-bytes: 64000000
                TX-packets: 1000000  TX-errors: 0  TX-bytes: 64000000
                Throughput: 12.5 Mpps
            "}
            .to_owned(),
            ..RoleResult::default()
        };
        Testpmd::new(None).parse_metrics(&mut result).unwrap();
        assert_eq!(result.metrics["ports"], MetricValue::Int(1));
        assert_eq!(result.metrics["rx_packets"], MetricValue::Int(1_000_000));
        assert_eq!(result.metrics["tx_errors"], MetricValue::Int(0));
        assert_eq!(result.metrics["rx_bytes"], MetricValue::Int(64_000_000));
        assert_eq!(result.metric_f64("throughput_mpps"), Some(12.5));
        assert_eq!(result.metric_f64("throughput_pps"), Some(12.5e6));
    }

    #[test]
    fn test_parse_throughput_units() {
        let mut result = RoleResult {
            output: "Throughput: 1.25 Gbps\nPacket rate: 2.5 Mpps\n".to_owned(),
            ..RoleResult::default()
        };
        Testpmd::new(None).parse_metrics(&mut result).unwrap();
        assert_eq!(result.metric_f64("throughput_gbps"), Some(1.25));
        assert_eq!(result.metric_f64("throughput_bps"), Some(1.25e9));
        assert_eq!(result.metric_f64("throughput_mpps"), Some(2.5));
        assert_eq!(result.metric_f64("throughput_pps"), Some(2.5e6));
    }

    #[test]
    fn test_parse_nothing() {
        let mut result = RoleResult {
            output: "testpmd> start\ntestpmd> stop\ntestpmd> quit\n".to_owned(),
            ..RoleResult::default()
        };
        Testpmd::new(None).parse_metrics(&mut result).unwrap();
        assert!(result.metrics.is_empty());
    }
}
