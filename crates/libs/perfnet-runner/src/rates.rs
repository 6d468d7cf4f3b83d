//! Scanning of human-readable rate measurements.

use std::sync::LazyLock;

use regex::Regex;

use crate::result::RoleResult;

/// Family of units that are normalized together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Family {
    Bits,
    Bytes,
    Packets,
}

struct Unit {
    suffix: &'static str,
    family: Family,
    /// Metric key suffix of the native unit.
    native: &'static str,
    /// Factor converting the native value to bits or packets per second.
    scale: f64,
}

const fn unit(suffix: &'static str, family: Family, native: &'static str, scale: f64) -> Unit {
    Unit {
        suffix,
        family,
        native,
        scale,
    }
}

/// Recognized unit suffixes, longest first within each prefix group.
const UNITS: &[Unit] = &[
    unit("Gbits/sec", Family::Bits, "gbps", 1e9),
    unit("Mbits/sec", Family::Bits, "mbps", 1e6),
    unit("Kbits/sec", Family::Bits, "kbps", 1e3),
    unit("bits/sec", Family::Bits, "bps", 1.0),
    unit("Gb/sec", Family::Bits, "gbps", 1e9),
    unit("Gbps", Family::Bits, "gbps", 1e9),
    unit("Mbps", Family::Bits, "mbps", 1e6),
    unit("Kbps", Family::Bits, "kbps", 1e3),
    unit("GBytes/sec", Family::Bytes, "gbytes_per_sec", 8e9),
    unit("MBytes/sec", Family::Bytes, "mbytes_per_sec", 8e6),
    unit("KBytes/sec", Family::Bytes, "kbytes_per_sec", 8e3),
    unit("GB/sec", Family::Bytes, "gbytes_per_sec", 8e9),
    unit("MB/sec", Family::Bytes, "mbytes_per_sec", 8e6),
    unit("KB/sec", Family::Bytes, "kbytes_per_sec", 8e3),
    unit("Gpps", Family::Packets, "gpps", 1e9),
    unit("Mpps", Family::Packets, "mpps", 1e6),
    unit("Kpps", Family::Packets, "kpps", 1e3),
    unit("pps", Family::Packets, "pps", 1.0),
];

static RATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let suffixes = UNITS
        .iter()
        .map(|unit| regex::escape(unit.suffix))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(\d+(?:\.\d+)?)\s*({suffixes})(?:\s|$)"))
        .expect("rate pattern must be valid")
});

/// Record the first rate of every unit family found in `text`.
///
/// Bit and byte rates are recorded in their native unit as `{bandwidth}_{unit}` and
/// normalized to `{bandwidth}_bps`. Packet rates use `{packets}_{unit}` and
/// `{packets}_pps`. Later matches of a family already seen are ignored, as are metrics
/// that are already present.
pub fn scan_rates(text: &str, bandwidth: &str, packets: &str, result: &mut RoleResult) {
    let mut seen = Vec::new();
    for captures in RATE_RE.captures_iter(text) {
        let Some(unit) = UNITS.iter().find(|unit| unit.suffix == &captures[2]) else {
            continue;
        };
        if seen.contains(&unit.family) {
            continue;
        }
        let Ok(value) = captures[1].parse::<f64>() else {
            continue;
        };
        seen.push(unit.family);
        let prefix = match unit.family {
            Family::Bits | Family::Bytes => bandwidth,
            Family::Packets => packets,
        };
        record_rate(result, prefix, unit, value);
    }
}

/// Record a value given in the unit with the given suffix under `prefix`.
///
/// Returns `false` if the unit is not known.
pub fn record_in_unit(result: &mut RoleResult, prefix: &str, suffix: &str, value: f64) -> bool {
    match UNITS.iter().find(|unit| unit.suffix == suffix) {
        Some(unit) => {
            record_rate(result, prefix, unit, value);
            true
        }
        None => false,
    }
}

fn record_rate(result: &mut RoleResult, prefix: &str, unit: &Unit, value: f64) {
    let normalized = match unit.family {
        Family::Bits | Family::Bytes => "bps",
        Family::Packets => "pps",
    };
    result.record(format!("{prefix}_{}", unit.native), value);
    result.record(format!("{prefix}_{normalized}"), value * unit.scale);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str) -> RoleResult {
        let mut result = RoleResult::default();
        scan_rates(text, "bandwidth", "packet_rate", &mut result);
        result
    }

    #[test]
    fn test_bits_per_second() {
        let result = scan("[  5]   0.00-10.00  sec  1.09 GBytes   934 Mbits/sec   15");
        assert_eq!(result.metric_f64("bandwidth_mbps"), Some(934.0));
        assert_eq!(result.metric_f64("bandwidth_bps"), Some(934_000_000.0));
        assert_eq!(result.metrics.len(), 2);
    }

    #[test]
    fn test_first_match_per_family() {
        let result = scan("1.5 Gbits/sec\n900 Mbits/sec\n12.5 Mpps\n3 Kpps\n");
        assert_eq!(result.metric_f64("bandwidth_gbps"), Some(1.5));
        assert_eq!(result.metric_f64("bandwidth_bps"), Some(1.5e9));
        assert_eq!(result.metric_f64("bandwidth_mbps"), None);
        assert_eq!(result.metric_f64("packet_rate_mpps"), Some(12.5));
        assert_eq!(result.metric_f64("packet_rate_pps"), Some(12.5e6));
        assert_eq!(result.metric_f64("packet_rate_kpps"), None);
    }

    #[test]
    fn test_bytes_per_second() {
        let result = scan("average 11200.12 MB/sec");
        assert_eq!(result.metric_f64("bandwidth_mbytes_per_sec"), Some(11200.12));
        let bps = result.metric_f64("bandwidth_bps").unwrap();
        assert!((bps - 11200.12 * 8e6).abs() < 1.0);
    }

    #[test]
    fn test_no_rates() {
        let result = scan("Connecting to host 10.0.0.2, port 5201\n1.09 GBytes\n");
        assert!(result.metrics.is_empty());
    }
}
