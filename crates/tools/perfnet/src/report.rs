//! Rendering of test results.

use std::fmt::Write;
use std::time::Duration;

use console::style;
use humantime_serde::re::humantime::format_duration;
use perfnet_coordinator::TestResult;
use serde::Serialize;

/// Counts over all results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl Summary {
    pub fn new(results: &[TestResult], duration: Duration) -> Self {
        let passed = results.iter().filter(|result| result.success).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
            duration,
        }
    }
}

#[derive(Serialize)]
struct Report<'r> {
    summary: Summary,
    results: &'r [TestResult],
}

/// Render results as pretty-printed JSON.
pub fn render_json(results: &[TestResult], duration: Duration) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&Report {
        summary: Summary::new(results, duration),
        results,
    })
}

fn status(success: bool) -> String {
    if success {
        style("PASS").green().bold().to_string()
    } else {
        style("FAIL").red().bold().to_string()
    }
}

/// Render results in human-readable form.
pub fn render_text(results: &[TestResult], duration: Duration) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", style("Results").bold().underlined());
    for (index, result) in results.iter().enumerate() {
        let _ = writeln!(
            out,
            "\n{}. {} ({}, run {})  {}  {}",
            index + 1,
            style(&result.scenario).bold(),
            result.topology,
            result.iteration,
            status(result.success),
            format_duration(round(result.duration)),
        );
        if let Some(error) = &result.error {
            let _ = writeln!(out, "   error: {}", style(error).red());
        }
        for (slot, command) in &result.commands {
            let Some(role) = result.results.get(slot) else {
                let _ = writeln!(out, "   {slot}: {}", style("no result").dim());
                let _ = writeln!(out, "     command: {command}");
                continue;
            };
            let _ = writeln!(out, "   {slot}: {}", status(role.success));
            let _ = writeln!(out, "     command: {command}");
            if let Some(error) = &role.error {
                let _ = writeln!(out, "     error: {error}");
            }
            for (name, value) in &role.metrics {
                let _ = writeln!(out, "     {name}: {value}");
            }
            if !role.success {
                let lines = role.output.lines().filter(|line| !line.trim().is_empty());
                for line in lines {
                    let _ = writeln!(out, "     | {line}");
                }
            }
        }
    }
    let summary = Summary::new(results, duration);
    let _ = writeln!(
        out,
        "\n{} tests, {} passed, {} failed in {}",
        summary.total,
        style(summary.passed).green(),
        if summary.failed > 0 {
            style(summary.failed).red()
        } else {
            style(summary.failed)
        },
        format_duration(round(summary.duration)),
    );
    out
}

/// Drop sub-millisecond precision from a duration.
fn round(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}
