mod common;

use std::sync::Arc;
use std::time::Duration;

use indoc::indoc;
use perfnet_coordinator::{BenchConfig, ConfigError, Coordinator, Phase};
use perfnet_runner::RunnerRegistry;

use common::{Lab, Reply};

const CONFIG: &str = indoc! {r#"
    name = "lab"
    runner = "iperf3"

    [settle]
    mode = "fixed"

    [hosts.a]
    ssh = { host = "10.0.0.1", user = "root", password = "pw" }

    [hosts.b]
    ssh = { host = "10.0.0.2", user = "root", password = "pw" }

    [[tests]]
    name = "forward"
    client = "a"
    server = "b"
    repeat = 2
    delay = "5s"

    [[tests]]
    name = "backward"
    client = "b"
    server = "a"
"#};

fn iperf3(command: &str) -> Reply {
    if command.contains(" -c ") {
        Reply::exit("934 Mbits/sec\n", 0, Duration::from_secs(10))
    } else {
        Reply::exit("", 0, Duration::from_secs(10))
    }
}

fn coordinator(lab: &Arc<Lab>) -> Coordinator {
    let config = BenchConfig::from_toml(CONFIG).unwrap();
    Coordinator::new(config, &RunnerRegistry::with_builtin(), lab.clone()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_run_all() {
    let lab = Arc::new(Lab::new().host("a", iperf3).host("b", iperf3));
    let mut coordinator = coordinator(&lab);
    coordinator.connect_all().await.unwrap();
    assert!(coordinator.is_connected("a") && coordinator.is_connected("b"));
    let mut results = Vec::new();
    coordinator.run_all(&mut results).await;
    coordinator.cleanup().await;

    let runs = results
        .iter()
        .map(|result| (result.scenario.as_str(), result.iteration, result.success))
        .collect::<Vec<_>>();
    assert_eq!(
        runs,
        [("forward", 1, true), ("forward", 2, true), ("backward", 1, true)]
    );
    // Client of the second run starts after the pause and the settle delay.
    let clients = lab
        .runner_calls()
        .into_iter()
        .filter(|call| call.command.contains(" -c "))
        .collect::<Vec<_>>();
    assert_eq!(
        clients[1].at - clients[0].at,
        Duration::from_secs(10 + 5 + 2)
    );
    assert_eq!(lab.gateway("a").closed(), 1);
    assert_eq!(lab.gateway("b").closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_continues_after_failure() {
    let lab = Arc::new(Lab::new().host("a", iperf3).host("b", iperf3));
    let coordinator = coordinator(&lab);
    // Without connections every scenario fails but the run goes on.
    let mut results = Vec::new();
    coordinator.run_all(&mut results).await;
    assert_eq!(results.len(), 3);
    for result in &results {
        assert!(!result.success);
        assert_eq!(result.outcome, Phase::Failed);
        assert!(result.error.as_deref().unwrap().contains("is not connected"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure() {
    let lab = Arc::new(Lab::new().host("a", iperf3).host("b", iperf3).unreachable("b"));
    let mut coordinator = coordinator(&lab);
    let error = coordinator.connect_all().await.unwrap_err();
    assert_eq!(error.failures.len(), 1);
    assert_eq!(error.failures[0].0, "b");
    assert!(error.to_string().contains("host `b` (b is unreachable)"));
    // The connection that succeeded is closed again.
    assert!(!coordinator.is_connected("a"));
    assert_eq!(lab.gateway("a").closed(), 1);
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let lab = Arc::new(Lab::new().host("a", iperf3).host("b", iperf3));
    let mut coordinator = coordinator(&lab);
    coordinator.connect_all().await.unwrap();
    coordinator.cleanup().await;
    coordinator.cleanup().await;
    assert_eq!(lab.gateway("a").closed(), 1);
    assert_eq!(lab.gateway("b").closed(), 1);
}

#[test]
fn test_unknown_runner() {
    let config = BenchConfig::from_toml(&CONFIG.replace("\"iperf3\"", "\"netperf\"")).unwrap();
    let lab = Arc::new(Lab::new());
    let error = Coordinator::new(config, &RunnerRegistry::with_builtin(), lab)
        .err()
        .unwrap();
    assert!(matches!(error, ConfigError::Registry(_)));
    assert_eq!(
        error.to_string(),
        "runner `netperf` not found, available runners: ib_send_bw, iperf3, testpmd"
    );
}

#[test]
fn test_intermediate_runner_support() {
    let source = indoc! {r#"
        name = "lab"
        runner = "ib_send_bw"

        [hosts.a]
        ssh = { host = "10.0.0.1", user = "root", password = "pw" }
        [hosts.b]
        ssh = { host = "10.0.0.2", user = "root", password = "pw" }
        [hosts.c]
        ssh = { host = "10.0.0.3", user = "root", password = "pw" }

        [[tests]]
        name = "relayed"
        client = "a"
        intermediate = "c"
        server = "b"
    "#};
    let lab = Arc::new(Lab::new());
    let config = BenchConfig::from_toml(source).unwrap();
    let error = Coordinator::new(config, &RunnerRegistry::with_builtin(), lab.clone())
        .err()
        .unwrap();
    assert!(error
        .to_string()
        .contains("runner `ib_send_bw` does not support the intermediate role"));

    // A per-role override makes the test runnable.
    let mut config = BenchConfig::from_toml(source).unwrap();
    config.runners.intermediate = Some("testpmd".to_owned());
    assert!(Coordinator::new(config, &RunnerRegistry::with_builtin(), lab).is_ok());
}
