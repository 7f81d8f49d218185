//! End-to-end rounds against a shell script that mimics the simulator's CLI and output.
#![cfg(unix)]

use flnet_abstract::{ActiveClients, PollOutcome, SimulationConfig, TransferMetric};
use flnet_runner::{NetworkAdapter, NetworkError, OsLauncher, SystemClock, TimeoutPolicy};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

fn sandbox(name: &str, run_body: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("flnet-{}-{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let script = format!(
        "case \"$1\" in\n  build) echo \"[1/1] Linking\"; exit 0 ;;\nesac\n{run_body}\n"
    );
    fs::write(dir.join("fake-ns3.sh"), script).unwrap();
    dir
}

fn config(dir: &Path, sim_time: f64) -> SimulationConfig {
    let mut config = SimulationConfig {
        total_clients: 10,
        ..Default::default()
    };
    config.thz.sim_time = sim_time;
    config.simulator.workdir = dir.to_path_buf();
    config.simulator.launcher = vec!["sh".into(), "fake-ns3.sh".into()];
    config
}

fn adapter(dir: &Path, sim_time: f64) -> NetworkAdapter<OsLauncher, SystemClock> {
    NetworkAdapter::new(config(dir, sim_time), OsLauncher, SystemClock).unwrap()
}

const SUMMARY: &str = r#"echo "PHY: beam alignment done"
echo "args: $*"
echo '{"clientResults":[{"id":0,"rxBytes":1000,"doneAt":0.5},{"id":2,"rxBytes":2000,"doneAt":1.0}]}'
echo "Simulation finished""#;

#[test]
fn sync_round_through_real_process() {
    let dir = sandbox("sync", SUMMARY);
    let adapter = adapter(&dir, 0.8);

    let out = adapter
        .run_sync(&ActiveClients::Ids(vec![3, 7, 9]))
        .unwrap();
    assert_eq!(out.len(), 2);
    assert_eq!(out[&3].round_time, 0.5);
    assert_eq!(out[&3].throughput, 2000.0);
    assert_eq!(out[&9].throughput, 2000.0);
    assert!(!out.contains_key(&7));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn failing_run_surfaces_stderr() {
    let dir = sandbox("fail", "echo 'aborting' >&2\nexit 3");
    let adapter = adapter(&dir, 0.8);

    let err = adapter.run_sync(&ActiveClients::Ids(vec![1])).unwrap_err();
    assert!(matches!(err, NetworkError::Run { .. }));
    assert!(err.to_string().contains("aborting"));
    assert!(err.to_string().contains("exit code 3"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn async_round_completes_normally() {
    let dir = sandbox("async", SUMMARY);
    let mut adapter = adapter(&dir, 0.8);

    adapter
        .start_async(&ActiveClients::Bitmap(vec![0, 0, 0, 1, 0, 0, 0, 1, 0, 1]))
        .unwrap();
    let records = poll_to_end(&mut adapter, Duration::from_secs(10));
    assert_eq!(
        records.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
        vec![3, 9]
    );

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn async_round_is_killed_at_deadline() {
    // Ignores SIGTERM, prints a partial summary, then hangs.
    let body = r#"trap '' TERM
echo '{"clientResults":[{"id":1,"rxBytes":500,"endTime":0.25}]}'
sleep 30"#;
    let dir = sandbox("timeout", body);
    let mut adapter = adapter(&dir, 0.05).with_timeout_policy(TimeoutPolicy {
        floor: Duration::from_millis(300),
        multiplier: 1.0,
        grace: Duration::from_millis(200),
    });

    let started = Instant::now();
    adapter.start_async(&ActiveClients::Ids(vec![5, 6])).unwrap();
    assert_eq!(adapter.poll().unwrap(), PollOutcome::InProgress);

    let records = poll_to_end(&mut adapter, Duration::from_secs(10));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(
        records,
        vec![
            (5, TransferMetric::unreported(0.05)),
            (
                6,
                TransferMetric {
                    start_time: 0.0,
                    end_time: 0.25,
                    throughput: 2000.0
                }
            ),
        ]
    );

    let _ = fs::remove_dir_all(dir);
}

fn poll_to_end<L, C>(
    adapter: &mut NetworkAdapter<L, C>,
    limit: Duration,
) -> Vec<(usize, TransferMetric)>
where
    L: flnet_runner::Launcher,
    C: flnet_runner::Clock,
{
    let started = Instant::now();
    let mut records = Vec::new();
    loop {
        assert!(started.elapsed() < limit, "round never finished");
        match adapter.poll().unwrap() {
            PollOutcome::InProgress => thread::sleep(Duration::from_millis(20)),
            PollOutcome::Record { client, metric } => records.push((client, metric)),
            PollOutcome::End => return records,
        }
    }
}
