use flnet_abstract::{ActiveClients, ClientId, RoundMetric, SimulationConfig};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::command::SimCommand;
use crate::error::NetworkError;
use crate::output::parse_last_json;
use crate::process::Launcher;
use crate::remap::LocalIdMap;

/// Run one round to completion and return a metric for every client the simulator reported.
///
/// Reported local indices outside the active set are dropped. An empty selection returns
/// immediately without launching anything.
pub fn run_round<L: Launcher + ?Sized>(
    launcher: &L,
    config: &SimulationConfig,
    clients: &ActiveClients,
) -> Result<BTreeMap<ClientId, RoundMetric>, NetworkError> {
    let active = clients.normalize();
    if active.is_empty() {
        debug!("Empty client selection, skipping simulator run");
        return Ok(BTreeMap::new());
    }

    let command = SimCommand::round(config, active.len());
    info!("Running simulator for {} clients: {}", active.len(), command);
    let captured = launcher
        .run(&command)
        .map_err(|source| NetworkError::Launch {
            command: command.to_string(),
            source,
        })?;

    if !captured.exit.success() {
        return Err(NetworkError::Run {
            command: command.to_string(),
            exit: captured.exit.to_string(),
            stdout: captured.stdout,
            stderr: captured.stderr,
        });
    }

    let summary = match parse_last_json(&captured.stdout) {
        Ok(summary) => summary,
        Err(source) => {
            return Err(NetworkError::Parse {
                command: command.to_string(),
                source,
                stdout: captured.stdout,
                stderr: captured.stderr,
            });
        }
    };

    let ids = LocalIdMap::new(&active);
    let mut out = BTreeMap::new();
    for entry in &summary.client_results {
        let Some(client) = ids.logical(entry.id) else {
            debug!("Dropping result for unknown local id {}", entry.id);
            continue;
        };
        let (round_time, throughput) = entry.measure(config.thz.sim_time);
        out.insert(
            client,
            RoundMetric {
                round_time,
                throughput,
            },
        );
    }

    info!(
        "Simulator reported {} of {} clients",
        out.len(),
        active.len()
    );
    Ok(out)
}
