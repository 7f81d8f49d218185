use flnet_abstract::{ActiveClients, ClientId, PollOutcome, RoundMetric, SimulationConfig};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::command::SimCommand;
use crate::error::NetworkError;
use crate::orchestrator::{AsyncOrchestrator, SessionPhase, TimeoutPolicy};
use crate::process::{Launcher, OsLauncher};
use crate::sync_runner::run_round;

/// The coordinator-facing handle on the network simulator.
///
/// Construction resolves the configuration and builds the simulator once. Rounds are then run
/// either synchronously with [`run_sync`](Self::run_sync) or in the background with
/// [`start_async`](Self::start_async) and [`poll`](Self::poll). Both paths share the simulator
/// working directory, so they must not be used concurrently.
pub struct NetworkAdapter<L = OsLauncher, C = SystemClock> {
    config: SimulationConfig,
    launcher: L,
    orchestrator: AsyncOrchestrator<C>,
}

impl NetworkAdapter {
    /// Resolve `root` and build the simulator on the local machine.
    pub fn open(root: &Value) -> Result<Self, NetworkError> {
        let config = SimulationConfig::resolve(root)?;
        Self::new(config, OsLauncher, SystemClock)
    }
}

impl<L: Launcher, C: Clock> NetworkAdapter<L, C> {
    pub fn new(config: SimulationConfig, launcher: L, clock: C) -> Result<Self, NetworkError> {
        build_simulator(&launcher, &config)?;
        Ok(Self {
            config,
            launcher,
            orchestrator: AsyncOrchestrator::new(clock, TimeoutPolicy::default()),
        })
    }

    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.orchestrator.set_policy(policy);
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.orchestrator.phase()
    }

    /// Run one round to completion, blocking the caller.
    pub fn run_sync(
        &self,
        clients: &ActiveClients,
    ) -> Result<BTreeMap<ClientId, RoundMetric>, NetworkError> {
        run_round(&self.launcher, &self.config, clients)
    }

    /// Start a background round; drive it with [`poll`](Self::poll).
    pub fn start_async(&mut self, clients: &ActiveClients) -> Result<(), NetworkError> {
        self.orchestrator
            .start(&self.launcher, &self.config, clients)
    }

    /// Non-blocking step of the background round.
    pub fn poll(&mut self) -> Result<PollOutcome, NetworkError> {
        self.orchestrator.poll()
    }
}

fn build_simulator<L: Launcher + ?Sized>(
    launcher: &L,
    config: &SimulationConfig,
) -> Result<(), NetworkError> {
    let command = SimCommand::build(&config.simulator);
    info!(
        "Building simulator in {}: {}",
        config.simulator.workdir.display(),
        command
    );
    let captured = launcher
        .run(&command)
        .map_err(|source| NetworkError::Launch {
            command: command.to_string(),
            source,
        })?;
    if !captured.exit.success() {
        return Err(NetworkError::Build {
            command: command.to_string(),
            exit: captured.exit.to_string(),
            stdout: captured.stdout,
            stderr: captured.stderr,
        });
    }
    info!("Simulator build finished");
    Ok(())
}
