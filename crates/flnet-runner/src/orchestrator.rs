//! Supervision of a background simulation round.
//!
//! A round moves `Idle -> Launching -> Running -> (TimedOut) -> Draining -> Idle`. Every
//! transition after launch happens inside [`AsyncOrchestrator::poll`], one step per call, so
//! the caller's round loop is the only driver and no locking is needed. Launching and timing out
//! complete within a single `start` or `poll` call, so [`SessionPhase`] never reports them.
//!
//! Whichever way the process ends, the caller sees per-client records followed by
//! [`PollOutcome::End`]. After a normal exit, clients the simulator did not report are left out.
//! After a timeout, unreported clients get a synthesized full-duration, zero-throughput record.

use flnet_abstract::{
    ActiveClients, ActiveSet, ClientId, PollOutcome, SimulationConfig, TransferMetric,
};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::command::SimCommand;
use crate::error::NetworkError;
use crate::output::{Summary, parse_last_json};
use crate::process::{Launcher, SimProcess};
use crate::remap::LocalIdMap;

/// Wall-clock budget of a background round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutPolicy {
    /// Minimum budget, however short the simulated duration.
    pub floor: Duration,
    /// Budget as a multiple of the simulated duration.
    pub multiplier: f64,
    /// How long a terminate request is given before the process is killed.
    pub grace: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(10),
            multiplier: 4.0,
            grace: Duration::from_secs(2),
        }
    }
}

impl TimeoutPolicy {
    /// Wall-clock allowance for a simulation of `sim_time` seconds. Saturates at `Duration::MAX`.
    pub fn budget(&self, sim_time: f64) -> Duration {
        let scaled = self.multiplier * sim_time;
        let scaled = if scaled > 0.0 {
            Duration::try_from_secs_f64(scaled).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        scaled.max(self.floor)
    }
}

/// Observable state of the round between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Running,
    Draining,
}

struct RunningRound {
    process: Box<dyn SimProcess>,
    command: SimCommand,
    active: ActiveSet,
    sim_time: f64,
    /// `None` when the budget reaches past what `Instant` can represent.
    deadline: Option<Instant>,
}

enum Session {
    Idle,
    Running(RunningRound),
    Draining(VecDeque<(ClientId, TransferMetric)>),
}

pub struct AsyncOrchestrator<C = SystemClock> {
    clock: C,
    policy: TimeoutPolicy,
    session: Session,
}

impl Default for AsyncOrchestrator<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock, TimeoutPolicy::default())
    }
}

impl<C: Clock> AsyncOrchestrator<C> {
    pub fn new(clock: C, policy: TimeoutPolicy) -> Self {
        Self {
            clock,
            policy,
            session: Session::Idle,
        }
    }

    pub fn set_policy(&mut self, policy: TimeoutPolicy) {
        self.policy = policy;
    }

    pub fn phase(&self) -> SessionPhase {
        match self.session {
            Session::Idle => SessionPhase::Idle,
            Session::Running(_) => SessionPhase::Running,
            Session::Draining(_) => SessionPhase::Draining,
        }
    }

    /// Launch a background round. Fails if the previous round has not been fully drained.
    pub fn start<L: Launcher + ?Sized>(
        &mut self,
        launcher: &L,
        config: &SimulationConfig,
        clients: &ActiveClients,
    ) -> Result<(), NetworkError> {
        if !matches!(self.session, Session::Idle) {
            return Err(NetworkError::Usage(format!(
                "asynchronous round already in progress (phase {:?})",
                self.phase()
            )));
        }

        let active = clients.normalize();
        if active.is_empty() {
            debug!("Empty client selection, nothing to launch");
            return Ok(());
        }

        let command = SimCommand::round(config, active.len());
        debug!("Idle -> Launching: {}", command);
        let process = launcher
            .spawn(&command)
            .map_err(|source| NetworkError::Launch {
                command: command.to_string(),
                source,
            })?;

        let budget = self.policy.budget(config.thz.sim_time);
        info!(
            "Launched background simulation for {} clients (budget {:?})",
            active.len(),
            budget
        );
        self.session = Session::Running(RunningRound {
            process,
            command,
            active,
            sim_time: config.thz.sim_time,
            deadline: self.clock.now().checked_add(budget),
        });
        Ok(())
    }

    /// Advance the round by at most one step. Never blocks beyond the termination grace period.
    pub fn poll(&mut self) -> Result<PollOutcome, NetworkError> {
        match std::mem::replace(&mut self.session, Session::Idle) {
            Session::Idle => return Ok(PollOutcome::End),
            Session::Running(mut round) => {
                let exited = round.process.has_exited().unwrap_or_else(|err| {
                    warn!("Could not query simulator status: {}", err);
                    false
                });
                let queue = if exited {
                    // A failure here leaves the session idle, ready for a fresh round.
                    complete(round)?
                } else if round.deadline.is_some_and(|at| self.clock.now() >= at) {
                    escalate(round, self.policy.grace)
                } else {
                    self.session = Session::Running(round);
                    return Ok(PollOutcome::InProgress);
                };
                debug!(
                    "{:?}: {} records queued",
                    SessionPhase::Draining,
                    queue.len()
                );
                self.session = Session::Draining(queue);
            }
            Session::Draining(queue) => self.session = Session::Draining(queue),
        }
        Ok(self.deliver())
    }

    fn deliver(&mut self) -> PollOutcome {
        if let Session::Draining(queue) = &mut self.session
            && let Some((client, metric)) = queue.pop_front()
        {
            return PollOutcome::Record { client, metric };
        }
        debug!("{:?} -> {:?}", SessionPhase::Draining, SessionPhase::Idle);
        self.session = Session::Idle;
        PollOutcome::End
    }
}

/// The process exited on its own: its output must hold a valid summary.
fn complete(round: RunningRound) -> Result<VecDeque<(ClientId, TransferMetric)>, NetworkError> {
    let RunningRound {
        process,
        command,
        active,
        sim_time,
        ..
    } = round;

    let captured = process.collect().map_err(|source| NetworkError::Capture {
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

    let reported = summary.by_local_id();
    let queue: VecDeque<_> = LocalIdMap::new(&active)
        .iter()
        .filter_map(|(local, client)| {
            let entry = reported.get(&local)?;
            let (end_time, throughput) = entry.measure(sim_time);
            Some((client, TransferMetric::finished(end_time, throughput)))
        })
        .collect();
    info!(
        "Background simulation finished: {} of {} clients reported",
        queue.len(),
        active.len()
    );
    Ok(queue)
}

/// Deadline passed: stop the process, salvage what it printed and fill the gaps.
fn escalate(round: RunningRound, grace: Duration) -> VecDeque<(ClientId, TransferMetric)> {
    let RunningRound {
        mut process,
        active,
        sim_time,
        ..
    } = round;
    warn!("Running -> TimedOut: simulation exceeded its deadline, terminating");

    if let Err(err) = process.terminate() {
        debug!("Terminate request failed: {}", err);
    }
    let mut stopped = process.wait_for(grace).unwrap_or(false);
    if !stopped {
        warn!("Simulator ignored terminate request, killing");
        if let Err(err) = process.kill() {
            debug!("Kill failed: {}", err);
        }
        stopped = process.wait_for(grace).unwrap_or(false);
    }

    let summary = if stopped {
        match process.collect() {
            Ok(captured) => parse_last_json(&captured.stdout).unwrap_or_else(|err| {
                debug!("No usable summary from killed simulator: {}", err);
                Summary::default()
            }),
            Err(err) => {
                debug!("Could not collect killed simulator output: {}", err);
                Summary::default()
            }
        }
    } else {
        warn!("Simulator still alive after kill, abandoning it");
        Summary::default()
    };

    let reported = summary.by_local_id();
    LocalIdMap::new(&active)
        .iter()
        .map(|(local, client)| {
            let metric = match reported.get(&local) {
                Some(entry) => {
                    let (end_time, throughput) = entry.measure(sim_time);
                    TransferMetric::finished(end_time, throughput)
                }
                None => TransferMetric::unreported(sim_time),
            };
            (client, metric)
        })
        .collect()
}
