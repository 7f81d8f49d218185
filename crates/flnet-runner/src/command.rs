use flnet_abstract::{SimulationConfig, SimulatorLocation};
use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;

/// A fully resolved simulator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimCommand {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
}

impl SimCommand {
    fn with_launcher(location: &SimulatorLocation, tail: Vec<String>) -> Self {
        let (program, leading) = match location.launcher.split_first() {
            Some((program, leading)) => (program.clone(), leading.to_vec()),
            None => (String::new(), Vec::new()),
        };
        let mut args = leading;
        args.extend(tail);
        Self {
            program,
            args,
            workdir: location.workdir.clone(),
        }
    }

    /// `<launcher> build`, run once before any round.
    pub fn build(location: &SimulatorLocation) -> Self {
        Self::with_launcher(location, vec!["build".to_string()])
    }

    /// `<launcher> run <program> -- <flags>` for a round with `active_count` participants.
    pub fn round(config: &SimulationConfig, active_count: usize) -> Self {
        let tail = round_args(
            config.total_clients,
            active_count,
            config.model_bytes,
            config,
        );
        Self::with_launcher(&config.simulator, tail)
    }
}

/// Positional and flagged arguments for one round, in the order the simulator expects.
pub fn round_args(
    total_clients: usize,
    active_count: usize,
    model_bytes: u64,
    config: &SimulationConfig,
) -> Vec<String> {
    let t = &config.thz;
    vec![
        "run".to_string(),
        config.simulator.program.clone(),
        "--".to_string(),
        format!("--nodeNum={total_clients}"),
        format!("--clients={active_count}"),
        format!("--modelBytes={model_bytes}"),
        format!("--pktSize={}", t.pkt_size),
        format!("--simTime={}", t.sim_time),
        format!("--intervalUs={}", t.interval_us),
        format!("--way={}", t.way),
        format!("--radius={}", t.radius),
        format!("--beamwidth={}", t.beamwidth),
        format!("--gain={}", t.gain),
        format!("--apAngle={}", t.ap_angle),
        format!("--staAngle={}", t.sta_angle),
        format!("--useWhiteList={}", t.use_white_list),
    ]
}

fn quote(word: &str) -> Cow<'_, str> {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}

impl fmt::Display for SimCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}
