use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{Level, info, warn};

use flnet_abstract::config::{as_u64, lookup};
use flnet_abstract::{ActiveClients, ClientId, PollOutcome, RoundMetric, SimulationConfig, TransferMetric};
use flnet_runner::NetworkAdapter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Drive the THz network simulator for federated-learning rounds")]
struct Args {
    /// Configuration file (.json or .toml).
    #[arg(short, long, default_value = "./config.json")]
    config: PathBuf,

    /// Run rounds synchronously or through the background poll loop.
    #[arg(long, value_enum, default_value_t = Mode::Sync)]
    mode: Mode,

    /// Fixed client ids for every round, e.g. `3,7,9`.
    #[arg(long, value_delimiter = ',', conflicts_with = "bitmap")]
    clients: Option<Vec<ClientId>>,

    /// Fixed 0/1 selection bitmap for every round, one entry per configured client.
    #[arg(long, value_delimiter = ',')]
    bitmap: Option<Vec<u8>>,

    #[arg(long, default_value_t = 1)]
    rounds: usize,

    /// Clients sampled per round when no fixed selection is given.
    /// Defaults to `clients.per_round` from the configuration, else every client.
    #[arg(long)]
    per_round: Option<usize>,

    /// Seed for per-round client sampling.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Delay between polls in async mode.
    #[arg(long, default_value_t = 200)]
    poll_interval_ms: u64,

    /// Write a JSON trace of every round.
    #[arg(long)]
    trace_out: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info")]
    log: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
enum Mode {
    Sync,
    Async,
}

/// Picks the clients of each round.
enum Selection {
    Fixed(ActiveClients),
    Sampled { per_round: usize, rng: StdRng },
}

impl Selection {
    fn next(&mut self, total: usize) -> ActiveClients {
        match self {
            Selection::Fixed(clients) => clients.clone(),
            Selection::Sampled { per_round, rng } => {
                let amount = (*per_round).min(total);
                ActiveClients::Ids(rand::seq::index::sample(rng, total, amount).into_vec())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(untagged)]
enum Record {
    Round(RoundMetric),
    Transfer(TransferMetric),
}

impl Record {
    fn completion(&self) -> f64 {
        match self {
            Record::Round(m) => m.round_time,
            Record::Transfer(m) => m.end_time,
        }
    }

    fn throughput(&self) -> f64 {
        match self {
            Record::Round(m) => m.throughput,
            Record::Transfer(m) => m.throughput,
        }
    }
}

#[derive(Debug, Serialize)]
struct RoundTrace {
    round: usize,
    mode: Mode,
    clients: Vec<ClientId>,
    wall_ms: u128,
    records: BTreeMap<ClientId, Record>,
}

#[derive(Debug, Serialize)]
struct RunTrace<'a> {
    config: &'a SimulationConfig,
    rounds: Vec<RoundTrace>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level: Level = args
        .log
        .parse()
        .with_context(|| format!("Invalid log level {:?}", args.log))?;
    tracing_subscriber::fmt().with_max_level(level).init();
    info!("flnet-cli starting…");

    let started = Instant::now();
    let root = load_config(&args.config)?;
    let mut adapter = NetworkAdapter::open(&root).context("Failed to set up network simulator")?;
    let total = adapter.config().total_clients;
    let mut selection = args.selection(&root, total);

    let mut rounds = Vec::with_capacity(args.rounds);
    for round in 1..=args.rounds {
        let clients = selection.next(total);
        let ids = clients.normalize().as_slice().to_vec();
        info!("Round {}/{}: {} clients", round, args.rounds, ids.len());

        let round_start = Instant::now();
        let records = match args.mode {
            Mode::Sync => run_sync_round(&adapter, &clients)?,
            Mode::Async => run_async_round(&mut adapter, &clients, args.poll_interval())?,
        };
        log_summary(round, &ids, &records);

        rounds.push(RoundTrace {
            round,
            mode: args.mode,
            clients: ids,
            wall_ms: round_start.elapsed().as_millis(),
            records,
        });
    }

    if let Some(path) = &args.trace_out {
        let trace = RunTrace {
            config: adapter.config(),
            rounds,
        };
        write_trace(path, &trace)?;
    }

    info!("Finished in {:.1?}", started.elapsed());
    Ok(())
}

impl Args {
    fn selection(&self, root: &Value, total: usize) -> Selection {
        if let Some(ids) = &self.clients {
            return Selection::Fixed(ActiveClients::Ids(ids.clone()));
        }
        if let Some(bits) = &self.bitmap {
            if bits.len() != total {
                warn!(
                    "Bitmap has {} entries but {} clients are configured",
                    bits.len(),
                    total
                );
            }
            return Selection::Fixed(ActiveClients::Bitmap(bits.clone()));
        }
        let per_round = self
            .per_round
            .or_else(|| {
                as_u64(lookup(root, &["clients", "per_round"])).and_then(|v| usize::try_from(v).ok())
            })
            .unwrap_or(total);
        Selection::Sampled {
            per_round,
            rng: StdRng::seed_from_u64(self.seed),
        }
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn run_sync_round(
    adapter: &NetworkAdapter,
    clients: &ActiveClients,
) -> Result<BTreeMap<ClientId, Record>> {
    let results = adapter.run_sync(clients).context("Synchronous round failed")?;
    Ok(results
        .into_iter()
        .map(|(id, metric)| (id, Record::Round(metric)))
        .collect())
}

fn run_async_round(
    adapter: &mut NetworkAdapter,
    clients: &ActiveClients,
    interval: Duration,
) -> Result<BTreeMap<ClientId, Record>> {
    adapter
        .start_async(clients)
        .context("Failed to start background round")?;
    let mut records = BTreeMap::new();
    loop {
        match adapter.poll().context("Background round failed")? {
            PollOutcome::InProgress => thread::sleep(interval),
            PollOutcome::Record { client, metric } => {
                info!(
                    "Client {} finished at {:.4}s ({:.1} B/s)",
                    client, metric.end_time, metric.throughput
                );
                records.insert(client, Record::Transfer(metric));
            }
            PollOutcome::End => return Ok(records),
        }
    }
}

fn log_summary(round: usize, ids: &[ClientId], records: &BTreeMap<ClientId, Record>) {
    let slowest = records
        .values()
        .map(Record::completion)
        .fold(0.0_f64, f64::max);
    let mean_throughput = if records.is_empty() {
        0.0
    } else {
        records.values().map(Record::throughput).sum::<f64>() / records.len() as f64
    };
    info!(
        "Round {} | reported: {}/{} | round time: {:.4}s | mean throughput: {:.1} B/s",
        round,
        records.len(),
        ids.len(),
        slowest,
        mean_throughput
    );
}

fn load_config(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let root = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&content).context("Failed to parse TOML config")?,
        _ => serde_json::from_str(&content).context("Failed to parse JSON config")?,
    };
    Ok(root)
}

fn write_trace(path: &Path, trace: &RunTrace<'_>) -> Result<()> {
    let data = serde_json::to_vec_pretty(trace).context("Failed to serialize run trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
