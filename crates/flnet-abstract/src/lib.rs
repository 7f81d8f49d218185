pub mod active;
pub mod config;
pub mod metrics;
pub mod poll;

pub use active::{ActiveClients, ActiveSet, ClientId, HasClientId};
pub use config::{ConfigError, SimulationConfig, SimulatorLocation, ThzConfig};
pub use metrics::{RoundMetric, TransferMetric, throughput};
pub use poll::PollOutcome;
