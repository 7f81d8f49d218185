pub mod adapter;
pub mod clock;
pub mod command;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod process;
pub mod remap;
pub mod sync_runner;

#[cfg(test)]
mod testing;

pub use adapter::NetworkAdapter;
pub use clock::{Clock, SystemClock};
pub use command::{SimCommand, round_args};
pub use error::NetworkError;
pub use orchestrator::{AsyncOrchestrator, SessionPhase, TimeoutPolicy};
pub use output::{ParseError, RawResultEntry, Summary, parse_last_json};
pub use process::{Captured, Exit, Launcher, OsLauncher, SimProcess};
pub use remap::LocalIdMap;
pub use sync_runner::run_round;
