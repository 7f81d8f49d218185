use crate::active::ClientId;
use crate::metrics::TransferMetric;

/// What a single non-blocking poll of an asynchronous round produced.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The simulation is still running; nothing to hand out yet.
    InProgress,
    /// Exactly one client's result.
    Record {
        client: ClientId,
        metric: TransferMetric,
    },
    /// Every record of the round has been delivered (or no round was started).
    End,
}

impl PollOutcome {
    pub fn is_end(&self) -> bool {
        matches!(self, PollOutcome::End)
    }

    pub fn record(&self) -> Option<(ClientId, TransferMetric)> {
        match self {
            PollOutcome::Record { client, metric } => Some((*client, *metric)),
            _ => None,
        }
    }
}
