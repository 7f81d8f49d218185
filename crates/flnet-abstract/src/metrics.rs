use serde::{Deserialize, Serialize};

/// Bytes per second, or 0.0 when the completion time is not strictly positive.
pub fn throughput(rx_bytes: f64, completion_time: f64) -> f64 {
    if completion_time > 0.0 {
        rx_bytes / completion_time
    } else {
        0.0
    }
}

/// Per-client result of a synchronous round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundMetric {
    /// Seconds until the client's upload completed.
    pub round_time: f64,
    pub throughput: f64,
}

/// Per-client result served by the asynchronous poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferMetric {
    pub start_time: f64,
    pub end_time: f64,
    pub throughput: f64,
}

impl TransferMetric {
    /// A transfer that started with the round and ended at `end_time`.
    pub fn finished(end_time: f64, throughput: f64) -> Self {
        Self {
            start_time: 0.0,
            end_time,
            throughput,
        }
    }

    /// Stand-in for a client the simulator never reported before it was killed:
    /// the whole simulated duration, nothing transferred.
    pub fn unreported(sim_time: f64) -> Self {
        Self {
            start_time: 0.0,
            end_time: sim_time,
            throughput: 0.0,
        }
    }
}
