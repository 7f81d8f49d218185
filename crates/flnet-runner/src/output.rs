//! Extraction of the simulator's JSON summary from captured standard output.
//!
//! The simulator prints arbitrary progress and debug lines and exactly one summary object.
//! Scanning from the end makes the parser indifferent to how much noise precedes it.

use flnet_abstract::throughput;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON summary found in simulator output")]
    NoSummary,
    #[error("malformed JSON summary: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The simulator's terminal summary line.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    #[serde(default, deserialize_with = "results_or_empty")]
    pub client_results: Vec<RawResultEntry>,
}

fn results_or_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<RawResultEntry>, D::Error> {
    Ok(Option::<Vec<RawResultEntry>>::deserialize(d)?.unwrap_or_default())
}

/// One client record as emitted by the simulator, keyed by local index.
///
/// Decoding never fails: fields are coerced from numbers or numeric strings, and anything
/// unusable falls back to an unknown id (`-1`), zero bytes or no completion time.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResultEntry {
    pub id: i64,
    pub rx_bytes: f64,
    // Completion time has gone by several names across simulator builds.
    pub done_at: Option<f64>,
    pub end_time: Option<f64>,
    pub round_time: Option<f64>,
}

impl<'de> Deserialize<'de> for RawResultEntry {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Value::deserialize(d).map(|v| Self::from_value(&v))
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|f: &f64| f.is_finite())
}

impl RawResultEntry {
    pub fn from_value(entry: &Value) -> Self {
        let field = |key: &str| entry.get(key);
        Self {
            id: field("id")
                .and_then(Value::as_i64)
                .or_else(|| number(field("id")).map(|f| f.trunc() as i64))
                .unwrap_or(-1),
            rx_bytes: number(field("rxBytes")).unwrap_or(0.0),
            done_at: number(field("doneAt")),
            end_time: number(field("endTime")),
            round_time: number(field("roundTime")),
        }
    }

    /// First completion time present, in `doneAt`, `endTime`, `roundTime` order.
    pub fn completion_time(&self) -> Option<f64> {
        self.done_at.or(self.end_time).or(self.round_time)
    }

    /// Completion time and throughput for this client.
    ///
    /// A missing time means the client ran for the whole simulation. A non-positive time is
    /// reported as the simulated duration with zero throughput.
    pub fn measure(&self, sim_time: f64) -> (f64, f64) {
        match self.completion_time() {
            Some(t) if t > 0.0 => (t, throughput(self.rx_bytes, t)),
            Some(_) => (sim_time, 0.0),
            None => (sim_time, throughput(self.rx_bytes, sim_time)),
        }
    }
}

impl Summary {
    /// Entries keyed by local index; a repeated index keeps the last entry.
    pub fn by_local_id(&self) -> HashMap<i64, &RawResultEntry> {
        self.client_results.iter().map(|e| (e.id, e)).collect()
    }
}

/// Decode the last line of `stdout` that, once trimmed, looks like a JSON object.
pub fn parse_last_json(stdout: &str) -> Result<Summary, ParseError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|s| s.starts_with('{') && s.ends_with('}'))
        .ok_or(ParseError::NoSummary)?;
    debug!("Simulator summary line: {}", line);
    Ok(serde_json::from_str(line)?)
}
