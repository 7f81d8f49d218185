use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

/// Errors raised while resolving the adapter configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The root of the configuration store is not a map, so no path can be traversed.
    #[error("configuration root must be an object, found {found}")]
    NotAnObject { found: &'static str },
}

/// Traffic, geometry and antenna knobs forwarded to the THz simulation program.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThzConfig {
    pub pkt_size: u32,
    /// Simulated duration in seconds. Also the fallback completion time of a client.
    pub sim_time: f64,
    pub interval_us: u32,
    /// Handshake variant (0, 2 or 3 way).
    pub way: u32,
    pub radius: f64,
    pub beamwidth: f64,
    pub gain: f64,
    pub ap_angle: f64,
    pub sta_angle: f64,
    pub use_white_list: u32,
}

impl Default for ThzConfig {
    fn default() -> Self {
        Self {
            pkt_size: 600,
            sim_time: 0.8,
            interval_us: 20,
            way: 3,
            radius: 0.5,
            beamwidth: 40.0,
            gain: 30.0,
            ap_angle: 0.0,
            sta_angle: 180.0,
            use_white_list: 0,
        }
    }
}

/// Where the simulator lives and how it is invoked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatorLocation {
    /// Working directory of every build and run.
    pub workdir: PathBuf,
    /// Program plus leading arguments, e.g. `["./ns3"]`.
    pub launcher: Vec<String>,
    /// Scenario passed to `<launcher> run`.
    pub program: String,
}

impl Default for SimulatorLocation {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("../ns3-fl-network"),
            launcher: vec!["./ns3".to_string()],
            program: "scratch/thz-macro-central".to_string(),
        }
    }
}

/// Immutable snapshot of everything a simulation round needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationConfig {
    pub total_clients: usize,
    /// Bytes each client uploads per round.
    pub model_bytes: u64,
    pub thz: ThzConfig,
    pub simulator: SimulatorLocation,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            total_clients: 1,
            model_bytes: 1600,
            thz: ThzConfig::default(),
            simulator: SimulatorLocation::default(),
        }
    }
}

impl SimulationConfig {
    /// Resolve a configuration from a nested store.
    ///
    /// Every field has a default; missing keys, wrong types and unparsable values fall back to it.
    /// Only a root that cannot be traversed is rejected.
    pub fn resolve(root: &Value) -> Result<Self, ConfigError> {
        if !root.is_object() {
            return Err(ConfigError::NotAnObject {
                found: kind_of(root),
            });
        }

        if let Some(kind) = lookup(root, &["network", "type"]).and_then(Value::as_str)
            && kind != "thz"
        {
            warn!("network.type is {:?}, driving the THz simulator anyway", kind);
        }

        let defaults = Self::default();
        let t = &defaults.thz;
        let thz = |key: &str| lookup(root, &["network", "thz", key]);

        let thz_cfg = ThzConfig {
            pkt_size: as_u32(thz("pkt_size")).unwrap_or(t.pkt_size),
            sim_time: as_f64(thz("sim_time")).unwrap_or(t.sim_time),
            interval_us: as_u32(thz("interval_us")).unwrap_or(t.interval_us),
            way: as_u32(thz("way")).unwrap_or(t.way),
            radius: as_f64(thz("radius")).unwrap_or(t.radius),
            beamwidth: as_f64(thz("beamwidth")).unwrap_or(t.beamwidth),
            gain: as_f64(thz("gain")).unwrap_or(t.gain),
            ap_angle: as_f64(thz("ap_angle")).unwrap_or(t.ap_angle),
            sta_angle: as_f64(thz("sta_angle")).unwrap_or(t.sta_angle),
            use_white_list: as_u32(thz("useWhiteList"))
                .or_else(|| as_u32(thz("use_white_list")))
                .unwrap_or(t.use_white_list),
        };

        let sim = |key: &str| lookup(root, &["network", "simulator", key]);
        let simulator = SimulatorLocation {
            workdir: sim("path")
                .and_then(Value::as_str)
                .map(PathBuf::from)
                .unwrap_or(defaults.simulator.workdir),
            launcher: sim("launcher")
                .and_then(as_launcher)
                .unwrap_or(defaults.simulator.launcher),
            program: sim("program")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(defaults.simulator.program),
        };

        Ok(Self {
            total_clients: as_u64(lookup(root, &["clients", "total"]))
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(defaults.total_clients),
            model_bytes: as_u64(lookup(root, &["model", "size"])).unwrap_or(defaults.model_bytes),
            thz: thz_cfg,
            simulator,
        })
    }
}

/// Walk `path` through nested objects, returning `None` as soon as a segment is missing.
pub fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |cur, key| cur.as_object()?.get(*key))
}

/// Read a non-negative integer, accepting numbers and numeric strings.
pub fn as_u64(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f.trunc() as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_u32(value: Option<&Value>) -> Option<u32> {
    as_u64(value).and_then(|v| u32::try_from(v).ok())
}

fn as_f64(value: Option<&Value>) -> Option<f64> {
    let parsed: Option<f64> = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

fn as_launcher(value: &Value) -> Option<Vec<String>> {
    let parts: Vec<String> = match value {
        Value::String(s) => s.split_whitespace().map(str::to_string).collect(),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect::<Option<_>>()?,
        _ => return None,
    };
    (!parts.is_empty()).then_some(parts)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
