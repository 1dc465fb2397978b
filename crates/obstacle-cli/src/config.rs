//! Configuration file – `obstacles.toml`.
//!
//! ```toml
//! frame_id = "world"
//! use_tracking = true
//!
//! [[static_transforms]]
//! parent_frame = "world"
//! child_frame = "mocap"
//! translation = [0.0, 0.0, 0.5]
//!
//! [obstacles.obstacle1]
//! type = "sphere"
//! radius = 0.1
//! translation = [1.0, 0.0, 0.0]
//! rotation = [0.0, 0.0, 0.0, 1.0]
//! ```
//!
//! Obstacles keep the order in which they appear in the file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use obstacle_runtime::{RawObstacleSpec, VisualizerConfig};
use obstacle_types::{ConfigError, Quaternion, Transform3D, TransformStamped, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Frame every marker is expressed in.
    #[serde(default = "default_frame_id")]
    pub frame_id: String,

    /// Follow `/obstacles/<id>/mocap` instead of keeping configured poses.
    #[serde(default)]
    pub use_tracking: bool,

    /// Spawn the obstacles into the simulator at startup.
    #[serde(default)]
    pub spawn_in_sim: bool,

    #[serde(default = "default_broadcast_period_ms")]
    pub broadcast_period_ms: u64,

    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    #[serde(default = "default_spawn_timeout_ms")]
    pub spawn_timeout_ms: u64,

    #[serde(default)]
    pub extrapolation_tolerance_ms: u64,

    /// Serve the rosbridge-style WebSocket bridge on this port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_port: Option<u16>,

    /// rosbridge endpoint of the simulator, e.g. `ws://localhost:9090`.
    /// Without it, spawning goes to the in-process simulator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rosbridge_url: Option<String>,

    #[serde(default)]
    pub static_transforms: Vec<StaticTransform>,

    #[serde(default)]
    pub obstacles: IndexMap<String, RawObstacleSpec>,
}

/// A fixed frame-tree edge declared in the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticTransform {
    pub parent_frame: String,
    pub child_frame: String,
    pub translation: [f64; 3],
    /// `[x, y, z, w]`.
    #[serde(default = "identity_rotation")]
    pub rotation: [f64; 4],
}

fn default_frame_id() -> String {
    "world".to_string()
}
fn default_broadcast_period_ms() -> u64 {
    100
}
fn default_lookup_timeout_ms() -> u64 {
    100
}
fn default_spawn_timeout_ms() -> u64 {
    5000
}
fn identity_rotation() -> [f64; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frame_id: default_frame_id(),
            use_tracking: false,
            spawn_in_sim: false,
            broadcast_period_ms: default_broadcast_period_ms(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
            spawn_timeout_ms: default_spawn_timeout_ms(),
            extrapolation_tolerance_ms: 0,
            bridge_port: None,
            rosbridge_url: None,
            static_transforms: Vec::new(),
            obstacles: IndexMap::new(),
        }
    }
}

impl Config {
    /// Reject settings the runtime cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_id.trim().is_empty() {
            return Err(ConfigError::Parse("frame_id must not be empty".into()));
        }
        if self.broadcast_period_ms == 0 {
            return Err(ConfigError::Parse(
                "broadcast_period_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn visualizer_config(&self) -> VisualizerConfig {
        let stamp = Utc::now();
        VisualizerConfig {
            frame_id: self.frame_id.clone(),
            use_tracking: self.use_tracking,
            spawn_in_sim: self.spawn_in_sim,
            broadcast_period: Duration::from_millis(self.broadcast_period_ms),
            lookup_timeout: Duration::from_millis(self.lookup_timeout_ms),
            spawn_timeout: Duration::from_millis(self.spawn_timeout_ms),
            extrapolation_tolerance: Duration::from_millis(self.extrapolation_tolerance_ms),
            static_transforms: self
                .static_transforms
                .iter()
                .map(|st| TransformStamped {
                    parent_frame: st.parent_frame.clone(),
                    child_frame: st.child_frame.clone(),
                    transform: Transform3D::new(
                        Vec3::from(st.translation),
                        Quaternion::from_xyzw(st.rotation),
                    ),
                    stamp,
                    is_static: true,
                })
                .collect(),
        }
    }
}

/// Read, parse, override and validate the file at `path`.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        details: e.to_string(),
    })?;
    let mut cfg = parse(&raw)?;
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    cfg.validate()?;
    Ok(cfg)
}

pub fn parse(raw: &str) -> Result<Config, ConfigError> {
    toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Apply `OBSTACLE_*` overrides, reading variables through `lookup`.
///
/// | Variable | Config field |
/// |---|---|
/// | `OBSTACLE_FRAME_ID` | `frame_id` |
/// | `OBSTACLE_USE_TRACKING` | `use_tracking` |
/// | `OBSTACLE_SPAWN_IN_SIM` | `spawn_in_sim` |
/// | `OBSTACLE_BRIDGE_PORT` | `bridge_port` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("OBSTACLE_FRAME_ID") {
        cfg.frame_id = v;
    }
    if let Some(v) = lookup("OBSTACLE_USE_TRACKING")
        && let Some(flag) = parse_flag(&v)
    {
        cfg.use_tracking = flag;
    }
    if let Some(v) = lookup("OBSTACLE_SPAWN_IN_SIM")
        && let Some(flag) = parse_flag(&v)
    {
        cfg.spawn_in_sim = flag;
    }
    if let Some(v) = lookup("OBSTACLE_BRIDGE_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.bridge_port = Some(port);
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
