//! `obstacle-types` – shared vocabulary of the obstacle scene.
//!
//! - [`geometry`] – vectors, quaternions, poses and rigid transforms.
//! - [`obstacle`] – typed obstacle descriptors, markers and spawn blueprints.
//!
//! The crate root holds the event envelope routed over the event bus and the
//! error types shared by every other crate.

pub mod geometry;
pub mod obstacle;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use geometry::{Pose, Quaternion, Transform3D, Vec3};
pub use obstacle::{
    MarkerPrimitive, MarkerState, ObstacleDescriptor, RenderShape, Rgba, ShapeKind, ShapeParams,
    SpawnBlueprint,
};

/// A pose tagged with the frame it is expressed in and the instant it was
/// measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseStamped {
    pub pose: Pose,
    pub frame_id: String,
    pub stamp: DateTime<Utc>,
}

/// One edge of the frame tree: the pose of `child_frame` in `parent_frame`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStamped {
    pub parent_frame: String,
    pub child_frame: String,
    pub transform: Transform3D,
    pub stamp: DateTime<Utc>,
    /// Static edges are valid at every instant.
    #[serde(default)]
    pub is_static: bool,
}

/// A copy of every marker in the scene, taken atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub stamp: DateTime<Utc>,
    pub markers: Vec<MarkerState>,
}

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"obstacle-runtime::broadcaster"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum EventPayload {
    /// Periodic full-scene broadcast.
    SceneUpdate(SceneSnapshot),
    /// Untransformed sample from an external tracking source.
    RawPose { obstacle: String, pose: PoseStamped },
    /// Sample re-expressed in the target frame.
    TrackedPose { obstacle: String, pose: PoseStamped },
    /// New edge for the transform buffer.
    Transform(TransformStamped),
}

/// Problems found while turning configuration into obstacles.  Always fatal
/// at startup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("obstacle '{obstacle}': unknown shape type '{kind}'")]
    UnknownShape { obstacle: String, kind: String },

    #[error("obstacle '{obstacle}': missing required field '{field}'")]
    MissingField {
        obstacle: String,
        field: &'static str,
    },

    #[error("obstacle '{obstacle}': invalid field '{field}': {reason}")]
    InvalidField {
        obstacle: String,
        field: &'static str,
        reason: String,
    },

    #[error("duplicate obstacle id '{0}'")]
    DuplicateId(String),

    #[error("failed to read config at {path}: {details}")]
    Io { path: String, details: String },

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Workspace-wide error type.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transform Lookup Error: {0}")]
    TransformLookup(String),

    #[error("Spawn Service Error on {obstacle}: {details}")]
    Spawn { obstacle: String, details: String },

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}
