//! Typed obstacle geometry and the visual / simulation records derived from
//! it.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::geometry::{Pose, Vec3};

/// The closed set of obstacle shapes understood by the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Sphere,
    Cylinder,
    Box,
    Capsule,
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeKind::Sphere => write!(f, "sphere"),
            ShapeKind::Cylinder => write!(f, "cylinder"),
            ShapeKind::Box => write!(f, "box"),
            ShapeKind::Capsule => write!(f, "capsule"),
        }
    }
}

impl FromStr for ShapeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sphere" => Ok(ShapeKind::Sphere),
            "cylinder" => Ok(ShapeKind::Cylinder),
            "box" => Ok(ShapeKind::Box),
            "capsule" => Ok(ShapeKind::Capsule),
            other => Err(other.to_string()),
        }
    }
}

/// Shape dimensions, one variant per [`ShapeKind`].  All lengths are metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ShapeParams {
    Sphere {
        radius: f64,
    },
    Cylinder {
        radius: f64,
        #[serde(rename = "halfLength")]
        half_length: f64,
    },
    Box {
        x: f64,
        y: f64,
        z: f64,
    },
    Capsule {
        radius: f64,
        #[serde(rename = "halfLength")]
        half_length: f64,
    },
}

impl ShapeParams {
    pub fn kind(&self) -> ShapeKind {
        match self {
            ShapeParams::Sphere { .. } => ShapeKind::Sphere,
            ShapeParams::Cylinder { .. } => ShapeKind::Cylinder,
            ShapeParams::Box { .. } => ShapeKind::Box,
            ShapeParams::Capsule { .. } => ShapeKind::Capsule,
        }
    }
}

/// A fully validated obstacle, produced once at startup by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleDescriptor {
    /// Configuration key with any leading namespace marker removed.
    pub id: String,
    pub params: ShapeParams,
    /// Pose in the target frame.  The rotation is always a unit quaternion.
    pub initial_pose: Pose,
}

impl ObstacleDescriptor {
    pub fn shape(&self) -> ShapeKind {
        self.params.kind()
    }
}

/// Renderable primitive used by the scene output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerPrimitive {
    Sphere,
    Cylinder,
    Cube,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderShape {
    pub primitive: MarkerPrimitive,
    pub scale: Vec3,
}

/// Straight RGBA in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

/// Visual state of one obstacle as broadcast on the scene channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerState {
    pub id: String,
    /// Position of the obstacle in registry order.  Stable for the process
    /// lifetime.
    pub index: u32,
    /// Frame in which `pose` is expressed.
    pub frame_id: String,
    pub pose: Pose,
    pub render_shape: RenderShape,
    pub color: Rgba,
    /// Lifetime hint for the consumer; kept short so a stalled broadcaster
    /// makes markers disappear instead of freezing.
    pub ttl: Duration,
}

/// Everything a physics simulator needs to instantiate one obstacle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnBlueprint {
    pub id: String,
    pub geometry_descriptor: String,
    pub initial_pose: Pose,
    pub reference_frame: String,
}
