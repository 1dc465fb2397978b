//! Obstacle registry: turns the `[obstacles.<name>]` configuration tables
//! into validated [`ObstacleDescriptor`]s.
//!
//! Validation is all-or-nothing.  The first problem found is returned as a
//! [`ConfigError`] and no descriptors are produced.

use std::collections::HashSet;

use indexmap::IndexMap;
use obstacle_types::{ConfigError, ObstacleDescriptor, Pose, Quaternion, ShapeKind, ShapeParams, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One obstacle table exactly as written in the configuration file.
///
/// Every field is optional here so that missing fields are reported per
/// obstacle by [`load`] instead of as an opaque deserialization error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawObstacleSpec {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(rename = "halfLength", skip_serializing_if = "Option::is_none")]
    pub half_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    /// `[x, y, z]` in metres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<[f64; 3]>,
    /// `[x, y, z, w]`; normalized on load.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<[f64; 4]>,
}

/// Parse every entry of `entries`, preserving their order.
///
/// An empty table is not an error: it is logged as a warning and yields an
/// empty scene.
pub fn load(
    entries: &IndexMap<String, RawObstacleSpec>,
) -> Result<Vec<ObstacleDescriptor>, ConfigError> {
    if entries.is_empty() {
        warn!("No obstacles configured; no collision avoidance with an external obstacle will be computed");
        return Ok(Vec::new());
    }

    let mut seen = HashSet::new();
    let mut descriptors = Vec::with_capacity(entries.len());
    for (key, raw) in entries {
        let id = obstacle_id(key)?;
        if !seen.insert(id.clone()) {
            return Err(ConfigError::DuplicateId(id));
        }
        let descriptor = ObstacleDescriptor {
            params: parse_params(&id, raw)?,
            initial_pose: parse_pose(&id, raw)?,
            id,
        };
        debug!(obstacle = %descriptor.id, shape = %descriptor.shape(), "Loaded obstacle");
        descriptors.push(descriptor);
    }
    Ok(descriptors)
}

/// Strip the leading namespace markers (`~`, `/`) from a configuration key.
pub fn obstacle_id(key: &str) -> Result<String, ConfigError> {
    let id = key.trim_start_matches(['~', '/']);
    let invalid = |reason: &str| ConfigError::InvalidField {
        obstacle: key.to_string(),
        field: "id",
        reason: reason.to_string(),
    };
    if id.is_empty() {
        return Err(invalid("name is empty once namespace markers are removed"));
    }
    if id.contains('/') {
        return Err(invalid("name must not contain '/'"));
    }
    Ok(id.to_string())
}

fn parse_params(id: &str, raw: &RawObstacleSpec) -> Result<ShapeParams, ConfigError> {
    let kind_name = raw.kind.as_deref().ok_or_else(|| ConfigError::MissingField {
        obstacle: id.to_string(),
        field: "type",
    })?;
    let kind: ShapeKind = kind_name.parse().map_err(|kind| ConfigError::UnknownShape {
        obstacle: id.to_string(),
        kind,
    })?;

    let dim = |field: &'static str, value: Option<f64>| positive(id, field, value);
    Ok(match kind {
        ShapeKind::Sphere => ShapeParams::Sphere {
            radius: dim("radius", raw.radius)?,
        },
        ShapeKind::Cylinder => ShapeParams::Cylinder {
            radius: dim("radius", raw.radius)?,
            half_length: dim("halfLength", raw.half_length)?,
        },
        ShapeKind::Box => ShapeParams::Box {
            x: dim("x", raw.x)?,
            y: dim("y", raw.y)?,
            z: dim("z", raw.z)?,
        },
        ShapeKind::Capsule => ShapeParams::Capsule {
            radius: dim("radius", raw.radius)?,
            half_length: dim("halfLength", raw.half_length)?,
        },
    })
}

fn positive(id: &str, field: &'static str, value: Option<f64>) -> Result<f64, ConfigError> {
    let value = value.ok_or_else(|| ConfigError::MissingField {
        obstacle: id.to_string(),
        field,
    })?;
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::InvalidField {
            obstacle: id.to_string(),
            field,
            reason: format!("must be a finite positive length, got {value}"),
        });
    }
    Ok(value)
}

fn parse_pose(id: &str, raw: &RawObstacleSpec) -> Result<Pose, ConfigError> {
    let missing = |field| ConfigError::MissingField {
        obstacle: id.to_string(),
        field,
    };
    let translation = Vec3::from(raw.translation.ok_or_else(|| missing("translation"))?);
    if !translation.is_finite() {
        return Err(ConfigError::InvalidField {
            obstacle: id.to_string(),
            field: "translation",
            reason: "components must be finite".into(),
        });
    }
    let rotation = Quaternion::from_xyzw(raw.rotation.ok_or_else(|| missing("rotation"))?)
        .normalized()
        .ok_or_else(|| ConfigError::InvalidField {
            obstacle: id.to_string(),
            field: "rotation",
            reason: "quaternion has zero or non-finite norm".into(),
        })?;
    Ok(Pose::new(translation, rotation))
}
