//! Rigid-body primitives shared by every crate in the workspace.
//!
//! All quantities are `f64` so that poses survive a round trip through
//! `geometry_msgs`-style JSON without losing precision.
//!
//! # Example
//!
//! ```rust
//! use obstacle_types::geometry::{Pose, Quaternion, Transform3D, Vec3};
//!
//! // The mocap frame sits 1 m above the world origin.
//! let world_from_mocap = Transform3D::new(Vec3::new(0.0, 0.0, 1.0), Quaternion::identity());
//! let in_mocap = Pose::new(Vec3::new(0.5, 0.0, 0.0), Quaternion::identity());
//!
//! let in_world = world_from_mocap.transform_pose(&in_mocap);
//! assert!((in_world.translation.z - 1.0).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D translation vector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Same value on all three axes.
    pub fn splat(v: f64) -> Self {
        Self::new(v, v, v)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    /// Linear interpolation; `t = 0` yields `self`, `t = 1` yields `rhs`.
    pub fn lerp(self, rhs: Self, t: f64) -> Self {
        Self::new(
            self.x + (rhs.x - self.x) * t,
            self.y + (rhs.y - self.y) * t,
            self.z + (rhs.z - self.z) * t,
        )
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self::new(x, y, z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Quaternion
// ────────────────────────────────────────────────────────────────────────────

/// A rotation quaternion.  Constructors take `(w, x, y, z)`; configuration
/// files and wire messages use the `[x, y, z, w]` order, see
/// [`Quaternion::from_xyzw`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1); use [`normalized`][Self::normalized] otherwise.
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z, w }
    }

    /// Build from the `[x, y, z, w]` layout used by configuration files.
    pub fn from_xyzw([x, y, z, w]: [f64; 4]) -> Self {
        Self::new(w, x, y, z)
    }

    /// The identity rotation.
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    pub fn dot(self, rhs: Self) -> f64 {
        self.w * rhs.w + self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Scale to unit length.  Returns `None` for a zero-length or non-finite
    /// quaternion, which cannot represent a rotation.
    pub fn normalized(self) -> Option<Self> {
        let n = self.norm();
        if !n.is_finite() || n < f64::EPSILON {
            return None;
        }
        Some(Self::new(self.w / n, self.x / n, self.y / n, self.z / n))
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// Spherical linear interpolation along the shortest arc.
    pub fn slerp(self, rhs: Self, t: f64) -> Self {
        let mut cos_theta = self.dot(rhs);
        let mut end = rhs;
        if cos_theta < 0.0 {
            cos_theta = -cos_theta;
            end = Self::new(-rhs.w, -rhs.x, -rhs.y, -rhs.z);
        }

        // Nearly parallel: fall back to normalized lerp.
        let (a, b) = if cos_theta > 1.0 - 1e-9 {
            (1.0 - t, t)
        } else {
            let theta = cos_theta.acos();
            let sin_theta = theta.sin();
            (
                ((1.0 - t) * theta).sin() / sin_theta,
                (t * theta).sin() / sin_theta,
            )
        };

        let q = Self::new(
            a * self.w + b * end.w,
            a * self.x + b * end.x,
            a * self.y + b * end.y,
            a * self.z + b * end.z,
        );
        q.normalized().unwrap_or(self)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pose
// ────────────────────────────────────────────────────────────────────────────

/// Position plus orientation of a body in some frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Pose {
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self::default()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body 3-D transform: translation followed by rotation.
///
/// Represents the pose of frame B relative to frame A: to convert a point
/// expressed in frame B into frame A, rotate it by `rotation` then add
/// `translation`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Transform3D {
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// The identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self::default()
    }

    /// Compose two transforms.  If `self` = T_A_B and `other` = T_B_C, the
    /// result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        let rotated = self.rotation.mul(other.rotation);
        Self::new(translated, rotated)
    }

    /// T_B_A from T_A_B.
    pub fn inverse(self) -> Self {
        let inv = self.rotation.conjugate();
        Self::new(inv.rotate(self.translation).scale(-1.0), inv)
    }

    /// Re-express `pose` (given in frame B) in frame A.
    ///
    /// The resulting rotation is re-normalized so that accumulated floating
    /// point error never leaves the unit sphere.
    pub fn transform_pose(&self, pose: &Pose) -> Pose {
        let translation = self.translation.add(self.rotation.rotate(pose.translation));
        let product = self.rotation.mul(pose.rotation);
        Pose::new(translation, product.normalized().unwrap_or(product))
    }

    /// Blend two samples of the same edge: lerp on translation, slerp on
    /// rotation.
    pub fn interpolate(self, rhs: Self, t: f64) -> Self {
        Self::new(
            self.translation.lerp(rhs.translation, t),
            self.rotation.slerp(rhs.rotation, t),
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_1_SQRT_2;

    fn q90z() -> Quaternion {
        Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2)
    }

    #[test]
    fn from_xyzw_places_w_last() {
        let q = Quaternion::from_xyzw([0.0, 0.0, 0.0, 1.0]);
        assert_eq!(q, Quaternion::identity());
    }

    #[test]
    fn quaternion_90deg_yaw_rotates_x_to_y() {
        let r = q90z().rotate(Vec3::new(1.0, 0.0, 0.0));
        assert!(r.x.abs() < 1e-9, "x should be ~0, got {}", r.x);
        assert!((r.y - 1.0).abs() < 1e-9, "y should be ~1, got {}", r.y);
        assert!(r.z.abs() < 1e-9);
    }

    #[test]
    fn normalized_scales_to_unit_length() {
        let q = Quaternion::from_xyzw([0.0, 0.0, 2.0, 2.0]).normalized().unwrap();
        assert!((q.norm() - 1.0).abs() < 1e-12);
        assert!((q.z - FRAC_1_SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn normalized_rejects_degenerate_input() {
        assert!(Quaternion::from_xyzw([0.0; 4]).normalized().is_none());
        assert!(Quaternion::from_xyzw([f64::NAN, 0.0, 0.0, 1.0]).normalized().is_none());
    }

    #[test]
    fn slerp_halfway_is_45deg_yaw() {
        let half = Quaternion::identity().slerp(q90z(), 0.5);
        let angle = 2.0 * half.w.acos();
        assert!((angle - std::f64::consts::FRAC_PI_4).abs() < 1e-9, "angle={angle}");
    }

    #[test]
    fn inverse_composes_to_identity() {
        let t = Transform3D::new(Vec3::new(1.0, -2.0, 0.5), q90z());
        let id = t.compose(t.inverse());
        assert!(id.translation.x.abs() < 1e-9);
        assert!(id.translation.y.abs() < 1e-9);
        assert!(id.translation.z.abs() < 1e-9);
        assert!((id.rotation.w.abs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn transform_pose_rotates_then_translates() {
        // Frame B is yawed 90° and sits at (1, 0, 0) in frame A.
        let a_from_b = Transform3D::new(Vec3::new(1.0, 0.0, 0.0), q90z());
        let in_b = Pose::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity());

        let in_a = a_from_b.transform_pose(&in_b);
        assert!((in_a.translation.x - 1.0).abs() < 1e-9);
        assert!((in_a.translation.y - 1.0).abs() < 1e-9);
        assert!((in_a.rotation.z - FRAC_1_SQRT_2).abs() < 1e-9);
    }

    #[test]
    fn interpolate_midpoint_translation() {
        let a = Transform3D::new(Vec3::zero(), Quaternion::identity());
        let b = Transform3D::new(Vec3::new(2.0, 4.0, -2.0), Quaternion::identity());
        let mid = a.interpolate(b, 0.5);
        assert_eq!(mid.translation, Vec3::new(1.0, 2.0, -1.0));
    }
}
