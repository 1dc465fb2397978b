//! Time-stamped frame tree.
//!
//! Every frame except the roots has exactly one parent.  Each parent → child
//! edge keeps a short, time-ordered history of [`Transform3D`] samples (or a
//! single sample for static edges).  A lookup between two frames walks both
//! up to their closest common ancestor and composes the edges on the way,
//! interpolating each edge at the requested instant.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use obstacle_tf::TfBuffer;
//! use obstacle_types::{Quaternion, Transform3D, TransformStamped, Vec3};
//!
//! let tf = TfBuffer::new();
//! tf.set_transform(TransformStamped {
//!     parent_frame: "world".into(),
//!     child_frame: "mocap".into(),
//!     transform: Transform3D::new(Vec3::new(0.0, 0.0, 1.0), Quaternion::identity()),
//!     stamp: Utc::now(),
//!     is_static: true,
//! })
//! .unwrap();
//!
//! let t = tf.lookup_latest("world", "mocap").unwrap();
//! assert!((t.translation.z - 1.0).abs() < 1e-9);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use obstacle_types::{Transform3D, TransformStamped};
use tokio::sync::Notify;
use tracing::debug;

use crate::{Direction, TfError, TransformService};

/// How much history each dynamic edge keeps.
pub const DEFAULT_CACHE_TIME: Duration = Duration::from_secs(10);

fn delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX)
}

// ────────────────────────────────────────────────────────────────────────────
// Edge history
// ────────────────────────────────────────────────────────────────────────────

struct FrameEdge {
    parent: String,
    is_static: bool,
    /// Sorted by stamp, oldest first.
    samples: VecDeque<(DateTime<Utc>, Transform3D)>,
}

impl FrameEdge {
    fn new(parent: &str, is_static: bool) -> Self {
        Self {
            parent: parent.to_string(),
            is_static,
            samples: VecDeque::new(),
        }
    }

    fn insert(&mut self, stamp: DateTime<Utc>, transform: Transform3D, cache_time: TimeDelta) {
        if self.is_static {
            self.samples.clear();
            self.samples.push_back((stamp, transform));
            return;
        }

        let pos = self.samples.partition_point(|(s, _)| *s <= stamp);
        if pos > 0 && self.samples[pos - 1].0 == stamp {
            self.samples[pos - 1].1 = transform;
        } else {
            self.samples.insert(pos, (stamp, transform));
        }

        if let Some(&(newest, _)) = self.samples.back() {
            while self.samples.len() > 1 {
                match self.samples.front() {
                    Some(&(oldest, _)) if newest - oldest > cache_time => {
                        self.samples.pop_front();
                    }
                    _ => break,
                }
            }
        }
    }

    /// T_parent_child at `time` (`None` = newest sample).
    fn sample_at(
        &self,
        child: &str,
        time: Option<DateTime<Utc>>,
        tolerance: TimeDelta,
    ) -> Result<Transform3D, TfError> {
        let (Some(&(oldest, first)), Some(&(newest, last))) =
            (self.samples.front(), self.samples.back())
        else {
            return Err(TfError::UnknownFrame(child.to_string()));
        };

        let time = match time {
            Some(t) if !self.is_static => t,
            _ => return Ok(last),
        };

        let extrapolation = |direction| TfError::Extrapolation {
            parent: self.parent.clone(),
            child: child.to_string(),
            direction,
            requested: time,
            oldest,
            newest,
        };

        if time >= newest {
            return if time - newest <= tolerance {
                Ok(last)
            } else {
                Err(extrapolation(Direction::Future))
            };
        }
        if time <= oldest {
            return if oldest - time <= tolerance {
                Ok(first)
            } else {
                Err(extrapolation(Direction::Past))
            };
        }

        // oldest < time < newest, so both neighbours exist.
        let idx = self.samples.partition_point(|(s, _)| *s <= time);
        let (t0, a) = self.samples[idx - 1];
        let (t1, b) = self.samples[idx];
        let span = (t1 - t0).num_nanoseconds().unwrap_or(i64::MAX) as f64;
        let offset = (time - t0).num_nanoseconds().unwrap_or(0) as f64;
        Ok(a.interpolate(b, offset / span))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TfBuffer
// ────────────────────────────────────────────────────────────────────────────

/// Shared, thread-safe frame tree.  Wrap it in an `Arc` and hand clones to
/// the transform listener (writer) and the frame reconcilers (readers).
pub struct TfBuffer {
    /// Keyed by child frame.
    frames: RwLock<HashMap<String, FrameEdge>>,
    updated: Notify,
    cache_time: TimeDelta,
    tolerance: TimeDelta,
}

impl Default for TfBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TfBuffer {
    /// Create an empty buffer with [`DEFAULT_CACHE_TIME`] of history and no
    /// extrapolation tolerance.
    pub fn new() -> Self {
        Self {
            frames: RwLock::new(HashMap::new()),
            updated: Notify::new(),
            cache_time: delta(DEFAULT_CACHE_TIME),
            tolerance: TimeDelta::zero(),
        }
    }

    pub fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = delta(cache_time);
        self
    }

    /// Allow lookups up to `tolerance` outside the buffered window; they are
    /// answered with the nearest sample.
    pub fn with_extrapolation_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = delta(tolerance);
        self
    }

    /// Insert or update one edge and wake every pending lookup.
    ///
    /// Reparenting a frame, or switching it between static and dynamic,
    /// discards its previous history.
    pub fn set_transform(&self, tf: TransformStamped) -> Result<(), TfError> {
        let invalid = |reason: &str| TfError::InvalidTransform {
            parent: tf.parent_frame.clone(),
            child: tf.child_frame.clone(),
            reason: reason.to_string(),
        };
        if tf.parent_frame == tf.child_frame {
            return Err(invalid("a frame cannot be its own parent"));
        }
        if !tf.transform.translation.is_finite() {
            return Err(invalid("translation is not finite"));
        }
        let Some(rotation) = tf.transform.rotation.normalized() else {
            return Err(invalid("rotation is not a valid quaternion"));
        };
        let transform = Transform3D::new(tf.transform.translation, rotation);

        {
            let mut frames = self.frames.write().unwrap_or_else(PoisonError::into_inner);
            let edge = frames
                .entry(tf.child_frame.clone())
                .or_insert_with(|| FrameEdge::new(&tf.parent_frame, tf.is_static));
            if edge.parent != tf.parent_frame || edge.is_static != tf.is_static {
                debug!(
                    child = %tf.child_frame,
                    old_parent = %edge.parent,
                    new_parent = %tf.parent_frame,
                    is_static = tf.is_static,
                    "replacing frame edge"
                );
                *edge = FrameEdge::new(&tf.parent_frame, tf.is_static);
            }
            edge.insert(tf.stamp, transform, self.cache_time);
        }

        self.updated.notify_waiters();
        Ok(())
    }

    /// Whether `frame` appears anywhere in the tree, as a parent or a child.
    pub fn frame_exists(&self, frame: &str) -> bool {
        let frames = self.frames.read().unwrap_or_else(PoisonError::into_inner);
        Self::known(&frames, frame)
    }

    /// T_target_source valid at `time`, without waiting.
    pub fn lookup_at(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: DateTime<Utc>,
    ) -> Result<Transform3D, TfError> {
        self.resolve(target_frame, source_frame, Some(time))
    }

    /// T_target_source built from the newest sample of every edge.
    pub fn lookup_latest(
        &self,
        target_frame: &str,
        source_frame: &str,
    ) -> Result<Transform3D, TfError> {
        self.resolve(target_frame, source_frame, None)
    }

    fn resolve(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: Option<DateTime<Utc>>,
    ) -> Result<Transform3D, TfError> {
        if target_frame == source_frame {
            return Ok(Transform3D::identity());
        }

        let frames = self.frames.read().unwrap_or_else(PoisonError::into_inner);
        for frame in [source_frame, target_frame] {
            if !Self::known(&frames, frame) {
                return Err(TfError::UnknownFrame(frame.to_string()));
            }
        }

        let source_chain = Self::ancestry(&frames, source_frame);
        let target_chain = Self::ancestry(&frames, target_frame);
        let Some(common) = source_chain.iter().find(|f| target_chain.contains(f)) else {
            return Err(TfError::Connectivity {
                source_frame: source_frame.to_string(),
                target_frame: target_frame.to_string(),
            });
        };

        let common_from_source = self.accumulate(&frames, source_frame, common, time)?;
        let common_from_target = self.accumulate(&frames, target_frame, common, time)?;
        Ok(common_from_target.inverse().compose(common_from_source))
    }

    fn known(frames: &HashMap<String, FrameEdge>, frame: &str) -> bool {
        frames.contains_key(frame) || frames.values().any(|e| e.parent == frame)
    }

    /// `start` followed by its parent, grandparent, … up to the root.
    fn ancestry(frames: &HashMap<String, FrameEdge>, start: &str) -> Vec<String> {
        let mut chain = vec![start.to_string()];
        let mut current = start;
        while let Some(edge) = frames.get(current) {
            if chain.iter().any(|f| *f == edge.parent) {
                break;
            }
            chain.push(edge.parent.clone());
            current = &edge.parent;
        }
        chain
    }

    /// T_ancestor_from, composed edge by edge.
    fn accumulate(
        &self,
        frames: &HashMap<String, FrameEdge>,
        from: &str,
        ancestor: &str,
        time: Option<DateTime<Utc>>,
    ) -> Result<Transform3D, TfError> {
        let mut acc = Transform3D::identity();
        let mut current = from;
        while current != ancestor {
            let edge = frames.get(current).ok_or_else(|| TfError::Connectivity {
                source_frame: from.to_string(),
                target_frame: ancestor.to_string(),
            })?;
            acc = edge.sample_at(current, time, self.tolerance)?.compose(acc);
            current = &edge.parent;
        }
        Ok(acc)
    }
}

#[async_trait]
impl TransformService for TfBuffer {
    async fn lookup(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Transform3D, TfError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before checking so an update landing between
            // the check and the await is not missed.
            let updated = self.updated.notified();
            match self.lookup_at(target_frame, source_frame, time) {
                Ok(t) => return Ok(t),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    if tokio::time::timeout_at(deadline, updated).await.is_err() {
                        return Err(e);
                    }
                }
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use obstacle_types::{Quaternion, Vec3};
    use std::f64::consts::FRAC_1_SQRT_2;
    use std::sync::Arc;

    fn edge(parent: &str, child: &str, t: Vec3, stamp: DateTime<Utc>) -> TransformStamped {
        TransformStamped {
            parent_frame: parent.into(),
            child_frame: child.into(),
            transform: Transform3D::new(t, Quaternion::identity()),
            stamp,
            is_static: false,
        }
    }

    fn static_edge(parent: &str, child: &str, transform: Transform3D) -> TransformStamped {
        TransformStamped {
            parent_frame: parent.into(),
            child_frame: child.into(),
            transform,
            stamp: Utc::now(),
            is_static: true,
        }
    }

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    // ── Tree traversal ──────────────────────────────────────────────────────

    #[test]
    fn lookup_same_frame_returns_identity() {
        let tf = TfBuffer::new();
        assert_eq!(tf.lookup_latest("world", "world").unwrap(), Transform3D::identity());
    }

    #[test]
    fn lookup_composed_chain_respects_rotation() {
        // base is at the world origin, yawed 90°; camera is 1 m along base +X.
        let q90z = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let tf = TfBuffer::new();
        tf.set_transform(static_edge("world", "base", Transform3D::new(Vec3::zero(), q90z)))
            .unwrap();
        tf.set_transform(static_edge(
            "base",
            "camera",
            Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()),
        ))
        .unwrap();

        let t = tf.lookup_latest("world", "camera").unwrap();
        assert!(t.translation.x.abs() < 1e-9, "x={}", t.translation.x);
        assert!((t.translation.y - 1.0).abs() < 1e-9, "y={}", t.translation.y);
    }

    #[test]
    fn lookup_walks_edges_against_their_direction() {
        let tf = TfBuffer::new();
        tf.set_transform(edge("world", "mocap", Vec3::new(0.0, 0.0, 1.0), at(0)))
            .unwrap();

        let t = tf.lookup_latest("mocap", "world").unwrap();
        assert!((t.translation.z + 1.0).abs() < 1e-9);
    }

    #[test]
    fn lookup_between_siblings_goes_through_common_parent() {
        let tf = TfBuffer::new();
        tf.set_transform(edge("world", "a", Vec3::new(1.0, 0.0, 0.0), at(0))).unwrap();
        tf.set_transform(edge("world", "b", Vec3::new(0.0, 2.0, 0.0), at(0))).unwrap();

        // A point at the origin of `a` seen from `b`.
        let t = tf.lookup_latest("b", "a").unwrap();
        assert!((t.translation.x - 1.0).abs() < 1e-9);
        assert!((t.translation.y + 2.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_frame_is_reported() {
        let tf = TfBuffer::new();
        tf.set_transform(edge("world", "mocap", Vec3::zero(), at(0))).unwrap();
        assert_eq!(
            tf.lookup_latest("world", "ghost"),
            Err(TfError::UnknownFrame("ghost".into()))
        );
    }

    #[test]
    fn disjoint_trees_are_not_connected() {
        let tf = TfBuffer::new();
        tf.set_transform(edge("world", "a", Vec3::zero(), at(0))).unwrap();
        tf.set_transform(edge("odom", "b", Vec3::zero(), at(0))).unwrap();
        assert!(matches!(
            tf.lookup_latest("world", "b"),
            Err(TfError::Connectivity { .. })
        ));
    }

    #[test]
    fn frame_exists_sees_parents_and_children() {
        let tf = TfBuffer::new();
        tf.set_transform(edge("world", "mocap", Vec3::zero(), at(0))).unwrap();
        assert!(tf.frame_exists("world"));
        assert!(tf.frame_exists("mocap"));
        assert!(!tf.frame_exists("camera"));
    }

    // ── Time handling ───────────────────────────────────────────────────────

    #[test]
    fn lookup_interpolates_between_samples() {
        let tf = TfBuffer::new();
        tf.set_transform(edge("world", "mocap", Vec3::new(0.0, 0.0, 0.0), at(0))).unwrap();
        tf.set_transform(edge("world", "mocap", Vec3::new(2.0, 0.0, 0.0), at(100))).unwrap();

        let t = tf.lookup_at("world", "mocap", at(25)).unwrap();
        assert!((t.translation.x - 0.5).abs() < 1e-9, "x={}", t.translation.x);
    }

    #[test]
    fn out_of_order_samples_are_sorted() {
        let tf = TfBuffer::new();
        tf.set_transform(edge("world", "mocap", Vec3::new(2.0, 0.0, 0.0), at(100))).unwrap();
        tf.set_transform(edge("world", "mocap", Vec3::new(0.0, 0.0, 0.0), at(0))).unwrap();

        let t = tf.lookup_at("world", "mocap", at(50)).unwrap();
        assert!((t.translation.x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn future_lookup_beyond_tolerance_is_extrapolation() {
        let tf = TfBuffer::new();
        tf.set_transform(edge("world", "mocap", Vec3::zero(), at(0))).unwrap();

        let err = tf.lookup_at("world", "mocap", at(50)).unwrap_err();
        assert!(matches!(
            err,
            TfError::Extrapolation { direction: Direction::Future, .. }
        ));
        assert!(err.is_transient());
    }

    #[test]
    fn past_lookup_beyond_tolerance_is_not_transient() {
        let tf = TfBuffer::new();
        tf.set_transform(edge("world", "mocap", Vec3::zero(), at(100))).unwrap();

        let err = tf.lookup_at("world", "mocap", at(0)).unwrap_err();
        assert!(matches!(
            err,
            TfError::Extrapolation { direction: Direction::Past, .. }
        ));
        assert!(!err.is_transient());
    }

    #[test]
    fn tolerance_answers_with_nearest_sample() {
        let tf = TfBuffer::new().with_extrapolation_tolerance(Duration::from_millis(20));
        tf.set_transform(edge("world", "mocap", Vec3::new(3.0, 0.0, 0.0), at(0))).unwrap();

        let t = tf.lookup_at("world", "mocap", at(15)).unwrap();
        assert_eq!(t.translation.x, 3.0);
        assert!(tf.lookup_at("world", "mocap", at(25)).is_err());
    }

    #[test]
    fn static_edge_is_valid_at_any_time() {
        let tf = TfBuffer::new();
        tf.set_transform(static_edge(
            "world",
            "table",
            Transform3D::new(Vec3::new(0.0, 0.0, 0.7), Quaternion::identity()),
        ))
        .unwrap();

        assert!(tf.lookup_at("world", "table", at(0)).is_ok());
        assert!(tf.lookup_at("world", "table", Utc::now() + TimeDelta::hours(1)).is_ok());
    }

    #[test]
    fn history_older_than_cache_time_is_pruned() {
        let tf = TfBuffer::new().with_cache_time(Duration::from_millis(100));
        tf.set_transform(edge("world", "mocap", Vec3::zero(), at(0))).unwrap();
        tf.set_transform(edge("world", "mocap", Vec3::zero(), at(500))).unwrap();

        assert!(matches!(
            tf.lookup_at("world", "mocap", at(250)),
            Err(TfError::Extrapolation { direction: Direction::Past, .. })
        ));
    }

    #[test]
    fn degenerate_rotation_is_rejected() {
        let tf = TfBuffer::new();
        let mut bad = edge("world", "mocap", Vec3::zero(), at(0));
        bad.transform.rotation = Quaternion::from_xyzw([0.0; 4]);
        assert!(matches!(
            tf.set_transform(bad),
            Err(TfError::InvalidTransform { .. })
        ));
        assert!(!tf.frame_exists("mocap"));
    }

    // ── Bounded wait ────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn lookup_waits_for_late_transform() {
        let tf = Arc::new(TfBuffer::new());
        let stamp = Utc::now();

        let writer = Arc::clone(&tf);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            writer
                .set_transform(edge("world", "mocap", Vec3::new(1.0, 0.0, 0.0), stamp))
                .unwrap();
        });

        let t = tf
            .lookup("world", "mocap", stamp, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(t.translation.x, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_gives_up_after_timeout() {
        let tf = TfBuffer::new();
        let start = tokio::time::Instant::now();

        let err = tf
            .lookup("world", "mocap", Utc::now(), Duration::from_millis(100))
            .await
            .unwrap_err();

        assert!(matches!(err, TfError::UnknownFrame(_)));
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_fails_fast_on_past_extrapolation() {
        let tf = TfBuffer::new();
        tf.set_transform(edge("world", "mocap", Vec3::zero(), at(1_000))).unwrap();
        let start = tokio::time::Instant::now();

        let err = tf
            .lookup("world", "mocap", at(0), Duration::from_millis(100))
            .await
            .unwrap_err();

        assert!(!err.is_transient());
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
