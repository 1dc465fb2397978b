//! [`FrameReconciler`] – re-expresses externally tracked poses in the scene's
//! target frame.
//!
//! Every tracked obstacle gets its own task (see
//! [`FrameReconciler::spawn_tracker`]) listening on `/obstacles/<id>/mocap`.
//! For each sample the task looks up `target ← source` at the sample's stamp,
//! waiting at most the lookup timeout, then:
//!
//! * on success writes the transformed pose into the [`MarkerStore`] and
//!   republishes it on `/obstacles/<id>` tagged with the target frame;
//! * on failure logs the frames involved and drops the sample.
//!
//! Samples are handled strictly one at a time per obstacle.  A slow lookup
//! for one obstacle never delays another.

use std::sync::Arc;
use std::time::Duration;

use obstacle_middleware::{EventBus, Topic};
use obstacle_tf::{TfError, TransformService};
use obstacle_types::{Event, EventPayload, Pose, PoseStamped};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::marker_store::MarkerStore;

const SOURCE: &str = "obstacle-runtime::reconciler";

/// Whether an obstacle follows an external pose source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    /// The configured pose is final.
    Idle,
    /// Poses arrive on the obstacle's raw-pose topic.
    Tracking,
}

pub struct FrameReconciler {
    transforms: Arc<dyn TransformService>,
    store: MarkerStore,
    bus: EventBus,
    target_frame: String,
    lookup_timeout: Duration,
}

impl FrameReconciler {
    pub fn new(
        transforms: Arc<dyn TransformService>,
        store: MarkerStore,
        bus: EventBus,
        target_frame: impl Into<String>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            transforms,
            store,
            bus,
            target_frame: target_frame.into(),
            lookup_timeout,
        }
    }

    /// Transform one sample for `obstacle` and apply it.
    ///
    /// On success the marker has been updated and the returned pose has been
    /// published on the obstacle's tracked-pose topic.  On failure nothing
    /// has changed.  Samples with a non-finite position or an orientation
    /// that cannot be normalized are rejected before any lookup.
    pub async fn reconcile(
        &self,
        obstacle: &str,
        sample: &PoseStamped,
    ) -> Result<PoseStamped, TfError> {
        let pose = checked_pose(sample)?;
        let transform = self
            .transforms
            .lookup(
                &self.target_frame,
                &sample.frame_id,
                sample.stamp,
                self.lookup_timeout,
            )
            .await?;

        let tracked = PoseStamped {
            pose: transform.transform_pose(&pose),
            frame_id: self.target_frame.clone(),
            stamp: sample.stamp,
        };
        if !self.store.update_pose(obstacle, tracked.pose) {
            warn!(obstacle = %obstacle, "Tracked sample for an obstacle that is not in the scene");
        }

        let event = Event::new(
            SOURCE,
            EventPayload::TrackedPose {
                obstacle: obstacle.to_string(),
                pose: tracked.clone(),
            },
        );
        if self
            .bus
            .publish_to(&Topic::TrackedPose(obstacle.to_string()), event)
            .is_err()
        {
            debug!(obstacle = %obstacle, "No subscribers for tracked pose");
        }
        Ok(tracked)
    }

    async fn handle_sample(&self, obstacle: &str, sample: PoseStamped) {
        if let Err(e) = self.reconcile(obstacle, &sample).await {
            error!(
                obstacle = %obstacle,
                source_frame = %sample.frame_id,
                target_frame = %self.target_frame,
                error = %e,
                "Failed to transform obstacle pose; sample dropped"
            );
        }
    }

    /// Start the per-obstacle task for `obstacle`.
    ///
    /// The raw-pose subscription is taken before this returns, so samples
    /// published afterwards are never missed.  The task ends when `shutdown`
    /// turns `true` or its sender is dropped.
    pub fn spawn_tracker(
        self: &Arc<Self>,
        obstacle: String,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let reconciler = Arc::clone(self);
        let mut samples = self.bus.subscribe_to(Topic::RawPose(obstacle.clone()));

        tokio::spawn(async move {
            info!(obstacle = %obstacle, topic = %samples.topic(), "Tracking obstacle");
            while !*shutdown.borrow() {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    received = samples.recv() => match received {
                        Ok(Event { payload: EventPayload::RawPose { pose, .. }, .. }) => {
                            reconciler.handle_sample(&obstacle, pose).await;
                        }
                        Ok(other) => {
                            debug!(obstacle = %obstacle, source = %other.source, "Ignoring non-pose event");
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(obstacle = %obstacle, skipped = n, "Tracker lagged; oldest samples dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!(obstacle = %obstacle, "Tracker stopped");
        })
    }
}

fn checked_pose(sample: &PoseStamped) -> Result<Pose, TfError> {
    let invalid = |reason: &str| TfError::InvalidPose {
        frame: sample.frame_id.clone(),
        reason: reason.to_string(),
    };
    if !sample.pose.translation.is_finite() {
        return Err(invalid("translation is not finite"));
    }
    let rotation = sample
        .pose
        .rotation
        .normalized()
        .ok_or_else(|| invalid("rotation is zero or not finite"))?;
    Ok(Pose::new(sample.pose.translation, rotation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use obstacle_types::{
        MarkerPrimitive, MarkerState, Quaternion, RenderShape, Rgba, Transform3D, Vec3,
    };

    /// Answers every lookup with a fixed translation, or with an error when
    /// the source frame is `"unknown"`.
    struct FixedTransforms(Vec3);

    #[async_trait]
    impl TransformService for FixedTransforms {
        async fn lookup(
            &self,
            _target_frame: &str,
            source_frame: &str,
            _time: DateTime<Utc>,
            _timeout: Duration,
        ) -> Result<Transform3D, TfError> {
            if source_frame == "unknown" {
                return Err(TfError::UnknownFrame(source_frame.into()));
            }
            Ok(Transform3D::new(self.0, Quaternion::identity()))
        }
    }

    fn store() -> MarkerStore {
        MarkerStore::new([MarkerState {
            id: "obstacle1".into(),
            index: 0,
            frame_id: "world".into(),
            pose: Pose::identity(),
            render_shape: RenderShape {
                primitive: MarkerPrimitive::Sphere,
                scale: Vec3::splat(0.2),
            },
            color: Rgba::new(0.58, 0.0, 0.98, 0.7),
            ttl: Duration::from_millis(100),
        }])
    }

    fn sample(frame: &str, t: Vec3) -> PoseStamped {
        PoseStamped {
            pose: Pose::new(t, Quaternion::identity()),
            frame_id: frame.into(),
            stamp: Utc::now(),
        }
    }

    fn reconciler(store: MarkerStore, bus: EventBus) -> Arc<FrameReconciler> {
        Arc::new(FrameReconciler::new(
            Arc::new(FixedTransforms(Vec3::new(0.0, 0.0, 1.0))),
            store,
            bus,
            "world",
            Duration::from_millis(100),
        ))
    }

    #[tokio::test]
    async fn successful_lookup_updates_marker_and_publishes() {
        let store = store();
        let bus = EventBus::default();
        let mut tracked = bus.subscribe_to(Topic::TrackedPose("obstacle1".into()));
        let r = reconciler(store.clone(), bus);

        let input = sample("mocap", Vec3::new(1.0, 0.0, 0.0));
        let out = r.reconcile("obstacle1", &input).await.unwrap();

        assert_eq!(out.frame_id, "world");
        assert_eq!(out.stamp, input.stamp);
        assert_eq!(out.pose.translation, Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(store.get("obstacle1").unwrap().pose, out.pose);

        match tracked.recv().await.unwrap().payload {
            EventPayload::TrackedPose { obstacle, pose } => {
                assert_eq!(obstacle, "obstacle1");
                assert_eq!(pose, out);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_lookup_leaves_marker_unchanged() {
        let store = store();
        let bus = EventBus::default();
        let mut tracked = bus.subscribe_to(Topic::TrackedPose("obstacle1".into()));
        let r = reconciler(store.clone(), bus);

        let result = r
            .reconcile("obstacle1", &sample("unknown", Vec3::new(1.0, 0.0, 0.0)))
            .await;

        assert!(matches!(result, Err(TfError::UnknownFrame(_))));
        assert_eq!(store.get("obstacle1").unwrap().pose, Pose::identity());
        assert!(tracked.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_sample_is_dropped() {
        let store = store();
        let bus = EventBus::default();
        let mut tracked = bus.subscribe_to(Topic::TrackedPose("obstacle1".into()));
        let r = reconciler(store.clone(), bus);

        let nan = PoseStamped {
            pose: Pose::new(Vec3::new(f64::NAN, 0.0, 0.0), Quaternion::identity()),
            ..sample("world", Vec3::zero())
        };
        let zero_rotation = PoseStamped {
            pose: Pose::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::from_xyzw([0.0; 4])),
            ..sample("world", Vec3::zero())
        };

        for bad in [nan, zero_rotation] {
            let result = r.reconcile("obstacle1", &bad).await;
            assert!(matches!(result, Err(TfError::InvalidPose { .. })), "{result:?}");
        }
        assert_eq!(store.get("obstacle1").unwrap().pose, Pose::identity());
        assert!(tracked.try_recv().is_err());
    }

    #[tokio::test]
    async fn unnormalized_rotation_is_normalized() {
        let store = store();
        let r = reconciler(store.clone(), EventBus::default());

        let input = PoseStamped {
            pose: Pose::new(Vec3::zero(), Quaternion::from_xyzw([0.0, 0.0, 0.0, 2.0])),
            ..sample("mocap", Vec3::zero())
        };
        let out = r.reconcile("obstacle1", &input).await.unwrap();

        assert_eq!(out.pose.rotation, Quaternion::identity());
        assert_eq!(store.get("obstacle1").unwrap().pose.rotation, Quaternion::identity());
    }

    #[tokio::test]
    async fn tracker_processes_samples_until_shutdown() {
        let store = store();
        let bus = EventBus::default();
        let mut tracked = bus.subscribe_to(Topic::TrackedPose("obstacle1".into()));
        let r = reconciler(store.clone(), bus.clone());
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = r.spawn_tracker("obstacle1".into(), stop_rx);
        bus.publish_to(
            &Topic::RawPose("obstacle1".into()),
            Event::new(
                "test",
                EventPayload::RawPose {
                    obstacle: "obstacle1".into(),
                    pose: sample("mocap", Vec3::new(2.0, 0.0, 0.0)),
                },
            ),
        )
        .unwrap();

        tracked.recv().await.unwrap();
        assert_eq!(
            store.get("obstacle1").unwrap().pose.translation,
            Vec3::new(2.0, 0.0, 1.0)
        );

        stop_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
