//! Typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.  A slow subscriber lags and loses the oldest events instead of
//! stalling the publisher, which is what keeps the scene broadcast periodic.
//!
//! # Topics
//!
//! | Topic | Wire name | Typical traffic |
//! |---|---|---|
//! | [`Topic::SceneMarkers`] | `/obstacle_markers` | Full scene snapshot every broadcast period |
//! | [`Topic::Transforms`] | `/tf` | Frame tree updates |
//! | [`Topic::RawPose`] | `/obstacles/<id>/mocap` | Untransformed tracking samples for one obstacle |
//! | [`Topic::TrackedPose`] | `/obstacles/<id>` | Samples re-expressed in the target frame |
//!
//! Channels are created lazily the first time a topic is published to or
//! subscribed to.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use obstacle_types::{Event, SceneError};
use tokio::sync::broadcast;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

const SCENE_MARKERS: &str = "/obstacle_markers";
const TRANSFORMS: &str = "/tf";
const OBSTACLE_PREFIX: &str = "/obstacles/";
const RAW_SUFFIX: &str = "/mocap";

/// Routing key on the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Periodic full-scene snapshots.
    SceneMarkers,
    /// Frame tree updates consumed by the transform listener.
    Transforms,
    /// Raw tracking samples for the named obstacle.
    RawPose(String),
    /// Target-frame samples for the named obstacle.
    TrackedPose(String),
}

impl Topic {
    /// The wire name used by the WebSocket bridge.
    pub fn name(&self) -> String {
        match self {
            Topic::SceneMarkers => SCENE_MARKERS.to_string(),
            Topic::Transforms => TRANSFORMS.to_string(),
            Topic::RawPose(id) => format!("{OBSTACLE_PREFIX}{id}{RAW_SUFFIX}"),
            Topic::TrackedPose(id) => format!("{OBSTACLE_PREFIX}{id}"),
        }
    }

    /// Inverse of [`name`][Self::name].  Returns `None` for names that do not
    /// map onto a topic.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            SCENE_MARKERS => return Some(Topic::SceneMarkers),
            TRANSFORMS => return Some(Topic::Transforms),
            _ => {}
        }
        let rest = name.strip_prefix(OBSTACLE_PREFIX)?;
        let (id, raw) = match rest.strip_suffix(RAW_SUFFIX) {
            Some(id) => (id, true),
            None => (rest, false),
        };
        if id.is_empty() || id.contains('/') {
            return None;
        }
        Some(if raw {
            Topic::RawPose(id.to_string())
        } else {
            Topic::TrackedPose(id.to_string())
        })
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    capacity: usize,
    channels: Arc<Mutex<HashMap<Topic, broadcast::Sender<Event>>>>,
}

impl EventBus {
    /// Create a new bus with the given per-topic channel capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Publish `event` to `topic`.
    ///
    /// Returns the number of active receivers that were handed the event.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::Channel`] when nobody is subscribed to the topic.
    /// Periodic publishers treat that as a normal condition.
    pub fn publish_to(&self, topic: &Topic, event: Event) -> Result<usize, SceneError> {
        self.sender(topic)
            .send(event)
            .map_err(|_| SceneError::Channel(format!("no subscribers for topic {topic}")))
    }

    /// Subscribe to `topic`.  Only events published after this call are
    /// delivered.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        let receiver = self.sender(&topic).subscribe();
        TopicReceiver { topic, receiver }
    }

    /// Number of live receivers on `topic`.
    pub fn receiver_count(&self, topic: &Topic) -> usize {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels.get(topic).map_or(0, |s| s.receiver_count())
    }

    fn sender(&self, topic: &Topic) -> broadcast::Sender<Event> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single [`Topic`].
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.  The caller decides whether to
    ///   continue or abort.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`][Self::recv].
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use obstacle_types::{EventPayload, Pose, PoseStamped};

    fn raw_pose_event(obstacle: &str) -> Event {
        Event::new(
            "test",
            EventPayload::RawPose {
                obstacle: obstacle.to_string(),
                pose: PoseStamped {
                    pose: Pose::identity(),
                    frame_id: "mocap".to_string(),
                    stamp: Utc::now(),
                },
            },
        )
    }

    #[test]
    fn topic_names_round_trip() {
        for topic in [
            Topic::SceneMarkers,
            Topic::Transforms,
            Topic::RawPose("obstacle1".into()),
            Topic::TrackedPose("obstacle1".into()),
        ] {
            assert_eq!(Topic::parse(&topic.name()), Some(topic));
        }
    }

    #[test]
    fn topic_parse_rejects_foreign_names() {
        assert_eq!(Topic::parse("/cmd_vel"), None);
        assert_eq!(Topic::parse("/obstacles/"), None);
        assert_eq!(Topic::parse("/obstacles/a/b"), None);
        assert_eq!(Topic::name(&Topic::RawPose("box".into())), "/obstacles/box/mocap");
    }

    #[test]
    fn publish_without_subscribers_returns_error() {
        let bus = EventBus::default();
        let result = bus.publish_to(&Topic::SceneMarkers, raw_pose_event("a"));
        assert!(matches!(result, Err(SceneError::Channel(_))));
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let topic = Topic::RawPose("obstacle1".into());
        let mut rx1 = bus.subscribe_to(topic.clone());
        let mut rx2 = bus.subscribe_to(topic.clone());

        let event = raw_pose_event("obstacle1");
        assert_eq!(bus.publish_to(&topic, event.clone())?, 2);

        assert_eq!(rx1.recv().await?.id, event.id);
        assert_eq!(rx2.recv().await?.id, event.id);
        Ok(())
    }

    /// Each obstacle owns its own lane; a sample for one obstacle must never
    /// reach another obstacle's subscriber.
    #[tokio::test]
    async fn per_obstacle_topics_are_isolated() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut other = bus.subscribe_to(Topic::RawPose("obstacle2".into()));
        let _mine = bus.subscribe_to(Topic::RawPose("obstacle1".into()));

        bus.publish_to(&Topic::RawPose("obstacle1".into()), raw_pose_event("obstacle1"))?;

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), other.recv()).await;
        assert!(result.is_err(), "obstacle2 must not see obstacle1 samples");
        Ok(())
    }

    #[tokio::test]
    async fn clones_share_channels() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let clone = bus.clone();
        let mut rx = bus.subscribe_to(Topic::Transforms);

        clone.publish_to(&Topic::Transforms, raw_pose_event("x"))?;
        assert_eq!(rx.recv().await?.source, "test");
        assert_eq!(clone.receiver_count(&Topic::Transforms), 1);
        Ok(())
    }

    /// Flooding a low-capacity channel while a subscriber sleeps must produce
    /// a `Lagged` error rather than panicking or blocking.
    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(8);
        let mut slow = bus.subscribe_to(Topic::SceneMarkers);

        for _ in 0..100 {
            let _ = bus.publish_to(&Topic::SceneMarkers, raw_pose_event("flood"));
        }

        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }
}
