//! [`BroadcastScheduler`] – publishes the whole scene on `/obstacle_markers`
//! at a fixed period, whether or not anything changed.

use std::time::Duration;

use chrono::Utc;
use obstacle_middleware::{EventBus, Topic};
use obstacle_types::{Event, EventPayload, SceneSnapshot};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::marker_store::MarkerStore;

const SOURCE: &str = "obstacle-runtime::broadcaster";

/// Shortest period accepted; `tokio::time::interval` rejects zero.
const MIN_PERIOD: Duration = Duration::from_millis(1);

pub struct BroadcastScheduler {
    store: MarkerStore,
    bus: EventBus,
    period: Duration,
}

impl BroadcastScheduler {
    pub fn new(store: MarkerStore, bus: EventBus, period: Duration) -> Self {
        Self {
            store,
            bus,
            period: period.max(MIN_PERIOD),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Copy the store and publish it once.  A scene nobody listens to is not
    /// an error.
    pub fn tick(&self) -> SceneSnapshot {
        let snapshot = SceneSnapshot {
            stamp: Utc::now(),
            markers: self.store.snapshot(),
        };
        let event = Event::new(SOURCE, EventPayload::SceneUpdate(snapshot.clone()));
        match self.bus.publish_to(&Topic::SceneMarkers, event) {
            Ok(n) => trace!(receivers = n, markers = snapshot.markers.len(), "Scene broadcast"),
            Err(_) => trace!("Scene broadcast with no subscribers"),
        }
        snapshot
    }

    /// Run [`tick`][Self::tick] every period until `shutdown` turns `true`.
    ///
    /// The first broadcast happens immediately.  If the task falls behind,
    /// ticks are delayed rather than fired in a burst.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = time::interval(self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period_ms = self.period.as_millis() as u64, "Broadcasting scene");

            let mut ticks: u64 = 0;
            while !*shutdown.borrow() {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        self.tick();
                        ticks += 1;
                    }
                }
            }
            debug!(ticks, "Broadcaster stopped");
        })
    }
}
