//! Feeds `/tf` traffic from the event bus into a [`TfBuffer`].

use std::sync::Arc;

use obstacle_middleware::{EventBus, Topic};
use obstacle_tf::TfBuffer;
use obstacle_types::{Event, EventPayload};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct TransformListener;

impl TransformListener {
    /// Subscribe to `/tf` and start copying every transform into `buffer`.
    ///
    /// The subscription exists once this returns.  Invalid transforms are
    /// logged and skipped.
    pub fn spawn(
        bus: &EventBus,
        buffer: Arc<TfBuffer>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let mut transforms = bus.subscribe_to(Topic::Transforms);
        tokio::spawn(async move {
            while !*shutdown.borrow() {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    received = transforms.recv() => match received {
                        Ok(Event { payload: EventPayload::Transform(tf), .. }) => {
                            let (parent, child) = (tf.parent_frame.clone(), tf.child_frame.clone());
                            match buffer.set_transform(tf) {
                                Ok(()) => debug!(parent = %parent, child = %child, "Transform received"),
                                Err(e) => warn!(error = %e, "Ignoring transform"),
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "Transform listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }
}
