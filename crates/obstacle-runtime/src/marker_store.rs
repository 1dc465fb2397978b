//! [`MarkerStore`] – the shared, ordered collection of obstacle markers.
//!
//! One store exists per scene.  Frame reconcilers write poses into it and the
//! broadcast scheduler copies it out; both hold clones of the same handle.
//! Every operation takes the lock for the duration of a whole-marker copy or
//! a whole-pose write, so readers never observe a half-updated pose.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use obstacle_types::{MarkerState, Pose};

#[derive(Clone, Debug, Default)]
pub struct MarkerStore {
    markers: Arc<Mutex<IndexMap<String, MarkerState>>>,
}

impl MarkerStore {
    /// Build a store holding `markers` in iteration order.
    pub fn new(markers: impl IntoIterator<Item = MarkerState>) -> Self {
        let markers = markers.into_iter().map(|m| (m.id.clone(), m)).collect();
        Self {
            markers: Arc::new(Mutex::new(markers)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, MarkerState>> {
        self.markers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the pose of `id`.  Returns `false` when no such marker exists.
    pub fn update_pose(&self, id: &str, pose: Pose) -> bool {
        match self.lock().get_mut(id) {
            Some(marker) => {
                marker.pose = pose;
                true
            }
            None => false,
        }
    }

    /// Copy of every marker, in insertion order.
    pub fn snapshot(&self) -> Vec<MarkerState> {
        self.lock().values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<MarkerState> {
        self.lock().get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
