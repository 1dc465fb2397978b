//! [`ObstacleVisualizer`] – assembles the scene and runs it.
//!
//! Construction is synchronous and fails fast: the registry, the geometry
//! builder and the static transforms are all processed before anything
//! runs.  Running is split in two steps so the caller controls ordering:
//!
//! 1. [`spawn_obstacles`][ObstacleVisualizer::spawn_obstacles] (optional,
//!    only when `spawn_in_sim` is set);
//! 2. [`start`][ObstacleVisualizer::start], which launches the transform
//!    listener, one tracker per obstacle when tracking is enabled, and the
//!    broadcast scheduler.
//!
//! # Example
//!
//! ```rust,no_run
//! use indexmap::IndexMap;
//! use obstacle_middleware::EventBus;
//! use obstacle_runtime::{ObstacleVisualizer, VisualizerConfig};
//!
//! # async fn run() -> Result<(), obstacle_types::SceneError> {
//! let visualizer =
//!     ObstacleVisualizer::new(VisualizerConfig::default(), &IndexMap::new(), EventBus::default())?;
//! let running = visualizer.start();
//! // ...
//! running.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use obstacle_middleware::EventBus;
use obstacle_sim::{GeometryDescriptorGenerator, SdfGenerator, SpawnService};
use obstacle_tf::{TfBuffer, TransformService};
use obstacle_types::{ObstacleDescriptor, SceneError, SpawnBlueprint, TransformStamped};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broadcaster::BroadcastScheduler;
use crate::geometry_builder;
use crate::marker_store::MarkerStore;
use crate::reconciler::{FrameReconciler, TrackingMode};
use crate::registry::{self, RawObstacleSpec};
use crate::spawn::{SpawnOrchestrator, SpawnReport};
use crate::tf_listener::TransformListener;

/// Runtime settings of one scene.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualizerConfig {
    /// Frame every marker is expressed in.
    pub frame_id: String,
    pub use_tracking: bool,
    pub spawn_in_sim: bool,
    pub broadcast_period: Duration,
    pub lookup_timeout: Duration,
    /// Bound on both the readiness wait and each spawn call.
    pub spawn_timeout: Duration,
    pub extrapolation_tolerance: Duration,
    /// Edges inserted into the frame tree before anything starts.
    pub static_transforms: Vec<TransformStamped>,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            frame_id: "world".to_string(),
            use_tracking: false,
            spawn_in_sim: false,
            broadcast_period: Duration::from_millis(100),
            lookup_timeout: Duration::from_millis(100),
            spawn_timeout: Duration::from_secs(5),
            extrapolation_tolerance: Duration::ZERO,
            static_transforms: Vec::new(),
        }
    }
}

pub struct ObstacleVisualizer {
    config: VisualizerConfig,
    descriptors: Vec<ObstacleDescriptor>,
    blueprints: Vec<SpawnBlueprint>,
    store: MarkerStore,
    bus: EventBus,
    transforms: Arc<TfBuffer>,
}

impl ObstacleVisualizer {
    /// Build the scene with the SDF generator.
    pub fn new(
        config: VisualizerConfig,
        obstacles: &IndexMap<String, RawObstacleSpec>,
        bus: EventBus,
    ) -> Result<Self, SceneError> {
        Self::with_generator(config, obstacles, bus, &SdfGenerator::new())
    }

    pub fn with_generator(
        config: VisualizerConfig,
        obstacles: &IndexMap<String, RawObstacleSpec>,
        bus: EventBus,
        generator: &dyn GeometryDescriptorGenerator,
    ) -> Result<Self, SceneError> {
        let descriptors = registry::load(obstacles)?;
        let (markers, blueprints) =
            geometry_builder::build_all(&descriptors, &config.frame_id, generator);

        let transforms =
            Arc::new(TfBuffer::new().with_extrapolation_tolerance(config.extrapolation_tolerance));
        for tf in &config.static_transforms {
            transforms.set_transform(TransformStamped {
                is_static: true,
                ..tf.clone()
            })?;
        }

        info!(
            obstacles = descriptors.len(),
            frame_id = %config.frame_id,
            tracking = config.use_tracking,
            "Obstacle scene assembled"
        );
        Ok(Self {
            store: MarkerStore::new(markers),
            config,
            descriptors,
            blueprints,
            bus,
            transforms,
        })
    }

    pub fn config(&self) -> &VisualizerConfig {
        &self.config
    }

    pub fn descriptors(&self) -> &[ObstacleDescriptor] {
        &self.descriptors
    }

    pub fn blueprints(&self) -> &[SpawnBlueprint] {
        &self.blueprints
    }

    pub fn store(&self) -> &MarkerStore {
        &self.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The frame tree used by the trackers.  Writers may insert transforms
    /// directly instead of going through `/tf`.
    pub fn transforms(&self) -> Arc<TfBuffer> {
        Arc::clone(&self.transforms)
    }

    pub fn tracking_mode(&self) -> TrackingMode {
        if self.config.use_tracking {
            TrackingMode::Tracking
        } else {
            TrackingMode::Idle
        }
    }

    /// Spawn every obstacle through `service`.  Returns `None` when
    /// `spawn_in_sim` is off.
    pub async fn spawn_obstacles(&self, service: Arc<dyn SpawnService>) -> Option<SpawnReport> {
        if !self.config.spawn_in_sim {
            debug!("Simulator spawning disabled");
            return None;
        }
        let orchestrator =
            SpawnOrchestrator::new(service, self.config.spawn_timeout, self.config.spawn_timeout);
        Some(orchestrator.run(&self.blueprints).await)
    }

    /// Launch the background tasks.  Must be called inside a Tokio runtime.
    pub fn start(&self) -> RunningVisualizer {
        let (shutdown, stop) = watch::channel(false);
        let mut tasks = vec![TransformListener::spawn(
            &self.bus,
            Arc::clone(&self.transforms),
            stop.clone(),
        )];

        if self.tracking_mode() == TrackingMode::Tracking {
            let service: Arc<dyn TransformService> = self.transforms.clone();
            let reconciler = Arc::new(FrameReconciler::new(
                service,
                self.store.clone(),
                self.bus.clone(),
                self.config.frame_id.clone(),
                self.config.lookup_timeout,
            ));
            for id in self.store.ids() {
                tasks.push(reconciler.spawn_tracker(id, stop.clone()));
            }
        }

        let scheduler =
            BroadcastScheduler::new(self.store.clone(), self.bus.clone(), self.config.broadcast_period);
        tasks.push(scheduler.spawn(stop));

        RunningVisualizer { shutdown, tasks }
    }
}

/// Handle to the tasks launched by [`ObstacleVisualizer::start`].
pub struct RunningVisualizer {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningVisualizer {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signal every task to stop and wait for them.
    pub async fn shutdown(self) {
        // Tasks also stop once the sender is gone, so a send error is moot.
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Visualizer task ended abnormally");
            }
        }
        info!("Obstacle visualizer stopped");
    }
}
