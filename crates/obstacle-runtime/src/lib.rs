//! `obstacle-runtime` – the obstacle scene pipeline.
//!
//! # Modules
//!
//! - [`registry`] – [`load`][registry::load]: parses the ordered obstacle
//!   table into validated [`ObstacleDescriptor`][obstacle_types::ObstacleDescriptor]s.
//! - [`geometry_builder`] – [`build`][geometry_builder::build]: derives the
//!   marker and the spawn blueprint of each obstacle.
//! - [`marker_store`] – [`MarkerStore`][marker_store::MarkerStore]: the
//!   shared, ordered marker collection.
//! - [`reconciler`] – [`FrameReconciler`][reconciler::FrameReconciler]:
//!   per-obstacle tasks that move tracked obstacles into the target frame.
//! - [`broadcaster`] – [`BroadcastScheduler`][broadcaster::BroadcastScheduler]:
//!   periodic full-scene broadcast on `/obstacle_markers`.
//! - [`spawn`] – [`SpawnOrchestrator`][spawn::SpawnOrchestrator]: one-shot
//!   simulator spawning at startup.
//! - [`tf_listener`] – [`TransformListener`][tf_listener::TransformListener]:
//!   feeds `/tf` into the frame tree.
//! - [`visualizer`] – [`ObstacleVisualizer`][visualizer::ObstacleVisualizer]:
//!   wires all of the above together.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console
//!   logging with optional OTLP span export.

pub mod broadcaster;
pub mod geometry_builder;
pub mod marker_store;
pub mod reconciler;
pub mod registry;
pub mod spawn;
pub mod telemetry;
pub mod tf_listener;
pub mod visualizer;

pub use broadcaster::BroadcastScheduler;
pub use marker_store::MarkerStore;
pub use reconciler::{FrameReconciler, TrackingMode};
pub use registry::RawObstacleSpec;
pub use spawn::{SpawnOrchestrator, SpawnReport};
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use tf_listener::TransformListener;
pub use visualizer::{ObstacleVisualizer, RunningVisualizer, VisualizerConfig};
