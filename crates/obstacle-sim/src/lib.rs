//! `obstacle-sim` – everything needed to put obstacles into a physics
//! simulator.
//!
//! # Modules
//!
//! - [`sdf`] – [`SdfGenerator`][sdf::SdfGenerator]: the
//!   [`GeometryDescriptorGenerator`][sdf::GeometryDescriptorGenerator] that
//!   renders each shape as an SDF model.
//! - [`service`] – the [`SpawnService`][service::SpawnService] trait and its
//!   error type.
//! - [`sim`] – [`SimSpawnService`][sim::SimSpawnService]: in-process recorder
//!   for tests and dry runs.
//! - [`rosbridge`] – [`RosbridgeSpawnService`][rosbridge::RosbridgeSpawnService]:
//!   calls Gazebo's `spawn_sdf_model` service through a rosbridge WebSocket.

pub mod rosbridge;
pub mod sdf;
pub mod service;
pub mod sim;

pub use rosbridge::RosbridgeSpawnService;
pub use sdf::{GeometryDescriptorGenerator, SdfGenerator};
pub use service::{SpawnError, SpawnService};
pub use sim::SimSpawnService;
