//! [`SimSpawnService`] – in-process spawn service for tests and dry runs.
//!
//! Records every blueprint it is handed instead of talking to a simulator.
//! Individual obstacles can be configured to fail, the whole service can be
//! marked unreachable, and an artificial latency can be injected to exercise
//! timeouts.
//!
//! # Example
//!
//! ```rust
//! use obstacle_sim::{SimSpawnService, SpawnService};
//! use obstacle_types::{Pose, SpawnBlueprint};
//!
//! # tokio_test_block(async {
//! let sim = SimSpawnService::new().with_failure("table");
//! let bp = SpawnBlueprint {
//!     id: "obstacle1".into(),
//!     geometry_descriptor: "<sdf/>".into(),
//!     initial_pose: Pose::identity(),
//!     reference_frame: "world".into(),
//! };
//! sim.spawn(&bp).await.unwrap();
//! assert_eq!(sim.spawned(), vec!["obstacle1".to_string()]);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use obstacle_types::SpawnBlueprint;

use crate::service::{SpawnError, SpawnService};

#[derive(Default)]
pub struct SimSpawnService {
    spawned: Mutex<Vec<SpawnBlueprint>>,
    failing: HashSet<String>,
    unreachable: bool,
    latency: Option<Duration>,
}

impl SimSpawnService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every spawn of `id` report failure.
    pub fn with_failure(mut self, id: impl Into<String>) -> Self {
        self.failing.insert(id.into());
        self
    }

    /// Make the service behave as if it were not running.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Delay every spawn by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Ids of the obstacles spawned so far, in call order.
    pub fn spawned(&self) -> Vec<String> {
        self.blueprints().into_iter().map(|b| b.id).collect()
    }

    /// Full blueprints of the obstacles spawned so far.
    pub fn blueprints(&self) -> Vec<SpawnBlueprint> {
        self.spawned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SpawnService for SimSpawnService {
    async fn wait_until_ready(&self, _timeout: Duration) -> Result<(), SpawnError> {
        if self.unreachable {
            return Err(SpawnError::Unavailable("simulated service is offline".into()));
        }
        Ok(())
    }

    async fn spawn(&self, blueprint: &SpawnBlueprint) -> Result<(), SpawnError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unreachable {
            return Err(SpawnError::Unavailable("simulated service is offline".into()));
        }
        if self.failing.contains(&blueprint.id) {
            return Err(SpawnError::Rejected {
                model: blueprint.id.clone(),
                message: "configured to fail".into(),
            });
        }
        self.spawned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(blueprint.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obstacle_types::Pose;

    fn blueprint(id: &str) -> SpawnBlueprint {
        SpawnBlueprint {
            id: id.into(),
            geometry_descriptor: "<sdf/>".into(),
            initial_pose: Pose::identity(),
            reference_frame: "world".into(),
        }
    }

    #[tokio::test]
    async fn records_successful_spawns_in_order() {
        let sim = SimSpawnService::new();
        sim.spawn(&blueprint("a")).await.unwrap();
        sim.spawn(&blueprint("b")).await.unwrap();
        assert_eq!(sim.spawned(), vec!["a", "b"]);
        assert_eq!(sim.blueprints()[0].reference_frame, "world");
    }

    #[tokio::test]
    async fn configured_failure_is_rejected_and_not_recorded() {
        let sim = SimSpawnService::new().with_failure("b");
        assert!(sim.spawn(&blueprint("a")).await.is_ok());
        assert!(matches!(
            sim.spawn(&blueprint("b")).await,
            Err(SpawnError::Rejected { .. })
        ));
        assert_eq!(sim.spawned(), vec!["a"]);
    }

    #[tokio::test]
    async fn unreachable_service_fails_readiness_and_spawns() {
        let sim = SimSpawnService::new().unreachable();
        assert!(sim.wait_until_ready(Duration::from_millis(10)).await.is_err());
        assert!(matches!(
            sim.spawn(&blueprint("a")).await,
            Err(SpawnError::Unavailable(_))
        ));
    }
}
