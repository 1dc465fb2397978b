//! [`SpawnOrchestrator`] – one-shot startup phase that instantiates every
//! obstacle in the simulator.
//!
//! The orchestrator waits (bounded) for the spawn service, then issues one
//! request per blueprint in registry order.  A failure or timeout for one
//! obstacle is logged and the remaining obstacles are still attempted.

use std::sync::Arc;
use std::time::Duration;

use obstacle_sim::{SpawnError, SpawnService};
use obstacle_types::{SceneError, SpawnBlueprint};
use tracing::{error, info, warn};

/// Outcome of a spawn phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnReport {
    /// Ids spawned successfully, in request order.
    pub spawned: Vec<String>,
    /// Ids that could not be spawned, with the reason.
    pub failed: Vec<(String, SpawnError)>,
}

impl SpawnReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// The failures as workspace errors, in request order.
    pub fn errors(&self) -> Vec<SceneError> {
        self.failed
            .iter()
            .map(|(id, e)| e.clone().into_scene_error(id))
            .collect()
    }
}

pub struct SpawnOrchestrator {
    service: Arc<dyn SpawnService>,
    ready_timeout: Duration,
    call_timeout: Duration,
}

impl SpawnOrchestrator {
    pub fn new(service: Arc<dyn SpawnService>, ready_timeout: Duration, call_timeout: Duration) -> Self {
        Self {
            service,
            ready_timeout,
            call_timeout,
        }
    }

    pub async fn run(&self, blueprints: &[SpawnBlueprint]) -> SpawnReport {
        let mut report = SpawnReport::default();

        if let Err(e) = self.service.wait_until_ready(self.ready_timeout).await {
            error!(error = %e, "Spawn service never became ready; no obstacle spawned");
            report.failed = blueprints
                .iter()
                .map(|bp| (bp.id.clone(), e.clone()))
                .collect();
            return report;
        }

        for blueprint in blueprints {
            let outcome = tokio::time::timeout(self.call_timeout, self.service.spawn(blueprint))
                .await
                .unwrap_or_else(|_| Err(SpawnError::Timeout(blueprint.id.clone())));
            match outcome {
                Ok(()) => {
                    info!(obstacle = %blueprint.id, "Spawned obstacle in simulator");
                    report.spawned.push(blueprint.id.clone());
                }
                Err(e) => {
                    warn!(obstacle = %blueprint.id, error = %e, "Spawning obstacle failed");
                    report.failed.push((blueprint.id.clone(), e));
                }
            }
        }
        report
    }
}
