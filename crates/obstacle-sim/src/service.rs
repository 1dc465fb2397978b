//! The seam between the spawn orchestrator and a concrete simulator.

use std::time::Duration;

use async_trait::async_trait;
use obstacle_types::{SceneError, SpawnBlueprint};
use thiserror::Error;

/// Why a single spawn request did not succeed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpawnError {
    #[error("spawn service unavailable: {0}")]
    Unavailable(String),

    #[error("simulator rejected '{model}': {message}")]
    Rejected { model: String, message: String },

    #[error("spawn of '{0}' timed out")]
    Timeout(String),

    #[error("spawn protocol error: {0}")]
    Protocol(String),
}

impl SpawnError {
    pub fn into_scene_error(self, obstacle: &str) -> SceneError {
        SceneError::Spawn {
            obstacle: obstacle.to_string(),
            details: self.to_string(),
        }
    }
}

/// A simulator that can instantiate obstacles from [`SpawnBlueprint`]s.
#[async_trait]
pub trait SpawnService: Send + Sync {
    /// Block until the service can accept requests, for at most `timeout`.
    ///
    /// Services that are always ready keep the default.
    async fn wait_until_ready(&self, _timeout: Duration) -> Result<(), SpawnError> {
        Ok(())
    }

    /// Instantiate one obstacle.
    async fn spawn(&self, blueprint: &SpawnBlueprint) -> Result<(), SpawnError>;
}
