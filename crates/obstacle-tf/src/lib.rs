//! `obstacle-tf` – frame tree and bounded-wait transform lookups.
//!
//! # Modules
//!
//! - [`buffer`] – [`TfBuffer`][buffer::TfBuffer]: time-stamped tree of named
//!   reference frames.  Interpolates between samples, refuses to extrapolate
//!   beyond a configurable tolerance and lets callers wait (up to a timeout)
//!   for transforms that have not arrived yet.
//!
//! The [`TransformService`] trait is the seam the frame reconciler depends
//! on; [`TfBuffer`][buffer::TfBuffer] is the in-process implementation.

pub mod buffer;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use obstacle_types::{SceneError, Transform3D};
use thiserror::Error;

pub use buffer::TfBuffer;

/// Which side of the buffered time window a lookup fell on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Past,
    Future,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Past => write!(f, "past"),
            Direction::Future => write!(f, "future"),
        }
    }
}

/// Why a transform could not be produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TfError {
    #[error("frame '{0}' does not exist in the frame tree")]
    UnknownFrame(String),

    #[error("frames '{source_frame}' and '{target_frame}' are not connected")]
    Connectivity {
        source_frame: String,
        target_frame: String,
    },

    #[error(
        "lookup at {requested} would extrapolate into the {direction} on edge \
         '{parent}' -> '{child}' (buffered {oldest} .. {newest})"
    )]
    Extrapolation {
        parent: String,
        child: String,
        direction: Direction,
        requested: DateTime<Utc>,
        oldest: DateTime<Utc>,
        newest: DateTime<Utc>,
    },

    #[error("rejected transform '{parent}' -> '{child}': {reason}")]
    InvalidTransform {
        parent: String,
        child: String,
        reason: String,
    },

    #[error("rejected pose sample in frame '{frame}': {reason}")]
    InvalidPose { frame: String, reason: String },
}

impl TfError {
    /// Whether waiting for more data could make the same lookup succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TfError::UnknownFrame(_) | TfError::Connectivity { .. } => true,
            TfError::Extrapolation { direction, .. } => *direction == Direction::Future,
            TfError::InvalidTransform { .. } | TfError::InvalidPose { .. } => false,
        }
    }
}

impl From<TfError> for SceneError {
    fn from(e: TfError) -> Self {
        SceneError::TransformLookup(e.to_string())
    }
}

/// Source of rigid transforms between named frames.
///
/// `lookup` returns T_target_source: the transform that re-expresses a pose
/// given in `source_frame` in `target_frame`, valid at `time`.  It may wait
/// for missing data but never longer than `timeout`; on expiry it returns the
/// last failure it saw.
#[async_trait]
pub trait TransformService: Send + Sync {
    async fn lookup(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Transform3D, TfError>;
}
