//! Result, outcome and state types for pipeline runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use super::error::PipelineError;
use crate::media::{MediaKind, TrackId};
use crate::transform::TransformError;

/// Source and destination of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl PipelineRequest {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Final result of a pipeline run. Published exactly once per run.
#[derive(Debug, Clone)]
pub enum PipelineResult {
    Success,
    Cancelled,
    Failed(Arc<PipelineError>),
}

impl PipelineResult {
    pub fn failed(error: PipelineError) -> Self {
        Self::Failed(Arc::new(error))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Label used in logs, metrics and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Cancelled => "cancelled",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for PipelineResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(err) => write!(f, "failed: {}", err),
            other => f.write_str(other.as_str()),
        }
    }
}

/// State of a single transfer loop.
///
/// A loop moves from `Idle` to `Draining`, ends draining in one of the
/// terminal drain states, then becomes `Finished` after marking its sink
/// finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Draining,
    /// The source ran out of samples.
    Exhausted,
    /// The sink refused a sample or closed.
    SinkRejected,
    TransformFailed,
    Cancelled,
    Finished,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Draining => "draining",
            Self::Exhausted => "exhausted",
            Self::SinkRejected => "sink_rejected",
            Self::TransformFailed => "transform_failed",
            Self::Cancelled => "cancelled",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one transfer loop reports after it finished.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub track: TrackId,
    pub kind: MediaKind,
    /// The state the loop stopped draining in.
    pub end_state: LoopState,
    pub samples_transferred: u64,
    pub transform_error: Option<TransformError>,
    /// Set when the loop's task ended without producing an outcome.
    pub task_failure: Option<String>,
}

impl TransferOutcome {
    pub(crate) fn task_failed(track: TrackId, kind: MediaKind, reason: String) -> Self {
        Self {
            track,
            kind,
            end_state: LoopState::Idle,
            samples_transferred: 0,
            transform_error: None,
            task_failure: Some(reason),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.transform_error.is_none() && self.task_failure.is_none()
    }

    /// The error this outcome contributes to the run result, if any.
    pub fn failure(&self) -> Option<PipelineError> {
        if let Some(source) = &self.transform_error {
            return Some(PipelineError::TransformFailed {
                track: self.track,
                source: source.clone(),
            });
        }
        self.task_failure
            .as_ref()
            .map(|reason| PipelineError::TransferTaskFailed {
                track: self.track,
                reason: reason.clone(),
            })
    }
}

/// Lifecycle of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    NotStarted,
    LoadingMetadata,
    BuildingPipes,
    Running,
    Finishing,
    Completed,
    Cancelled,
    Failed,
}

impl CoordinatorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// The terminal state matching a run result.
    pub fn for_result(result: &PipelineResult) -> Self {
        match result {
            PipelineResult::Success => Self::Completed,
            PipelineResult::Cancelled => Self::Cancelled,
            PipelineResult::Failed(_) => Self::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::LoadingMetadata => "loading_metadata",
            Self::BuildingPipes => "building_pipes",
            Self::Running => "running",
            Self::Finishing => "finishing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-pipe entry of a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeReport {
    pub track: u32,
    pub kind: MediaKind,
    pub end_state: LoopState,
    pub samples_transferred: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&TransferOutcome> for PipeReport {
    fn from(outcome: &TransferOutcome) -> Self {
        Self {
            track: outcome.track.0,
            kind: outcome.kind,
            end_state: outcome.end_state,
            samples_transferred: outcome.samples_transferred,
            error: outcome.failure().map(|e| e.to_string()),
        }
    }
}

/// Serializable summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub pipes: Vec<PipeReport>,
}
