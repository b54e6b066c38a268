//! Error types for pipeline runs.

use std::path::PathBuf;
use thiserror::Error;

use crate::engine::EngineError;
use crate::media::TrackId;
use crate::transform::TransformError;

/// Errors that end a pipeline run with a failed result.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A track yielded no samples carrying a format description.
    #[error("Track {track} yielded no media data")]
    NoMediaData { track: TrackId },

    /// None of the source tracks can be stored in the destination.
    #[error("No source track is supported by the destination")]
    NoEligibleTracks,

    /// Loading the asset's track list failed.
    #[error("Failed to load asset tracks: {0}")]
    MetadataLoadFailed(#[source] EngineError),

    /// The engine refused to create a reader.
    #[error("Failed to create reader: {0}")]
    ReaderCreateFailed(#[source] EngineError),

    /// The engine refused to create a writer.
    #[error("Failed to create writer: {0}")]
    WriterCreateFailed(#[source] EngineError),

    /// A reader output or writer input could not be registered.
    #[error("Failed to register track {track}: {source}")]
    OutputRegistrationFailed {
        track: TrackId,
        #[source]
        source: EngineError,
    },

    /// The reader did not start.
    #[error("Reader failed to start: {0}")]
    ReaderStartFailed(#[source] EngineError),

    /// The writer did not start.
    #[error("Writer failed to start: {0}")]
    WriterStartFailed(#[source] EngineError),

    /// A sample transform failed on one track.
    #[error("Transform failed on track {track}: {source}")]
    TransformFailed {
        track: TrackId,
        #[source]
        source: TransformError,
    },

    /// The writer ended in a failed state.
    #[error("Writer failed: {0}")]
    SinkTerminalFailure(#[source] EngineError),

    /// The reader ended in a failed state.
    #[error("Reader failed: {0}")]
    SourceTerminalFailure(#[source] EngineError),

    /// A pre-existing output artifact could not be removed.
    #[error("Failed to remove existing output {path}: {source}")]
    StorageFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A transfer task ended without reporting an outcome.
    #[error("Transfer task for track {track} failed: {reason}")]
    TransferTaskFailed { track: TrackId, reason: String },

    /// A session stopped in a non-terminal status.
    #[error("Unexpected {session} status: {status}")]
    UnexpectedStatus {
        session: &'static str,
        status: String,
    },
}

impl PipelineError {
    /// Whether this error was raised before any transfer started.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Self::NoMediaData { .. }
                | Self::NoEligibleTracks
                | Self::MetadataLoadFailed(_)
                | Self::ReaderCreateFailed(_)
                | Self::WriterCreateFailed(_)
                | Self::OutputRegistrationFailed { .. }
                | Self::ReaderStartFailed(_)
                | Self::WriterStartFailed(_)
                | Self::StorageFailure { .. }
        )
    }
}
