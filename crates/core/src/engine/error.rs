//! Error types reported by media engines.

use std::path::PathBuf;
use thiserror::Error;

use crate::media::MediaKind;

/// Errors raised by a media engine or one of its sessions.
///
/// Engine errors are carried inside reader and writer statuses, so they are
/// cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The source asset does not exist.
    #[error("Asset not found: {path}")]
    AssetNotFound { path: PathBuf },

    /// Loading track metadata failed.
    #[error("Failed to load tracks: {reason}")]
    LoadFailed { reason: String },

    /// The writer cannot hold tracks of this kind.
    #[error("Unsupported media kind: {kind}")]
    UnsupportedMediaKind { kind: MediaKind },

    /// The session is not in a state that allows the operation.
    #[error("Operation not allowed while {state}")]
    InvalidState { state: String },

    /// An artifact already exists at the writer's destination.
    #[error("Output already exists: {path}")]
    OutputExists { path: PathBuf },

    /// Generic engine failure with a platform status code.
    #[error("Media engine failure (code {code}): {reason}")]
    Failed { code: i32, reason: String },
}

impl EngineError {
    /// Creates a generic failure with a status code.
    pub fn failed(code: i32, reason: impl Into<String>) -> Self {
        Self::Failed {
            code,
            reason: reason.into(),
        }
    }

    /// Creates a track loading failure.
    pub fn load_failed(reason: impl Into<String>) -> Self {
        Self::LoadFailed {
            reason: reason.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(state: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.into(),
        }
    }
}
