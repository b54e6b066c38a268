//! Error types for sample transforms.

use thiserror::Error;

use crate::media::LockError;

/// Errors raised while transforming a sample.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// Exclusive access to the pixel buffer could not be acquired.
    #[error("Failed to lock pixel buffer (status {status})")]
    LockFailed { status: i32 },

    /// The requested channel does not exist in the buffer's pixels.
    #[error("Channel {channel} is outside a {bytes_per_pixel}-byte pixel")]
    ChannelOutOfRange {
        channel: usize,
        bytes_per_pixel: usize,
    },

    /// Width, height and row stride do not describe a usable buffer.
    #[error("Invalid pixel buffer layout: {reason}")]
    InvalidLayout { reason: String },

    /// Any other transform-specific failure.
    #[error("Transform failed: {reason}")]
    Failed { reason: String },
}

impl TransformError {
    /// Creates a generic transform failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

impl From<LockError> for TransformError {
    fn from(err: LockError) -> Self {
        Self::LockFailed { status: err.status }
    }
}
