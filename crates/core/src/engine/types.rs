//! Session status and settings types for media engines.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::EngineError;
use crate::media::PixelFormat;

/// Status of a reader session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderStatus {
    Unknown,
    Reading,
    Completed,
    Failed(EngineError),
    Cancelled,
}

impl ReaderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_) | Self::Cancelled)
    }
}

impl fmt::Display for ReaderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Reading => f.write_str("reading"),
            Self::Completed => f.write_str("completed"),
            Self::Failed(_) => f.write_str("failed"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Status of a writer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterStatus {
    Unknown,
    Writing,
    Completed,
    Failed(EngineError),
    Cancelled,
}

impl WriterStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_) | Self::Cancelled)
    }
}

impl fmt::Display for WriterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Writing => f.write_str("writing"),
            Self::Completed => f.write_str("completed"),
            Self::Failed(_) => f.write_str("failed"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// How a reader output vends samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OutputSettings {
    /// Samples are vended exactly as stored in the container.
    Passthrough,
    /// Samples are decoded to frames of the given pixel format.
    Decode { pixel_format: PixelFormat },
}

/// How a writer input stores appended samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InputSettings {
    /// Samples are stored without re-encoding.
    Passthrough,
    /// Samples are compressed with the given codec.
    Encode { codec: String },
}

/// Result of waiting on a writer input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkReadiness {
    /// The input accepts more samples.
    Ready,
    /// The input will never accept more samples.
    Closed,
}
