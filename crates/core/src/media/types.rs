//! Track and format types shared by engines and the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
    Other,
}

impl MediaKind {
    /// Whether tracks of this kind are decoded and re-encoded instead of copied.
    pub fn requires_recode(&self) -> bool {
        matches!(self, Self::Video)
    }

    /// Short label used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a track within one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub u32);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Presentation time in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub fn as_micros(&self) -> i64 {
        self.0
    }
}

/// Opaque description of the samples a track produces.
///
/// The pipeline never interprets these fields; it only forwards them as
/// hints from a source track to the matching sink input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDescription {
    /// Codec or sample format tag (e.g. "h264", "aac", "argb32").
    pub codec: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
}

impl FormatDescription {
    /// Describes a video format.
    pub fn video(codec: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            codec: codec.into(),
            width: Some(width),
            height: Some(height),
            sample_rate: None,
            channels: None,
        }
    }

    /// Describes an audio format.
    pub fn audio(codec: impl Into<String>, sample_rate: u32, channels: u16) -> Self {
        Self {
            codec: codec.into(),
            width: None,
            height: None,
            sample_rate: Some(sample_rate),
            channels: Some(channels),
        }
    }

    /// Describes a format with only a codec tag.
    pub fn opaque(codec: impl Into<String>) -> Self {
        Self {
            codec: codec.into(),
            width: None,
            height: None,
            sample_rate: None,
            channels: None,
        }
    }
}

/// One media stream inside a container. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub media_kind: MediaKind,
    /// Format descriptions advertised by the container, possibly empty.
    pub format_descriptions: Vec<FormatDescription>,
}

impl Track {
    pub fn new(id: u32, media_kind: MediaKind, format_descriptions: Vec<FormatDescription>) -> Self {
        Self {
            id: TrackId(id),
            media_kind,
            format_descriptions,
        }
    }

    /// The first advertised format, used as the hint for passthrough inputs.
    pub fn primary_format(&self) -> Option<&FormatDescription> {
        self.format_descriptions.first()
    }
}

/// Output container type requested from the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerType {
    #[default]
    QuickTime,
    Mp4,
    M4a,
}

impl ContainerType {
    /// Conventional file extension for this container.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::QuickTime => "mov",
            Self::Mp4 => "mp4",
            Self::M4a => "m4a",
        }
    }
}

/// Pixel layout requested when decoding video for a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    #[default]
    Argb32,
    Bgra32,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        4
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Argb32 => "argb32",
            Self::Bgra32 => "bgra32",
        }
    }
}
