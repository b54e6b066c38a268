//! Configuration for pipeline runs.

use serde::{Deserialize, Serialize};

use crate::media::{ContainerType, PixelFormat, Timestamp};
use crate::transform::ARGB_RED_CHANNEL;

/// Configuration for a single pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Container type of the destination.
    #[serde(default)]
    pub container: ContainerType,

    /// Byte offset within each pixel that the transform zeroes.
    #[serde(default = "default_transform_channel")]
    pub transform_channel: usize,

    /// Pixel layout video tracks are decoded to before transforming.
    #[serde(default)]
    pub video_pixel_format: PixelFormat,

    /// Codec transformed video is re-encoded with.
    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    /// Whether a pre-existing artifact at the destination is removed.
    /// When disabled, an existing artifact fails the run.
    #[serde(default = "default_overwrite_existing")]
    pub overwrite_existing: bool,

    /// Source time, in microseconds, the writing session starts at.
    #[serde(default)]
    pub session_start: i64,
}

fn default_transform_channel() -> usize {
    ARGB_RED_CHANNEL
}

fn default_video_codec() -> String {
    "h264".to_string()
}

fn default_overwrite_existing() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            container: ContainerType::default(),
            transform_channel: default_transform_channel(),
            video_pixel_format: PixelFormat::default(),
            video_codec: default_video_codec(),
            overwrite_existing: default_overwrite_existing(),
            session_start: 0,
        }
    }
}

impl PipelineConfig {
    /// Sets the destination container.
    pub fn with_container(mut self, container: ContainerType) -> Self {
        self.container = container;
        self
    }

    /// Sets the channel the transform zeroes.
    pub fn with_transform_channel(mut self, channel: usize) -> Self {
        self.transform_channel = channel;
        self
    }

    /// Sets the codec for transformed video.
    pub fn with_video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = codec.into();
        self
    }

    pub fn with_overwrite_existing(mut self, overwrite: bool) -> Self {
        self.overwrite_existing = overwrite;
        self
    }

    pub fn session_start_time(&self) -> Timestamp {
        Timestamp::from_micros(self.session_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.container, ContainerType::QuickTime);
        assert_eq!(config.transform_channel, 1);
        assert_eq!(config.video_pixel_format, PixelFormat::Argb32);
        assert_eq!(config.video_codec, "h264");
        assert!(config.overwrite_existing);
        assert_eq!(config.session_start_time(), Timestamp::ZERO);
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::default()
            .with_container(ContainerType::Mp4)
            .with_transform_channel(3)
            .with_video_codec("hevc")
            .with_overwrite_existing(false);

        assert_eq!(config.container, ContainerType::Mp4);
        assert_eq!(config.transform_channel, 3);
        assert_eq!(config.video_codec, "hevc");
        assert!(!config.overwrite_existing);
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"container": "m4a"}"#).unwrap();
        assert_eq!(config.container, ContainerType::M4a);
        assert_eq!(config.video_codec, "h264");
        assert!(config.overwrite_existing);
    }
}
