use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::media::MediaKind;
use crate::pipeline::PipelineConfig;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub memory_engine: MemoryEngineConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Synthetic source and engine behaviour for the in-memory engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MemoryEngineConfig {
    /// Path the synthetic asset is registered under.
    #[serde(default = "default_source")]
    pub source: PathBuf,
    #[serde(default = "default_video_tracks")]
    pub video_tracks: usize,
    #[serde(default = "default_audio_tracks")]
    pub audio_tracks: usize,
    #[serde(default)]
    pub other_tracks: usize,
    /// Frames per video track.
    #[serde(default = "default_frames")]
    pub frames: usize,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Samples per audio or other track.
    #[serde(default = "default_audio_samples")]
    pub audio_samples: usize,
    /// Samples each writer input queues before it reports not ready.
    #[serde(default = "default_sink_capacity")]
    pub sink_capacity: usize,
    /// Media kinds the writer accepts.
    #[serde(default = "default_supported_kinds")]
    pub supported_kinds: Vec<MediaKind>,
    /// Simulated decode time per sample in milliseconds.
    #[serde(default)]
    pub sample_delay_ms: u64,
}

impl Default for MemoryEngineConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            video_tracks: default_video_tracks(),
            audio_tracks: default_audio_tracks(),
            other_tracks: 0,
            frames: default_frames(),
            width: default_width(),
            height: default_height(),
            audio_samples: default_audio_samples(),
            sink_capacity: default_sink_capacity(),
            supported_kinds: default_supported_kinds(),
            sample_delay_ms: 0,
        }
    }
}

fn default_source() -> PathBuf {
    PathBuf::from("synthetic.mov")
}

fn default_video_tracks() -> usize {
    1
}

fn default_audio_tracks() -> usize {
    1
}

fn default_frames() -> usize {
    120
}

fn default_width() -> u32 {
    320
}

fn default_height() -> u32 {
    240
}

fn default_audio_samples() -> usize {
    240
}

fn default_sink_capacity() -> usize {
    4
}

fn default_supported_kinds() -> Vec<MediaKind> {
    vec![MediaKind::Video, MediaKind::Audio]
}

/// Where results go.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Destination container path.
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
    /// Print the Prometheus text exposition after the run.
    #[serde(default)]
    pub print_metrics: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            print_metrics: false,
        }
    }
}

fn default_output_path() -> PathBuf {
    PathBuf::from("out.mov")
}
