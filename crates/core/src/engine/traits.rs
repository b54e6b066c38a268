//! Trait definitions for media engines.
//!
//! These are the seams between the pipeline and the host media stack. The
//! pipeline only ever calls through these traits and treats samples as
//! opaque.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::error::EngineError;
use super::types::{InputSettings, OutputSettings, ReaderStatus, SinkReadiness, WriterStatus};
use crate::media::{ContainerType, FormatDescription, MediaKind, Sample, Timestamp, Track, TrackId};

/// Factory for assets, readers and writers.
pub trait MediaEngine: Send + Sync {
    /// Returns the name of this engine implementation.
    fn name(&self) -> &str;

    /// Opens a handle to a source container. Performs no I/O.
    fn open_asset(&self, source: &Path) -> Arc<dyn MediaAsset>;

    /// Creates a reader session over an asset.
    fn create_reader(&self, asset: &dyn MediaAsset) -> Result<Box<dyn AssetReader>, EngineError>;

    /// Creates a writer session targeting `destination`.
    fn create_writer(
        &self,
        destination: &Path,
        container: ContainerType,
    ) -> Result<Box<dyn AssetWriter>, EngineError>;
}

/// A source container whose track list is loaded lazily.
#[async_trait]
pub trait MediaAsset: Send + Sync {
    fn source(&self) -> &Path;

    /// Loads the track list without blocking the calling thread.
    async fn load_tracks(&self) -> Result<Vec<Track>, EngineError>;
}

/// A reader session producing samples for each registered output.
pub trait AssetReader: Send + Sync {
    /// Registers an output for `track`. Must be called before [`start`](Self::start).
    fn add_output(
        &mut self,
        track: &Track,
        settings: OutputSettings,
    ) -> Result<Box<dyn TrackOutput>, EngineError>;

    fn start(&mut self) -> Result<(), EngineError>;

    fn status(&self) -> ReaderStatus;

    /// Stops reading. Outputs vend no further samples.
    fn cancel(&self);
}

/// The per-track sample source of a reader.
#[async_trait]
pub trait TrackOutput: Send + Sync {
    fn track_id(&self) -> TrackId;

    /// Returns the next sample, or `None` once the output is exhausted or the
    /// reader stopped.
    async fn next_sample(&mut self) -> Option<Sample>;
}

/// A writer session consuming samples for each registered input.
#[async_trait]
pub trait AssetWriter: Send + Sync {
    /// Media kinds the destination container can hold.
    fn supported_media_kinds(&self) -> Vec<MediaKind>;

    /// Registers an input. Must be called before [`start`](Self::start).
    fn add_input(
        &mut self,
        kind: MediaKind,
        settings: InputSettings,
        format_hint: FormatDescription,
    ) -> Result<Box<dyn TrackInput>, EngineError>;

    fn start(&mut self) -> Result<(), EngineError>;

    /// Opens the writing session at the given source time.
    fn start_session(&mut self, at: Timestamp);

    fn status(&self) -> WriterStatus;

    /// Stops writing and discards the partial output.
    fn cancel(&self);

    /// Completes the output once every input is finished.
    async fn finalize(&mut self) -> WriterStatus;
}

/// The per-track sample sink of a writer.
#[async_trait]
pub trait TrackInput: Send + Sync {
    fn is_ready_for_more(&self) -> bool;

    /// Resolves once the input is ready for more data or can never accept
    /// more. Implementations must wake on state changes, not poll.
    async fn ready(&self) -> SinkReadiness;

    /// Appends a sample. Returns `false` if the sink rejected it.
    fn append(&mut self, sample: Sample) -> bool;

    /// Signals that no further samples will be appended.
    fn mark_finished(&mut self);
}

/// Access to whatever storage holds output artifacts.
#[async_trait]
pub trait OutputStorage: Send + Sync {
    async fn exists(&self, path: &Path) -> std::io::Result<bool>;

    async fn remove(&self, path: &Path) -> std::io::Result<()>;
}
