//! Testing utilities and mock implementations.
//!
//! This module provides mocks for the pipeline's pluggable collaborators and
//! fixtures for building synthetic sources. Media engine behaviour itself is
//! exercised through [`MemoryEngine`](crate::engine::MemoryEngine), which
//! already supports fault injection.
//!
//! # Example
//!
//! ```rust,ignore
//! use trackpipe_core::testing::{fixtures, MockStorage, MockTransform};
//!
//! let engine = fixtures::engine_with(fixtures::av_asset(100, 200));
//! let storage = MockStorage::new();
//! let transform = MockTransform::new().fail_at(TrackId(1), 5, TransformError::failed("x"));
//! ```

mod mock_storage;
mod mock_transform;

pub use mock_storage::{MockStorage, StorageCall};
pub use mock_transform::MockTransform;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::PathBuf;
    use std::sync::Arc;

    use crate::engine::{MemoryEngine, SyntheticAsset, SyntheticTrack};
    use crate::pipeline::{Pipeline, PipelineConfig, PipelineRequest};

    /// Path synthetic sources are registered under.
    pub const SOURCE: &str = "/fixtures/source.mov";

    /// Path outputs are written to.
    pub const DESTINATION: &str = "/fixtures/output.mov";

    /// Create a source with one 8x8 video track (id 1) and one audio
    /// track (id 2).
    pub fn av_asset(frames: usize, audio_samples: usize) -> SyntheticAsset {
        SyntheticAsset::new()
            .with_track(SyntheticTrack::video(1, frames, 8, 8))
            .with_track(SyntheticTrack::audio(2, audio_samples))
    }

    /// Create an engine with `asset` registered at [`SOURCE`].
    pub fn engine_with(asset: SyntheticAsset) -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine.insert_asset(SOURCE, asset);
        engine
    }

    /// Create a pipeline from [`SOURCE`] to [`DESTINATION`] that uses the
    /// engine for output storage too.
    pub fn pipeline(engine: &MemoryEngine, config: PipelineConfig) -> Pipeline {
        Pipeline::new(Arc::new(engine.clone()), request(), config)
            .with_storage(Arc::new(engine.clone()))
    }

    pub fn request() -> PipelineRequest {
        PipelineRequest::new(SOURCE, DESTINATION)
    }

    pub fn destination() -> PathBuf {
        PathBuf::from(DESTINATION)
    }
}
