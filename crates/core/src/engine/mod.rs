//! Media engine collaborators.
//!
//! The pipeline consumes a host media stack through the traits defined here:
//!
//! - [`MediaEngine`]: opens assets and creates reader/writer sessions
//! - [`AssetReader`] / [`TrackOutput`]: per-track sample sources
//! - [`AssetWriter`] / [`TrackInput`]: per-track sample sinks with readiness
//! - [`OutputStorage`]: checks for and removes pre-existing output artifacts
//!
//! Two implementations ship with the crate: [`FsStorage`] for real
//! filesystems and [`MemoryEngine`], a complete in-process engine over
//! synthetic assets.

mod error;
pub mod memory;
mod storage;
mod traits;
mod types;

pub use error::EngineError;
pub use memory::{MemoryEngine, SyntheticAsset, SyntheticTrack, WrittenOutput, WrittenTrack};
pub use storage::FsStorage;
pub use traits::{
    AssetReader, AssetWriter, MediaAsset, MediaEngine, OutputStorage, TrackInput, TrackOutput,
};
pub use types::{InputSettings, OutputSettings, ReaderStatus, SinkReadiness, WriterStatus};
