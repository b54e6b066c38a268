//! Media data model: tracks, formats and sample buffers.
//!
//! Everything here is container- and codec-agnostic. Engines produce these
//! values; the pipeline moves them without interpreting their contents.

mod sample;
mod types;

pub use sample::{
    LockError, PixelBuffer, PixelLock, Sample, SamplePayload, LOCK_STATUS_BUSY,
    LOCK_STATUS_POISONED,
};
pub use types::{ContainerType, FormatDescription, MediaKind, PixelFormat, Timestamp, Track, TrackId};
