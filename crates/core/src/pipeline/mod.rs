//! The transcode pipeline.
//!
//! A run reads every eligible track of a source container and writes it to a
//! destination container. Video tracks are decoded, passed through a
//! [`SampleTransform`](crate::transform::SampleTransform) and re-encoded;
//! other supported tracks are copied as-is. Each track moves through its own
//! [`TrackPipe`] driven by a [`TransferLoop`] under sink backpressure, and the
//! [`Pipeline`] joins the loops and resolves a single [`PipelineResult`].

mod cancel;
mod classifier;
mod completion;
mod config;
mod coordinator;
mod error;
mod pipe;
mod probe;
mod transfer;
mod types;

pub use cancel::CancelFlag;
pub use classifier::{classify, Classification};
pub use config::PipelineConfig;
pub use coordinator::{run_pipeline, Pipeline, PipelineHandle};
pub use error::PipelineError;
pub use pipe::{TrackPipe, TrackRole};
pub use probe::probe_formats;
pub use transfer::TransferLoop;
pub use types::{
    CoordinatorState, LoopState, PipeReport, PipelineRequest, PipelineResult, RunReport,
    TransferOutcome,
};
