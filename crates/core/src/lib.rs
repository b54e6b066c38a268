pub mod config;
pub mod engine;
pub mod media;
pub mod metrics;
pub mod pipeline;
pub mod testing;
pub mod transform;

pub use config::{
    load_config, load_config_from_str, load_config_or_default, validate_config, Config,
    ConfigError, MemoryEngineConfig, OutputConfig,
};
pub use engine::{
    AssetReader, AssetWriter, EngineError, FsStorage, InputSettings, MediaAsset, MediaEngine,
    MemoryEngine, OutputSettings, OutputStorage, ReaderStatus, SinkReadiness, SyntheticAsset,
    SyntheticTrack, TrackInput, TrackOutput, WriterStatus,
};
pub use media::{
    ContainerType, FormatDescription, MediaKind, PixelBuffer, PixelFormat, Sample, SamplePayload,
    Timestamp, Track, TrackId,
};
pub use pipeline::{
    run_pipeline, CancelFlag, CoordinatorState, LoopState, Pipeline, PipelineConfig,
    PipelineError, PipelineHandle, PipelineRequest, PipelineResult, RunReport, TransferOutcome,
};
pub use transform::{ChannelZero, SampleTransform, TransformError};
