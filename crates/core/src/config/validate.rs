use super::{types::Config, ConfigError};
use crate::media::PixelFormat;

/// Validate configuration
/// Currently validates:
/// - Transform channel lies within one pixel of the decode format
/// - Synthetic video dimensions are non-zero
/// - Sink capacity is non-zero
/// - Output path is not empty
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Pipeline validation
    let bytes_per_pixel = config.pipeline.video_pixel_format.bytes_per_pixel();
    if config.pipeline.transform_channel >= bytes_per_pixel {
        return Err(ConfigError::ValidationError(format!(
            "pipeline.transform_channel must be below {} for {}",
            bytes_per_pixel,
            config.pipeline.video_pixel_format.as_str()
        )));
    }
    if config.pipeline.video_codec.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "pipeline.video_codec cannot be empty".to_string(),
        ));
    }

    // Memory engine validation
    let engine = &config.memory_engine;
    if engine.video_tracks > 0 && (engine.width == 0 || engine.height == 0) {
        return Err(ConfigError::ValidationError(
            "memory_engine.width and memory_engine.height cannot be 0".to_string(),
        ));
    }
    if engine.sink_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "memory_engine.sink_capacity cannot be 0".to_string(),
        ));
    }

    // Output validation
    if config.output.path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "output.path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
