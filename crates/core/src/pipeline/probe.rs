//! Discovering the runtime format of decoded tracks.

use tracing::{debug, warn};

use super::error::PipelineError;
use crate::engine::{AssetReader, MediaAsset, MediaEngine, OutputSettings};
use crate::media::{FormatDescription, Track};

/// Cancels the wrapped reader when dropped.
struct ProbeReader(Box<dyn AssetReader>);

impl Drop for ProbeReader {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Finds the format each track produces under `settings`.
///
/// A temporary reader is opened against `asset`, one output per track is
/// attached and samples are pulled until one carries a format description.
/// The temporary reader is cancelled on every return path. No reader is
/// created when `tracks` is empty.
pub async fn probe_formats(
    engine: &dyn MediaEngine,
    asset: &dyn MediaAsset,
    tracks: &[Track],
    settings: &OutputSettings,
) -> Result<Vec<FormatDescription>, PipelineError> {
    if tracks.is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = ProbeReader(
        engine
            .create_reader(asset)
            .map_err(PipelineError::ReaderCreateFailed)?,
    );

    let mut outputs = Vec::with_capacity(tracks.len());
    for track in tracks {
        let output = reader
            .0
            .add_output(track, settings.clone())
            .map_err(|source| PipelineError::OutputRegistrationFailed {
                track: track.id,
                source,
            })?;
        outputs.push(output);
    }

    reader.0.start().map_err(PipelineError::ReaderStartFailed)?;

    let mut formats = Vec::with_capacity(outputs.len());
    for (track, output) in tracks.iter().zip(outputs.iter_mut()) {
        let mut skipped = 0usize;
        let format = loop {
            match output.next_sample().await {
                Some(sample) => match sample.format_description() {
                    Some(format) => break format.clone(),
                    None => skipped += 1,
                },
                None => {
                    warn!(track = %track.id, skipped, "Track ran out of samples while probing");
                    return Err(PipelineError::NoMediaData { track: track.id });
                }
            }
        };
        debug!(track = %track.id, codec = %format.codec, skipped, "Probed track format");
        formats.push(format);
    }

    Ok(formats)
}
