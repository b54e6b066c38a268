//! Zeroes one color channel of every pixel.

use super::error::TransformError;
use super::SampleTransform;
use crate::media::{PixelLock, Sample};

/// Byte offset of the red component in an ARGB pixel.
pub const ARGB_RED_CHANNEL: usize = 1;

/// Overwrites the byte at a fixed channel offset of every pixel with zero.
///
/// Zeroing red in ARGB frames tints the picture cyan; other offsets give the
/// matching complementary tint. Samples that carry no decoded frame pass
/// through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelZero {
    channel: usize,
}

impl ChannelZero {
    pub fn new(channel: usize) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> usize {
        self.channel
    }
}

impl Default for ChannelZero {
    fn default() -> Self {
        Self::new(ARGB_RED_CHANNEL)
    }
}

impl SampleTransform for ChannelZero {
    fn name(&self) -> &str {
        "channel_zero"
    }

    fn apply(&self, sample: &Sample) -> Result<(), TransformError> {
        let Some(buffer) = sample.pixel_buffer() else {
            return Ok(());
        };

        let mut pixels = buffer.lock()?;
        zero_channel(&mut pixels, self.channel)
    }
}

fn zero_channel(pixels: &mut PixelLock<'_>, channel: usize) -> Result<(), TransformError> {
    let width = pixels.width();
    let height = pixels.height();
    let bytes_per_row = pixels.bytes_per_row();

    if width == 0 || height == 0 {
        return Ok(());
    }

    let bytes_per_pixel = bytes_per_row / width;
    if bytes_per_pixel == 0 {
        return Err(TransformError::InvalidLayout {
            reason: format!("{} bytes per row cannot hold {} pixels", bytes_per_row, width),
        });
    }
    if channel >= bytes_per_pixel {
        return Err(TransformError::ChannelOutOfRange {
            channel,
            bytes_per_pixel,
        });
    }

    let row_len = width * bytes_per_pixel;
    for row in pixels.bytes_mut().chunks_mut(bytes_per_row).take(height) {
        for pixel in row[..row_len].chunks_exact_mut(bytes_per_pixel) {
            pixel[channel] = 0;
        }
    }

    Ok(())
}
