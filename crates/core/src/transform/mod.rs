//! Per-sample transforms applied by transformable track pipes.

mod channel_zero;
mod error;

pub use channel_zero::{ChannelZero, ARGB_RED_CHANNEL};
pub use error::TransformError;

use crate::media::Sample;

/// A pluggable, synchronous mutation of one sample.
///
/// Called on the transfer loop that owns the sample, once per sample, before
/// the sample is appended to the sink. Implementations must release any
/// buffer lock they take on every exit path.
pub trait SampleTransform: Send + Sync {
    /// Returns the name of this transform, used in logs.
    fn name(&self) -> &str;

    fn apply(&self, sample: &Sample) -> Result<(), TransformError>;
}
