//! Pairing a source track output with its destination input.

use std::fmt;
use std::sync::Arc;

use crate::engine::{TrackInput, TrackOutput};
use crate::media::{MediaKind, TrackId};
use crate::transform::SampleTransform;

/// What happens to samples on their way through a pipe.
#[derive(Clone)]
pub enum TrackRole {
    /// Samples are decoded frames passed through the transform.
    Transform(Arc<dyn SampleTransform>),
    /// Samples are copied unchanged.
    Passthrough,
}

impl TrackRole {
    pub fn transform(&self) -> Option<&dyn SampleTransform> {
        match self {
            Self::Transform(transform) => Some(transform.as_ref()),
            Self::Passthrough => None,
        }
    }
}

impl fmt::Debug for TrackRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transform(transform) => f.debug_tuple("Transform").field(&transform.name()).finish(),
            Self::Passthrough => f.write_str("Passthrough"),
        }
    }
}

/// One source track output paired with one destination input.
///
/// A pipe is owned by exactly one transfer loop.
pub struct TrackPipe {
    pub(crate) track: TrackId,
    pub(crate) kind: MediaKind,
    pub(crate) output: Box<dyn TrackOutput>,
    pub(crate) input: Box<dyn TrackInput>,
    pub(crate) role: TrackRole,
}

impl TrackPipe {
    pub fn new(
        kind: MediaKind,
        output: Box<dyn TrackOutput>,
        input: Box<dyn TrackInput>,
        role: TrackRole,
    ) -> Self {
        Self {
            track: output.track_id(),
            kind,
            output,
            input,
            role,
        }
    }

    pub fn track_id(&self) -> TrackId {
        self.track
    }

    pub fn media_kind(&self) -> MediaKind {
        self.kind
    }

    pub fn role(&self) -> &TrackRole {
        &self.role
    }
}

impl fmt::Debug for TrackPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackPipe")
            .field("track", &self.track)
            .field("kind", &self.kind)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}
