//! Sorting source tracks into transformable, passthrough and dropped.

use crate::media::{MediaKind, Track};

/// Eligible source tracks, split by how they are handled.
///
/// Both lists keep the relative order of the input tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Tracks that are decoded, transformed and re-encoded.
    pub transformable: Vec<Track>,
    /// Tracks copied to the destination as-is.
    pub passthrough: Vec<Track>,
}

impl Classification {
    pub fn len(&self) -> usize {
        self.transformable.len() + self.passthrough.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Classifies `tracks` against the kinds the destination can hold.
///
/// Tracks whose kind the destination does not support are dropped.
pub fn classify(tracks: &[Track], supported: &[MediaKind]) -> Classification {
    let mut classification = Classification::default();

    for track in tracks {
        if !supported.contains(&track.media_kind) {
            continue;
        }
        if track.media_kind.requires_recode() {
            classification.transformable.push(track.clone());
        } else {
            classification.passthrough.push(track.clone());
        }
    }

    classification
}
