//! Mock sample transform for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::media::{Sample, TrackId};
use crate::transform::{SampleTransform, TransformError};

/// Mock implementation of the SampleTransform trait.
///
/// Counts applications per track and can be told to fail or panic on the
/// n-th sample (one based) of a given track. Samples are never modified.
#[derive(Debug, Default)]
pub struct MockTransform {
    applied: AtomicUsize,
    per_track: Mutex<HashMap<TrackId, usize>>,
    failures: Mutex<HashMap<TrackId, (usize, TransformError)>>,
    panics: Mutex<HashMap<TrackId, usize>>,
}

impl MockTransform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `nth` sample of `track` with `error`.
    pub fn fail_at(self, track: TrackId, nth: usize, error: TransformError) -> Self {
        self.lock_failures().insert(track, (nth, error));
        self
    }

    /// Panic while transforming the `nth` sample of `track`.
    pub fn panic_at(self, track: TrackId, nth: usize) -> Self {
        self.panics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(track, nth);
        self
    }

    /// Total samples this transform was applied to.
    pub fn applied(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }

    /// Samples of `track` this transform was applied to.
    pub fn applied_to(&self, track: TrackId) -> usize {
        self.per_track
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&track)
            .copied()
            .unwrap_or(0)
    }

    fn lock_failures(&self) -> std::sync::MutexGuard<'_, HashMap<TrackId, (usize, TransformError)>> {
        self.failures.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SampleTransform for MockTransform {
    fn name(&self) -> &str {
        "mock"
    }

    fn apply(&self, sample: &Sample) -> Result<(), TransformError> {
        self.applied.fetch_add(1, Ordering::SeqCst);
        let nth = {
            let mut per_track = self.per_track.lock().unwrap_or_else(|e| e.into_inner());
            let count = per_track.entry(sample.track).or_insert(0);
            *count += 1;
            *count
        };

        let panic_at = self
            .panics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&sample.track)
            .copied();
        if panic_at == Some(nth) {
            panic!("mock transform panicked on sample {} of {}", nth, sample.track);
        }

        match self.lock_failures().get(&sample.track) {
            Some((at, error)) if *at == nth => Err(error.clone()),
            _ => Ok(()),
        }
    }
}
