//! In-process media engine over synthetic assets.
//!
//! `MemoryEngine` implements every engine trait without touching real media:
//! assets are described by [`SyntheticAsset`], readers generate samples on
//! demand, and writers keep what they receive in memory. Each writer input has
//! a bounded queue drained by a background muxer task, so readiness flips the
//! way a real writer's does.
//!
//! The engine also doubles as the [`OutputStorage`] for its own artifacts and
//! exposes knobs for injecting faults at every stage.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

use super::error::EngineError;
use super::traits::{
    AssetReader, AssetWriter, MediaAsset, MediaEngine, OutputStorage, TrackInput, TrackOutput,
};
use super::types::{InputSettings, OutputSettings, ReaderStatus, SinkReadiness, WriterStatus};
use crate::config::MemoryEngineConfig;
use crate::media::{
    ContainerType, FormatDescription, MediaKind, PixelBuffer, Sample, SamplePayload, Timestamp,
    Track, TrackId,
};

/// Byte value synthetic frames are filled with.
pub const FRAME_FILL: u8 = 0xFF;

const DEFAULT_SINK_CAPACITY: usize = 4;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Description of one synthetic track.
#[derive(Debug, Clone)]
pub struct SyntheticTrack {
    pub track: Track,
    pub sample_count: usize,
    /// Frame dimensions used when decoding video.
    pub frame_size: (usize, usize),
    /// Number of leading samples vended without a format description.
    pub unformatted_prefix: usize,
    pub sample_interval: Timestamp,
}

impl SyntheticTrack {
    pub fn video(id: u32, frames: usize, width: usize, height: usize) -> Self {
        Self {
            track: Track::new(
                id,
                MediaKind::Video,
                vec![FormatDescription::video("h264", width as u32, height as u32)],
            ),
            sample_count: frames,
            frame_size: (width, height),
            unformatted_prefix: 0,
            sample_interval: Timestamp(33_333),
        }
    }

    pub fn audio(id: u32, samples: usize) -> Self {
        Self {
            track: Track::new(id, MediaKind::Audio, vec![FormatDescription::audio("aac", 48_000, 2)]),
            sample_count: samples,
            frame_size: (0, 0),
            unformatted_prefix: 0,
            sample_interval: Timestamp(21_333),
        }
    }

    pub fn other(id: u32, samples: usize) -> Self {
        Self {
            track: Track::new(id, MediaKind::Other, vec![FormatDescription::opaque("tmcd")]),
            sample_count: samples,
            frame_size: (0, 0),
            unformatted_prefix: 0,
            sample_interval: Timestamp(1_000_000),
        }
    }

    /// Vends the first `count` samples without a format description.
    pub fn with_unformatted_prefix(mut self, count: usize) -> Self {
        self.unformatted_prefix = count;
        self
    }

    /// Drops the container-level format descriptions of the track.
    pub fn without_format_descriptions(mut self) -> Self {
        self.track.format_descriptions.clear();
        self
    }

    fn make_sample(&self, index: usize, settings: &OutputSettings) -> Sample {
        let pts = Timestamp(index as i64 * self.sample_interval.0);
        let formatted = index >= self.unformatted_prefix;

        let (format, payload) = match settings {
            OutputSettings::Decode { pixel_format } => {
                let (width, height) = self.frame_size;
                let format = formatted.then(|| {
                    Arc::new(FormatDescription::video(
                        pixel_format.as_str(),
                        width as u32,
                        height as u32,
                    ))
                });
                let buffer = PixelBuffer::filled(width, height, *pixel_format, FRAME_FILL);
                (format, SamplePayload::Pixels(buffer))
            }
            OutputSettings::Passthrough => {
                let format = if formatted {
                    self.track.primary_format().cloned().map(Arc::new)
                } else {
                    None
                };
                let mut bytes = self.track.id.0.to_le_bytes().to_vec();
                bytes.extend_from_slice(&(index as u64).to_le_bytes());
                (format, SamplePayload::Encoded(Arc::new(bytes)))
            }
        };

        Sample {
            track: self.track.id,
            pts,
            duration: self.sample_interval,
            format,
            payload,
        }
    }
}

/// A synthetic source container.
#[derive(Debug, Clone, Default)]
pub struct SyntheticAsset {
    pub tracks: Vec<SyntheticTrack>,
    /// Time spent "loading" track metadata.
    pub load_delay: Duration,
    /// Error returned by track loading, if any.
    pub load_error: Option<EngineError>,
    /// Time spent producing each sample.
    pub sample_delay: Duration,
}

impl SyntheticAsset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an asset from engine configuration.
    ///
    /// Track ids are assigned in order: video tracks first, then audio, then
    /// other.
    pub fn from_config(config: &MemoryEngineConfig) -> Self {
        let mut asset = Self::new().with_sample_delay(Duration::from_millis(config.sample_delay_ms));
        let mut next_id = 1;
        for _ in 0..config.video_tracks {
            asset = asset.with_track(SyntheticTrack::video(
                next_id,
                config.frames,
                config.width as usize,
                config.height as usize,
            ));
            next_id += 1;
        }
        for _ in 0..config.audio_tracks {
            asset = asset.with_track(SyntheticTrack::audio(next_id, config.audio_samples));
            next_id += 1;
        }
        for _ in 0..config.other_tracks {
            asset = asset.with_track(SyntheticTrack::other(next_id, config.audio_samples));
            next_id += 1;
        }
        asset
    }

    pub fn with_track(mut self, track: SyntheticTrack) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_load_error(mut self, error: EngineError) -> Self {
        self.load_error = Some(error);
        self
    }

    pub fn with_sample_delay(mut self, delay: Duration) -> Self {
        self.sample_delay = delay;
        self
    }

    fn find(&self, id: TrackId) -> Option<&SyntheticTrack> {
        self.tracks.iter().find(|t| t.track.id == id)
    }
}

/// A track as stored by a memory writer.
#[derive(Debug, Clone)]
pub struct WrittenTrack {
    pub kind: MediaKind,
    pub settings: InputSettings,
    pub format_hint: FormatDescription,
    pub samples: Vec<Sample>,
    pub mark_finished_calls: usize,
}

/// Snapshot of an output artifact held by the engine.
#[derive(Debug, Clone)]
pub struct WrittenOutput {
    pub container: ContainerType,
    pub status: WriterStatus,
    pub session_start: Option<Timestamp>,
    pub tracks: Vec<WrittenTrack>,
}

#[derive(Debug, Default)]
struct Faults {
    reader_create: Option<EngineError>,
    writer_create: Option<EngineError>,
    reader_start: Option<EngineError>,
    writer_start: Option<EngineError>,
    read_failure: Option<(TrackId, usize, EngineError)>,
    reject_append: Option<(TrackId, usize, EngineError)>,
    finalize: Option<EngineError>,
    remove: Option<std::io::ErrorKind>,
}

struct EngineState {
    assets: Mutex<HashMap<PathBuf, Arc<SyntheticAsset>>>,
    outputs: Mutex<HashMap<PathBuf, OutputRecord>>,
    faults: Mutex<Faults>,
    supported_kinds: Mutex<Vec<MediaKind>>,
    paused_kinds: Mutex<HashSet<MediaKind>>,
    live_inputs: Mutex<Vec<Arc<InputShared>>>,
    sink_capacity: AtomicUsize,
    /// Status cells of every reader created, in creation order.
    readers: Mutex<Vec<Arc<Mutex<ReaderStatus>>>>,
    writers_created: AtomicUsize,
    pulls: Mutex<HashMap<TrackId, usize>>,
}

/// An artifact present in the engine's storage.
#[derive(Clone)]
enum OutputRecord {
    /// Pre-existing artifact not produced by a writer of this engine.
    Foreign,
    Written {
        container: ContainerType,
        writer: Arc<WriterShared>,
    },
}

/// In-process [`MediaEngine`] over [`SyntheticAsset`]s.
#[derive(Clone)]
pub struct MemoryEngine {
    state: Arc<EngineState>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Creates an engine whose writers accept video and audio.
    pub fn new() -> Self {
        Self {
            state: Arc::new(EngineState {
                assets: Mutex::new(HashMap::new()),
                outputs: Mutex::new(HashMap::new()),
                faults: Mutex::new(Faults::default()),
                supported_kinds: Mutex::new(vec![MediaKind::Video, MediaKind::Audio]),
                paused_kinds: Mutex::new(HashSet::new()),
                live_inputs: Mutex::new(Vec::new()),
                sink_capacity: AtomicUsize::new(DEFAULT_SINK_CAPACITY),
                readers: Mutex::new(Vec::new()),
                writers_created: AtomicUsize::new(0),
                pulls: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Creates an engine configured from `config`, without any assets.
    pub fn from_config(config: &MemoryEngineConfig) -> Self {
        let engine = Self::new().with_sink_capacity(config.sink_capacity);
        engine.set_supported_kinds(config.supported_kinds.clone());
        engine
    }

    /// Sets how many samples each writer input queues before reporting not ready.
    pub fn with_sink_capacity(self, capacity: usize) -> Self {
        self.state.sink_capacity.store(capacity.max(1), Ordering::Relaxed);
        self
    }

    /// Registers an asset at `path`.
    pub fn insert_asset(&self, path: impl Into<PathBuf>, asset: SyntheticAsset) {
        lock(&self.state.assets).insert(path.into(), Arc::new(asset));
    }

    /// Sets the media kinds writers accept.
    pub fn set_supported_kinds(&self, kinds: Vec<MediaKind>) {
        *lock(&self.state.supported_kinds) = kinds;
    }

    /// Places a foreign artifact at `path`, as if left over from an earlier run.
    pub fn place_artifact(&self, path: impl Into<PathBuf>) {
        lock(&self.state.outputs).insert(path.into(), OutputRecord::Foreign);
    }

    pub fn fail_reader_creation(&self, error: EngineError) {
        lock(&self.state.faults).reader_create = Some(error);
    }

    pub fn fail_writer_creation(&self, error: EngineError) {
        lock(&self.state.faults).writer_create = Some(error);
    }

    pub fn fail_reader_start(&self, error: EngineError) {
        lock(&self.state.faults).reader_start = Some(error);
    }

    pub fn fail_writer_start(&self, error: EngineError) {
        lock(&self.state.faults).writer_start = Some(error);
    }

    /// Fails the reader once `after` samples of `track` have been vended.
    pub fn fail_reading(&self, track: TrackId, after: usize, error: EngineError) {
        lock(&self.state.faults).read_failure = Some((track, after, error));
    }

    /// Rejects the append of sample number `at` (zero based) of `track`.
    pub fn reject_append(&self, track: TrackId, at: usize, error: EngineError) {
        lock(&self.state.faults).reject_append = Some((track, at, error));
    }

    pub fn fail_finalize(&self, error: EngineError) {
        lock(&self.state.faults).finalize = Some(error);
    }

    /// Makes artifact removal fail with `kind`.
    pub fn fail_remove(&self, kind: std::io::ErrorKind) {
        lock(&self.state.faults).remove = Some(kind);
    }

    /// Stops the muxers of every input of `kind`, so those inputs fill up and
    /// report not ready.
    pub fn pause_sinks(&self, kind: MediaKind) {
        lock(&self.state.paused_kinds).insert(kind);
        for input in lock(&self.state.live_inputs).iter().filter(|i| i.kind == kind) {
            input.set_paused(true);
        }
    }

    pub fn resume_sinks(&self, kind: MediaKind) {
        lock(&self.state.paused_kinds).remove(&kind);
        for input in lock(&self.state.live_inputs).iter().filter(|i| i.kind == kind) {
            input.set_paused(false);
        }
    }

    pub fn readers_created(&self) -> usize {
        lock(&self.state.readers).len()
    }

    /// Status of every reader created so far, in creation order.
    pub fn reader_statuses(&self) -> Vec<ReaderStatus> {
        lock(&self.state.readers)
            .iter()
            .map(|status| lock(status).clone())
            .collect()
    }

    pub fn writers_created(&self) -> usize {
        self.state.writers_created.load(Ordering::SeqCst)
    }

    /// Total samples vended for `track` across all readers.
    pub fn pulls(&self, track: TrackId) -> usize {
        lock(&self.state.pulls).get(&track).copied().unwrap_or(0)
    }

    /// Number of queued-but-not-muxed samples across inputs of `kind`.
    pub fn queued(&self, kind: MediaKind) -> usize {
        lock(&self.state.live_inputs)
            .iter()
            .filter(|i| i.kind == kind)
            .map(|i| lock(&i.state).queue.len())
            .sum()
    }

    /// Snapshot of the artifact written at `path`.
    pub fn output(&self, path: &Path) -> Option<WrittenOutput> {
        let record = lock(&self.state.outputs).get(path).cloned()?;
        match record {
            OutputRecord::Foreign => None,
            OutputRecord::Written { container, writer } => Some(writer.snapshot(container)),
        }
    }

    pub fn has_artifact(&self, path: &Path) -> bool {
        lock(&self.state.outputs).contains_key(path)
    }
}

impl MediaEngine for MemoryEngine {
    fn name(&self) -> &str {
        "memory"
    }

    fn open_asset(&self, source: &Path) -> Arc<dyn MediaAsset> {
        Arc::new(MemoryAsset {
            source: source.to_path_buf(),
            state: Arc::clone(&self.state),
        })
    }

    fn create_reader(&self, asset: &dyn MediaAsset) -> Result<Box<dyn AssetReader>, EngineError> {
        if let Some(err) = lock(&self.state.faults).reader_create.clone() {
            return Err(err);
        }

        let synthetic = lock(&self.state.assets)
            .get(asset.source())
            .cloned()
            .ok_or_else(|| EngineError::AssetNotFound {
                path: asset.source().to_path_buf(),
            })?;

        let status = Arc::new(Mutex::new(ReaderStatus::Unknown));
        lock(&self.state.readers).push(Arc::clone(&status));
        Ok(Box::new(MemoryReader {
            shared: Arc::new(ReaderShared {
                asset: synthetic,
                status,
                open_outputs: AtomicUsize::new(0),
                engine: Arc::clone(&self.state),
            }),
        }))
    }

    fn create_writer(
        &self,
        destination: &Path,
        container: ContainerType,
    ) -> Result<Box<dyn AssetWriter>, EngineError> {
        if let Some(err) = lock(&self.state.faults).writer_create.clone() {
            return Err(err);
        }

        self.state.writers_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryWriter {
            engine: Arc::clone(&self.state),
            destination: destination.to_path_buf(),
            container,
            shared: Arc::new(WriterShared {
                status: Mutex::new(WriterStatus::Unknown),
                inputs: Mutex::new(Vec::new()),
                session_start: Mutex::new(None),
            }),
            muxers: Vec::new(),
        }))
    }
}

#[async_trait]
impl OutputStorage for MemoryEngine {
    async fn exists(&self, path: &Path) -> std::io::Result<bool> {
        Ok(self.has_artifact(path))
    }

    async fn remove(&self, path: &Path) -> std::io::Result<()> {
        if let Some(kind) = lock(&self.state.faults).remove {
            return Err(std::io::Error::new(kind, "injected removal failure"));
        }
        match lock(&self.state.outputs).remove(path) {
            Some(_) => Ok(()),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no artifact at {}", path.display()),
            )),
        }
    }
}

// =============================================================================
// Asset
// =============================================================================

struct MemoryAsset {
    source: PathBuf,
    state: Arc<EngineState>,
}

#[async_trait]
impl MediaAsset for MemoryAsset {
    fn source(&self) -> &Path {
        &self.source
    }

    async fn load_tracks(&self) -> Result<Vec<Track>, EngineError> {
        let asset = lock(&self.state.assets)
            .get(&self.source)
            .cloned()
            .ok_or_else(|| EngineError::AssetNotFound {
                path: self.source.clone(),
            })?;

        if !asset.load_delay.is_zero() {
            tokio::time::sleep(asset.load_delay).await;
        }

        if let Some(err) = &asset.load_error {
            return Err(err.clone());
        }

        Ok(asset.tracks.iter().map(|t| t.track.clone()).collect())
    }
}

// =============================================================================
// Reader
// =============================================================================

struct ReaderShared {
    asset: Arc<SyntheticAsset>,
    status: Arc<Mutex<ReaderStatus>>,
    /// Outputs that have not yet been exhausted.
    open_outputs: AtomicUsize,
    engine: Arc<EngineState>,
}

impl ReaderShared {
    fn is_reading(&self) -> bool {
        matches!(*lock(&self.status), ReaderStatus::Reading)
    }

    fn transition(&self, next: ReaderStatus) {
        let mut status = lock(&self.status);
        if !status.is_terminal() {
            *status = next;
        }
    }
}

struct MemoryReader {
    shared: Arc<ReaderShared>,
}

impl AssetReader for MemoryReader {
    fn add_output(
        &mut self,
        track: &Track,
        settings: OutputSettings,
    ) -> Result<Box<dyn TrackOutput>, EngineError> {
        let status = lock(&self.shared.status).clone();
        if status != ReaderStatus::Unknown {
            return Err(EngineError::invalid_state(format!("reader is {}", status)));
        }

        let synthetic = self
            .shared
            .asset
            .find(track.id)
            .cloned()
            .ok_or_else(|| EngineError::failed(-11838, format!("track {} is not in the asset", track.id)))?;

        self.shared.open_outputs.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryTrackOutput {
            reader: Arc::clone(&self.shared),
            track: synthetic,
            settings,
            next_index: 0,
            exhausted: false,
        }))
    }

    fn start(&mut self) -> Result<(), EngineError> {
        if let Some(err) = lock(&self.shared.engine.faults).reader_start.clone() {
            self.shared.transition(ReaderStatus::Failed(err.clone()));
            return Err(err);
        }

        let mut status = lock(&self.shared.status);
        if *status != ReaderStatus::Unknown {
            return Err(EngineError::invalid_state(format!("reader is {}", *status)));
        }
        *status = ReaderStatus::Reading;
        Ok(())
    }

    fn status(&self) -> ReaderStatus {
        lock(&self.shared.status).clone()
    }

    fn cancel(&self) {
        self.shared.transition(ReaderStatus::Cancelled);
    }
}

struct MemoryTrackOutput {
    reader: Arc<ReaderShared>,
    track: SyntheticTrack,
    settings: OutputSettings,
    next_index: usize,
    exhausted: bool,
}

impl MemoryTrackOutput {
    fn exhaust(&mut self) {
        if self.exhausted {
            return;
        }
        self.exhausted = true;
        if self.reader.open_outputs.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.reader.transition(ReaderStatus::Completed);
        }
    }
}

#[async_trait]
impl TrackOutput for MemoryTrackOutput {
    fn track_id(&self) -> TrackId {
        self.track.track.id
    }

    async fn next_sample(&mut self) -> Option<Sample> {
        if !self.reader.asset.sample_delay.is_zero() {
            tokio::time::sleep(self.reader.asset.sample_delay).await;
        }

        if self.exhausted || !self.reader.is_reading() {
            return None;
        }

        let read_failure = lock(&self.reader.engine.faults)
            .read_failure
            .as_ref()
            .filter(|(track, after, _)| *track == self.track.track.id && *after == self.next_index)
            .map(|(_, _, err)| err.clone());
        if let Some(err) = read_failure {
            debug!(track = %self.track.track.id, "injected read failure");
            self.reader.transition(ReaderStatus::Failed(err));
            return None;
        }

        if self.next_index >= self.track.sample_count {
            self.exhaust();
            return None;
        }

        let sample = self.track.make_sample(self.next_index, &self.settings);
        self.next_index += 1;
        *lock(&self.reader.engine.pulls)
            .entry(self.track.track.id)
            .or_insert(0) += 1;
        Some(sample)
    }
}

// =============================================================================
// Writer
// =============================================================================

struct WriterShared {
    status: Mutex<WriterStatus>,
    inputs: Mutex<Vec<Arc<InputShared>>>,
    session_start: Mutex<Option<Timestamp>>,
}

impl WriterShared {
    fn transition(&self, next: WriterStatus) -> bool {
        let mut status = lock(&self.status);
        if status.is_terminal() {
            return false;
        }
        *status = next;
        true
    }

    fn close_inputs(&self) {
        for input in lock(&self.inputs).iter() {
            input.close();
        }
    }

    fn fail(&self, error: EngineError) {
        if self.transition(WriterStatus::Failed(error)) {
            self.close_inputs();
        }
    }

    fn snapshot(&self, container: ContainerType) -> WrittenOutput {
        let tracks = lock(&self.inputs)
            .iter()
            .map(|input| {
                let state = lock(&input.state);
                WrittenTrack {
                    kind: input.kind,
                    settings: input.settings.clone(),
                    format_hint: input.format_hint.clone(),
                    samples: state.written.clone(),
                    mark_finished_calls: state.mark_finished_calls,
                }
            })
            .collect();

        WrittenOutput {
            container,
            status: lock(&self.status).clone(),
            session_start: *lock(&self.session_start),
            tracks,
        }
    }
}

struct MemoryWriter {
    engine: Arc<EngineState>,
    destination: PathBuf,
    container: ContainerType,
    shared: Arc<WriterShared>,
    muxers: Vec<JoinHandle<()>>,
}

#[async_trait]
impl AssetWriter for MemoryWriter {
    fn supported_media_kinds(&self) -> Vec<MediaKind> {
        lock(&self.engine.supported_kinds).clone()
    }

    fn add_input(
        &mut self,
        kind: MediaKind,
        settings: InputSettings,
        format_hint: FormatDescription,
    ) -> Result<Box<dyn TrackInput>, EngineError> {
        let status = lock(&self.shared.status).clone();
        if status != WriterStatus::Unknown {
            return Err(EngineError::invalid_state(format!("writer is {}", status)));
        }
        if !lock(&self.engine.supported_kinds).contains(&kind) {
            return Err(EngineError::UnsupportedMediaKind { kind });
        }

        let paused = lock(&self.engine.paused_kinds).contains(&kind);
        let input = Arc::new(InputShared {
            kind,
            settings,
            format_hint,
            capacity: self.engine.sink_capacity.load(Ordering::Relaxed),
            state: Mutex::new(InputState {
                paused,
                ..InputState::default()
            }),
            space: Notify::new(),
            work: Notify::new(),
            writer: Arc::clone(&self.shared),
            engine: Arc::clone(&self.engine),
        });

        lock(&self.shared.inputs).push(Arc::clone(&input));
        lock(&self.engine.live_inputs).push(Arc::clone(&input));
        Ok(Box::new(MemoryTrackInput { shared: input }))
    }

    fn start(&mut self) -> Result<(), EngineError> {
        if let Some(err) = lock(&self.engine.faults).writer_start.clone() {
            self.shared.fail(err.clone());
            return Err(err);
        }

        {
            let mut outputs = lock(&self.engine.outputs);
            if outputs.contains_key(&self.destination) {
                let err = EngineError::OutputExists {
                    path: self.destination.clone(),
                };
                drop(outputs);
                self.shared.fail(err.clone());
                return Err(err);
            }
            outputs.insert(
                self.destination.clone(),
                OutputRecord::Written {
                    container: self.container,
                    writer: Arc::clone(&self.shared),
                },
            );
        }

        if !self.shared.transition(WriterStatus::Writing) {
            return Err(EngineError::invalid_state("writer already stopped"));
        }

        for input in lock(&self.shared.inputs).iter() {
            self.muxers.push(tokio::spawn(run_muxer(Arc::clone(input))));
        }
        Ok(())
    }

    fn start_session(&mut self, at: Timestamp) {
        *lock(&self.shared.session_start) = Some(at);
    }

    fn status(&self) -> WriterStatus {
        lock(&self.shared.status).clone()
    }

    fn cancel(&self) {
        if self.shared.transition(WriterStatus::Cancelled) {
            self.shared.close_inputs();
        }
    }

    async fn finalize(&mut self) -> WriterStatus {
        if *lock(&self.shared.status) != WriterStatus::Writing {
            return self.status();
        }

        // Inputs still open are finished implicitly.
        for input in lock(&self.shared.inputs).iter() {
            input.finish_implicitly();
        }
        for muxer in self.muxers.drain(..) {
            let _ = muxer.await;
        }

        let finalize_fault = lock(&self.engine.faults).finalize.clone();
        match finalize_fault {
            Some(err) => {
                self.shared.transition(WriterStatus::Failed(err));
            }
            None => {
                self.shared.transition(WriterStatus::Completed);
            }
        }
        self.status()
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        for muxer in &self.muxers {
            muxer.abort();
        }
    }
}

#[derive(Default)]
struct InputState {
    queue: VecDeque<Sample>,
    written: Vec<Sample>,
    paused: bool,
    finished: bool,
    closed: bool,
    appended: usize,
    mark_finished_calls: usize,
}

struct InputShared {
    kind: MediaKind,
    settings: InputSettings,
    format_hint: FormatDescription,
    capacity: usize,
    state: Mutex<InputState>,
    /// Signalled when queue space frees up or the input closes.
    space: Notify,
    /// Signalled when the muxer has something to do.
    work: Notify,
    writer: Arc<WriterShared>,
    engine: Arc<EngineState>,
}

impl InputShared {
    fn close(&self) {
        lock(&self.state).closed = true;
        self.space.notify_waiters();
        self.work.notify_one();
    }

    fn set_paused(&self, paused: bool) {
        lock(&self.state).paused = paused;
        self.work.notify_one();
    }

    fn finish_implicitly(&self) {
        lock(&self.state).finished = true;
        self.work.notify_one();
    }
}

struct MemoryTrackInput {
    shared: Arc<InputShared>,
}

#[async_trait]
impl TrackInput for MemoryTrackInput {
    fn is_ready_for_more(&self) -> bool {
        let state = lock(&self.shared.state);
        !state.closed && !state.finished && state.queue.len() < self.shared.capacity
    }

    async fn ready(&self) -> SinkReadiness {
        loop {
            let notified = self.shared.space.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = lock(&self.shared.state);
                if state.closed || state.finished {
                    return SinkReadiness::Closed;
                }
                if state.queue.len() < self.shared.capacity {
                    return SinkReadiness::Ready;
                }
            }

            notified.await;
        }
    }

    fn append(&mut self, sample: Sample) -> bool {
        let mut state = lock(&self.shared.state);
        if state.closed || state.finished {
            return false;
        }

        let rejection = lock(&self.shared.engine.faults)
            .reject_append
            .as_ref()
            .filter(|(track, at, _)| *track == sample.track && *at == state.appended)
            .map(|(_, _, err)| err.clone());
        if let Some(err) = rejection {
            drop(state);
            debug!(track = %sample.track, "injected append rejection");
            self.shared.writer.fail(err);
            return false;
        }

        state.appended += 1;
        state.queue.push_back(sample);
        drop(state);
        self.shared.work.notify_one();
        true
    }

    fn mark_finished(&mut self) {
        {
            let mut state = lock(&self.shared.state);
            state.finished = true;
            state.mark_finished_calls += 1;
        }
        self.shared.work.notify_one();
        self.shared.space.notify_waiters();
    }
}

/// Moves queued samples of one input into its written track.
async fn run_muxer(input: Arc<InputShared>) {
    loop {
        let notified = input.work.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let moved = {
            let mut state = lock(&input.state);
            if state.closed {
                return;
            }
            let next = if state.paused {
                None
            } else {
                state.queue.pop_front()
            };
            match next {
                Some(sample) => {
                    state.written.push(sample);
                    true
                }
                None if state.finished && state.queue.is_empty() => return,
                None => false,
            }
        };

        if moved {
            input.space.notify_waiters();
            tokio::task::yield_now().await;
            continue;
        }

        notified.await;
    }
}
