//! Orchestration of a full pipeline run.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::cancel::CancelFlag;
use super::classifier::classify;
use super::completion::{completion_slot, Completion, Finisher};
use super::config::PipelineConfig;
use super::error::PipelineError;
use super::pipe::{TrackPipe, TrackRole};
use super::probe::probe_formats;
use super::transfer::TransferLoop;
use super::types::{
    CoordinatorState, PipeReport, PipelineRequest, PipelineResult, RunReport, TransferOutcome,
};
use crate::engine::{
    AssetReader, AssetWriter, FsStorage, InputSettings, MediaAsset, MediaEngine, OutputSettings,
    OutputStorage, ReaderStatus, WriterStatus,
};
use crate::media::{MediaKind, Track, TrackId};
use crate::metrics;
use crate::transform::{ChannelZero, SampleTransform};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// State shared between a pipeline and its handles.
struct Shared {
    run_id: Uuid,
    request: PipelineRequest,
    cancel: CancelFlag,
    state: Mutex<CoordinatorState>,
    completion: Completion,
    outcomes: Mutex<Vec<TransferOutcome>>,
    duration: Mutex<Option<Duration>>,
}

impl Shared {
    fn set_state(&self, next: CoordinatorState) {
        let mut state = lock(&self.state);
        debug!(from = state.as_str(), to = next.as_str(), "Coordinator state changed");
        *state = next;
    }
}

/// Cloneable view of a pipeline run.
///
/// Handles can cancel the run and observe its progress from any task.
#[derive(Clone)]
pub struct PipelineHandle {
    shared: Arc<Shared>,
}

impl PipelineHandle {
    pub fn run_id(&self) -> Uuid {
        self.shared.run_id
    }

    /// Requests cancellation. Safe to call at any time, any number of times.
    pub fn cancel(&self) {
        if self.shared.cancel.cancel() {
            info!(run_id = %self.shared.run_id, "Cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Whether no result has been published yet.
    pub fn is_running(&self) -> bool {
        !self.shared.completion.is_finished()
    }

    /// Whether the result has been published.
    pub fn is_finished(&self) -> bool {
        self.shared.completion.is_finished()
    }

    pub fn state(&self) -> CoordinatorState {
        *lock(&self.shared.state)
    }

    pub fn result(&self) -> Option<PipelineResult> {
        self.shared.completion.result()
    }

    /// Waits for the run's result.
    pub async fn wait(&self) -> PipelineResult {
        self.shared.completion.wait().await
    }

    /// Subscribes to the result slot. The value changes from `None` to the
    /// result exactly once.
    pub fn subscribe(&self) -> watch::Receiver<Option<PipelineResult>> {
        self.shared.completion.subscribe()
    }

    /// Outcomes of the transfer loops, in pipe declaration order. Empty until
    /// every loop has reported.
    pub fn outcomes(&self) -> Vec<TransferOutcome> {
        lock(&self.shared.outcomes).clone()
    }

    /// Summary of the run, available once it finished.
    pub fn report(&self) -> Option<RunReport> {
        let result = self.result()?;
        let duration = lock(&self.shared.duration).unwrap_or_default();
        Some(RunReport {
            run_id: self.shared.run_id,
            source: self.shared.request.source.clone(),
            destination: self.shared.request.destination.clone(),
            result: result.as_str().to_string(),
            error: result.error().map(|e| e.to_string()),
            duration_ms: duration.as_millis() as u64,
            pipes: lock(&self.shared.outcomes).iter().map(PipeReport::from).collect(),
        })
    }
}

/// Reader, writer and pipes of a run whose setup succeeded.
struct Session {
    reader: Box<dyn AssetReader>,
    writer: Box<dyn AssetWriter>,
    pipes: Vec<TrackPipe>,
}

/// Coordinates one run: loads the source, builds one pipe per eligible
/// track, runs the transfer loops concurrently and resolves the result.
///
/// A pipeline is single-use; [`run`](Self::run) consumes it.
pub struct Pipeline {
    engine: Arc<dyn MediaEngine>,
    storage: Arc<dyn OutputStorage>,
    transform: Arc<dyn SampleTransform>,
    config: PipelineConfig,
    shared: Arc<Shared>,
    finisher: Finisher,
}

impl Pipeline {
    /// Creates a pipeline over the local filesystem that zeroes the
    /// configured channel of every video frame.
    pub fn new(engine: Arc<dyn MediaEngine>, request: PipelineRequest, config: PipelineConfig) -> Self {
        let (finisher, completion) = completion_slot();
        let transform: Arc<dyn SampleTransform> = Arc::new(ChannelZero::new(config.transform_channel));

        Self {
            engine,
            storage: Arc::new(FsStorage),
            transform,
            config,
            shared: Arc::new(Shared {
                run_id: Uuid::new_v4(),
                request,
                cancel: CancelFlag::new(),
                state: Mutex::new(CoordinatorState::NotStarted),
                completion,
                outcomes: Mutex::new(Vec::new()),
                duration: Mutex::new(None),
            }),
            finisher,
        }
    }

    /// Sets where pre-existing output artifacts are looked up and removed.
    pub fn with_storage(mut self, storage: Arc<dyn OutputStorage>) -> Self {
        self.storage = storage;
        self
    }

    /// Sets the transform applied to decoded video samples.
    pub fn with_transform(mut self, transform: Arc<dyn SampleTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.shared.run_id
    }

    /// Runs the pipeline to completion and publishes its result.
    pub async fn run(self) -> PipelineResult {
        let span = info_span!("pipeline", run_id = %self.shared.run_id);
        let started = Instant::now();

        let Pipeline {
            engine,
            storage,
            transform,
            config,
            shared,
            finisher,
        } = self;
        let guard = RunGuard {
            shared: Arc::clone(&shared),
            finisher: Some(finisher),
        };
        let run = Run {
            engine,
            storage,
            transform,
            config,
            shared: Arc::clone(&shared),
        };

        let result = run.execute().instrument(span.clone()).await;
        let elapsed = started.elapsed();

        *lock(&shared.duration) = Some(elapsed);
        shared.set_state(CoordinatorState::for_result(&result));

        metrics::PIPELINE_RUNS
            .with_label_values(&[result.as_str()])
            .inc();
        metrics::PIPELINE_DURATION
            .with_label_values(&[result.as_str()])
            .observe(elapsed.as_secs_f64());

        span.in_scope(|| match &result {
            PipelineResult::Success => {
                info!(elapsed_ms = elapsed.as_millis() as u64, "Pipeline completed");
            }
            PipelineResult::Cancelled => {
                info!(elapsed_ms = elapsed.as_millis() as u64, "Pipeline cancelled");
            }
            PipelineResult::Failed(err) => {
                error!(elapsed_ms = elapsed.as_millis() as u64, error = %err, "Pipeline failed");
            }
        });

        guard.finish(result)
    }
}

/// Owns the finisher for the duration of [`Pipeline::run`].
///
/// If the run future is dropped before a result is resolved, the run is
/// cancelled so its transfer loops stop, and `Cancelled` is published.
struct RunGuard {
    shared: Arc<Shared>,
    finisher: Option<Finisher>,
}

impl RunGuard {
    fn finish(mut self, result: PipelineResult) -> PipelineResult {
        match self.finisher.take() {
            Some(finisher) => finisher.finish(result),
            None => result,
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let Some(finisher) = self.finisher.take() else {
            return;
        };
        warn!(run_id = %self.shared.run_id, "Pipeline dropped before finishing");
        self.shared.cancel.cancel();
        self.shared.set_state(CoordinatorState::Cancelled);
        drop(finisher);
    }
}

/// Spawned transfer loops, aborted if dropped before they are joined.
struct LoopTasks(Vec<JoinHandle<TransferOutcome>>);

impl Drop for LoopTasks {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

/// The working half of a [`Pipeline`], split from its finisher.
struct Run {
    engine: Arc<dyn MediaEngine>,
    storage: Arc<dyn OutputStorage>,
    transform: Arc<dyn SampleTransform>,
    config: PipelineConfig,
    shared: Arc<Shared>,
}

impl Run {
    fn cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    async fn execute(&self) -> PipelineResult {
        let request = &self.shared.request;
        if self.cancelled() {
            info!("Cancelled before start");
            return PipelineResult::Cancelled;
        }

        info!(
            source = %request.source.display(),
            destination = %request.destination.display(),
            engine = self.engine.name(),
            "Starting pipeline"
        );

        self.shared.set_state(CoordinatorState::LoadingMetadata);
        let asset = self.engine.open_asset(&request.source);
        let loaded = asset.load_tracks().await;

        if self.cancelled() {
            info!("Cancelled while loading metadata");
            return PipelineResult::Cancelled;
        }
        let tracks = match loaded {
            Ok(tracks) => tracks,
            Err(err) => return self.setup_failed(PipelineError::MetadataLoadFailed(err)),
        };
        debug!(tracks = tracks.len(), "Loaded track metadata");

        self.shared.set_state(CoordinatorState::BuildingPipes);
        let session = match self.build_session(asset.as_ref(), &tracks).await {
            Ok(session) => session,
            Err(err) => return self.setup_failed(err),
        };

        self.shared.set_state(CoordinatorState::Running);
        let outcomes = self.transfer(session.pipes).await;
        *lock(&self.shared.outcomes) = outcomes.clone();

        self.shared.set_state(CoordinatorState::Finishing);
        self.resolve(session.reader, session.writer, &outcomes).await
    }

    fn setup_failed(&self, err: PipelineError) -> PipelineResult {
        error!(error = %err, "Pipeline setup failed");
        metrics::SETUP_FAILURES.inc();
        PipelineResult::failed(err)
    }

    async fn build_session(
        &self,
        asset: &dyn MediaAsset,
        tracks: &[Track],
    ) -> Result<Session, PipelineError> {
        let mut reader = self
            .engine
            .create_reader(asset)
            .map_err(PipelineError::ReaderCreateFailed)?;
        let mut writer = self
            .engine
            .create_writer(&self.shared.request.destination, self.config.container)
            .map_err(PipelineError::WriterCreateFailed)?;

        let classification = classify(tracks, &writer.supported_media_kinds());
        if classification.is_empty() {
            return Err(PipelineError::NoEligibleTracks);
        }
        let dropped = tracks.len() - classification.len();
        if dropped > 0 {
            debug!(dropped, "Dropped tracks the destination cannot hold");
        }

        let decode = OutputSettings::Decode {
            pixel_format: self.config.video_pixel_format,
        };
        let probed = probe_formats(
            self.engine.as_ref(),
            asset,
            &classification.transformable,
            &decode,
        )
        .await;
        if !classification.transformable.is_empty() {
            let label = if probed.is_ok() { "ok" } else { "failed" };
            metrics::PROBES_TOTAL.with_label_values(&[label]).inc();
        }
        let hints = probed?;

        let mut pipes = Vec::with_capacity(classification.len());
        for (track, hint) in classification.transformable.iter().zip(hints) {
            let output = reader
                .add_output(track, decode.clone())
                .map_err(|source| registration_failed(track.id, source))?;
            let settings = InputSettings::Encode {
                codec: self.config.video_codec.clone(),
            };
            let input = writer
                .add_input(track.media_kind, settings, hint)
                .map_err(|source| registration_failed(track.id, source))?;
            let role = TrackRole::Transform(Arc::clone(&self.transform));
            pipes.push(TrackPipe::new(track.media_kind, output, input, role));
        }

        for track in &classification.passthrough {
            let hint = track
                .primary_format()
                .cloned()
                .ok_or(PipelineError::NoMediaData { track: track.id })?;
            let output = reader
                .add_output(track, OutputSettings::Passthrough)
                .map_err(|source| registration_failed(track.id, source))?;
            let input = writer
                .add_input(track.media_kind, InputSettings::Passthrough, hint)
                .map_err(|source| registration_failed(track.id, source))?;
            pipes.push(TrackPipe::new(track.media_kind, output, input, TrackRole::Passthrough));
        }

        self.remove_existing_output().await?;

        reader.start().map_err(PipelineError::ReaderStartFailed)?;
        if let Err(err) = writer.start() {
            reader.cancel();
            return Err(PipelineError::WriterStartFailed(err));
        }
        writer.start_session(self.config.session_start_time());

        info!(
            transformable = classification.transformable.len(),
            passthrough = classification.passthrough.len(),
            transform = self.transform.name(),
            "Pipes built"
        );
        Ok(Session {
            reader,
            writer,
            pipes,
        })
    }

    async fn remove_existing_output(&self) -> Result<(), PipelineError> {
        let path = &self.shared.request.destination;
        let storage_failure = |source| PipelineError::StorageFailure {
            path: path.clone(),
            source,
        };

        let exists = self.storage.exists(path).await.map_err(storage_failure)?;
        if !exists {
            return Ok(());
        }
        if !self.config.overwrite_existing {
            return Err(storage_failure(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "output exists and overwriting is disabled",
            )));
        }

        self.storage.remove(path).await.map_err(storage_failure)?;
        info!(path = %path.display(), "Removed existing output");
        Ok(())
    }

    /// Runs one loop per pipe and waits for all of them.
    ///
    /// The returned outcomes are in pipe order, one per pipe.
    async fn transfer(&self, pipes: Vec<TrackPipe>) -> Vec<TransferOutcome> {
        let labels: Vec<(TrackId, MediaKind)> =
            pipes.iter().map(|p| (p.track_id(), p.media_kind())).collect();

        let mut tasks = LoopTasks(
            pipes
                .into_iter()
                .map(|pipe| {
                    let span =
                        info_span!("transfer", track = %pipe.track_id(), kind = %pipe.media_kind());
                    let transfer = TransferLoop::new(pipe, self.shared.cancel.clone());
                    tokio::spawn(transfer.run().instrument(span))
                })
                .collect(),
        );
        let joined = join_all(tasks.0.iter_mut()).await;

        joined
            .into_iter()
            .zip(labels)
            .map(|(joined, (track, kind))| match joined {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(track = %track, error = %err, "Transfer task ended abnormally");
                    TransferOutcome::task_failed(track, kind, err.to_string())
                }
            })
            .collect()
    }

    async fn resolve(
        &self,
        reader: Box<dyn AssetReader>,
        mut writer: Box<dyn AssetWriter>,
        outcomes: &[TransferOutcome],
    ) -> PipelineResult {
        if self.cancelled() {
            reader.cancel();
            writer.cancel();
            return PipelineResult::Cancelled;
        }

        if let Some(err) = outcomes.iter().find_map(TransferOutcome::failure) {
            reader.cancel();
            writer.cancel();
            return PipelineResult::failed(err);
        }

        match reader.status() {
            ReaderStatus::Completed => {}
            ReaderStatus::Cancelled => {
                writer.cancel();
                return PipelineResult::Cancelled;
            }
            ReaderStatus::Failed(err) => {
                writer.cancel();
                return PipelineResult::failed(PipelineError::SourceTerminalFailure(err));
            }
            status => {
                // Loops stop early when the writer fails, leaving the reader
                // mid-stream.
                reader.cancel();
                if let WriterStatus::Failed(err) = writer.status() {
                    return PipelineResult::failed(PipelineError::SinkTerminalFailure(err));
                }
                writer.cancel();
                return PipelineResult::failed(PipelineError::UnexpectedStatus {
                    session: "reader",
                    status: status.to_string(),
                });
            }
        }

        match writer.finalize().await {
            WriterStatus::Completed => PipelineResult::Success,
            WriterStatus::Cancelled => PipelineResult::Cancelled,
            WriterStatus::Failed(err) => PipelineResult::failed(PipelineError::SinkTerminalFailure(err)),
            status => PipelineResult::failed(PipelineError::UnexpectedStatus {
                session: "writer",
                status: status.to_string(),
            }),
        }
    }
}

fn registration_failed(track: TrackId, source: crate::engine::EngineError) -> PipelineError {
    PipelineError::OutputRegistrationFailed { track, source }
}

/// Runs a pipeline from `source` to `destination` on the local filesystem.
pub async fn run_pipeline(
    engine: Arc<dyn MediaEngine>,
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    config: PipelineConfig,
) -> PipelineResult {
    let request = PipelineRequest::new(source.as_ref(), destination.as_ref());
    Pipeline::new(engine, request, config).run().await
}
