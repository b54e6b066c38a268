//! The per-pipe loop moving samples from a reader output to a writer input.

use tracing::{debug, warn};

use super::cancel::CancelFlag;
use super::pipe::TrackPipe;
use super::types::{LoopState, TransferOutcome};
use crate::engine::SinkReadiness;
use crate::metrics;
use crate::transform::TransformError;

/// Drains one [`TrackPipe`] under sink backpressure.
///
/// Samples are only pulled while the sink reports it is ready for more, so
/// at most one sample per pipe is in flight. When the sink is full the loop
/// suspends until the sink signals readiness or the run is cancelled.
pub struct TransferLoop {
    pipe: TrackPipe,
    cancel: CancelFlag,
    samples_transferred: u64,
    transform_error: Option<TransformError>,
}

impl TransferLoop {
    pub fn new(pipe: TrackPipe, cancel: CancelFlag) -> Self {
        Self {
            pipe,
            cancel,
            samples_transferred: 0,
            transform_error: None,
        }
    }

    /// Runs the loop to completion.
    ///
    /// The sink is marked finished exactly once, whatever state draining
    /// ended in.
    pub async fn run(mut self) -> TransferOutcome {
        debug!(track = %self.pipe.track, kind = %self.pipe.kind, role = ?self.pipe.role, "Transfer loop started");

        let end_state = self.drain().await;
        self.pipe.input.mark_finished();

        debug!(
            track = %self.pipe.track,
            end_state = %end_state,
            samples = self.samples_transferred,
            "Transfer loop finished"
        );
        metrics::SAMPLES_TRANSFERRED
            .with_label_values(&[self.pipe.kind.as_str()])
            .inc_by(self.samples_transferred);
        metrics::LOOP_END_STATES
            .with_label_values(&[end_state.as_str()])
            .inc();

        TransferOutcome {
            track: self.pipe.track,
            kind: self.pipe.kind,
            end_state,
            samples_transferred: self.samples_transferred,
            transform_error: self.transform_error,
            task_failure: None,
        }
    }

    async fn drain(&mut self) -> LoopState {
        loop {
            if !self.pipe.input.is_ready_for_more() {
                let readiness = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return LoopState::Cancelled,
                    readiness = self.pipe.input.ready() => readiness,
                };
                if readiness == SinkReadiness::Closed {
                    return LoopState::SinkRejected;
                }
                continue;
            }

            if self.cancel.is_cancelled() {
                return LoopState::Cancelled;
            }

            let Some(sample) = self.pipe.output.next_sample().await else {
                return LoopState::Exhausted;
            };

            let mut failed = false;
            if let Some(transform) = self.pipe.role.transform() {
                if let Err(err) = transform.apply(&sample) {
                    warn!(
                        track = %self.pipe.track,
                        transform = transform.name(),
                        pts = sample.pts.as_micros(),
                        error = %err,
                        "Sample transform failed"
                    );
                    metrics::TRANSFORM_FAILURES.inc();
                    self.transform_error = Some(err);
                    failed = true;
                }
            }

            // A sample that failed its transform is still appended; the loop
            // just stops pulling after it.
            if !self.pipe.input.append(sample) {
                return if failed {
                    LoopState::TransformFailed
                } else {
                    LoopState::SinkRejected
                };
            }
            self.samples_transferred += 1;

            if failed {
                return LoopState::TransformFailed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        AssetReader, AssetWriter, EngineError, InputSettings, MediaEngine, MemoryEngine,
        OutputSettings, ReaderStatus, SyntheticAsset, SyntheticTrack, WriterStatus,
    };
    use crate::media::{ContainerType, MediaKind, PixelFormat, Sample, Timestamp, TrackId};
    use crate::pipeline::TrackRole;
    use crate::transform::{ChannelZero, SampleTransform};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const SOURCE: &str = "/media/in.mov";
    const DEST: &str = "/media/out.mov";

    struct FailAt {
        at: usize,
        seen: AtomicUsize,
    }

    impl SampleTransform for FailAt {
        fn name(&self) -> &str {
            "fail_at"
        }

        fn apply(&self, _sample: &Sample) -> Result<(), TransformError> {
            let n = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.at {
                Err(TransformError::failed(format!("sample {}", n)))
            } else {
                Ok(())
            }
        }
    }

    struct Session {
        reader: Box<dyn AssetReader>,
        writer: Box<dyn AssetWriter>,
        pipe: TrackPipe,
    }

    async fn single_pipe(engine: &MemoryEngine, track: SyntheticTrack, role: TrackRole) -> Session {
        let kind = track.track.media_kind;
        let hint = track.track.primary_format().cloned().unwrap();
        engine.insert_asset(SOURCE, SyntheticAsset::new().with_track(track));

        let asset = engine.open_asset(Path::new(SOURCE));
        let tracks = asset.load_tracks().await.unwrap();
        let mut reader = engine.create_reader(asset.as_ref()).unwrap();
        let mut writer = engine
            .create_writer(Path::new(DEST), ContainerType::QuickTime)
            .unwrap();

        let (output_settings, input_settings) = match role {
            TrackRole::Transform(_) => (
                OutputSettings::Decode {
                    pixel_format: PixelFormat::Argb32,
                },
                InputSettings::Encode {
                    codec: "h264".into(),
                },
            ),
            TrackRole::Passthrough => (OutputSettings::Passthrough, InputSettings::Passthrough),
        };
        let output = reader.add_output(&tracks[0], output_settings).unwrap();
        let input = writer.add_input(kind, input_settings, hint).unwrap();
        reader.start().unwrap();
        writer.start().unwrap();
        writer.start_session(Timestamp::ZERO);

        Session {
            reader,
            writer,
            pipe: TrackPipe::new(kind, output, input, role),
        }
    }

    #[tokio::test]
    async fn test_drains_until_exhausted() {
        let engine = MemoryEngine::new();
        let mut session = single_pipe(&engine, SyntheticTrack::audio(1, 20), TrackRole::Passthrough).await;

        let outcome = TransferLoop::new(session.pipe, CancelFlag::new()).run().await;

        assert_eq!(outcome.end_state, LoopState::Exhausted);
        assert_eq!(outcome.samples_transferred, 20);
        assert!(outcome.is_ok());

        session.writer.finalize().await;
        let written = engine.output(Path::new(DEST)).unwrap();
        assert_eq!(written.tracks[0].samples.len(), 20);
        assert_eq!(written.tracks[0].mark_finished_calls, 1);
        assert_eq!(session.reader.status(), ReaderStatus::Completed);
    }

    #[tokio::test]
    async fn test_transform_applied_to_frames() {
        let engine = MemoryEngine::new();
        let role = TrackRole::Transform(Arc::new(ChannelZero::default()));
        let mut session = single_pipe(&engine, SyntheticTrack::video(1, 3, 2, 2), role).await;

        let outcome = TransferLoop::new(session.pipe, CancelFlag::new()).run().await;
        assert_eq!(outcome.end_state, LoopState::Exhausted);

        session.writer.finalize().await;
        let written = engine.output(Path::new(DEST)).unwrap();
        for sample in &written.tracks[0].samples {
            let bytes = sample.pixel_buffer().unwrap().snapshot().unwrap();
            assert!(bytes.chunks_exact(4).all(|px| px == [0xFF, 0x00, 0xFF, 0xFF]));
        }
    }

    #[tokio::test]
    async fn test_transform_failure_stops_pulling() {
        let engine = MemoryEngine::new();
        let role = TrackRole::Transform(Arc::new(FailAt {
            at: 5,
            seen: AtomicUsize::new(0),
        }));
        let mut session = single_pipe(&engine, SyntheticTrack::video(1, 100, 2, 2), role).await;

        let outcome = TransferLoop::new(session.pipe, CancelFlag::new()).run().await;

        assert_eq!(outcome.end_state, LoopState::TransformFailed);
        assert_eq!(outcome.transform_error, Some(TransformError::failed("sample 5")));
        assert_eq!(outcome.samples_transferred, 5);
        assert_eq!(engine.pulls(TrackId(1)), 5);

        session.writer.finalize().await;
        let written = engine.output(Path::new(DEST)).unwrap();
        assert_eq!(written.tracks[0].mark_finished_calls, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_pull() {
        let engine = MemoryEngine::new();
        let session = single_pipe(&engine, SyntheticTrack::audio(1, 20), TrackRole::Passthrough).await;
        let cancel = CancelFlag::new();
        cancel.cancel();

        let outcome = TransferLoop::new(session.pipe, cancel).run().await;

        assert_eq!(outcome.end_state, LoopState::Cancelled);
        assert_eq!(outcome.samples_transferred, 0);
        assert_eq!(engine.pulls(TrackId(1)), 0);
        let written = engine.output(Path::new(DEST)).unwrap();
        assert_eq!(written.tracks[0].mark_finished_calls, 1);
    }

    #[tokio::test]
    async fn test_cancel_wakes_loop_waiting_for_sink() {
        let engine = MemoryEngine::new().with_sink_capacity(2);
        engine.pause_sinks(MediaKind::Audio);
        let session = single_pipe(&engine, SyntheticTrack::audio(1, 50), TrackRole::Passthrough).await;
        let cancel = CancelFlag::new();

        let task = tokio::spawn(TransferLoop::new(session.pipe, cancel.clone()).run());
        tokio::time::sleep(Duration::from_millis(30)).await;
        // The sink is full, so only `capacity` samples were pulled.
        assert_eq!(engine.pulls(TrackId(1)), 2);

        cancel.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("loop did not wake on cancel")
            .unwrap();
        assert_eq!(outcome.end_state, LoopState::Cancelled);
        assert_eq!(outcome.samples_transferred, 2);
    }

    #[tokio::test]
    async fn test_rejected_append_ends_loop() {
        let engine = MemoryEngine::new();
        engine.reject_append(TrackId(1), 3, EngineError::failed(-11847, "disk full"));
        let session = single_pipe(&engine, SyntheticTrack::audio(1, 20), TrackRole::Passthrough).await;

        let outcome = TransferLoop::new(session.pipe, CancelFlag::new()).run().await;

        assert_eq!(outcome.end_state, LoopState::SinkRejected);
        assert_eq!(outcome.samples_transferred, 3);
        assert!(outcome.is_ok());
        assert!(matches!(session.writer.status(), WriterStatus::Failed(_)));
    }

    #[tokio::test]
    async fn test_closed_sink_while_waiting() {
        let engine = MemoryEngine::new().with_sink_capacity(1);
        engine.pause_sinks(MediaKind::Audio);
        let session = single_pipe(&engine, SyntheticTrack::audio(1, 10), TrackRole::Passthrough).await;

        let task = tokio::spawn(TransferLoop::new(session.pipe, CancelFlag::new()).run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.writer.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.end_state, LoopState::SinkRejected);
    }
}
