//! Pipeline lifecycle integration tests.
//!
//! These tests drive complete runs through the in-memory engine:
//! not started -> loading metadata -> building pipes -> running -> finishing
//! -> completed / cancelled / failed

use std::io;
use std::sync::Arc;
use std::time::Duration;

use trackpipe_core::{
    engine::WrittenOutput,
    testing::{fixtures, MockStorage, MockTransform, StorageCall},
    CoordinatorState, EngineError, InputSettings, LoopState, MediaKind, MemoryEngine, Pipeline,
    PipelineConfig, PipelineError, PipelineResult, ReaderStatus, SyntheticAsset, SyntheticTrack,
    TrackId, TransformError, WriterStatus,
};

fn written(engine: &MemoryEngine) -> WrittenOutput {
    engine
        .output(&fixtures::destination())
        .expect("no output written")
}

/// Polls `condition` until it holds, failing the test after a second.
async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

// =============================================================================
// Successful runs
// =============================================================================

#[tokio::test]
async fn test_video_and_audio_success() {
    let engine = fixtures::engine_with(fixtures::av_asset(100, 200));
    let pipeline = fixtures::pipeline(&engine, PipelineConfig::default());
    let handle = pipeline.handle();

    let result = pipeline.run().await;

    assert!(result.is_success(), "unexpected result: {}", result);
    assert_eq!(handle.state(), CoordinatorState::Completed);

    let outcomes = handle.outcomes();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.end_state == LoopState::Exhausted));
    assert_eq!(outcomes[0].samples_transferred, 100);
    assert_eq!(outcomes[1].samples_transferred, 200);

    let output = written(&engine);
    assert_eq!(output.status, WriterStatus::Completed);
    assert_eq!(output.session_start, Some(trackpipe_core::Timestamp::ZERO));
    assert_eq!(output.tracks.len(), 2);

    let video = &output.tracks[0];
    assert_eq!(video.kind, MediaKind::Video);
    assert_eq!(
        video.settings,
        InputSettings::Encode {
            codec: "h264".to_string()
        }
    );
    assert_eq!(video.format_hint.codec, "argb32");
    assert_eq!(video.samples.len(), 100);
    for sample in &video.samples {
        let bytes = sample.pixel_buffer().unwrap().snapshot().unwrap();
        assert!(bytes.chunks_exact(4).all(|px| px == [0xFF, 0x00, 0xFF, 0xFF]));
    }

    let audio = &output.tracks[1];
    assert_eq!(audio.settings, InputSettings::Passthrough);
    assert_eq!(audio.format_hint.codec, "aac");
    assert_eq!(audio.samples.len(), 200);

    // One probe reader plus the main reader.
    assert_eq!(engine.readers_created(), 2);
    assert_eq!(engine.writers_created(), 1);
}

#[tokio::test]
async fn test_every_input_marked_finished_once() {
    let engine = fixtures::engine_with(fixtures::av_asset(10, 10));
    fixtures::pipeline(&engine, PipelineConfig::default()).run().await;

    for track in written(&engine).tracks {
        assert_eq!(track.mark_finished_calls, 1);
    }
}

#[tokio::test]
async fn test_audio_only_creates_no_probe_reader() {
    let engine = fixtures::engine_with(
        SyntheticAsset::new().with_track(SyntheticTrack::audio(1, 50)),
    );
    let result = fixtures::pipeline(&engine, PipelineConfig::default()).run().await;

    assert!(result.is_success());
    assert_eq!(engine.readers_created(), 1);
}

#[tokio::test]
async fn test_unsupported_kinds_are_dropped() {
    let engine = fixtures::engine_with(
        fixtures::av_asset(5, 5).with_track(SyntheticTrack::other(3, 5)),
    );
    let pipeline = fixtures::pipeline(&engine, PipelineConfig::default());
    let handle = pipeline.handle();

    let result = pipeline.run().await;

    assert!(result.is_success());
    assert_eq!(handle.outcomes().len(), 2);
    let kinds: Vec<MediaKind> = written(&engine).tracks.iter().map(|t| t.kind).collect();
    assert_eq!(kinds, vec![MediaKind::Video, MediaKind::Audio]);
}

#[tokio::test]
async fn test_existing_output_is_removed() {
    let engine = fixtures::engine_with(fixtures::av_asset(5, 5));
    engine.place_artifact(fixtures::DESTINATION);

    let result = fixtures::pipeline(&engine, PipelineConfig::default()).run().await;

    assert!(result.is_success());
    assert_eq!(written(&engine).status, WriterStatus::Completed);
}

#[tokio::test]
async fn test_join_waits_for_every_pipe() {
    for k in 1..=4u32 {
        let mut asset = SyntheticAsset::new();
        for id in 1..=k {
            asset = asset.with_track(SyntheticTrack::audio(id, 10 * id as usize));
        }
        let engine = fixtures::engine_with(asset);
        let pipeline = fixtures::pipeline(&engine, PipelineConfig::default());
        let handle = pipeline.handle();

        assert!(pipeline.run().await.is_success());

        let outcomes = handle.outcomes();
        assert_eq!(outcomes.len(), k as usize);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.track, TrackId(i as u32 + 1));
            assert_eq!(outcome.end_state, LoopState::Exhausted);
            assert_eq!(outcome.samples_transferred, 10 * (i as u64 + 1));
        }
    }
}

// =============================================================================
// Result publication
// =============================================================================

#[tokio::test]
async fn test_result_published_exactly_once() {
    let engine = fixtures::engine_with(fixtures::av_asset(20, 20));
    let pipeline = fixtures::pipeline(&engine, PipelineConfig::default());
    let handle = pipeline.handle();
    let mut results = handle.subscribe();

    assert!(handle.is_running());
    assert!(!handle.is_finished());

    let run = tokio::spawn(pipeline.run());

    results.changed().await.unwrap();
    assert!(results.borrow_and_update().as_ref().unwrap().is_success());
    // No second transition: the publisher is gone once the result is out.
    assert!(results.changed().await.is_err());

    assert!(run.await.unwrap().is_success());
    assert!(handle.is_finished());
    assert!(!handle.is_running());
    assert!(handle.wait().await.is_success());
}

#[tokio::test]
async fn test_report_serializes() {
    let engine = fixtures::engine_with(fixtures::av_asset(3, 3));
    let pipeline = fixtures::pipeline(&engine, PipelineConfig::default());
    let handle = pipeline.handle();
    pipeline.run().await;

    let report = handle.report().unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["result"], "success");
    assert_eq!(json["pipes"][0]["kind"], "video");
    assert_eq!(json["pipes"][1]["end_state"], "exhausted");
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_before_start_touches_nothing() {
    let engine = fixtures::engine_with(fixtures::av_asset(10, 10));
    let pipeline = fixtures::pipeline(&engine, PipelineConfig::default());
    let handle = pipeline.handle();

    handle.cancel();
    let result = pipeline.run().await;

    assert!(result.is_cancelled());
    assert_eq!(handle.state(), CoordinatorState::Cancelled);
    assert_eq!(engine.readers_created(), 0);
    assert_eq!(engine.writers_created(), 0);
    assert!(!engine.has_artifact(&fixtures::destination()));
}

#[tokio::test]
async fn test_cancel_mid_run() {
    let engine = fixtures::engine_with(
        fixtures::av_asset(1000, 1000).with_sample_delay(Duration::from_millis(1)),
    );
    let pipeline = fixtures::pipeline(&engine, PipelineConfig::default());
    let handle = pipeline.handle();
    let run = tokio::spawn(pipeline.run());

    eventually(|| engine.pulls(TrackId(1)) > 5 && engine.pulls(TrackId(2)) > 5).await;
    handle.cancel();

    let result = run.await.unwrap();
    assert!(result.is_cancelled());
    assert_eq!(handle.state(), CoordinatorState::Cancelled);

    let outcomes = handle.outcomes();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.end_state == LoopState::Cancelled));

    let output = written(&engine);
    assert_eq!(output.status, WriterStatus::Cancelled);
    for track in output.tracks {
        assert_eq!(track.mark_finished_calls, 1);
    }
    // Probe reader first, then the run's reader; both end cancelled.
    assert_eq!(
        engine.reader_statuses(),
        vec![ReaderStatus::Cancelled, ReaderStatus::Cancelled]
    );
}

#[tokio::test]
async fn test_cancel_during_metadata_load() {
    let engine = fixtures::engine_with(
        fixtures::av_asset(10, 10).with_load_delay(Duration::from_millis(50)),
    );
    let pipeline = fixtures::pipeline(&engine, PipelineConfig::default());
    let handle = pipeline.handle();
    let run = tokio::spawn(pipeline.run());

    eventually(|| handle.state() == CoordinatorState::LoadingMetadata).await;
    handle.cancel();

    assert!(run.await.unwrap().is_cancelled());
    assert_eq!(engine.readers_created(), 0);
}

#[tokio::test]
async fn test_cancel_wins_over_failing_metadata_load() {
    let engine = fixtures::engine_with(
        fixtures::av_asset(10, 10)
            .with_load_delay(Duration::from_millis(50))
            .with_load_error(EngineError::failed(-11829, "corrupt")),
    );
    let pipeline = fixtures::pipeline(&engine, PipelineConfig::default());
    let handle = pipeline.handle();
    let run = tokio::spawn(pipeline.run());

    eventually(|| handle.state() == CoordinatorState::LoadingMetadata).await;
    handle.cancel();

    let result = run.await.unwrap();
    assert!(result.is_cancelled(), "unexpected result: {}", result);
    assert_eq!(handle.state(), CoordinatorState::Cancelled);
    assert_eq!(engine.readers_created(), 0);
}

#[tokio::test]
async fn test_dropped_run_stops_transfer_loops() {
    let engine = fixtures::engine_with(
        fixtures::av_asset(1000, 1000).with_sample_delay(Duration::from_millis(1)),
    );
    let pipeline = fixtures::pipeline(&engine, PipelineConfig::default());
    let handle = pipeline.handle();
    let run = tokio::spawn(pipeline.run());

    eventually(|| engine.pulls(TrackId(2)) >= 5).await;
    run.abort();
    assert!(run.await.unwrap_err().is_cancelled());

    assert!(handle.is_cancelled());
    assert!(handle.result().unwrap().is_cancelled());
    assert_eq!(handle.state(), CoordinatorState::Cancelled);

    // Give aborted loops a moment to unwind, then check nothing pulls anymore.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let video = engine.pulls(TrackId(1));
    let audio = engine.pulls(TrackId(2));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.pulls(TrackId(1)), video);
    assert_eq!(engine.pulls(TrackId(2)), audio);
    assert!(audio < 1000);
}

// =============================================================================
// Backpressure
// =============================================================================

#[tokio::test]
async fn test_no_pulls_while_sink_not_ready() {
    let engine = MemoryEngine::new().with_sink_capacity(3);
    engine.insert_asset(
        fixtures::SOURCE,
        SyntheticAsset::new().with_track(SyntheticTrack::audio(1, 100)),
    );
    engine.pause_sinks(MediaKind::Audio);

    let pipeline = fixtures::pipeline(&engine, PipelineConfig::default());
    let run = tokio::spawn(pipeline.run());

    eventually(|| engine.queued(MediaKind::Audio) == 3).await;
    let pulled = engine.pulls(TrackId(1));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(pulled, 3);
    assert_eq!(engine.pulls(TrackId(1)), pulled);

    engine.resume_sinks(MediaKind::Audio);
    assert!(run.await.unwrap().is_success());
    assert_eq!(written(&engine).tracks[0].samples.len(), 100);
}

// =============================================================================
// Transform failures
// =============================================================================

#[tokio::test]
async fn test_transform_failure_on_fifth_sample() {
    let engine = fixtures::engine_with(fixtures::av_asset(100, 100));
    let transform = Arc::new(MockTransform::new().fail_at(
        TrackId(1),
        5,
        TransformError::LockFailed { status: -6660 },
    ));
    let pipeline = fixtures::pipeline(&engine, PipelineConfig::default())
        .with_transform(transform.clone());
    let handle = pipeline.handle();

    let result = pipeline.run().await;

    match result.error() {
        Some(PipelineError::TransformFailed { track, source }) => {
            assert_eq!(*track, TrackId(1));
            assert_eq!(*source, TransformError::LockFailed { status: -6660 });
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(handle.state(), CoordinatorState::Failed);
    assert_eq!(transform.applied_to(TrackId(1)), 5);
    // Passthrough audio never reaches the transform.
    assert_eq!(transform.applied(), 5);

    let outcomes = handle.outcomes();
    assert_eq!(outcomes[0].end_state, LoopState::TransformFailed);
    assert_eq!(outcomes[0].samples_transferred, 5);
    assert_eq!(outcomes[1].end_state, LoopState::Exhausted);
    assert_eq!(outcomes[1].samples_transferred, 100);

    assert_eq!(written(&engine).status, WriterStatus::Cancelled);
}

#[tokio::test]
async fn test_first_declared_transform_failure_wins() {
    let engine = fixtures::engine_with(
        SyntheticAsset::new()
            .with_track(SyntheticTrack::video(1, 60, 4, 4))
            .with_track(SyntheticTrack::video(2, 60, 4, 4)),
    );
    // Track 2 fails almost immediately, track 1 much later.
    let transform = Arc::new(
        MockTransform::new()
            .fail_at(TrackId(1), 50, TransformError::failed("late"))
            .fail_at(TrackId(2), 1, TransformError::failed("early")),
    );

    let result = fixtures::pipeline(&engine, PipelineConfig::default())
        .with_transform(transform)
        .run()
        .await;

    match result.error() {
        Some(PipelineError::TransformFailed { track, source }) => {
            assert_eq!(*track, TrackId(1));
            assert_eq!(*source, TransformError::failed("late"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_panicking_transform_fails_run() {
    let engine = fixtures::engine_with(fixtures::av_asset(20, 20));
    let transform = Arc::new(MockTransform::new().panic_at(TrackId(1), 3));
    let pipeline = fixtures::pipeline(&engine, PipelineConfig::default()).with_transform(transform);
    let handle = pipeline.handle();

    let result = pipeline.run().await;

    assert!(matches!(
        result.error(),
        Some(PipelineError::TransferTaskFailed {
            track: TrackId(1),
            ..
        })
    ));
    assert_eq!(handle.outcomes().len(), 2);
}

// =============================================================================
// Setup failures
// =============================================================================

#[tokio::test]
async fn test_metadata_load_failure() {
    let engine = fixtures::engine_with(
        fixtures::av_asset(5, 5).with_load_error(EngineError::load_failed("corrupt moov atom")),
    );
    let pipeline = fixtures::pipeline(&engine, PipelineConfig::default());
    let handle = pipeline.handle();

    let result = pipeline.run().await;

    assert!(matches!(
        result.error(),
        Some(PipelineError::MetadataLoadFailed(_))
    ));
    assert_eq!(handle.state(), CoordinatorState::Failed);
    assert_eq!(engine.readers_created(), 0);
}

#[tokio::test]
async fn test_reader_creation_failure() {
    let engine = fixtures::engine_with(fixtures::av_asset(5, 5));
    engine.fail_reader_creation(EngineError::failed(-11800, "unsupported"));

    let result = fixtures::pipeline(&engine, PipelineConfig::default()).run().await;

    assert!(matches!(
        result.error(),
        Some(PipelineError::ReaderCreateFailed(_))
    ));
    assert_eq!(engine.writers_created(), 0);
}

#[tokio::test]
async fn test_writer_creation_failure() {
    let engine = fixtures::engine_with(fixtures::av_asset(5, 5));
    engine.fail_writer_creation(EngineError::failed(-11823, "read-only volume"));

    let result = fixtures::pipeline(&engine, PipelineConfig::default()).run().await;

    assert!(matches!(
        result.error(),
        Some(PipelineError::WriterCreateFailed(_))
    ));
}

#[tokio::test]
async fn test_reader_start_failure() {
    let engine = fixtures::engine_with(
        SyntheticAsset::new().with_track(SyntheticTrack::audio(1, 5)),
    );
    engine.fail_reader_start(EngineError::failed(-11800, "cannot decode"));
    let pipeline = fixtures::pipeline(&engine, PipelineConfig::default());
    let handle = pipeline.handle();

    let result = pipeline.run().await;

    assert!(matches!(
        result.error(),
        Some(PipelineError::ReaderStartFailed(_))
    ));
    assert!(handle.outcomes().is_empty());
}

#[tokio::test]
async fn test_passthrough_without_format_is_no_media_data() {
    let engine = fixtures::engine_with(
        SyntheticAsset::new()
            .with_track(SyntheticTrack::video(1, 5, 4, 4))
            .with_track(SyntheticTrack::audio(2, 5).without_format_descriptions()),
    );

    let result = fixtures::pipeline(&engine, PipelineConfig::default()).run().await;

    assert!(matches!(
        result.error(),
        Some(PipelineError::NoMediaData { track: TrackId(2) })
    ));
}

#[tokio::test]
async fn test_probe_exhaustion_is_no_media_data() {
    let engine = fixtures::engine_with(
        SyntheticAsset::new()
            .with_track(SyntheticTrack::video(1, 5, 4, 4).with_unformatted_prefix(5))
            .with_track(SyntheticTrack::audio(2, 5)),
    );
    let pipeline = fixtures::pipeline(&engine, PipelineConfig::default());
    let handle = pipeline.handle();

    let result = pipeline.run().await;

    assert!(matches!(
        result.error(),
        Some(PipelineError::NoMediaData { track: TrackId(1) })
    ));
    assert!(handle.outcomes().is_empty());
    assert!(engine.output(&fixtures::destination()).is_none());
}

#[tokio::test]
async fn test_storage_failure_fails_setup() {
    let engine = fixtures::engine_with(fixtures::av_asset(5, 5));
    engine.place_artifact(fixtures::DESTINATION);
    engine.fail_remove(io::ErrorKind::PermissionDenied);
    let pipeline = fixtures::pipeline(&engine, PipelineConfig::default());
    let handle = pipeline.handle();

    let result = pipeline.run().await;

    match result.error() {
        Some(PipelineError::StorageFailure { path, source }) => {
            assert_eq!(*path, fixtures::destination());
            assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(handle.outcomes().is_empty());
}

#[tokio::test]
async fn test_storage_lookup_failure_with_mock_storage() {
    let engine = fixtures::engine_with(fixtures::av_asset(5, 5));
    let storage = MockStorage::new();
    storage.fail_exists(io::ErrorKind::TimedOut).await;

    let result = fixtures::pipeline(&engine, PipelineConfig::default())
        .with_storage(Arc::new(storage.clone()))
        .run()
        .await;

    assert!(matches!(
        result.error(),
        Some(PipelineError::StorageFailure { .. })
    ));
    assert_eq!(
        storage.calls().await,
        vec![StorageCall::Exists(fixtures::destination())]
    );
}

#[tokio::test]
async fn test_mock_storage_removes_existing_output() {
    let engine = fixtures::engine_with(fixtures::av_asset(5, 5));
    let storage = MockStorage::new();
    storage.add_artifact(fixtures::DESTINATION).await;

    let result = fixtures::pipeline(&engine, PipelineConfig::default())
        .with_storage(Arc::new(storage.clone()))
        .run()
        .await;

    assert!(result.is_success());
    assert!(!storage.has_artifact(fixtures::DESTINATION).await);
    assert_eq!(
        storage.calls().await,
        vec![
            StorageCall::Exists(fixtures::destination()),
            StorageCall::Remove(fixtures::destination()),
        ]
    );
}

// =============================================================================
// Terminal session failures
// =============================================================================

#[tokio::test]
async fn test_reader_failure_mid_run() {
    let engine = fixtures::engine_with(fixtures::av_asset(50, 50));
    engine.fail_reading(TrackId(2), 10, EngineError::failed(-11829, "truncated file"));

    let result = fixtures::pipeline(&engine, PipelineConfig::default()).run().await;

    assert!(matches!(
        result.error(),
        Some(PipelineError::SourceTerminalFailure(EngineError::Failed { code: -11829, .. }))
    ));
    assert_eq!(written(&engine).status, WriterStatus::Cancelled);
}

#[tokio::test]
async fn test_writer_finalize_failure() {
    let engine = fixtures::engine_with(fixtures::av_asset(10, 10));
    engine.fail_finalize(EngineError::failed(-11847, "disk full"));

    let result = fixtures::pipeline(&engine, PipelineConfig::default()).run().await;

    assert!(matches!(
        result.error(),
        Some(PipelineError::SinkTerminalFailure(_))
    ));
}

#[tokio::test]
async fn test_rejected_append_fails_with_writer_error() {
    let engine = fixtures::engine_with(fixtures::av_asset(50, 50));
    engine.reject_append(TrackId(2), 3, EngineError::failed(-11847, "disk full"));
    let pipeline = fixtures::pipeline(&engine, PipelineConfig::default());
    let handle = pipeline.handle();

    let result = pipeline.run().await;

    assert!(matches!(
        result.error(),
        Some(PipelineError::SinkTerminalFailure(EngineError::Failed { code: -11847, .. }))
    ));
    let audio = handle
        .outcomes()
        .into_iter()
        .find(|o| o.track == TrackId(2))
        .unwrap();
    assert_eq!(audio.end_state, LoopState::SinkRejected);
    assert_eq!(audio.samples_transferred, 3);
}

#[tokio::test]
async fn test_results_from_run_pipeline() {
    let engine = fixtures::engine_with(fixtures::av_asset(5, 5));
    let dir = tempfile::TempDir::new().unwrap();
    let destination = dir.path().join("out.mov");

    let result: PipelineResult = trackpipe_core::run_pipeline(
        Arc::new(engine.clone()),
        fixtures::SOURCE,
        &destination,
        PipelineConfig::default(),
    )
    .await;

    assert!(result.is_success());
    assert!(engine.output(&destination).is_some());
}

#[tokio::test]
async fn test_pipeline_with_custom_channel() {
    let engine = fixtures::engine_with(fixtures::av_asset(2, 2));
    let config = PipelineConfig::default().with_transform_channel(3);

    let result = Pipeline::new(Arc::new(engine.clone()), fixtures::request(), config)
        .with_storage(Arc::new(engine.clone()))
        .run()
        .await;

    assert!(result.is_success());
    for sample in &written(&engine).tracks[0].samples {
        let bytes = sample.pixel_buffer().unwrap().snapshot().unwrap();
        assert!(bytes.chunks_exact(4).all(|px| px == [0xFF, 0xFF, 0xFF, 0x00]));
    }
}
