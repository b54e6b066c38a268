//! Prometheus metrics for pipeline runs.
//!
//! This module provides metrics for:
//! - Runs (results, durations)
//! - Transfer loops (samples moved, end states, transform failures)
//! - Format probing

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Runs
// =============================================================================

/// Pipeline runs total by result.
pub static PIPELINE_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trackpipe_runs_total", "Total pipeline runs"),
        &["result"], // "success", "cancelled", "failed"
    )
    .unwrap()
});

/// Pipeline run duration in seconds.
pub static PIPELINE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "trackpipe_run_duration_seconds",
            "Duration of pipeline runs",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0]),
        &["result"],
    )
    .unwrap()
});

/// Runs that failed before any transfer started.
pub static SETUP_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "trackpipe_setup_failures_total",
        "Runs that failed while building pipes",
    )
    .unwrap()
});

// =============================================================================
// Transfer loops
// =============================================================================

/// Samples appended to writer inputs by track kind.
pub static SAMPLES_TRANSFERRED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "trackpipe_samples_transferred_total",
            "Total samples appended to writer inputs",
        ),
        &["kind"], // "video", "audio", "other"
    )
    .unwrap()
});

/// Transfer loops by the state they stopped draining in.
pub static LOOP_END_STATES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "trackpipe_loop_end_states_total",
            "Transfer loops by end state",
        ),
        &["state"],
    )
    .unwrap()
});

pub static TRANSFORM_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "trackpipe_transform_failures_total",
        "Sample transforms that returned an error",
    )
    .unwrap()
});

// =============================================================================
// Probing
// =============================================================================

/// Format probes by result.
pub static PROBES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trackpipe_probes_total", "Total format probes"),
        &["result"], // "ok", "failed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Runs
        Box::new(PIPELINE_RUNS.clone()),
        Box::new(PIPELINE_DURATION.clone()),
        Box::new(SETUP_FAILURES.clone()),
        // Transfer loops
        Box::new(SAMPLES_TRANSFERRED.clone()),
        Box::new(LOOP_END_STATES.clone()),
        Box::new(TRANSFORM_FAILURES.clone()),
        // Probing
        Box::new(PROBES_TOTAL.clone()),
    ]
}
