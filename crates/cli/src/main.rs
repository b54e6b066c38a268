mod metrics;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trackpipe_core::{
    load_config_or_default, validate_config, Config, MemoryEngine, Pipeline, PipelineRequest,
    PipelineResult, SyntheticAsset,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable naming the configuration file
const CONFIG_ENV: &str = "TRACKPIPE_CONFIG";

/// Exit code for a run that was interrupted
const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(PipelineResult::Success) => {}
        Ok(PipelineResult::Cancelled) => std::process::exit(EXIT_CANCELLED),
        Ok(PipelineResult::Failed(_)) => std::process::exit(1),
        Err(e) => {
            error!("Fatal error: {:#}", e);
            std::process::exit(2);
        }
    }
}

async fn run() -> Result<PipelineResult> {
    // Initialize logging. Stdout carries the JSON report.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Determine config path
    let config_path = std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("trackpipe.toml"));

    // Load configuration
    info!("trackpipe {} loading configuration from {:?}", VERSION, config_path);
    let config = load_config_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Container: {:?}", config.pipeline.container);
    info!("Output path: {:?}", config.output.path);

    let (_engine, pipeline) = build_pipeline(&config);
    let handle = pipeline.handle();
    info!(run_id = %handle.run_id(), "Pipeline created");

    let task = tokio::spawn(pipeline.run());
    tokio::select! {
        _ = shutdown_signal() => {
            warn!("Shutdown signal received, cancelling pipeline");
            handle.cancel();
        }
        _ = handle.wait() => {}
    }
    let result = task.await.context("Pipeline task failed")?;

    let report = handle
        .report()
        .context("Pipeline finished without a report")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize report")?
    );

    if config.output.print_metrics {
        print!("{}", metrics::encode_metrics()?);
    }

    Ok(result)
}

/// Build an in-memory engine holding the configured synthetic source, and a
/// pipeline reading from it.
fn build_pipeline(config: &Config) -> (MemoryEngine, Pipeline) {
    let engine = MemoryEngine::from_config(&config.memory_engine);
    let asset = SyntheticAsset::from_config(&config.memory_engine);
    info!(
        "Synthetic source {:?}: {} track(s)",
        config.memory_engine.source,
        asset.tracks.len()
    );
    engine.insert_asset(config.memory_engine.source.clone(), asset);

    let request = PipelineRequest::new(
        config.memory_engine.source.clone(),
        config.output.path.clone(),
    );
    let pipeline = Pipeline::new(Arc::new(engine.clone()), request, config.pipeline.clone())
        .with_storage(Arc::new(engine.clone()));

    (engine, pipeline)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
