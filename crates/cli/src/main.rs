mod batch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use prometheus::Registry;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use convertino_core::metrics::{encode_metrics, register_metrics};
use convertino_core::{
    load_config, validate_config, BatchCallbacks, Config, ConversionEngine, OrchestratorConfig,
};

use batch::BatchFile;

/// Convert a batch of media files.
#[derive(Debug, Parser)]
#[command(name = "convertino", version, about)]
struct Cli {
    /// TOML file with one `[[tasks]]` entry per file.
    batch: PathBuf,

    /// Configuration file. Defaults are used when omitted.
    #[arg(short, long, env = "CONVERTINO_CONFIG")]
    config: Option<PathBuf>,

    /// Concurrent conversions, overriding the configured queue sizes.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Print Prometheus metrics to stderr when the batch ends.
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("Fatal error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns whether every task succeeded.
async fn run() -> Result<bool> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?
        }
        None => Config::default(),
    };
    if let Some(concurrency) = cli.concurrency {
        config.queue = OrchestratorConfig::fixed(concurrency);
    }
    validate_config(&config).context("Configuration validation failed")?;

    let registry = Registry::new();
    register_metrics(&registry).context("Failed to register metrics")?;

    let batch = BatchFile::load(&cli.batch)?;
    info!(tasks = batch.tasks.len(), batch = ?cli.batch, "Loaded batch");

    let engine = Arc::new(ConversionEngine::from_config(&config));
    let orchestrator = engine.orchestrator();

    // Cancel the batch on Ctrl+C or SIGTERM
    let canceller = Arc::clone(&orchestrator);
    let signal_task = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown signal received, cancelling batch");
        canceller.cancel();
    });

    let callbacks = BatchCallbacks::new()
        .on_progress(|percent| tracing::debug!("Progress {:.1}%", percent))
        .on_error(|failure| error!(task_id = %failure.task_id, "{}", failure.error));

    let result = orchestrator
        .convert(batch.tasks, callbacks)
        .await
        .context("Batch did not start")?;
    signal_task.abort();
    engine.shutdown();

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to encode batch result")?
    );
    if cli.metrics {
        eprintln!("{}", encode_metrics(&registry).context("Failed to encode metrics")?);
    }

    Ok(result.failed_tasks.is_empty() && !result.was_cancelled)
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
            Ok(mut sigterm) => {
                sigterm.recv().await;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_arguments() {
        let cli = Cli::try_parse_from([
            "convertino",
            "batch.toml",
            "--config",
            "convertino.toml",
            "--concurrency",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.batch, PathBuf::from("batch.toml"));
        assert_eq!(cli.config, Some(PathBuf::from("convertino.toml")));
        assert_eq!(cli.concurrency, Some(2));
        assert!(!cli.metrics);
    }

    #[test]
    fn test_cli_requires_batch() {
        assert!(Cli::try_parse_from(["convertino"]).is_err());
    }
}
