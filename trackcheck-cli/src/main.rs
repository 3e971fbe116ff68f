//! trackcheck CLI: smoke test for an experiment-tracking server.
//!
//! Fits a toy linear model, records it as one run on the server at
//! `http://<ip>`, and prints a single confirmation line.

use anyhow::Context;
use clap::Parser;
use clap::builder::NonEmptyStringValueParser;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use trackcheck_core::SmokeTestRunner;

/// MLflow smoke test
#[derive(Parser, Debug)]
#[command(name = "trackcheck", version, about, long_about = None)]
struct Cli {
    /// MLflow server public IP or hostname, optionally with a port
    #[arg(long, value_parser = NonEmptyStringValueParser::new())]
    ip: String,
}

/// Daily-rotated log file in `log_dir`, creating the directory if needed.
fn open_log_file(log_dir: &Path) -> anyhow::Result<RollingFileAppender> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("trackcheck.log")
        .build(log_dir)
        .with_context(|| format!("Failed to open log file in {}", log_dir.display()))
}

/// Human-readable stderr output plus a JSON log file.
///
/// The file layer is skipped, with a debug event saying why, when the log
/// directory is not writable. The returned guard flushes the file writer on
/// drop.
fn init_tracing() -> Option<WorkerGuard> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    let log_dir = directories::ProjectDirs::from("dev", "trackcheck", "trackcheck")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));

    let (json_layer, guard, skipped) = match open_log_file(&log_dir) {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard), None)
        }
        Err(err) => (None, None, Some(err)),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    if let Some(err) = skipped {
        let reason = format!("{err:#}");
        tracing::debug!(error = %reason, "JSON log file disabled");
    }
    guard
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing();

    let workspace = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = trackcheck_core::load_config(Some(&workspace), None)
        .context("Failed to load configuration")?;

    let runner = SmokeTestRunner::for_host(&cli.ip, config)?;
    let report = runner
        .run()
        .await
        .with_context(|| format!("Smoke test against {} failed", runner.endpoint()))?;

    println!("{}", report.confirmation());
    Ok(())
}
