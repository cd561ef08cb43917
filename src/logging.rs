//! Tracing subscriber setup.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Prefix for daily log files (`shopflow.log.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "shopflow.log";

/// Default filter directive when `RUST_LOG` is not set.
pub fn default_directive(config: &LoggingConfig, verbose: bool) -> String {
    if verbose {
        "shopflow=debug,tower_http=debug".to_string()
    } else if config.level.contains('=') {
        config.level.clone()
    } else {
        format!("shopflow={},tower_http=warn", config.level)
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held
/// for the lifetime of the process.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(config, verbose)))
        .context("Invalid log filter")?;

    let stderr_json = config
        .json
        .then(|| fmt::layer().json().with_writer(std::io::stderr));
    let stderr_text = (!config.json).then(|| fmt::layer().with_writer(std::io::stderr));

    let (file_layer, guard) = match &config.file {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_json)
        .with(stderr_text)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
