//! Logging setup
//!
//! Console output is `pretty` (development) or `json` (production). When a
//! log directory is configured, JSON lines are also written to a daily
//! rolling file.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "playlist_import=info";
const LOG_FILE_NAME: &str = "playlist-import.log";

/// Install the global subscriber
///
/// # Returns
/// The file writer guard; keep it alive for the process lifetime or buffered
/// lines are lost on exit.
pub fn init(format: &str, log_dir: Option<&str>) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Failed to create env filter")?;

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let dir = shellexpand::tilde(dir).into_owned();
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory {}", dir))?;
            let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(env_filter).with(file_layer);
    match format {
        "json" => registry
            .with(fmt::layer().json())
            .try_init()
            .context("Failed to install tracing subscriber")?,
        _ => registry
            .with(fmt::layer().pretty())
            .try_init()
            .context("Failed to install tracing subscriber")?,
    }

    Ok(guard)
}
