//! Tracing setup: one stream to stdout, optionally mirrored to a log file.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber. Keep the returned guard alive until exit
/// or buffered file output is lost.
pub fn init(level: &str, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stdout = fmt::layer().with_target(false);

    let file = log_file.and_then(|path| match open_append(path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("failed to open log file {}: {e}; logging to stdout only", path.display());
            None
        }
    });

    match file {
        Some(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout)
                .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
                .init();
            if let Some(path) = log_file {
                tracing::info!(path = %path.display(), "logging initialized");
            }
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout)
                .init();
            None
        }
    }
}

fn open_append(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::OpenOptions::new().create(true).append(true).open(path)
}
