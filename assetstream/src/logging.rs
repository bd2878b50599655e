//! Tracing subscriber setup.
//!
//! Console output always; an optional log file written through a
//! non-blocking appender. `RUST_LOG` overrides the configured level.

use std::path::Path;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Errors installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid log filter '{0}'")]
    Filter(String),

    #[error("Failed to install subscriber: {0}")]
    Install(String),
}

/// Build the filter, preferring `RUST_LOG` when set.
pub fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|_| LoggingError::Filter(level.to_string())),
    }
}

/// Install the global subscriber.
///
/// Returns the file writer guard when a log file is configured; keep it alive
/// for the lifetime of the process or buffered lines are lost.
pub fn init_logging(level: &str, file: Option<&Path>) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = build_filter(level)?;

    let Some(file) = file else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .map_err(|e| LoggingError::Install(e.to_string()))?;
        return Ok(None);
    };

    let directory = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&directory).map_err(|source| LoggingError::Directory {
        path: directory.display().to_string(),
        source,
    })?;

    let file_name = file
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "assetstream.log".into());
    let appender = tracing_appender::rolling::never(&directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))?;

    Ok(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_accepts_directives() {
        assert!(build_filter("info").is_ok());
        assert!(build_filter("assetstream=debug,reqwest=warn").is_ok());
    }
}
