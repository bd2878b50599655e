//! CLI error type.

use std::fmt;

use assetstream::cache::CacheError;
use assetstream::config::ConfigError;
use assetstream::logging::LoggingError;

/// Errors reported by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded.
    Config(String),
    /// Logging could not be initialized.
    Logging(String),
    /// The async runtime could not be started.
    Runtime(String),
    /// No provider accepts the asset id.
    NoProvider { id: String, asset_type: String },
    /// The fetch was canceled.
    Canceled { id: String, reason: String },
    /// The fetch did not finish in time.
    Timeout { id: String, seconds: u64 },
    /// Writing the output file failed.
    Output(String),
    /// A cache operation failed.
    Cache(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(msg) => write!(f, "Logging error: {}", msg),
            CliError::Runtime(msg) => write!(f, "Failed to start runtime: {}", msg),
            CliError::NoProvider { id, asset_type } => {
                write!(f, "No provider can fetch '{}' (type {})", id, asset_type)
            }
            CliError::Canceled { id, reason } => write!(f, "Fetch of '{}' canceled: {}", id, reason),
            CliError::Timeout { id, seconds } => {
                write!(f, "Fetch of '{}' did not finish within {}s", id, seconds)
            }
            CliError::Output(msg) => write!(f, "Failed to write output: {}", msg),
            CliError::Cache(msg) => write!(f, "Cache error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e.to_string())
    }
}

impl From<CacheError> for CliError {
    fn from(e: CacheError) -> Self {
        CliError::Cache(e.to_string())
    }
}
