//! searchbench - Search client benchmark harness
//!
//! Runs an external search-client executable against a catalog of levels
//! under several strategies, collects the metrics it prints, and ranks the
//! results against previously recorded baselines.

pub mod app;
pub mod bench;
pub mod config;
pub mod models;
pub mod util;

/// Crate-wide error type.
///
/// Only startup and persistence problems surface here. Per-task failures
/// are recorded as a [`models::CaseStatus`] on the task's result instead.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration missing, malformed or invalid
    #[error("Configuration error: {0}")]
    Config(String),
    /// Benchmarked executable missing or not runnable
    #[error("Executable error: {0}")]
    Executable(String),
    /// Run file could not be written or read back
    #[error("Results persistence error: {0}")]
    Persistence(String),
    /// Worker pool failed outside of any single task
    #[error("Worker error: {0}")]
    Worker(String),
}

impl From<serde_json::Error> for BenchError {
    fn from(err: serde_json::Error) -> Self {
        BenchError::Persistence(format!("JSON serialization error: {}", err))
    }
}

impl From<toml::de::Error> for BenchError {
    fn from(err: toml::de::Error) -> Self {
        BenchError::Config(format!("TOML parsing error: {}", err))
    }
}

/// Result type alias for searchbench operations
pub type Result<T> = std::result::Result<T, BenchError>;

/// Error handling utilities
pub mod error {
    use super::BenchError;

    /// Whether the error must stop the run before any task is submitted
    pub fn is_fatal(error: &BenchError) -> bool {
        match error {
            BenchError::Config(_) | BenchError::Executable(_) => true,
            BenchError::Io(_) => true,
            BenchError::Persistence(_) | BenchError::Worker(_) => false,
        }
    }

    /// Convert error to user-friendly message with suggestions
    pub fn user_friendly_message(error: &BenchError) -> String {
        match error {
            BenchError::Config(msg) => {
                format!("Configuration error: {}. Check the benchmark document.", msg)
            }
            BenchError::Executable(msg) => format!(
                "{}. Build the search client or pass --executable with the right path.",
                msg
            ),
            BenchError::Persistence(msg) => {
                format!("{}. Check the results directory and disk space.", msg)
            }
            BenchError::Io(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                "Permission denied. Check file permissions of the levels and output directories."
                    .to_string()
            }
            _ => error.to_string(),
        }
    }
}

// Common types and constants
pub const APP_NAME: &str = "searchbench";
pub const CONFIG_FILE: &str = "benchmarks.toml";
pub const DEFAULT_RESULT_PREFIX: &str = "run";
pub const RESULT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const DEFAULT_GRAY_AREA_PERCENT: f64 = 5.0;
pub const DEFAULT_TIMEOUT_SECONDS: f64 = 180.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(error::is_fatal(&BenchError::Config("missing cases".into())));
        assert!(error::is_fatal(&BenchError::Executable("not found".into())));
        assert!(!error::is_fatal(&BenchError::Persistence("disk full".into())));
    }

    #[test]
    fn test_user_friendly_message() {
        let msg = error::user_friendly_message(&BenchError::Executable(
            "Executable not found: ./client".into(),
        ));
        assert!(msg.contains("--executable"));

        let msg = error::user_friendly_message(&BenchError::Config("bad".into()));
        assert!(msg.contains("benchmark document"));
    }

    #[test]
    fn test_toml_error_maps_to_config() {
        let err: BenchError = toml::from_str::<toml::Value>("= broken").unwrap_err().into();
        assert!(matches!(err, BenchError::Config(_)));
    }
}
