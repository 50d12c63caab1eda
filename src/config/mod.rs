//! Configuration management module
//!
//! Handles loading and validation of the benchmark document: where the
//! levels live, which executable to run, which (level, strategies) cases
//! to expand, and how the output protocol and comparison are tuned.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::models::Baseline;
use crate::{
    BenchError, Result, APP_NAME, CONFIG_FILE, DEFAULT_GRAY_AREA_PERCENT, DEFAULT_RESULT_PREFIX,
    DEFAULT_TIMEOUT_SECONDS,
};

pub mod persistence;

/// Benchmark document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Search client executable; may also be supplied on the command line
    #[serde(default)]
    pub executable: Option<PathBuf>,
    /// Root directory level inputs are resolved against
    pub levels_dir: PathBuf,
    /// Directory run files are written to
    pub output_dir: PathBuf,
    /// Level descriptors to expand into tasks
    pub cases: Vec<CaseConfig>,
    /// Global per-task timeout in seconds
    #[serde(default = "default_timeout", alias = "timeout_seconds")]
    pub timeout_s: f64,
    /// Worker pool size; defaults to the available CPU count
    #[serde(default)]
    pub max_workers: Option<usize>,
    /// How the level reaches the executable
    #[serde(default)]
    pub input_mode: InputMode,
    /// Prefix that marks metric lines in the client output
    #[serde(default = "default_metric_prefix")]
    pub metric_prefix: String,
    /// Free-text marker preceding the solution length, e.g. "Actions used: "
    #[serde(default)]
    pub solution_marker: Option<String>,
    /// Which source wins when both metric and marker report a length
    #[serde(default)]
    pub length_source: LengthSource,
    /// Metric names used for ranking
    #[serde(default)]
    pub metric_keys: MetricKeys,
    /// Tolerance band (percent) within which a change is neutral
    #[serde(default = "default_gray_area")]
    pub gray_area_percent: f64,
    /// What happens to running tasks when shutdown is requested
    #[serde(default)]
    pub cancel_policy: CancelPolicy,
    /// Time a terminated process gets to exit before it is killed
    #[serde(default = "default_grace_ms")]
    pub termination_grace_ms: u64,
    /// File name prefix for persisted runs
    #[serde(default = "default_result_prefix")]
    pub result_prefix: String,
}

/// One level descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseConfig {
    /// Level path relative to `levels_dir`
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub strategies: Vec<String>,
    /// Overrides the global timeout for this level
    #[serde(default, alias = "timeout_seconds")]
    pub timeout_s: Option<f64>,
    /// Previous best-known result for this level
    #[serde(default, alias = "baseline")]
    pub best_found_solution_metrics: Option<BaselineConfig>,
}

/// Baseline block as written in the benchmark document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineConfig {
    pub strategy: String,
    pub length: u64,
    pub time_s: f64,
    pub memory_mb: f64,
}

impl BaselineConfig {
    pub fn to_baseline(&self, level: &str) -> Baseline {
        Baseline {
            level: level.to_string(),
            strategy: self.strategy.clone(),
            solution_length: self.length,
            time_seconds: self.time_s,
            memory_mb: self.memory_mb,
        }
    }
}

/// Level injection mode for the benchmarked executable
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InputMode {
    /// Level file content is piped to standard input
    #[default]
    Stdin,
    /// Level path is appended to the arguments, optionally behind a flag
    Argument {
        #[serde(default)]
        flag: Option<String>,
    },
}

/// Precedence between the structured length metric and the text marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthSource {
    /// Keep the metric; the marker only fills in when the metric is absent
    #[default]
    Metric,
    /// The marker overrides the metric
    Marker,
}

/// Running-task behavior once shutdown is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelPolicy {
    /// Ask running processes to stop, kill them after the grace period
    #[default]
    Terminate,
    /// Let running processes finish and keep their outcome
    Drain,
}

/// Case-folded metric header names used by the comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricKeys {
    #[serde(default = "default_length_key")]
    pub length: String,
    #[serde(default = "default_time_key")]
    pub time: String,
    #[serde(default = "default_memory_key")]
    pub memory: String,
}

impl Default for MetricKeys {
    fn default() -> Self {
        Self {
            length: default_length_key(),
            time: default_time_key(),
            memory: default_memory_key(),
        }
    }
}

fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_metric_prefix() -> String {
    "#".to_string()
}

fn default_gray_area() -> f64 {
    DEFAULT_GRAY_AREA_PERCENT
}

fn default_grace_ms() -> u64 {
    2000
}

fn default_result_prefix() -> String {
    DEFAULT_RESULT_PREFIX.to_string()
}

fn default_length_key() -> String {
    "solutionlength".to_string()
}

fn default_time_key() -> String {
    "time[s]".to_string()
}

fn default_memory_key() -> String {
    "alloc[mb]".to_string()
}

impl BenchmarkConfig {
    /// Minimal configuration; everything optional takes its default
    pub fn new(levels_dir: PathBuf, output_dir: PathBuf, cases: Vec<CaseConfig>) -> Self {
        Self {
            executable: None,
            levels_dir,
            output_dir,
            cases,
            timeout_s: default_timeout(),
            max_workers: None,
            input_mode: InputMode::default(),
            metric_prefix: default_metric_prefix(),
            solution_marker: None,
            length_source: LengthSource::default(),
            metric_keys: MetricKeys::default(),
            gray_area_percent: default_gray_area(),
            cancel_policy: CancelPolicy::default(),
            termination_grace_ms: default_grace_ms(),
            result_prefix: default_result_prefix(),
        }
    }

    /// Parse a benchmark document; JSON when the extension says so, TOML otherwise
    pub fn from_str_with_format(content: &str, json: bool) -> Result<Self> {
        if json {
            serde_json::from_str(content)
                .map_err(|e| BenchError::Config(format!("JSON parsing error: {}", e)))
        } else {
            Ok(toml::from_str(content)?)
        }
    }

    /// Load the benchmark document at `path`
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            BenchError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let config = Self::from_str_with_format(&content, is_json).map_err(|e| match e {
            BenchError::Config(msg) => {
                BenchError::Config(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })?;

        debug!(path = %path.display(), cases = config.cases.len(), "loaded benchmark config");
        Ok(config)
    }

    /// Get the standard configuration file path
    /// Uses ./benchmarks.toml when present, else $CONFIG_HOME/searchbench/benchmarks.toml
    pub fn config_file_path() -> Result<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Ok(local);
        }

        let config_dir = dirs::config_dir().ok_or_else(|| {
            BenchError::Config("Unable to determine config directory".to_string())
        })?;

        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Validate everything that has to hold before a single task runs
    pub fn validate(&self) -> Result<()> {
        if !self.levels_dir.is_dir() {
            return Err(BenchError::Config(format!(
                "Levels directory does not exist: {}",
                self.levels_dir.display()
            )));
        }

        if !self.timeout_s.is_finite() || self.timeout_s <= 0.0 {
            return Err(BenchError::Config(format!(
                "Timeout must be a positive number of seconds, got {}",
                self.timeout_s
            )));
        }

        for case in &self.cases {
            if let Some(timeout) = case.timeout_s {
                if !timeout.is_finite() || timeout <= 0.0 {
                    return Err(BenchError::Config(format!(
                        "Timeout for case {} must be positive, got {}",
                        case.input.as_deref().unwrap_or("<missing input>"),
                        timeout
                    )));
                }
            }
        }

        if self.max_workers == Some(0) {
            return Err(BenchError::Config(
                "Worker count must be greater than 0".to_string(),
            ));
        }

        if !self.gray_area_percent.is_finite() || self.gray_area_percent < 0.0 {
            return Err(BenchError::Config(format!(
                "Gray area must be a non-negative percentage, got {}",
                self.gray_area_percent
            )));
        }

        if self.metric_prefix.trim().is_empty() {
            return Err(BenchError::Config(
                "Metric prefix must not be empty".to_string(),
            ));
        }

        let executable = self.executable.as_ref().ok_or_else(|| {
            BenchError::Config(
                "No executable configured; set `executable` or pass --executable".to_string(),
            )
        })?;
        check_executable(executable)?;

        Ok(())
    }

    /// Effective worker pool size (never below one)
    pub fn worker_count(&self) -> usize {
        self.max_workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }

    /// Grace period between the termination request and a forced kill
    pub fn termination_grace(&self) -> Duration {
        Duration::from_millis(self.termination_grace_ms)
    }

    /// Create the output directory if needed
    pub fn ensure_output_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.output_dir).map_err(|e| {
            BenchError::Config(format!(
                "Could not create output directory {}: {}",
                self.output_dir.display(),
                e
            ))
        })
    }

    /// Set the executable path
    pub fn with_executable(mut self, path: PathBuf) -> Self {
        self.executable = Some(path);
        self
    }

    /// Set the number of workers
    pub fn with_max_workers(mut self, count: usize) -> Self {
        self.max_workers = Some(count);
        self
    }

    /// Set the global timeout
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_s = seconds;
        self
    }

    /// Set the gray-area tolerance
    pub fn with_gray_area(mut self, percent: f64) -> Self {
        self.gray_area_percent = percent;
        self
    }

    /// Set the cancel policy
    pub fn with_cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.cancel_policy = policy;
        self
    }
}

/// Check that `path` is an existing, runnable file
pub fn check_executable(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(BenchError::Executable(format!(
            "Executable not found: {}",
            path.display()
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(path)?.permissions().mode();
        if mode & 0o111 == 0 {
            return Err(BenchError::Executable(format!(
                "Executable is not marked executable: {}",
                path.display()
            )));
        }
    }

    Ok(())
}
