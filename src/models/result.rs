//! Benchmark result data models
//!
//! Contains the planned task, the per-task outcome, the run-scoped
//! collection that gets persisted, and the historical baseline used when
//! comparing runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// One (level, strategy) execution unit handed to the worker pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkTask {
    /// Unique within a run, derived from level and strategy
    pub id: String,
    /// Level identifier as written in the configuration
    pub level_id: String,
    /// Resolved path of the level file
    pub level_path: PathBuf,
    /// Strategy arguments passed to the executable
    pub strategy_spec: String,
    /// Hard deadline for this task
    pub timeout_seconds: f64,
}

impl BenchmarkTask {
    /// Build the stable task identifier for a level/strategy pair
    pub fn make_id(level_id: &str, strategy: &str) -> String {
        format!("{}::{}", level_id, strategy)
    }

    /// Strategy arguments split the way they are passed to the process
    pub fn strategy_args(&self) -> Vec<&str> {
        self.strategy_spec.split_whitespace().collect()
    }
}

/// Terminal status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CaseStatus {
    Success,
    Timeout,
    NonZeroExit,
    FileNotFound,
    ParseError,
    #[serde(rename = "OSFailure")]
    OsFailure,
    Cancelled,
    UnexpectedError,
}

impl CaseStatus {
    /// All statuses, in reporting order
    pub const ALL: [CaseStatus; 8] = [
        CaseStatus::Success,
        CaseStatus::Timeout,
        CaseStatus::NonZeroExit,
        CaseStatus::FileNotFound,
        CaseStatus::ParseError,
        CaseStatus::OsFailure,
        CaseStatus::Cancelled,
        CaseStatus::UnexpectedError,
    ];

    pub fn is_success(&self) -> bool {
        matches!(self, CaseStatus::Success)
    }

    pub fn label(&self) -> &'static str {
        match self {
            CaseStatus::Success => "Success",
            CaseStatus::Timeout => "Timeout",
            CaseStatus::NonZeroExit => "NonZeroExit",
            CaseStatus::FileNotFound => "FileNotFound",
            CaseStatus::ParseError => "ParseError",
            CaseStatus::OsFailure => "OSFailure",
            CaseStatus::Cancelled => "Cancelled",
            CaseStatus::UnexpectedError => "UnexpectedError",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of a single task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub level: String,
    pub strategy: String,
    pub status: CaseStatus,
    /// Parsed metrics; only populated for successful runs
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub solution: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Set when the task kept running after shutdown was requested
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub completed_during_shutdown: bool,
}

impl CaseResult {
    /// Successful outcome with parsed metrics and solution
    pub fn success(
        task: &BenchmarkTask,
        metrics: BTreeMap<String, f64>,
        solution: Vec<String>,
        duration_seconds: f64,
    ) -> Self {
        Self {
            level: task.level_id.clone(),
            strategy: task.strategy_spec.clone(),
            status: CaseStatus::Success,
            metrics,
            solution,
            error_message: None,
            duration_seconds: Some(duration_seconds),
            completed_during_shutdown: false,
        }
    }

    /// Failed outcome; metrics always stay empty
    pub fn failure(
        task: &BenchmarkTask,
        status: CaseStatus,
        error_message: impl Into<String>,
        duration_seconds: Option<f64>,
    ) -> Self {
        Self {
            level: task.level_id.clone(),
            strategy: task.strategy_spec.clone(),
            status,
            metrics: BTreeMap::new(),
            solution: Vec::new(),
            error_message: Some(error_message.into()),
            duration_seconds,
            completed_during_shutdown: false,
        }
    }

    /// Outcome for a task that never reached a worker
    pub fn cancelled_before_dispatch(task: &BenchmarkTask) -> Self {
        Self::failure(task, CaseStatus::Cancelled, "cancelled before dispatch", None)
    }

    /// Attach a partial solution recovered from a failed run
    pub fn with_solution(mut self, solution: Vec<String>) -> Self {
        self.solution = solution;
        self
    }

    /// Identifier of the task this result belongs to
    pub fn task_id(&self) -> String {
        BenchmarkTask::make_id(&self.level, &self.strategy)
    }

    /// Look up a metric by its case-folded header name
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }

    /// Solution length: the metric when reported, otherwise the solution line count
    pub fn solution_length(&self, length_key: &str) -> u64 {
        match self.metric(length_key) {
            Some(value) if value.is_finite() && value > 0.0 => value.round() as u64,
            Some(_) => 0,
            None => self.solution.len() as u64,
        }
    }

    /// One-line summary for logs and reports
    pub fn summary(&self) -> String {
        let duration = self
            .duration_seconds
            .map(|d| format!("{:.2}s", d))
            .unwrap_or_else(|| "-".to_string());
        match &self.error_message {
            Some(msg) => format!(
                "{} [{}] {} ({}) {}",
                self.level, self.strategy, self.status, duration, msg
            ),
            None => format!("{} [{}] {} ({})", self.level, self.strategy, self.status, duration),
        }
    }
}

/// All results of one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRun {
    /// ISO-8601 local timestamp of the run start
    pub timestamp: String,
    pub cases: Vec<CaseResult>,
}

impl BenchmarkRun {
    pub fn new(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            cases: Vec::new(),
        }
    }

    /// Levels present in the run, sorted
    pub fn levels(&self) -> Vec<&str> {
        let mut levels: Vec<&str> = self.cases.iter().map(|c| c.level.as_str()).collect();
        levels.sort_unstable();
        levels.dedup();
        levels
    }

    /// Results for one level
    pub fn cases_for_level<'a>(&'a self, level: &'a str) -> impl Iterator<Item = &'a CaseResult> {
        self.cases.iter().filter(move |c| c.level == level)
    }
}

/// Previously recorded best-known result for a level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub level: String,
    pub strategy: String,
    pub solution_length: u64,
    pub time_seconds: f64,
    pub memory_mb: f64,
}
