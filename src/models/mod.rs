//! Data models module
//!
//! Contains the task, result and baseline structures shared by the
//! benchmark engine, persistence and reporting.

pub mod result;

// Re-export commonly used types
pub use result::{Baseline, BenchmarkRun, BenchmarkTask, CaseResult, CaseStatus};
