//! Benchmark engine module
//!
//! Contains task planning, client process execution, the worker pool with
//! its cancellation plumbing, output parsing, aggregation and comparison.

pub mod aggregate;
pub mod cancel;
pub mod compare;
pub mod parser;
pub mod planner;
pub mod runner;
pub mod worker;

// Re-export commonly used types
pub use aggregate::{ResultAggregator, RunSummary};
pub use cancel::{spawn_ctrl_c_watcher, spawn_key_watcher, CancellationController, KeySource};
pub use compare::{baselines_from_run, ComparisonEngine, LevelComparison, Verdict};
pub use parser::{OutputParser, ParseError};
pub use planner::{collect_baselines, SkipReason, SkippedCase, TaskPlan, TaskPlanner};
pub use runner::{RunnerSettings, TaskRunner};
pub use worker::{PoolEvent, PoolRun, WorkerPool};
