//! Result aggregation
//!
//! Collects pool outcomes into a [`BenchmarkRun`] as they complete and
//! keeps the counters the final report needs. No judgement about better or
//! worse happens here.

use std::collections::BTreeMap;

use crate::models::{BenchmarkRun, CaseResult, CaseStatus};

/// Counters over a finished (or partially cancelled) run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    /// Everything that is neither a success nor a cancellation
    pub failed: usize,
    pub cancelled: usize,
    pub timed_out: usize,
    /// Results that kept running after shutdown was requested
    pub completed_during_shutdown: usize,
    pub by_status: BTreeMap<CaseStatus, usize>,
}

impl RunSummary {
    pub fn count(&self, status: CaseStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    /// Percentage of successful tasks
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64 * 100.0
        }
    }

    fn record(&mut self, result: &CaseResult) {
        self.total += 1;
        *self.by_status.entry(result.status).or_insert(0) += 1;

        match result.status {
            CaseStatus::Success => self.succeeded += 1,
            CaseStatus::Cancelled => self.cancelled += 1,
            CaseStatus::Timeout => {
                self.timed_out += 1;
                self.failed += 1;
            }
            _ => self.failed += 1,
        }

        if result.completed_during_shutdown {
            self.completed_during_shutdown += 1;
        }
    }
}

/// Single-writer collector driven by the coordinating task
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    run: BenchmarkRun,
    summary: RunSummary,
}

impl ResultAggregator {
    pub fn new(timestamp: impl Into<String>) -> Self {
        Self {
            run: BenchmarkRun::new(timestamp),
            summary: RunSummary::default(),
        }
    }

    /// Append one completed result
    pub fn record(&mut self, result: CaseResult) {
        self.summary.record(&result);
        self.run.cases.push(result);
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn len(&self) -> usize {
        self.run.cases.len()
    }

    /// Final run, sorted by level then strategy
    pub fn finish(self) -> (BenchmarkRun, RunSummary) {
        let mut run = self.run;
        run.cases.sort_by(|a, b| {
            a.level
                .cmp(&b.level)
                .then_with(|| a.strategy.cmp(&b.strategy))
        });
        (run, self.summary)
    }
}

/// Summary of an already materialized run, e.g. one loaded from disk
pub fn summarize(run: &BenchmarkRun) -> RunSummary {
    let mut summary = RunSummary::default();
    for result in &run.cases {
        summary.record(result);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BenchmarkTask;
    use std::path::PathBuf;

    fn task(level: &str, strategy: &str) -> BenchmarkTask {
        BenchmarkTask {
            id: BenchmarkTask::make_id(level, strategy),
            level_id: level.to_string(),
            level_path: PathBuf::from(level),
            strategy_spec: strategy.to_string(),
            timeout_seconds: 10.0,
        }
    }

    #[test]
    fn test_counts_and_sorting() {
        let mut aggregator = ResultAggregator::new("2025-05-14T10:00:00");
        aggregator.record(CaseResult::failure(
            &task("b.lvl", "-s bfs"),
            CaseStatus::Timeout,
            "timed out",
            Some(10.0),
        ));
        aggregator.record(CaseResult::success(
            &task("a.lvl", "-s dfs"),
            BTreeMap::new(),
            vec!["Move(E)".into()],
            0.2,
        ));
        aggregator.record(CaseResult::cancelled_before_dispatch(&task("a.lvl", "-s bfs")));
        let mut drained = CaseResult::success(&task("c.lvl", "-s bfs"), BTreeMap::new(), vec![], 1.0);
        drained.completed_during_shutdown = true;
        aggregator.record(drained);

        assert_eq!(aggregator.len(), 4);
        assert_eq!(aggregator.summary().total, 4);

        let (run, summary) = aggregator.finish();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.timed_out, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.completed_during_shutdown, 1);
        assert_eq!(summary.count(CaseStatus::OsFailure), 0);
        assert_eq!(summary.success_rate(), 50.0);

        let order: Vec<(&str, &str)> = run
            .cases
            .iter()
            .map(|c| (c.level.as_str(), c.strategy.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a.lvl", "-s bfs"),
                ("a.lvl", "-s dfs"),
                ("b.lvl", "-s bfs"),
                ("c.lvl", "-s bfs")
            ]
        );
        assert_eq!(summarize(&run), summary);
    }

    #[test]
    fn test_empty_run_is_valid() {
        let (run, summary) = ResultAggregator::new("t").finish();
        assert!(run.cases.is_empty());
        assert_eq!(summary.success_rate(), 0.0);
        assert!(serde_json::to_string(&run).is_ok());
    }
}
