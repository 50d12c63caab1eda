//! Plain-text reports
//!
//! Renders the end-of-run summary, skipped cases, comparison verdicts and
//! side-by-side views of several runs as aligned text tables. Everything
//! returns a `String`; printing is up to the caller.

use std::collections::BTreeSet;
use std::fmt::Write;

use crate::bench::aggregate::{summarize, RunSummary};
use crate::bench::compare::{ComparisonEngine, LevelComparison, MetricDelta};
use crate::bench::planner::SkippedCase;
use crate::config::MetricKeys;
use crate::models::{BenchmarkRun, CaseResult, CaseStatus};
use crate::util::{format_memory_mb, format_percent_delta, format_seconds};

/// Column-aligned text table
struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn new<H: Into<String>>(headers: Vec<H>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(width) = widths.get_mut(i) {
                    *width = (*width).max(cell.chars().count());
                }
            }
        }

        let mut out = String::new();
        Self::line(&mut out, &self.headers, &widths);
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        Self::line(&mut out, &rule, &widths);
        for row in &self.rows {
            Self::line(&mut out, row, &widths);
        }
        out
    }

    fn line(out: &mut String, cells: &[String], widths: &[usize]) {
        let padded: Vec<String> = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect();
        out.push_str(padded.join("  ").trim_end());
        out.push('\n');
    }
}

/// Per-case table plus status counts
pub fn render_summary(run: &BenchmarkRun, summary: &RunSummary, keys: &MetricKeys) -> String {
    let mut table = Table::new(vec!["Level", "Strategy", "Status", "Length", "Time", "Memory", "Note"]);
    for case in &run.cases {
        let length = if case.status.is_success() {
            case.solution_length(&keys.length).to_string()
        } else {
            "-".to_string()
        };
        let mut note = case.error_message.clone().unwrap_or_default();
        if case.completed_during_shutdown {
            note = format!("completed during shutdown {}", note).trim_end().to_string();
        }
        // Multi-line stderr would break the table
        let note = note.lines().next().unwrap_or_default().to_string();

        table.push(vec![
            case.level.clone(),
            case.strategy.clone(),
            case.status.to_string(),
            length,
            format_seconds(case_time(case, keys)),
            format_memory_mb(case.metric(&keys.memory)),
            note,
        ]);
    }

    let mut out = format!("Benchmark run {}\n\n", run.timestamp);
    out.push_str(&table.render());

    let _ = write!(
        out,
        "\n{} tasks: {} succeeded, {} failed ({} timed out), {} cancelled",
        summary.total, summary.succeeded, summary.failed, summary.timed_out, summary.cancelled
    );
    if summary.completed_during_shutdown > 0 {
        let _ = write!(
            out,
            ", {} completed during shutdown",
            summary.completed_during_shutdown
        );
    }
    out.push('\n');

    let breakdown: Vec<String> = CaseStatus::ALL
        .iter()
        .filter(|status| summary.count(**status) > 0)
        .map(|status| format!("{}={}", status, summary.count(*status)))
        .collect();
    if !breakdown.is_empty() {
        let _ = writeln!(out, "Statuses: {}", breakdown.join(", "));
    }

    out
}

/// Cases that were left out of the plan
pub fn render_skipped(skipped: &[SkippedCase]) -> String {
    let mut out = String::new();
    for case in skipped {
        let _ = writeln!(
            out,
            "skipped {}: {}",
            case.input.as_deref().unwrap_or("<case without input>"),
            case.reason
        );
    }
    out
}

/// Reported time, falling back to the measured wall-clock duration
fn case_time(case: &CaseResult, keys: &MetricKeys) -> Option<f64> {
    case.metric(&keys.time).or(case.duration_seconds)
}

fn delta_cell(delta: Option<&MetricDelta>) -> String {
    match delta {
        Some(delta) => format!("{} {:?}", format_percent_delta(delta.percent), delta.class),
        None => "-".to_string(),
    }
}

/// Verdict table, one row per level
pub fn render_comparison(comparisons: &[LevelComparison], gray_area_percent: f64) -> String {
    let mut table = Table::new(vec![
        "Level", "Best strategy", "Length", "Baseline", "dLength", "dTime", "dMemory", "Verdict",
    ]);

    for cmp in comparisons {
        table.push(vec![
            cmp.level.clone(),
            cmp.best
                .as_ref()
                .map(|b| b.strategy.clone())
                .unwrap_or_else(|| "-".to_string()),
            cmp.best
                .as_ref()
                .map(|b| b.solution_length.to_string())
                .unwrap_or_else(|| "-".to_string()),
            cmp.baseline
                .as_ref()
                .map(|b| b.solution_length.to_string())
                .unwrap_or_else(|| "-".to_string()),
            delta_cell(cmp.length.as_ref()),
            delta_cell(cmp.time.as_ref()),
            delta_cell(cmp.memory.as_ref()),
            cmp.verdict.to_string(),
        ]);
    }

    format!(
        "Comparison (gray area {:.1}%)\n\n{}",
        gray_area_percent,
        table.render()
    )
}

/// Strategies of `level`: ranked successes first, run by run, then the rest by name
fn strategy_order(runs: &[(String, BenchmarkRun)], level: &str, engine: &ComparisonEngine) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    for (_, run) in runs {
        for candidate in engine.rank_level(run, level) {
            if !order.contains(&candidate.strategy) {
                order.push(candidate.strategy);
            }
        }
    }

    let remaining: BTreeSet<&str> = runs
        .iter()
        .flat_map(|(_, run)| run.cases_for_level(level))
        .map(|case| case.strategy.as_str())
        .collect();
    for strategy in remaining {
        if !order.iter().any(|s| s == strategy) {
            order.push(strategy.to_string());
        }
    }
    order
}

/// Several runs side by side, one table per level and one row per strategy.
///
/// With exactly two runs a time delta column `(R2 - R1) / R1` is added.
pub fn render_run_matrix(runs: &[(String, BenchmarkRun)], engine: &ComparisonEngine) -> String {
    let keys = engine.keys();
    let mut out = format!("Comparing {} runs\n", runs.len());
    for (i, (name, run)) in runs.iter().enumerate() {
        let summary = summarize(run);
        let _ = writeln!(
            out,
            "  R{} {} ({}): {}/{} succeeded ({:.1}%)",
            i + 1,
            name,
            run.timestamp,
            summary.succeeded,
            summary.total,
            summary.success_rate()
        );
    }

    let levels: BTreeSet<&str> = runs.iter().flat_map(|(_, run)| run.levels()).collect();
    for level in levels {
        let mut headers = vec!["Strategy".to_string()];
        for i in 1..=runs.len() {
            headers.push(format!("R{} length", i));
            headers.push(format!("R{} time", i));
        }
        if runs.len() == 2 {
            headers.push("dTime R2/R1".to_string());
        }
        let mut table = Table::new(headers);

        for strategy in strategy_order(runs, level, engine) {
            let cases: Vec<Option<&CaseResult>> = runs
                .iter()
                .map(|(_, run)| run.cases_for_level(level).find(|c| c.strategy == strategy))
                .collect();

            let mut row = vec![strategy];
            for case in &cases {
                match case {
                    Some(case) if case.status.is_success() => {
                        row.push(case.solution_length(&keys.length).to_string());
                        row.push(format_seconds(case_time(case, keys)));
                    }
                    Some(case) => {
                        row.push("-".to_string());
                        row.push(case.status.to_string());
                    }
                    None => {
                        row.push("n/a".to_string());
                        row.push("n/a".to_string());
                    }
                }
            }

            if let [first, second] = cases.as_slice() {
                let successful_time = |case: &Option<&CaseResult>| {
                    (*case)
                        .filter(|c| c.status.is_success())
                        .and_then(|c| case_time(c, keys))
                };
                let delta = successful_time(first)
                    .zip(successful_time(second))
                    .and_then(|(before, after)| engine.delta(after, before));
                row.push(delta_cell(delta.as_ref()));
            }
            table.push(row);
        }

        let _ = write!(out, "\nLevel {}\n\n{}", level, table.render());
    }

    out
}
