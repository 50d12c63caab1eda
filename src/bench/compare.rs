//! Run comparison
//!
//! Picks the best successful result per level and compares it against the
//! level's baseline. Lower is better for every metric. Everything here is
//! a pure function of (results, baselines).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::config::{BenchmarkConfig, MetricKeys};
use crate::models::{Baseline, BenchmarkRun, CaseResult};

/// Direction of a single metric change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaClass {
    Better,
    Worse,
    Neutral,
}

/// Change of one metric relative to the baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub baseline: f64,
    pub candidate: f64,
    /// Signed percent change; `None` when the baseline is zero and the
    /// candidate is not
    pub percent: Option<f64>,
    pub class: DeltaClass,
}

/// Overall verdict for one level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Better,
    Worse,
    Neutral,
    /// Same length and no time data to break the tie
    SameLengthOnly,
    NoSuccessfulResult,
    NoBaseline,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Verdict::Better => "BETTER",
            Verdict::Worse => "WORSE",
            Verdict::Neutral => "NEUTRAL",
            Verdict::SameLengthOnly => "SAME (length only)",
            Verdict::NoSuccessfulResult => "no successful new result",
            Verdict::NoBaseline => "no baseline",
        };
        f.write_str(text)
    }
}

/// Successful result reduced to its ranking keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub strategy: String,
    pub solution_length: u64,
    pub time_seconds: Option<f64>,
    pub memory_mb: Option<f64>,
}

impl Candidate {
    /// Lexicographic ranking; missing time or memory always loses a tie
    fn rank(&self, other: &Self) -> Ordering {
        let missing = f64::INFINITY;
        self.solution_length
            .cmp(&other.solution_length)
            .then_with(|| {
                self.time_seconds
                    .unwrap_or(missing)
                    .total_cmp(&other.time_seconds.unwrap_or(missing))
            })
            .then_with(|| {
                self.memory_mb
                    .unwrap_or(missing)
                    .total_cmp(&other.memory_mb.unwrap_or(missing))
            })
            .then_with(|| self.strategy.cmp(&other.strategy))
    }
}

/// Comparison outcome for one level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelComparison {
    pub level: String,
    pub best: Option<Candidate>,
    pub baseline: Option<Baseline>,
    pub length: Option<MetricDelta>,
    pub time: Option<MetricDelta>,
    pub memory: Option<MetricDelta>,
    pub verdict: Verdict,
}

/// Ranks results and compares them to baselines
#[derive(Debug, Clone)]
pub struct ComparisonEngine {
    gray_area_percent: f64,
    keys: MetricKeys,
}

impl ComparisonEngine {
    pub fn new(gray_area_percent: f64, keys: MetricKeys) -> Self {
        Self {
            gray_area_percent,
            keys,
        }
    }

    pub fn from_config(config: &BenchmarkConfig) -> Self {
        Self::new(config.gray_area_percent, config.metric_keys.clone())
    }

    pub fn gray_area_percent(&self) -> f64 {
        self.gray_area_percent
    }

    pub fn keys(&self) -> &MetricKeys {
        &self.keys
    }

    /// Ranking keys of a result, if it can take part in the comparison
    pub fn candidate(&self, result: &CaseResult) -> Option<Candidate> {
        if !result.status.is_success() {
            return None;
        }

        let solution_length = result.solution_length(&self.keys.length);
        if solution_length == 0 {
            return None;
        }

        Some(Candidate {
            strategy: result.strategy.clone(),
            solution_length,
            time_seconds: result.metric(&self.keys.time),
            memory_mb: result.metric(&self.keys.memory),
        })
    }

    /// Successful candidates of `level`, best first
    pub fn rank_level(&self, run: &BenchmarkRun, level: &str) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = run
            .cases_for_level(level)
            .filter_map(|case| self.candidate(case))
            .collect();
        candidates.sort_by(Candidate::rank);
        candidates
    }

    pub fn best_candidate(&self, run: &BenchmarkRun, level: &str) -> Option<Candidate> {
        run.cases_for_level(level)
            .filter_map(|case| self.candidate(case))
            .min_by(Candidate::rank)
    }

    /// Compare one level's best result with its baseline
    pub fn compare_level(
        &self,
        run: &BenchmarkRun,
        level: &str,
        baseline: Option<&Baseline>,
    ) -> LevelComparison {
        let best = self.best_candidate(run, level);

        let mut comparison = LevelComparison {
            level: level.to_string(),
            best: best.clone(),
            baseline: baseline.cloned(),
            length: None,
            time: None,
            memory: None,
            verdict: Verdict::NoSuccessfulResult,
        };

        let Some(best) = best else {
            return comparison;
        };
        let Some(baseline) = baseline else {
            comparison.verdict = Verdict::NoBaseline;
            return comparison;
        };

        comparison.length = self.delta(best.solution_length as f64, baseline.solution_length as f64);
        comparison.time = best
            .time_seconds
            .and_then(|time| self.delta(time, baseline.time_seconds));
        comparison.memory = best
            .memory_mb
            .and_then(|memory| self.delta(memory, baseline.memory_mb));

        comparison.verdict = match best.solution_length.cmp(&baseline.solution_length) {
            Ordering::Less => Verdict::Better,
            Ordering::Greater => Verdict::Worse,
            Ordering::Equal => match comparison.time.as_ref().map(|d| d.class) {
                Some(DeltaClass::Better) => Verdict::Better,
                Some(DeltaClass::Worse) => Verdict::Worse,
                Some(DeltaClass::Neutral) => Verdict::Neutral,
                None => Verdict::SameLengthOnly,
            },
        };

        comparison
    }

    /// Compare every level that has results or a baseline, sorted by level
    pub fn compare(
        &self,
        run: &BenchmarkRun,
        baselines: &BTreeMap<String, Baseline>,
    ) -> Vec<LevelComparison> {
        let levels: BTreeSet<&str> = run
            .levels()
            .into_iter()
            .chain(baselines.keys().map(String::as_str))
            .collect();

        levels
            .into_iter()
            .map(|level| self.compare_level(run, level, baselines.get(level)))
            .collect()
    }

    /// Compare `current` against the best results of `previous`
    pub fn compare_runs(&self, current: &BenchmarkRun, previous: &BenchmarkRun) -> Vec<LevelComparison> {
        self.compare(current, &baselines_from_run(previous, &self.keys))
    }

    /// Percent change and classification; `None` without a usable baseline
    pub fn delta(&self, candidate: f64, baseline: f64) -> Option<MetricDelta> {
        if !baseline.is_finite() || !candidate.is_finite() {
            return None;
        }

        let percent = if baseline == 0.0 {
            (candidate == 0.0).then_some(0.0)
        } else {
            Some((candidate - baseline) / baseline * 100.0)
        };

        let class = match percent {
            Some(p) if p.abs() <= self.gray_area_percent => DeltaClass::Neutral,
            Some(p) if p < 0.0 => DeltaClass::Better,
            Some(_) => DeltaClass::Worse,
            None if candidate < baseline => DeltaClass::Better,
            None => DeltaClass::Worse,
        };

        Some(MetricDelta {
            baseline,
            candidate,
            percent,
            class,
        })
    }
}

/// Turn the best result per level of a previous run into baselines.
/// Missing time or memory is stored as NaN and excluded from deltas.
pub fn baselines_from_run(run: &BenchmarkRun, keys: &MetricKeys) -> BTreeMap<String, Baseline> {
    let engine = ComparisonEngine::new(0.0, keys.clone());
    run.levels()
        .into_iter()
        .filter_map(|level| {
            let best = engine.best_candidate(run, level)?;
            Some((
                level.to_string(),
                Baseline {
                    level: level.to_string(),
                    strategy: best.strategy,
                    solution_length: best.solution_length,
                    time_seconds: best.time_seconds.unwrap_or(f64::NAN),
                    memory_mb: best.memory_mb.unwrap_or(f64::NAN),
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BenchmarkTask, CaseStatus};
    use std::path::PathBuf;

    fn engine() -> ComparisonEngine {
        ComparisonEngine::new(5.0, MetricKeys::default())
    }

    fn result(level: &str, strategy: &str, length: f64, time: Option<f64>, mem: Option<f64>) -> CaseResult {
        let task = BenchmarkTask {
            id: BenchmarkTask::make_id(level, strategy),
            level_id: level.to_string(),
            level_path: PathBuf::from(level),
            strategy_spec: strategy.to_string(),
            timeout_seconds: 10.0,
        };
        let mut metrics = BTreeMap::new();
        metrics.insert("solutionlength".to_string(), length);
        if let Some(time) = time {
            metrics.insert("time[s]".to_string(), time);
        }
        if let Some(mem) = mem {
            metrics.insert("alloc[mb]".to_string(), mem);
        }
        CaseResult::success(&task, metrics, Vec::new(), 1.0)
    }

    fn baseline(level: &str, length: u64, time: f64) -> Baseline {
        Baseline {
            level: level.to_string(),
            strategy: "-s bfs".to_string(),
            solution_length: length,
            time_seconds: time,
            memory_mb: 100.0,
        }
    }

    fn run_of(cases: Vec<CaseResult>) -> BenchmarkRun {
        let mut run = BenchmarkRun::new("2025-05-14T10:00:00");
        run.cases = cases;
        run
    }

    #[test]
    fn test_shorter_solution_wins_despite_slower_time() {
        let run = run_of(vec![result("a.lvl", "-s astar", 8.0, Some(3.0), None)]);
        let cmp = engine().compare_level(&run, "a.lvl", Some(&baseline("a.lvl", 10, 2.0)));

        assert_eq!(cmp.verdict, Verdict::Better);
        let length = cmp.length.unwrap();
        assert_eq!(length.percent, Some(-20.0));
        assert_eq!(length.class, DeltaClass::Better);
        assert_eq!(cmp.time.unwrap().class, DeltaClass::Worse);
        assert!(cmp.memory.is_none());
    }

    #[test]
    fn test_small_time_change_is_neutral() {
        let run = run_of(vec![result("a.lvl", "-s astar", 10.0, Some(2.08), None)]);
        let cmp = engine().compare_level(&run, "a.lvl", Some(&baseline("a.lvl", 10, 2.0)));

        assert_eq!(cmp.verdict, Verdict::Neutral);
        let time = cmp.time.unwrap();
        assert!((time.percent.unwrap() - 4.0).abs() < 1e-9);
        assert_eq!(time.class, DeltaClass::Neutral);
    }

    #[test]
    fn test_time_decides_on_length_tie() {
        let faster = run_of(vec![result("a.lvl", "-s astar", 10.0, Some(1.0), None)]);
        let slower = run_of(vec![result("a.lvl", "-s astar", 10.0, Some(3.0), None)]);
        let base = baseline("a.lvl", 10, 2.0);

        assert_eq!(engine().compare_level(&faster, "a.lvl", Some(&base)).verdict, Verdict::Better);
        assert_eq!(engine().compare_level(&slower, "a.lvl", Some(&base)).verdict, Verdict::Worse);
    }

    #[test]
    fn test_length_tie_without_time_is_inconclusive() {
        let run = run_of(vec![result("a.lvl", "-s astar", 10.0, None, None)]);
        let cmp = engine().compare_level(&run, "a.lvl", Some(&baseline("a.lvl", 10, 2.0)));
        assert_eq!(cmp.verdict, Verdict::SameLengthOnly);
    }

    #[test]
    fn test_longer_solution_is_worse_even_within_gray_area() {
        let run = run_of(vec![result("a.lvl", "-s astar", 101.0, Some(0.1), None)]);
        let cmp = engine().compare_level(&run, "a.lvl", Some(&baseline("a.lvl", 100, 2.0)));

        assert_eq!(cmp.verdict, Verdict::Worse);
        assert_eq!(cmp.length.unwrap().class, DeltaClass::Neutral);
    }

    #[test]
    fn test_zero_length_and_failures_are_filtered() {
        let mut failed = result("a.lvl", "-s dfs", 3.0, Some(0.1), None);
        failed.status = CaseStatus::Timeout;
        let run = run_of(vec![failed, result("a.lvl", "-s bfs", 0.0, Some(0.1), None)]);

        let cmp = engine().compare_level(&run, "a.lvl", Some(&baseline("a.lvl", 10, 2.0)));
        assert_eq!(cmp.verdict, Verdict::NoSuccessfulResult);
        assert!(cmp.best.is_none());
        assert!(cmp.length.is_none());
    }

    #[test]
    fn test_missing_baseline() {
        let run = run_of(vec![result("a.lvl", "-s bfs", 4.0, Some(0.1), None)]);
        let cmp = engine().compare_level(&run, "a.lvl", None);
        assert_eq!(cmp.verdict, Verdict::NoBaseline);
        assert_eq!(cmp.best.unwrap().solution_length, 4);
    }

    #[test]
    fn test_missing_metrics_lose_ties() {
        let run = run_of(vec![
            result("a.lvl", "-s a", 5.0, None, Some(1.0)),
            result("a.lvl", "-s b", 5.0, Some(9.0), None),
            result("a.lvl", "-s c", 5.0, Some(9.0), Some(50.0)),
            result("a.lvl", "-s d", 6.0, Some(0.1), Some(1.0)),
        ]);
        let ranked: Vec<String> = engine()
            .rank_level(&run, "a.lvl")
            .into_iter()
            .map(|c| c.strategy)
            .collect();
        assert_eq!(ranked, vec!["-s c", "-s b", "-s a", "-s d"]);
    }

    #[test]
    fn test_comparison_is_order_independent() {
        let cases = vec![
            result("a.lvl", "-s x", 7.0, Some(1.0), Some(10.0)),
            result("a.lvl", "-s y", 7.0, Some(1.0), Some(10.0)),
            result("b.lvl", "-s x", 12.0, Some(2.2), None),
            result("b.lvl", "-s y", 12.0, Some(2.1), None),
        ];
        let mut reversed = cases.clone();
        reversed.reverse();

        let mut baselines = BTreeMap::new();
        baselines.insert("a.lvl".to_string(), baseline("a.lvl", 7, 1.0));
        baselines.insert("b.lvl".to_string(), baseline("b.lvl", 13, 2.0));
        baselines.insert("c.lvl".to_string(), baseline("c.lvl", 3, 1.0));

        let first = engine().compare(&run_of(cases), &baselines);
        let second = engine().compare(&run_of(reversed), &baselines);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].best.as_ref().unwrap().strategy, "-s x");
        assert_eq!(first[1].verdict, Verdict::Better);
        assert_eq!(first[2].verdict, Verdict::NoSuccessfulResult);
    }

    #[test]
    fn test_zero_baseline_delta() {
        let engine = engine();
        assert_eq!(engine.delta(0.0, 0.0).unwrap().percent, Some(0.0));
        let up = engine.delta(1.5, 0.0).unwrap();
        assert_eq!(up.percent, None);
        assert_eq!(up.class, DeltaClass::Worse);
        assert!(engine.delta(1.0, f64::NAN).is_none());
    }

    #[test]
    fn test_compare_runs_against_previous() {
        let previous = run_of(vec![
            result("a.lvl", "-s bfs", 10.0, Some(2.0), Some(30.0)),
            result("a.lvl", "-s dfs", 14.0, Some(0.5), Some(5.0)),
            result("b.lvl", "-s bfs", 9.0, None, None),
        ]);
        let current = run_of(vec![
            result("a.lvl", "-s astar", 10.0, Some(1.0), Some(20.0)),
            result("b.lvl", "-s astar", 9.0, Some(1.0), None),
        ]);

        let baselines = baselines_from_run(&previous, &MetricKeys::default());
        assert_eq!(baselines["a.lvl"].strategy, "-s bfs");
        assert!(baselines["b.lvl"].time_seconds.is_nan());

        let comparisons = engine().compare_runs(&current, &previous);
        assert_eq!(comparisons[0].verdict, Verdict::Better);
        assert_eq!(comparisons[1].verdict, Verdict::SameLengthOnly);
    }
}
