//! Task planning
//!
//! Expands the (level x strategy) cross product of the benchmark document
//! into a flat, deduplicated task list. Unusable descriptors are reported
//! and skipped; they never abort the run.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::config::{BenchmarkConfig, CaseConfig};
use crate::models::{Baseline, BenchmarkTask};

/// Why a descriptor produced no tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingInput,
    LevelNotFound(PathBuf),
    NoStrategies,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingInput => write!(f, "case has no input level"),
            SkipReason::LevelNotFound(path) => write!(f, "level file not found: {}", path.display()),
            SkipReason::NoStrategies => write!(f, "case has no strategies"),
        }
    }
}

/// A descriptor that was left out of the plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedCase {
    pub input: Option<String>,
    pub reason: SkipReason,
}

/// Planned tasks plus everything that was skipped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPlan {
    pub tasks: Vec<BenchmarkTask>,
    pub skipped: Vec<SkippedCase>,
}

impl TaskPlan {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn level_count(&self) -> usize {
        let levels: BTreeSet<&str> = self.tasks.iter().map(|t| t.level_id.as_str()).collect();
        levels.len()
    }
}

/// Accumulated per-level state while walking the descriptors
struct LevelEntry {
    level_id: String,
    path: PathBuf,
    strategies: BTreeSet<String>,
    timeout_seconds: Option<f64>,
}

/// Builds the task list for a run
#[derive(Debug, Clone)]
pub struct TaskPlanner {
    levels_dir: PathBuf,
    default_timeout: f64,
}

impl TaskPlanner {
    pub fn new(levels_dir: impl Into<PathBuf>, default_timeout: f64) -> Self {
        Self {
            levels_dir: levels_dir.into(),
            default_timeout,
        }
    }

    pub fn from_config(config: &BenchmarkConfig) -> Self {
        Self::new(config.levels_dir.clone(), config.timeout_s)
    }

    /// Expand `cases` into tasks. Same inputs always give the same plan.
    pub fn plan(&self, cases: &[CaseConfig]) -> TaskPlan {
        let mut skipped = Vec::new();
        let mut entries: Vec<LevelEntry> = Vec::new();
        let mut index: BTreeMap<String, usize> = BTreeMap::new();

        for case in cases {
            let Some(input) = case.input.as_deref().filter(|i| !i.trim().is_empty()) else {
                Self::skip(&mut skipped, None, SkipReason::MissingInput);
                continue;
            };

            let strategies: Vec<&String> = case
                .strategies
                .iter()
                .filter(|s| !s.trim().is_empty())
                .collect();
            if strategies.is_empty() {
                Self::skip(&mut skipped, Some(input), SkipReason::NoStrategies);
                continue;
            }

            let path = self.levels_dir.join(input);
            if !path.is_file() {
                Self::skip(&mut skipped, Some(input), SkipReason::LevelNotFound(path));
                continue;
            }

            let slot = *index.entry(input.to_string()).or_insert_with(|| {
                entries.push(LevelEntry {
                    level_id: input.to_string(),
                    path,
                    strategies: BTreeSet::new(),
                    timeout_seconds: None,
                });
                entries.len() - 1
            });

            let entry = &mut entries[slot];
            entry
                .strategies
                .extend(strategies.into_iter().map(|s| s.trim().to_string()));
            if entry.timeout_seconds.is_none() {
                entry.timeout_seconds = case.timeout_s;
            }
        }

        let tasks: Vec<BenchmarkTask> = entries
            .iter()
            .flat_map(|entry| {
                let timeout = entry.timeout_seconds.unwrap_or(self.default_timeout);
                entry.strategies.iter().map(move |strategy| BenchmarkTask {
                    id: BenchmarkTask::make_id(&entry.level_id, strategy),
                    level_id: entry.level_id.clone(),
                    level_path: entry.path.clone(),
                    strategy_spec: strategy.clone(),
                    timeout_seconds: timeout,
                })
            })
            .collect();

        debug!(
            tasks = tasks.len(),
            levels = entries.len(),
            skipped = skipped.len(),
            "task plan built"
        );

        TaskPlan { tasks, skipped }
    }

    fn skip(skipped: &mut Vec<SkippedCase>, input: Option<&str>, reason: SkipReason) {
        warn!(input = input.unwrap_or("<none>"), %reason, "skipping case");
        skipped.push(SkippedCase {
            input: input.map(str::to_string),
            reason,
        });
    }
}

/// Historical baselines per level; the first one declared for a level wins
pub fn collect_baselines(cases: &[CaseConfig]) -> BTreeMap<String, Baseline> {
    let mut baselines = BTreeMap::new();
    for case in cases {
        if let (Some(input), Some(best)) = (&case.input, &case.best_found_solution_metrics) {
            baselines
                .entry(input.clone())
                .or_insert_with(|| best.to_baseline(input));
        }
    }
    baselines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BaselineConfig;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    fn levels_dir(names: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in names {
            fs::write(dir.path().join(name), "#domain\nhospital\n").unwrap();
        }
        dir
    }

    fn case(input: Option<&str>, strategies: &[&str]) -> CaseConfig {
        CaseConfig {
            input: input.map(str::to_string),
            strategies: strategies.iter().map(|s| s.to_string()).collect(),
            ..CaseConfig::default()
        }
    }

    #[test]
    fn test_cross_product_and_ids() {
        let dir = levels_dir(&["a.lvl", "b.lvl"]);
        let planner = TaskPlanner::new(dir.path(), 60.0);
        let plan = planner.plan(&[
            case(Some("a.lvl"), &["-s bfs", "-s astar"]),
            case(Some("b.lvl"), &["-s greedy"]),
        ]);

        assert!(plan.skipped.is_empty());
        let ids: Vec<&str> = plan.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a.lvl::-s astar", "a.lvl::-s bfs", "b.lvl::-s greedy"]);
        assert_eq!(plan.tasks[0].level_path, dir.path().join("a.lvl"));
        assert!(plan.tasks.iter().all(|t| t.timeout_seconds == 60.0));
        assert_eq!(plan.level_count(), 2);
    }

    #[test]
    fn test_deduplicates_across_descriptors() {
        let dir = levels_dir(&["a.lvl"]);
        let planner = TaskPlanner::new(dir.path(), 60.0);
        let plan = planner.plan(&[
            case(Some("a.lvl"), &["-s bfs", "-s dfs", "-s bfs"]),
            case(Some("a.lvl"), &["-s dfs", "-s astar"]),
        ]);

        let pairs: HashSet<(String, String)> = plan
            .tasks
            .iter()
            .map(|t| (t.level_id.clone(), t.strategy_spec.clone()))
            .collect();
        assert_eq!(pairs.len(), plan.tasks.len());
        assert_eq!(plan.tasks.len(), 3);
    }

    #[test]
    fn test_skips_are_reported_not_fatal() {
        let dir = levels_dir(&["ok.lvl"]);
        let planner = TaskPlanner::new(dir.path(), 60.0);
        let plan = planner.plan(&[
            case(None, &["-s bfs"]),
            case(Some("missing.lvl"), &["-s bfs"]),
            case(Some("ok.lvl"), &[]),
            case(Some("ok.lvl"), &["-s bfs"]),
        ]);

        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.skipped.len(), 3);
        assert_eq!(plan.skipped[0].reason, SkipReason::MissingInput);
        assert_eq!(
            plan.skipped[1].reason,
            SkipReason::LevelNotFound(dir.path().join("missing.lvl"))
        );
        assert_eq!(plan.skipped[2].reason, SkipReason::NoStrategies);

        let nothing = planner.plan(&[case(Some("missing.lvl"), &["-s bfs"])]);
        assert!(nothing.is_empty());
        assert_eq!(nothing.skipped.len(), 1);
    }

    #[test]
    fn test_plan_is_deterministic_and_pure() {
        let dir = levels_dir(&["z.lvl", "a.lvl"]);
        let planner = TaskPlanner::new(dir.path(), 60.0);
        let cases = vec![
            case(Some("z.lvl"), &["-s c", "-s a"]),
            case(Some("a.lvl"), &["-s b"]),
        ];
        let before = format!("{:?}", cases);

        let first = planner.plan(&cases);
        let second = planner.plan(&cases);
        assert_eq!(first, second);
        assert_eq!(format!("{:?}", cases), before);
        // Levels keep declaration order
        assert_eq!(first.tasks[0].level_id, "z.lvl");
        assert_eq!(first.tasks[0].strategy_spec, "-s a");
    }

    #[test]
    fn test_per_level_timeout_override() {
        let dir = levels_dir(&["a.lvl", "b.lvl"]);
        let planner = TaskPlanner::new(dir.path(), 60.0);
        let mut fast = case(Some("a.lvl"), &["-s bfs"]);
        fast.timeout_s = Some(2.5);
        let plan = planner.plan(&[fast, case(Some("b.lvl"), &["-s bfs"])]);

        assert_eq!(plan.tasks[0].timeout_seconds, 2.5);
        assert_eq!(plan.tasks[1].timeout_seconds, 60.0);
    }

    #[test]
    fn test_collect_baselines_first_wins() {
        let mut first = case(Some("a.lvl"), &["-s bfs"]);
        first.best_found_solution_metrics = Some(BaselineConfig {
            strategy: "-s bfs".into(),
            length: 10,
            time_s: 2.0,
            memory_mb: 50.0,
        });
        let mut second = case(Some("a.lvl"), &["-s dfs"]);
        second.best_found_solution_metrics = Some(BaselineConfig {
            strategy: "-s dfs".into(),
            length: 30,
            time_s: 1.0,
            memory_mb: 10.0,
        });

        let baselines = collect_baselines(&[first, second, case(Some("b.lvl"), &["-s bfs"])]);
        assert_eq!(baselines.len(), 1);
        assert_eq!(baselines["a.lvl"].solution_length, 10);
        assert_eq!(baselines["a.lvl"].strategy, "-s bfs");
    }
}
