//! Results persistence module
//!
//! Writes one file per run, named `<prefix>_<YYYYMMDD_HHMMSS>.json`, and
//! finds the most recent run file in a directory for later comparison.

use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::models::BenchmarkRun;
use crate::{BenchError, Result, RESULT_TIMESTAMP_FORMAT};

/// Build the file name of a run started at `when`
pub fn run_file_name(prefix: &str, when: &NaiveDateTime) -> String {
    format!("{}_{}.json", prefix, when.format(RESULT_TIMESTAMP_FORMAT))
}

/// Extract the embedded timestamp from a run file name
pub fn parse_run_file_name(prefix: &str, file_name: &str) -> Option<NaiveDateTime> {
    let stamp = file_name
        .strip_prefix(prefix)?
        .strip_prefix('_')?
        .strip_suffix(".json")?;
    NaiveDateTime::parse_from_str(stamp, RESULT_TIMESTAMP_FORMAT).ok()
}

/// Serialize `run` into `output_dir`, returning the written path
pub fn save_run(
    run: &BenchmarkRun,
    output_dir: &Path,
    prefix: &str,
    when: &NaiveDateTime,
) -> Result<PathBuf> {
    fs::create_dir_all(output_dir).map_err(|e| {
        BenchError::Persistence(format!(
            "Failed to create results directory {}: {}",
            output_dir.display(),
            e
        ))
    })?;

    let path = output_dir.join(run_file_name(prefix, when));
    let content = serde_json::to_string_pretty(run)?;

    fs::write(&path, content).map_err(|e| {
        BenchError::Persistence(format!(
            "Failed to write results file {}: {}",
            path.display(),
            e
        ))
    })?;

    info!(path = %path.display(), cases = run.cases.len(), "benchmark results saved");
    Ok(path)
}

/// Load a previously written run file
pub fn load_run(path: &Path) -> Result<BenchmarkRun> {
    let content = fs::read_to_string(path).map_err(|e| {
        BenchError::Persistence(format!(
            "Failed to read results file {}: {}",
            path.display(),
            e
        ))
    })?;

    serde_json::from_str(&content).map_err(|e| {
        BenchError::Persistence(format!(
            "Failed to parse results file {}: {}",
            path.display(),
            e
        ))
    })
}

/// Newest run file in `dir` by embedded timestamp
pub fn find_latest_run(dir: &Path, prefix: &str) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Err(BenchError::Persistence(format!(
            "Results directory not found: {}",
            dir.display()
        )));
    }

    let mut latest: Option<(NaiveDateTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !name.starts_with(prefix) || !name.ends_with(".json") {
            continue;
        }

        match parse_run_file_name(prefix, name) {
            Some(stamp) => {
                let newer = latest.as_ref().map_or(true, |(best, _)| stamp > *best);
                if newer {
                    latest = Some((stamp, entry.path()));
                }
            }
            None => warn!(file = %name, "run file with invalid timestamp skipped"),
        }
    }

    Ok(latest.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BenchmarkTask, CaseResult, CaseStatus};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn stamp(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, 14)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn create_test_run() -> BenchmarkRun {
        let task = BenchmarkTask {
            id: BenchmarkTask::make_id("SAD1.lvl", "-s bfs"),
            level_id: "SAD1.lvl".to_string(),
            level_path: PathBuf::from("levels/SAD1.lvl"),
            strategy_spec: "-s bfs".to_string(),
            timeout_seconds: 10.0,
        };
        let mut metrics = BTreeMap::new();
        metrics.insert("time[s]".to_string(), 0.25);
        let mut run = BenchmarkRun::new("2025-05-14T10:00:00");
        run.cases.push(CaseResult::success(&task, metrics, vec!["Move(E)".into()], 0.3));
        run.cases
            .push(CaseResult::failure(&task, CaseStatus::Timeout, "timed out", Some(10.0)));
        run
    }

    #[test]
    fn test_file_name_round_trip() {
        let name = run_file_name("run", &stamp(9, 5, 7));
        assert_eq!(name, "run_20250514_090507.json");
        assert_eq!(parse_run_file_name("run", &name), Some(stamp(9, 5, 7)));
        assert_eq!(parse_run_file_name("run", "run_latest.json"), None);
        assert_eq!(parse_run_file_name("hyperfine_run", &name), None);
    }

    #[test]
    fn test_save_and_load_run() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("results");
        let run = create_test_run();

        let path = save_run(&run, &out, "run", &stamp(10, 0, 0)).unwrap();
        assert!(path.ends_with("run_20250514_100000.json"));

        let loaded = load_run(&path).unwrap();
        assert_eq!(loaded, run);
    }

    #[test]
    fn test_load_corrupt_run() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("run_20250514_100000.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_run(&path), Err(BenchError::Persistence(_))));
    }

    #[test]
    fn test_find_latest_run() {
        let temp_dir = TempDir::new().unwrap();
        let run = create_test_run();
        save_run(&run, temp_dir.path(), "run", &stamp(8, 0, 0)).unwrap();
        save_run(&run, temp_dir.path(), "run", &stamp(12, 30, 0)).unwrap();
        save_run(&run, temp_dir.path(), "run", &stamp(11, 0, 0)).unwrap();
        fs::write(temp_dir.path().join("run_garbage.json"), "{}").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "x").unwrap();

        let latest = find_latest_run(temp_dir.path(), "run").unwrap().unwrap();
        assert!(latest.ends_with("run_20250514_123000.json"));

        let empty = TempDir::new().unwrap();
        assert!(find_latest_run(empty.path(), "run").unwrap().is_none());
        assert!(find_latest_run(&empty.path().join("missing"), "run").is_err());
    }
}
