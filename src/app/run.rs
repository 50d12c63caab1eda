//! Benchmark run orchestration
//!
//! Drives one invocation end to end: validate, plan, execute through the
//! worker pool while watching for a shutdown request, aggregate, persist,
//! compare. This is the single writer of the run's results.

use chrono::Local;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::keys::TerminalKeys;
use crate::app::progress::ProgressRenderer;
use crate::bench::aggregate::{ResultAggregator, RunSummary};
use crate::bench::cancel::{spawn_ctrl_c_watcher, spawn_key_watcher, CancellationController};
use crate::bench::compare::{baselines_from_run, ComparisonEngine, LevelComparison};
use crate::bench::planner::{collect_baselines, SkippedCase, TaskPlanner};
use crate::bench::runner::TaskRunner;
use crate::bench::worker::WorkerPool;
use crate::config::persistence::{load_run, save_run};
use crate::config::BenchmarkConfig;
use crate::models::{Baseline, BenchmarkRun};
use crate::Result;

const KEY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Presentation switches for one run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Watch the terminal for the stop key
    pub interactive_keys: bool,
    /// Draw a progress bar
    pub show_progress: bool,
    /// Compare against this previous run instead of the configured baselines
    pub against: Option<PathBuf>,
    /// Listen for Ctrl-C
    pub handle_interrupt: bool,
}

/// Everything a finished invocation produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run: BenchmarkRun,
    pub summary: RunSummary,
    pub skipped: Vec<SkippedCase>,
    pub comparisons: Vec<LevelComparison>,
    pub saved_to: PathBuf,
    pub shutdown_requested: bool,
    pub elapsed: Duration,
}

/// Execute the benchmark described by `config`.
///
/// Errors returned here are fatal startup or persistence problems; task
/// failures are part of the outcome.
pub async fn execute_run(
    config: &BenchmarkConfig,
    options: &RunOptions,
    controller: CancellationController,
) -> Result<RunOutcome> {
    config.validate()?;
    config.ensure_output_dir()?;

    let baselines = load_baselines(config, options)?;
    let plan = TaskPlanner::from_config(config).plan(&config.cases);
    if plan.is_empty() {
        warn!("no runnable tasks; the run file will be empty");
    }
    let runner = TaskRunner::from_config(config)?;
    let started_at = Local::now();
    let started = Instant::now();

    info!(
        tasks = plan.tasks.len(),
        levels = plan.level_count(),
        skipped = plan.skipped.len(),
        workers = config.worker_count(),
        "benchmark run starting"
    );

    let stop_watchers = CancellationToken::new();
    let mut watchers = Vec::new();
    if options.handle_interrupt {
        watchers.push(spawn_ctrl_c_watcher(controller.clone(), stop_watchers.clone()));
    }
    if options.interactive_keys {
        match TerminalKeys::open() {
            Ok(Some(keys)) => {
                eprintln!("Press 'q' to stop after the running tasks.");
                watchers.push(spawn_key_watcher(
                    keys,
                    controller.clone(),
                    stop_watchers.clone(),
                    KEY_POLL_INTERVAL,
                ));
            }
            Ok(None) => debug!("stdin is not a terminal; stop key disabled"),
            Err(e) => warn!(error = %e, "could not set up the terminal; stop key disabled"),
        }
    }

    let mut pool = WorkerPool::new(runner, config.worker_count());
    let renderer = if options.show_progress {
        let (tx, rx) = mpsc::unbounded_channel();
        pool = pool.with_events(tx);
        Some(ProgressRenderer::new(plan.tasks.len()).spawn(rx))
    } else {
        None
    };

    let mut aggregator = ResultAggregator::new(started_at.format("%Y-%m-%dT%H:%M:%S").to_string());
    let mut pool_run = pool.start(plan.tasks.clone(), controller.token());
    // Workers and coordinator hold their own event senders from here on
    drop(pool);

    while let Some(result) = pool_run.next_result().await {
        debug!(task_id = %result.task_id(), "{}", result.summary());
        aggregator.record(result);
    }
    pool_run.join().await?;
    debug!(
        recorded = aggregator.len(),
        planned = plan.tasks.len(),
        succeeded = aggregator.summary().succeeded,
        "worker pool drained"
    );

    let shutdown_requested = controller.is_requested();
    stop_watchers.cancel();
    for watcher in watchers {
        if let Err(e) = watcher.await {
            warn!(error = %e, "shutdown watcher failed");
        }
    }
    if let Some(renderer) = renderer {
        if let Err(e) = renderer.await {
            warn!(error = %e, "progress renderer failed");
        }
    }

    let (run, summary) = aggregator.finish();
    let saved_to = save_run(
        &run,
        &config.output_dir,
        &config.result_prefix,
        &started_at.naive_local(),
    )?;

    let comparisons = ComparisonEngine::from_config(config).compare(&run, &baselines);

    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        cancelled = summary.cancelled,
        shutdown_requested,
        "benchmark run finished"
    );

    Ok(RunOutcome {
        run,
        summary,
        skipped: plan.skipped,
        comparisons,
        saved_to,
        shutdown_requested,
        elapsed: started.elapsed(),
    })
}

/// Baselines from a previous run file when asked for, else from the config
fn load_baselines(
    config: &BenchmarkConfig,
    options: &RunOptions,
) -> Result<BTreeMap<String, Baseline>> {
    match &options.against {
        Some(path) => {
            let previous = load_run(path)?;
            debug!(path = %path.display(), "comparing against previous run");
            Ok(baselines_from_run(&previous, &config.metric_keys))
        }
        None => Ok(collect_baselines(&config.cases)),
    }
}
