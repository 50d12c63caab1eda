//! Benchmark worker pool
//!
//! A fixed set of worker tasks pulls from a shared task queue and pushes
//! outcomes into a completion channel. A coordinator sits behind the
//! completion channel: it drops duplicates, reports the shutdown once, and
//! after the workers are gone synthesizes a result for any task that never
//! produced one. Consumers therefore see exactly one result per task, in
//! completion order.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bench::runner::TaskRunner;
use crate::models::{BenchmarkTask, CaseResult, CaseStatus};
use crate::{BenchError, Result};

/// Progress notifications for renderers
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEvent {
    /// A worker launched the task
    Dispatched { worker: usize, task_id: String },
    /// A task reached its terminal status; `worker` is `None` for
    /// results synthesized by the coordinator
    Finished {
        worker: Option<usize>,
        task_id: String,
        status: CaseStatus,
        duration_seconds: Option<f64>,
    },
    /// The shutdown request reached the pool
    ShutdownObserved { completed: usize, total: usize },
}

type EventSender = Option<mpsc::UnboundedSender<PoolEvent>>;
type TaskQueue = Arc<Mutex<mpsc::UnboundedReceiver<BenchmarkTask>>>;

fn emit(events: &EventSender, event: PoolEvent) {
    if let Some(tx) = events {
        // A renderer that went away must not stall the run
        let _ = tx.send(event);
    }
}

fn finished_event(worker: Option<usize>, result: &CaseResult) -> PoolEvent {
    PoolEvent::Finished {
        worker,
        task_id: result.task_id(),
        status: result.status,
        duration_seconds: result.duration_seconds,
    }
}

/// Bounded pool running tasks as isolated client processes
pub struct WorkerPool {
    runner: Arc<TaskRunner>,
    workers: usize,
    events: EventSender,
}

impl WorkerPool {
    /// Create a pool of `workers` (at least one)
    pub fn new(runner: TaskRunner, workers: usize) -> Self {
        Self {
            runner: Arc::new(runner),
            workers: workers.max(1),
            events: None,
        }
    }

    /// Send [`PoolEvent`]s to `tx`
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<PoolEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Start executing `tasks`; results arrive on the returned handle
    pub fn start(&self, tasks: Vec<BenchmarkTask>, token: CancellationToken) -> PoolRun {
        let total = tasks.len();
        let worker_count = self.workers.min(total.max(1));

        let (task_tx, task_rx) = mpsc::unbounded_channel();
        for task in &tasks {
            if task_tx.send(task.clone()).is_err() {
                // Unreachable while we hold the receiver; reconciliation covers it
                warn!(task_id = %task.id, "task could not be queued");
            }
        }
        drop(task_tx);
        let queue: TaskQueue = Arc::new(Mutex::new(task_rx));

        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();

        info!(tasks = total, workers = worker_count, "starting worker pool");

        let handles: Vec<JoinHandle<()>> = (0..worker_count)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    self.runner.clone(),
                    queue.clone(),
                    token.clone(),
                    done_tx.clone(),
                    self.events.clone(),
                ))
            })
            .collect();
        drop(done_tx);

        let coordinator = tokio::spawn(coordinate(
            tasks,
            handles,
            done_rx,
            result_tx,
            token,
            self.events.clone(),
        ));

        PoolRun {
            results: result_rx,
            coordinator,
            total,
        }
    }

    /// Run all tasks and collect the results in completion order
    pub async fn run_all(
        &self,
        tasks: Vec<BenchmarkTask>,
        token: CancellationToken,
    ) -> Result<Vec<CaseResult>> {
        let mut run = self.start(tasks, token);
        let mut results = Vec::with_capacity(run.total());
        while let Some(result) = run.next_result().await {
            results.push(result);
        }
        run.join().await?;
        Ok(results)
    }
}

/// Handle on a started pool
pub struct PoolRun {
    results: mpsc::UnboundedReceiver<CaseResult>,
    coordinator: JoinHandle<()>,
    total: usize,
}

impl PoolRun {
    /// Number of tasks submitted
    pub fn total(&self) -> usize {
        self.total
    }

    /// Next completed result; `None` once every task has one
    pub async fn next_result(&mut self) -> Option<CaseResult> {
        self.results.recv().await
    }

    /// Wait for the pool to wind down
    pub async fn join(self) -> Result<()> {
        self.coordinator
            .await
            .map_err(|e| BenchError::Worker(format!("pool coordinator failed: {}", e)))
    }
}

async fn worker_loop(
    id: usize,
    runner: Arc<TaskRunner>,
    queue: TaskQueue,
    token: CancellationToken,
    done_tx: mpsc::UnboundedSender<(Option<usize>, CaseResult)>,
    events: EventSender,
) {
    debug!(worker = id, "worker started");

    loop {
        let next = {
            let mut queue = queue.lock().await;
            queue.recv().await
        };
        let Some(task) = next else {
            break;
        };

        if token.is_cancelled() {
            if done_tx
                .send((Some(id), CaseResult::cancelled_before_dispatch(&task)))
                .is_err()
            {
                break;
            }
            continue;
        }

        emit(
            &events,
            PoolEvent::Dispatched {
                worker: id,
                task_id: task.id.clone(),
            },
        );

        // Run in its own task so a panic stays confined to this result
        let job = {
            let runner = runner.clone();
            let task = task.clone();
            let token = token.clone();
            tokio::spawn(async move { runner.run(&task, &token).await })
        };

        let result = match job.await {
            Ok(result) => result,
            Err(e) => {
                warn!(worker = id, task_id = %task.id, error = %e, "task panicked");
                CaseResult::failure(
                    &task,
                    CaseStatus::UnexpectedError,
                    format!("task execution failed: {}", e),
                    None,
                )
            }
        };

        if done_tx.send((Some(id), result)).is_err() {
            break;
        }
    }

    debug!(worker = id, "worker stopped");
}

async fn coordinate(
    tasks: Vec<BenchmarkTask>,
    handles: Vec<JoinHandle<()>>,
    mut done_rx: mpsc::UnboundedReceiver<(Option<usize>, CaseResult)>,
    result_tx: mpsc::UnboundedSender<CaseResult>,
    token: CancellationToken,
    events: EventSender,
) {
    let total = tasks.len();
    let mut seen: HashSet<String> = HashSet::with_capacity(total);
    let mut shutdown_reported = false;

    let deliver = |worker: Option<usize>, result: CaseResult, seen: &mut HashSet<String>| {
        if !seen.insert(result.task_id()) {
            warn!(task_id = %result.task_id(), "duplicate result dropped");
            return;
        }
        emit(&events, finished_event(worker, &result));
        // Receiver gone means nobody wants results anymore; keep draining
        let _ = result_tx.send(result);
    };

    loop {
        tokio::select! {
            next = done_rx.recv() => match next {
                Some((worker, result)) => deliver(worker, result, &mut seen),
                None => break,
            },
            _ = token.cancelled(), if !shutdown_reported => {
                shutdown_reported = true;
                info!(completed = seen.len(), total, "shutdown observed by pool");
                emit(&events, PoolEvent::ShutdownObserved { completed: seen.len(), total });
            }
        }
    }

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "worker exited abnormally");
        }
    }

    for task in &tasks {
        if seen.contains(&task.id) {
            continue;
        }
        let result = if token.is_cancelled() {
            CaseResult::cancelled_before_dispatch(task)
        } else {
            CaseResult::failure(
                task,
                CaseStatus::UnexpectedError,
                "task produced no result",
                None,
            )
        };
        warn!(task_id = %task.id, status = %result.status, "reconciled missing result");
        deliver(None, result, &mut seen);
    }

    debug!(results = seen.len(), "worker pool finished");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::bench::parser::OutputParser;
    use crate::bench::runner::RunnerSettings;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn tasks_for(dir: &Path, script: &Path, count: usize) -> Vec<BenchmarkTask> {
        fs::write(dir.join("level.lvl"), "level\n").unwrap();
        (0..count)
            .map(|i| {
                let strategy = format!("{} {}", script.display(), i);
                BenchmarkTask {
                    id: BenchmarkTask::make_id("level.lvl", &strategy),
                    level_id: "level.lvl".to_string(),
                    level_path: dir.join("level.lvl"),
                    strategy_spec: strategy,
                    timeout_seconds: 10.0,
                }
            })
            .collect()
    }

    fn pool(workers: usize) -> WorkerPool {
        WorkerPool::new(
            TaskRunner::new(RunnerSettings::new("/bin/sh"), OutputParser::default()),
            workers,
        )
    }

    #[tokio::test]
    async fn test_every_task_gets_one_result() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("client.sh");
        fs::write(&script, "echo \"#n\"\necho \"#$1\"\n").unwrap();
        let tasks = tasks_for(dir.path(), &script, 12);

        let results = pool(4)
            .run_all(tasks.clone(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(results.len(), tasks.len());
        let ids: HashSet<String> = results.iter().map(|r| r.task_id()).collect();
        assert_eq!(ids.len(), tasks.len());
        assert!(results.iter().all(|r| r.status == CaseStatus::Success));
    }

    #[tokio::test]
    async fn test_cancel_before_start_cancels_everything() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("client.sh");
        fs::write(&script, "echo \"#n\"\necho \"#1\"\n").unwrap();
        let tasks = tasks_for(dir.path(), &script, 5);

        let token = CancellationToken::new();
        token.cancel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let results = pool(2).with_events(tx).run_all(tasks, token).await.unwrap();

        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.status == CaseStatus::Cancelled));

        let mut dispatched = 0;
        let mut finished = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                PoolEvent::Dispatched { .. } => dispatched += 1,
                PoolEvent::Finished { .. } => finished += 1,
                PoolEvent::ShutdownObserved { .. } => {}
            }
        }
        assert_eq!(dispatched, 0);
        assert_eq!(finished, 5);
    }

    #[tokio::test]
    async fn test_empty_task_list() {
        let results = pool(3)
            .run_all(Vec::new(), CancellationToken::new())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_worker_count_minimum() {
        assert_eq!(pool(0).worker_count(), 1);
        assert_eq!(pool(8).worker_count(), 8);
    }
}
