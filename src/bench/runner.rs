//! Single task execution
//!
//! Launches the search client for one task, enforces the task deadline,
//! reacts to shutdown according to the cancel policy, and classifies the
//! outcome into a terminal [`CaseStatus`].

use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bench::parser::OutputParser;
use crate::config::{BenchmarkConfig, CancelPolicy, InputMode};
use crate::models::{BenchmarkTask, CaseResult, CaseStatus};
use crate::{BenchError, Result};

/// How long pipe readers may keep going once the process is gone
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(2);

/// Characters of stdout quoted in parse error messages
const STDOUT_SNIPPET_CHARS: usize = 200;

/// Process-level settings shared by every task of a run
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub executable: PathBuf,
    pub input_mode: InputMode,
    pub cancel_policy: CancelPolicy,
    pub termination_grace: Duration,
}

impl RunnerSettings {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            input_mode: InputMode::Stdin,
            cancel_policy: CancelPolicy::Terminate,
            termination_grace: Duration::from_millis(2000),
        }
    }

    pub fn from_config(config: &BenchmarkConfig) -> Result<Self> {
        let executable = config.executable.clone().ok_or_else(|| {
            BenchError::Config("No executable configured".to_string())
        })?;

        Ok(Self {
            executable,
            input_mode: config.input_mode.clone(),
            cancel_policy: config.cancel_policy,
            termination_grace: config.termination_grace(),
        })
    }
}

/// What ended the wait on the child
enum Outcome {
    Exited(io::Result<ExitStatus>),
    TimedOut,
    Shutdown,
}

/// Runs one task to a terminal result
#[derive(Debug, Clone)]
pub struct TaskRunner {
    settings: RunnerSettings,
    parser: OutputParser,
}

impl TaskRunner {
    pub fn new(settings: RunnerSettings, parser: OutputParser) -> Self {
        Self { settings, parser }
    }

    pub fn from_config(config: &BenchmarkConfig) -> Result<Self> {
        Ok(Self::new(
            RunnerSettings::from_config(config)?,
            OutputParser::from_config(config),
        ))
    }

    /// Execute `task`; never fails, every problem becomes a status
    pub async fn run(&self, task: &BenchmarkTask, token: &CancellationToken) -> CaseResult {
        let mut result = self.execute(task, token).await;

        if self.settings.cancel_policy == CancelPolicy::Drain
            && token.is_cancelled()
            && result.status != CaseStatus::Cancelled
        {
            result.completed_during_shutdown = true;
        }

        debug!(task_id = %task.id, status = %result.status, "task finished");
        result
    }

    async fn execute(&self, task: &BenchmarkTask, token: &CancellationToken) -> CaseResult {
        if !task.level_path.is_file() {
            return CaseResult::failure(
                task,
                CaseStatus::FileNotFound,
                format!("level file not found: {}", task.level_path.display()),
                None,
            );
        }

        let mut command = match self.build_command(task) {
            Ok(command) => command,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return CaseResult::failure(
                    task,
                    CaseStatus::FileNotFound,
                    format!("level file not found: {}", task.level_path.display()),
                    None,
                );
            }
            Err(e) => {
                return CaseResult::failure(
                    task,
                    CaseStatus::OsFailure,
                    format!("failed to open level {}: {}", task.level_path.display(), e),
                    None,
                );
            }
        };

        let start = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return CaseResult::failure(
                    task,
                    CaseStatus::OsFailure,
                    format!("failed to launch {}: {}", self.settings.executable.display(), e),
                    Some(start.elapsed().as_secs_f64()),
                );
            }
        };
        // Child::id is gone once the child is reaped, the group outlives it
        let pid = child.id();
        debug!(task_id = %task.id, pid = ?pid, "process started");

        let capture_stop = CancellationToken::new();
        let stdout_reader = spawn_reader(child.stdout.take(), capture_stop.clone());
        let stderr_reader = spawn_reader(child.stderr.take(), capture_stop.clone());

        let deadline = Duration::from_secs_f64(task.timeout_seconds);
        let terminate_on_shutdown = self.settings.cancel_policy == CancelPolicy::Terminate;

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = tokio::time::sleep(deadline) => Outcome::TimedOut,
            _ = token.cancelled(), if terminate_on_shutdown => Outcome::Shutdown,
        };

        match outcome {
            Outcome::TimedOut => {
                kill_tree(&mut child, pid).await;
                stdout_reader.abort();
                stderr_reader.abort();
                let elapsed = start.elapsed().as_secs_f64();
                CaseResult::failure(
                    task,
                    CaseStatus::Timeout,
                    format!(
                        "timed out after {:.2}s (limit {:.2}s)",
                        elapsed, task.timeout_seconds
                    ),
                    Some(elapsed),
                )
            }
            Outcome::Shutdown => {
                self.terminate(&mut child, pid).await;
                stdout_reader.abort();
                stderr_reader.abort();
                let elapsed = start.elapsed().as_secs_f64();
                CaseResult::failure(
                    task,
                    CaseStatus::Cancelled,
                    format!("terminated during shutdown after {:.2}s", elapsed),
                    Some(elapsed),
                )
            }
            Outcome::Exited(Err(e)) => {
                kill_tree(&mut child, pid).await;
                capture_stop.cancel();
                CaseResult::failure(
                    task,
                    CaseStatus::UnexpectedError,
                    format!("failed to wait for process: {}", e),
                    Some(start.elapsed().as_secs_f64()),
                )
            }
            Outcome::Exited(Ok(status)) => {
                let elapsed = start.elapsed().as_secs_f64();
                // Leftover background processes would hold the pipes open
                signal_group(pid, TerminationSignal::Kill);
                let (stdout, stderr) =
                    collect(stdout_reader, stderr_reader, &capture_stop, &task.id).await;
                self.classify(task, status, &stdout, &stderr, elapsed)
            }
        }
    }

    fn build_command(&self, task: &BenchmarkTask) -> io::Result<Command> {
        let mut command = Command::new(&self.settings.executable);
        command.args(task.strategy_args());

        match &self.settings.input_mode {
            InputMode::Stdin => {
                let level = std::fs::File::open(&task.level_path)?;
                command.stdin(Stdio::from(level));
            }
            InputMode::Argument { flag } => {
                if let Some(flag) = flag {
                    command.arg(flag);
                }
                command.arg(&task.level_path);
                command.stdin(Stdio::null());
            }
        }

        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so the whole client tree can be signalled
        #[cfg(unix)]
        command.process_group(0);

        Ok(command)
    }

    fn classify(
        &self,
        task: &BenchmarkTask,
        status: ExitStatus,
        stdout: &[u8],
        stderr: &[u8],
        elapsed: f64,
    ) -> CaseResult {
        let stdout = String::from_utf8_lossy(stdout);

        if !status.success() {
            let stderr = String::from_utf8_lossy(stderr);
            let message = match status.code() {
                Some(code) => format!("process exited with code {}: {}", code, stderr.trim()),
                None => format!("terminated by signal: {}", stderr.trim()),
            };
            return CaseResult::failure(task, CaseStatus::NonZeroExit, message, Some(elapsed))
                .with_solution(self.parser.lenient_solution(&stdout));
        }

        match self.parser.parse(&stdout) {
            Ok(parsed) => CaseResult::success(task, parsed.metrics, parsed.solution, elapsed),
            Err(e) => {
                let snippet: String = stdout.chars().take(STDOUT_SNIPPET_CHARS).collect();
                let message = format!(
                    "{}; stdout {} bytes, starts with: {}",
                    e,
                    stdout.len(),
                    snippet
                );
                CaseResult::failure(task, CaseStatus::ParseError, message, Some(elapsed))
                    .with_solution(self.parser.lenient_solution(&stdout))
            }
        }
    }

    /// Ask the client to stop, force it after the grace period
    async fn terminate(&self, child: &mut Child, pid: Option<u32>) {
        if !signal_group(pid, TerminationSignal::Terminate) {
            kill_tree(child, pid).await;
            return;
        }

        tokio::select! {
            _ = child.wait() => {
                // The client may exit on SIGTERM and leave helpers behind
                signal_group(pid, TerminationSignal::Kill);
            }
            _ = tokio::time::sleep(self.settings.termination_grace) => {
                debug!(pid = ?pid, "grace period elapsed, killing process");
                kill_tree(child, pid).await;
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TerminationSignal {
    Terminate,
    Kill,
}

/// Signal the child's process group; false when that is not possible
#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: TerminationSignal) -> bool {
    let Some(pid) = pid else {
        return false;
    };
    let signal = match signal {
        TerminationSignal::Terminate => libc::SIGTERM,
        TerminationSignal::Kill => libc::SIGKILL,
    };
    // SAFETY: plain kill(2) on the group we created for this child
    unsafe { libc::kill(-(pid as libc::pid_t), signal) == 0 }
}

#[cfg(not(unix))]
fn signal_group(_pid: Option<u32>, _signal: TerminationSignal) -> bool {
    false
}

/// Kill the client and everything it spawned, then reap it
async fn kill_tree(child: &mut Child, pid: Option<u32>) {
    signal_group(pid, TerminationSignal::Kill);
    if let Err(e) = child.start_kill() {
        if e.kind() != io::ErrorKind::InvalidInput {
            warn!(error = %e, "failed to kill process");
        }
    }
    if let Err(e) = child.wait().await {
        warn!(error = %e, "failed to reap process");
    }
}

/// Read a pipe to EOF; on `stop` return whatever has arrived so far
fn spawn_reader<R>(pipe: Option<R>, stop: CancellationToken) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let Some(mut pipe) = pipe else {
            return buf;
        };

        let mut chunk = [0u8; 8192];
        loop {
            let read = tokio::select! {
                read = pipe.read(&mut chunk) => read,
                _ = stop.cancelled() => break,
            };
            match read {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    debug!(error = %e, "pipe read failed");
                    break;
                }
            }
        }
        buf
    })
}

/// Wait for both pipe readers together, keeping partial output on timeout
async fn collect(
    stdout: JoinHandle<Vec<u8>>,
    stderr: JoinHandle<Vec<u8>>,
    stop: &CancellationToken,
    task_id: &str,
) -> (Vec<u8>, Vec<u8>) {
    let readers = async { tokio::join!(stdout, stderr) };
    tokio::pin!(readers);

    let (stdout, stderr) = match tokio::time::timeout(CAPTURE_TIMEOUT, &mut readers).await {
        Ok(done) => done,
        Err(_) => {
            warn!(task_id, "output capture timed out, keeping partial output");
            stop.cancel();
            readers.await
        }
    };

    let output = |joined: std::result::Result<Vec<u8>, tokio::task::JoinError>| {
        joined.unwrap_or_else(|e| {
            warn!(task_id, error = %e, "output reader failed");
            Vec::new()
        })
    };
    (output(stdout), output(stderr))
}
