use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::prelude::*;

use searchbench::app::report::{
    render_comparison, render_run_matrix, render_skipped, render_summary,
};
use searchbench::app::{execute_run, RunOptions};
use searchbench::bench::cancel::CancellationController;
use searchbench::bench::compare::ComparisonEngine;
use searchbench::bench::planner::collect_baselines;
use searchbench::config::persistence::{find_latest_run, load_run};
use searchbench::config::{BenchmarkConfig, CancelPolicy};
use searchbench::util::{format_duration, parse_timeout};
use searchbench::{error, BenchError, Result, DEFAULT_GRAY_AREA_PERCENT, DEFAULT_RESULT_PREFIX};

const EXIT_OK: u8 = 0;
const EXIT_SHUTDOWN: u8 = 1;
const EXIT_FATAL: u8 = 2;
/// Non-fatal failure after startup, e.g. a run file that cannot be written
const EXIT_FAILED: u8 = 3;

#[derive(Parser)]
#[command(
    name = "searchbench",
    version,
    about = "Benchmark a search client over levels and strategies"
)]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the configured benchmark
    Run(RunArgs),
    /// Compare a stored run with baselines or with an earlier run
    Compare(CompareArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Benchmark document (TOML or JSON); defaults to ./benchmarks.toml
    config: Option<PathBuf>,

    /// Search client executable
    #[arg(long)]
    executable: Option<PathBuf>,

    /// Number of concurrent workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Per-task timeout, e.g. `90`, `2m` or `1m 30s`
    #[arg(short, long, value_parser = parse_timeout)]
    timeout: Option<f64>,

    /// Tolerance band in percent for neutral changes
    #[arg(long)]
    gray_area: Option<f64>,

    /// Do not watch the terminal for the stop key
    #[arg(long)]
    no_keys: bool,

    /// Do not draw a progress bar
    #[arg(long)]
    no_progress: bool,

    /// Let running tasks finish on shutdown instead of terminating them
    #[arg(long)]
    drain: bool,

    /// Compare against this earlier run file instead of configured baselines
    #[arg(long)]
    against: Option<PathBuf>,
}

#[derive(Args)]
struct CompareArgs {
    /// Run files; one is compared with baselines, several side by side
    #[arg(required_unless_present = "latest_in")]
    runs: Vec<PathBuf>,

    /// Add the newest run file in this directory
    #[arg(long)]
    latest_in: Option<PathBuf>,

    /// Earlier run file providing the baselines (single run only)
    #[arg(long)]
    against: Option<PathBuf>,

    /// Benchmark document providing baselines and metric names
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tolerance band in percent for neutral changes
    #[arg(long)]
    gray_area: Option<f64>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "searchbench=debug"
    } else {
        "searchbench=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn resolve_config(path: Option<PathBuf>) -> Result<BenchmarkConfig> {
    let path = match path {
        Some(path) => path,
        None => BenchmarkConfig::config_file_path()?,
    };
    BenchmarkConfig::load_from(&path)
}

async fn run_command(args: RunArgs, controller: CancellationController) -> Result<bool> {
    let mut config = resolve_config(args.config)?;
    if let Some(executable) = args.executable {
        config = config.with_executable(executable);
    }
    if let Some(workers) = args.workers {
        config = config.with_max_workers(workers);
    }
    if let Some(timeout) = args.timeout {
        config = config.with_timeout(timeout);
    }
    if let Some(gray_area) = args.gray_area {
        config = config.with_gray_area(gray_area);
    }
    if args.drain {
        config = config.with_cancel_policy(CancelPolicy::Drain);
    }

    let interactive = std::io::stderr().is_terminal();
    let options = RunOptions {
        interactive_keys: interactive && !args.no_keys,
        show_progress: interactive && !args.no_progress,
        against: args.against,
        handle_interrupt: true,
    };

    let outcome = execute_run(&config, &options, controller).await?;

    if !outcome.skipped.is_empty() {
        print!("{}", render_skipped(&outcome.skipped));
        println!();
    }
    print!(
        "{}",
        render_summary(&outcome.run, &outcome.summary, &config.metric_keys)
    );
    println!();
    print!(
        "{}",
        render_comparison(&outcome.comparisons, config.gray_area_percent)
    );
    println!(
        "\nResults saved to {} ({})",
        outcome.saved_to.display(),
        format_duration(outcome.elapsed)
    );
    if outcome.shutdown_requested {
        println!("Run stopped early on request.");
    }

    Ok(outcome.shutdown_requested)
}

fn compare_command(args: CompareArgs) -> Result<()> {
    let mut paths = args.runs.clone();
    if let Some(dir) = &args.latest_in {
        let latest = find_latest_run(dir, DEFAULT_RESULT_PREFIX)?.ok_or_else(|| {
            BenchError::Persistence(format!("No run files found in {}", dir.display()))
        })?;
        paths.push(latest);
    }

    match paths.as_slice() {
        [] => Err(BenchError::Config(
            "Pass a run file or --latest-in <dir>".to_string(),
        )),
        [single] => compare_with_baselines(single, &args),
        several => {
            if args.against.is_some() {
                return Err(BenchError::Config(
                    "--against takes exactly one run file".to_string(),
                ));
            }
            compare_side_by_side(several, &args)
        }
    }
}

/// Metric names and gray area from the document, CLI override first
fn comparison_engine(config: Option<&BenchmarkConfig>, gray_area: Option<f64>) -> ComparisonEngine {
    let keys = config.map(|c| c.metric_keys.clone()).unwrap_or_default();
    let gray_area = gray_area
        .or_else(|| config.map(|c| c.gray_area_percent))
        .unwrap_or(DEFAULT_GRAY_AREA_PERCENT);
    ComparisonEngine::new(gray_area, keys)
}

fn compare_with_baselines(run_path: &Path, args: &CompareArgs) -> Result<()> {
    let run = load_run(run_path)?;

    let config = match &args.config {
        Some(path) => Some(BenchmarkConfig::load_from(path)?),
        None if args.against.is_none() => Some(resolve_config(None)?),
        None => None,
    };
    let engine = comparison_engine(config.as_ref(), args.gray_area);

    let comparisons = match (&args.against, &config) {
        (Some(previous), _) => engine.compare_runs(&run, &load_run(previous)?),
        (None, Some(config)) => engine.compare(&run, &collect_baselines(&config.cases)),
        (None, None) => engine.compare(&run, &BTreeMap::new()),
    };

    println!("Run {} ({})\n", run.timestamp, run_path.display());
    print!("{}", render_comparison(&comparisons, engine.gray_area_percent()));
    Ok(())
}

fn compare_side_by_side(paths: &[PathBuf], args: &CompareArgs) -> Result<()> {
    let config = args
        .config
        .as_deref()
        .map(BenchmarkConfig::load_from)
        .transpose()?;
    let engine = comparison_engine(config.as_ref(), args.gray_area);

    let runs = paths
        .iter()
        .map(|path| Ok((path.display().to_string(), load_run(path)?)))
        .collect::<Result<Vec<_>>>()?;

    print!("{}", render_run_matrix(&runs, &engine));
    Ok(())
}

/// Process exit status for the outcome of a command.
///
/// `Ok(true)` means the operator stopped the run early.
fn exit_code(result: &Result<bool>) -> u8 {
    match result {
        Ok(false) => EXIT_OK,
        Ok(true) => EXIT_SHUTDOWN,
        Err(e) if error::is_fatal(e) => EXIT_FATAL,
        Err(_) => EXIT_FAILED,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Run(args) => run_command(args, CancellationController::new()).await,
        Command::Compare(args) => compare_command(args).map(|_| false),
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, fatal = error::is_fatal(e), "searchbench failed");
        eprintln!("Error: {}", error::user_friendly_message(e));
    }
    ExitCode::from(exit_code(&result))
}
