//! Application layer
//!
//! Terminal key input, progress rendering, text reports and the run
//! orchestration that ties them to the benchmark engine.

pub mod keys;
pub mod progress;
pub mod report;
pub mod run;

pub use keys::TerminalKeys;
pub use progress::{ProgressRenderer, ProgressTally};
pub use run::{execute_run, RunOptions, RunOutcome};
