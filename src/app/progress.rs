//! Live progress rendering
//!
//! Consumes [`PoolEvent`]s and drives an indicatif bar. Failed tasks are
//! printed above the bar as they finish.

use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bench::worker::PoolEvent;
use crate::models::CaseStatus;
use crate::util::format_seconds;

const BAR_TEMPLATE: &str = "{spinner} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}";

/// What the renderer saw, returned when the event stream ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressTally {
    pub dispatched: usize,
    pub finished: usize,
    pub succeeded: usize,
    pub running: usize,
    pub shutdown_seen: bool,
}

/// Progress bar over the tasks of one run
pub struct ProgressRenderer {
    bar: ProgressBar,
    in_flight: HashSet<String>,
    tally: ProgressTally,
}

impl ProgressRenderer {
    /// Visible bar on stderr
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self::with_bar(bar)
    }

    /// Renderer that only keeps the tally
    pub fn hidden(total: usize) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(total as u64);
        Self::with_bar(bar)
    }

    fn with_bar(bar: ProgressBar) -> Self {
        Self {
            bar,
            in_flight: HashSet::new(),
            tally: ProgressTally::default(),
        }
    }

    /// Render until the pool drops its event sender
    pub fn spawn(mut self, mut events: mpsc::UnboundedReceiver<PoolEvent>) -> JoinHandle<ProgressTally> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle(event);
            }
            self.bar.finish_and_clear();
            self.tally
        })
    }

    pub fn handle(&mut self, event: PoolEvent) {
        match event {
            PoolEvent::Dispatched { task_id, .. } => {
                self.tally.dispatched += 1;
                self.in_flight.insert(task_id);
            }
            PoolEvent::Finished {
                task_id,
                status,
                duration_seconds,
                ..
            } => {
                self.tally.finished += 1;
                self.in_flight.remove(&task_id);
                if status.is_success() {
                    self.tally.succeeded += 1;
                } else if status != CaseStatus::Cancelled {
                    self.bar.println(format!(
                        "{} {} ({})",
                        status,
                        task_id,
                        format_seconds(duration_seconds)
                    ));
                }
                self.bar.inc(1);
            }
            PoolEvent::ShutdownObserved { completed, total } => {
                self.tally.shutdown_seen = true;
                self.bar.println(format!(
                    "Shutdown requested after {}/{} tasks; stopping...",
                    completed, total
                ));
            }
        }
        self.tally.running = self.in_flight.len();
        self.refresh_message();
    }

    pub fn tally(&self) -> &ProgressTally {
        &self.tally
    }

    fn refresh_message(&self) {
        let failed = self.tally.finished - self.tally.succeeded;
        let mut message = format!(
            "running {} | ok {} | not ok {}",
            self.tally.running, self.tally.succeeded, failed
        );
        if self.tally.shutdown_seen {
            message.push_str(" | stopping");
        }
        self.bar.set_message(message);
    }
}
