//! Cooperative shutdown
//!
//! A single cancellation token is shared between whoever requests the
//! shutdown (stop key, Ctrl-C) and the worker pool that observes it. The
//! key watcher is written against [`KeySource`] so it can be driven
//! without a terminal.

use std::io;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Key that requests a graceful shutdown
pub const STOP_KEY: char = 'q';

/// Owner of the run-wide shutdown signal
#[derive(Debug, Clone, Default)]
pub struct CancellationController {
    token: CancellationToken,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token handed to the pool and its tasks
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request shutdown; idempotent
    pub fn request_shutdown(&self, source: &str) {
        if !self.token.is_cancelled() {
            info!(source, "shutdown requested");
        }
        self.token.cancel();
    }

    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Source of single key presses
pub trait KeySource: Send + 'static {
    /// Wait up to `timeout` for a key; `Ok(None)` when nothing was pressed
    fn next_key(&mut self, timeout: Duration) -> io::Result<Option<char>>;
}

/// Watch `source` on a blocking thread until the stop key is pressed,
/// shutdown is requested elsewhere, or `stop` is cancelled at the end of
/// the run.
pub fn spawn_key_watcher<K: KeySource>(
    mut source: K,
    controller: CancellationController,
    stop: CancellationToken,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        while !controller.is_requested() && !stop.is_cancelled() {
            match source.next_key(poll_interval) {
                Ok(Some(key)) if key.eq_ignore_ascii_case(&STOP_KEY) => {
                    controller.request_shutdown("stop key");
                    break;
                }
                Ok(Some(key)) => debug!(%key, "ignoring key"),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "key input unavailable; stop key disabled");
                    break;
                }
            }
        }
    })
}

/// Request shutdown when the process receives Ctrl-C
pub fn spawn_ctrl_c_watcher(
    controller: CancellationController,
    stop: CancellationToken,
) -> JoinHandle<()> {
    let token = controller.token();
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => controller.request_shutdown("interrupt"),
                Err(e) => warn!(error = %e, "could not listen for interrupt"),
            },
            _ = token.cancelled() => {}
            _ = stop.cancelled() => {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays a fixed key sequence, then reports no input
    struct ScriptedKeys(VecDeque<io::Result<Option<char>>>);

    impl KeySource for ScriptedKeys {
        fn next_key(&mut self, timeout: Duration) -> io::Result<Option<char>> {
            match self.0.pop_front() {
                Some(next) => next,
                None => {
                    std::thread::sleep(timeout);
                    Ok(None)
                }
            }
        }
    }

    #[test]
    fn test_request_is_idempotent() {
        let controller = CancellationController::new();
        let token = controller.token();
        assert!(!controller.is_requested());

        controller.request_shutdown("test");
        controller.request_shutdown("test");
        assert!(controller.is_requested());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_stop_key_requests_shutdown() {
        let controller = CancellationController::new();
        let keys = ScriptedKeys(VecDeque::from(vec![Ok(Some('x')), Ok(None), Ok(Some('Q'))]));

        spawn_key_watcher(
            keys,
            controller.clone(),
            CancellationToken::new(),
            Duration::from_millis(5),
        )
        .await
        .unwrap();
        assert!(controller.is_requested());
    }

    #[tokio::test]
    async fn test_input_error_disables_watcher() {
        let controller = CancellationController::new();
        let keys = ScriptedKeys(VecDeque::from(vec![Err(io::Error::new(
            io::ErrorKind::Other,
            "not a tty",
        ))]));

        spawn_key_watcher(
            keys,
            controller.clone(),
            CancellationToken::new(),
            Duration::from_millis(5),
        )
        .await
        .unwrap();
        assert!(!controller.is_requested());
    }

    #[tokio::test]
    async fn test_watcher_exits_on_external_cancel() {
        let controller = CancellationController::new();
        let handle = spawn_key_watcher(
            ScriptedKeys(VecDeque::new()),
            controller.clone(),
            CancellationToken::new(),
            Duration::from_millis(5),
        );

        controller.request_shutdown("external");
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("watcher did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_watchers_release_on_stop() {
        let controller = CancellationController::new();
        let stop = CancellationToken::new();
        let keys = spawn_key_watcher(
            ScriptedKeys(VecDeque::new()),
            controller.clone(),
            stop.clone(),
            Duration::from_millis(5),
        );
        let interrupt = spawn_ctrl_c_watcher(controller.clone(), stop.clone());

        stop.cancel();
        tokio::time::timeout(Duration::from_secs(2), async {
            keys.await.unwrap();
            interrupt.await.unwrap();
        })
        .await
        .expect("watchers did not stop");
        assert!(!controller.is_requested());
    }
}
