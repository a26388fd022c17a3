//! The runtime handle that owns session tasks.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Handle to the task pool backing all streaming sessions.
///
/// Every session side (source, sink, transform hop, relay) is spawned
/// through a `Runtime`, so a process can account for and tear down all of
/// its pipelines in one place. Construct one per process (or per test) and
/// pass it to drive operations; there is no implicit global.
///
/// Cloning is cheap and clones share the same task pool.
#[derive(Clone)]
pub struct Runtime {
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl Runtime {
    /// Create a new runtime handle.
    ///
    /// Must be called from within a tokio runtime context; sessions are
    /// spawned onto the ambient executor.
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Spawn a session task. The task ends early if the runtime shuts
    /// down; cancellation takes effect at the task's next suspension point,
    /// which for session loops is a token boundary.
    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = future => {}
            }
        });
    }

    /// Number of session tasks currently alive
    pub fn live_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Graceful shutdown: cancel every outstanding session and wait for
    /// the tasks to exit. Idempotent.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
