//! Cooperative shutdown for pipeline workers.

use std::time::Duration;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;

/// Broadcast stop signal plus outstanding-worker accounting.
///
/// Every long-lived task spawned by the pipeline registers itself with
/// [`Stopper::begin`] and holds the returned guard for its whole lifetime;
/// [`Stopper::stop`] broadcasts cancellation and then blocks until every
/// guard has been dropped.
#[derive(Debug, Clone, Default)]
pub struct Stopper {
    cancel: CancellationToken,
    workers: TaskTracker,
}

/// RAII registration of one worker with a [`Stopper`].
///
/// Dropping the guard marks the worker as finished on every exit path,
/// including panics and early returns.
#[derive(Debug)]
pub struct WorkerGuard {
    _token: TaskTrackerToken,
}

impl Stopper {
    /// Creates a new stopper in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a worker. The worker counts as outstanding until the
    /// returned guard is dropped.
    pub fn begin(&self) -> WorkerGuard {
        WorkerGuard {
            _token: self.workers.token(),
        }
    }

    /// Resolves once stop has been requested. Safe to await from any number
    /// of workers concurrently.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Whether stop has not been requested yet.
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Cancellable delay.
    ///
    /// Returns `true` if the full delay elapsed and `false` if stop was
    /// requested first. A zero delay returns `true` immediately.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return true;
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => true,
            () = self.cancel.cancelled() => false,
        }
    }

    /// Requests stop, broadcasts the signal, and waits for every
    /// outstanding worker to finish.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.workers.close();
        self.workers.wait().await;
    }
}
