//! Periodic queue maintenance.

use std::sync::Arc;
use std::time::Duration;

use condor_core::{QueueModule, Stopper, WorkerGuard};
use tokio::time::{Instant, interval_at};

use crate::{QUEUES, TRACING_TARGET_BOOKKEEPER};

/// Runs the queue module's bookkeeping on every managed queue at a fixed
/// period until shutdown: expired dedup entries are pruned and documents
/// whose leases have lapsed are resurrected.
pub(crate) async fn run(
    stopper: Stopper,
    queue: Arc<dyn QueueModule>,
    period: Duration,
    guard: WorkerGuard,
) {
    let _guard = guard;
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = ticker.tick() => queue.bookkeep(&QUEUES).await,
            () = stopper.cancelled() => {
                tracing::debug!(target: TRACING_TARGET_BOOKKEEPER, "bookkeeper stopped");
                return;
            }
        }
    }
}
