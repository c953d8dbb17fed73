//! Long-lived producers feeding the listed queue.

use std::sync::Arc;
use std::time::Duration;

use condor_core::{Document, InputModule, QueueModule, Stopper, WorkerGuard};
use rand::Rng;
use tokio::sync::mpsc;

use crate::config::Timings;
use crate::{QUEUE_LISTED, TRACING_TARGET_LISTER};

const PUBLISH_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// One lister per configured input handle.
///
/// Runs the input module's `list` in a loop (re-invoking it whenever it
/// returns) while a relay task publishes every yielded document to the
/// listed queue: the handle name is stamped as provenance, the dedup cache
/// suppresses repeats inside the cache window, and enqueue failures back
/// off exponentially. On shutdown the relay drains pending yields with one
/// delivery attempt each before exiting.
pub(crate) struct Lister {
    pub(crate) stopper: Stopper,
    pub(crate) queue: Arc<dyn QueueModule>,
    pub(crate) input: Arc<dyn InputModule>,
    pub(crate) handle: String,
    pub(crate) timings: Timings,
}

impl Lister {
    pub(crate) async fn run(self, guard: WorkerGuard) {
        let _guard = guard;
        let (documents_tx, documents_rx) = mpsc::channel(16);

        let relay = tokio::spawn(relay(
            self.stopper.clone(),
            Arc::clone(&self.queue),
            self.handle.clone(),
            documents_rx,
            self.timings,
        ));

        while self.stopper.is_running() {
            if let Err(error) = self
                .input
                .list(self.stopper.clone(), documents_tx.clone())
                .await
            {
                tracing::warn!(
                    target: TRACING_TARGET_LISTER,
                    module = %self.handle,
                    error = %error,
                    "input failed"
                );
            }
        }

        // Close the channel and wait for every yielded document to be
        // published.
        drop(documents_tx);
        relay.await.ok();
        tracing::debug!(target: TRACING_TARGET_LISTER, module = %self.handle, "lister stopped");
    }
}

async fn relay(
    stopper: Stopper,
    queue: Arc<dyn QueueModule>,
    handle: String,
    mut documents: mpsc::Receiver<Document>,
    timings: Timings,
) {
    loop {
        tokio::select! {
            received = documents.recv() => {
                let Some(mut document) = received else { return };
                document.input_module_name = handle.clone();
                if !publish(&stopper, queue.as_ref(), &handle, &document, &timings).await {
                    break;
                }
            }
            () = stopper.cancelled() => break,
        }
    }

    // Shutdown: pending yields get one delivery attempt each so nothing
    // already produced is silently dropped.
    while let Ok(mut document) = documents.try_recv() {
        document.input_module_name = handle.clone();
        publish_once(queue.as_ref(), &handle, &document, &timings).await;
    }
}

/// Publishes with exponential backoff until delivered, deduplicated, or
/// shut down. Returns false when shutdown interrupted the attempt.
async fn publish(
    stopper: &Stopper,
    queue: &dyn QueueModule,
    handle: &str,
    document: &Document,
    timings: &Timings,
) -> bool {
    let mut backoff = Duration::ZERO;
    loop {
        if !stopper.sleep(backoff).await {
            publish_once(queue, handle, document, timings).await;
            return false;
        }
        match queue
            .add_document(QUEUE_LISTED, document, timings.listed_cache_ttl)
            .await
        {
            Ok(()) => {
                tracing::debug!(
                    target: TRACING_TARGET_LISTER,
                    module = %handle,
                    item_id = %document.id,
                    "listed new document"
                );
                return true;
            }
            Err(error) if error.is_already_exists() => return true,
            Err(error) => {
                backoff = next_backoff(backoff, timings.publish_backoff_max);
                tracing::warn!(
                    target: TRACING_TARGET_LISTER,
                    module = %handle,
                    item_id = %document.id,
                    backoff = ?backoff,
                    error = %error,
                    "failed to add document to queue (backing off)"
                );
            }
        }
    }
}

async fn publish_once(
    queue: &dyn QueueModule,
    handle: &str,
    document: &Document,
    timings: &Timings,
) {
    match queue
        .add_document(QUEUE_LISTED, document, timings.listed_cache_ttl)
        .await
    {
        Ok(()) => {}
        Err(error) if error.is_already_exists() => {}
        Err(error) => {
            tracing::warn!(
                target: TRACING_TARGET_LISTER,
                module = %handle,
                item_id = %document.id,
                error = %error,
                "dropping document yielded during shutdown"
            );
        }
    }
}

/// Doubles the backoff with up to 10% jitter, capped at `max`.
fn next_backoff(current: Duration, max: Duration) -> Duration {
    let doubled = if current.is_zero() {
        PUBLISH_BACKOFF_BASE
    } else {
        current.saturating_mul(2)
    };
    let jitter = doubled.mul_f64(rand::rng().random_range(0.0..0.1));
    (doubled + jitter).min(max)
}
