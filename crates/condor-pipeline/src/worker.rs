//! Generic lease-process-advance loop serving one pipeline stage.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use condor_core::{Document, QueueModule, Stopper, WorkerGuard};
use tokio::sync::Mutex;
use tokio::time::{Instant, interval_at};

use crate::actions::StageAction;
use crate::config::Timings;
use crate::TRACING_TARGET_WORKER;

/// What one iteration of the loop accomplished.
enum Iteration {
    /// The action ran and the document was moved and released.
    Advanced,
    /// The action (or the move) failed; the lease is left to lapse.
    Abandoned,
    /// The dequeue itself failed; the caller backs off.
    DequeueFailed,
}

/// One worker in a stage pool.
///
/// Binds a source queue, an optional destination queue (absent for the
/// terminal stage), and a per-document action. The worker leases one
/// document at a time, renews the lease on a fixed period while the action
/// runs, and on success moves the document to the destination before
/// releasing the source record. The move and release run inside a critical
/// section that shutdown waits on, so a committed advancement is never
/// abandoned halfway.
pub(crate) struct StageWorker {
    pub(crate) stopper: Stopper,
    pub(crate) queue: Arc<dyn QueueModule>,
    pub(crate) source: &'static str,
    pub(crate) destination: Option<&'static str>,
    pub(crate) action: Arc<dyn StageAction>,
    pub(crate) role: &'static str,
    pub(crate) timings: Timings,
}

impl StageWorker {
    pub(crate) async fn run(self, guard: WorkerGuard) {
        let _guard = guard;
        let relock_period = self.timings.relock_period();

        while self.stopper.is_running() {
            // The critical section: held by the child while it moves a
            // document between queues, taken by the supervisor before it
            // honors shutdown.
            let gate = Arc::new(Mutex::new(()));
            // Identity of the currently leased document, for renewals.
            let leased: Arc<StdMutex<Option<String>>> = Arc::new(StdMutex::new(None));

            let mut child = tokio::spawn(iterate(
                Arc::clone(&self.queue),
                self.source,
                self.destination,
                Arc::clone(&self.action),
                Arc::clone(&gate),
                Arc::clone(&leased),
                self.timings.lock_ttl,
                self.role,
            ));

            let mut relock = interval_at(Instant::now() + relock_period, relock_period);
            let outcome = loop {
                tokio::select! {
                    result = &mut child => {
                        break result.unwrap_or_else(|error| {
                            tracing::error!(
                                target: TRACING_TARGET_WORKER,
                                role = self.role,
                                error = %error,
                                "stage iteration aborted"
                            );
                            Iteration::Abandoned
                        });
                    }
                    _ = relock.tick() => {
                        let document_id = leased.lock().expect("lease slot poisoned").clone();
                        if let Some(document_id) = document_id {
                            if let Err(error) = self
                                .queue
                                .renew_lock(self.source, &document_id, self.timings.lock_ttl)
                                .await
                            {
                                tracing::warn!(
                                    target: TRACING_TARGET_WORKER,
                                    role = self.role,
                                    item_id = %document_id,
                                    error = %error,
                                    "failed to renew document lock"
                                );
                            }
                        }
                    }
                    () = self.stopper.cancelled() => {
                        // Wait out any in-flight move, then cut the child
                        // loose; an unfinished action's lease will lapse
                        // and bookkeeping takes over.
                        let _held = gate.lock().await;
                        child.abort();
                        tracing::debug!(
                            target: TRACING_TARGET_WORKER,
                            role = self.role,
                            "worker stopped"
                        );
                        return;
                    }
                }
            };

            if matches!(outcome, Iteration::DequeueFailed)
                && !self.stopper.sleep(self.timings.dequeue_backoff).await
            {
                return;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn iterate(
    queue: Arc<dyn QueueModule>,
    source: &'static str,
    destination: Option<&'static str>,
    action: Arc<dyn StageAction>,
    gate: Arc<Mutex<()>>,
    leased: Arc<StdMutex<Option<String>>>,
    lock_ttl: Duration,
    role: &'static str,
) -> Iteration {
    let lease = match queue.get_document(source, lock_ttl).await {
        Ok(lease) => lease,
        Err(error) => {
            tracing::warn!(
                target: TRACING_TARGET_WORKER,
                role,
                queue = source,
                error = %error,
                "failed to get document from queue"
            );
            return Iteration::DequeueFailed;
        }
    };
    *leased.lock().expect("lease slot poisoned") = Some(lease.document.id.clone());

    let mut document: Document = lease.document.clone();
    if action.run(&mut document).await.is_err() {
        // Not released: the lease expires and bookkeeping resurrects the
        // document for another attempt.
        return Iteration::Abandoned;
    }

    // From here on, shutdown must not interrupt the move.
    let _held = gate.lock().await;

    if let Some(destination) = destination {
        if let Err(error) = queue
            .add_document(destination, &document, Duration::ZERO)
            .await
        {
            tracing::warn!(
                target: TRACING_TARGET_WORKER,
                role,
                item_id = %document.id,
                queue = destination,
                error = %error,
                "failed to add document to queue"
            );
            return Iteration::Abandoned;
        }
    }
    if let Err(error) = queue.release_document(source, &lease).await {
        tracing::warn!(
            target: TRACING_TARGET_WORKER,
            role,
            item_id = %document.id,
            queue = source,
            error = %error,
            "failed to release document"
        );
    }
    Iteration::Advanced
}
