//! In-process queue backend with the full lease/lock/dedup protocol.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use condor_core::{Document, Error, Lease, ModuleConfig, QueueModule, Result};
use tokio::sync::Notify;

#[derive(Default)]
struct QueueState {
    main: VecDeque<Bytes>,
    processing: Vec<Bytes>,
    locks: HashMap<String, Instant>,
    cache: HashMap<String, Instant>,
}

/// In-memory [`QueueModule`] with the same record/lock/cache semantics as
/// a durable backend: FIFO main lists, per-queue processing shadow lists,
/// expiring lock entries, and a dedup cache keyed by document id.
///
/// Inspection helpers let tests observe queue contents and simulate worker
/// crashes (`drop_lock`) and clock passage (`expire_cache_entry`) without
/// waiting out real TTLs.
#[derive(Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, QueueState>>,
    arrival: Notify,
}

impl MemoryQueue {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records on a queue's main list.
    pub fn queue_len(&self, queue: &str) -> usize {
        self.with_state(queue, |state| state.main.len())
    }

    /// Number of records on a queue's processing list.
    pub fn processing_len(&self, queue: &str) -> usize {
        self.with_state(queue, |state| state.processing.len())
    }

    /// Document ids on a queue's main list, head first.
    pub fn queued_ids(&self, queue: &str) -> Vec<String> {
        self.with_state(queue, |state| {
            state
                .main
                .iter()
                .filter_map(|record| Document::from_wire(record).ok())
                .map(|document| document.id)
                .collect()
        })
    }

    /// Whether an unexpired dedup entry exists for a document id.
    pub fn cache_contains(&self, queue: &str, document_id: &str) -> bool {
        self.with_state(queue, |state| {
            state
                .cache
                .get(document_id)
                .is_some_and(|expiry| *expiry > Instant::now())
        })
    }

    /// Drops the lock entry for a document, simulating a crashed worker
    /// whose lease has lapsed.
    pub fn drop_lock(&self, queue: &str, document_id: &str) {
        self.with_state(queue, |state| {
            state.locks.remove(document_id);
        });
    }

    /// Marks a dedup entry as already expired, simulating the passage of
    /// the cache window.
    pub fn expire_cache_entry(&self, queue: &str, document_id: &str) {
        self.with_state(queue, |state| {
            if let Some(expiry) = state.cache.get_mut(document_id) {
                *expiry = Instant::now();
            }
        });
    }

    fn with_state<T>(&self, queue: &str, f: impl FnOnce(&mut QueueState) -> T) -> T {
        let mut queues = self.queues.lock().expect("queue state poisoned");
        f(queues.entry(queue.to_string()).or_default())
    }

    fn try_get(&self, queue: &str, ttl: Duration) -> Result<Option<Lease>> {
        self.with_state(queue, |state| {
            let Some(record) = state.main.pop_front() else {
                return Ok(None);
            };
            state.processing.push(record.clone());
            let document = Document::from_wire(&record)?;
            state
                .locks
                .insert(document.id.clone(), Instant::now() + ttl);
            Ok(Some(Lease { record, document }))
        })
    }
}

#[async_trait]
impl QueueModule for MemoryQueue {
    async fn configure(&self, _config: &ModuleConfig) -> Result<()> {
        Ok(())
    }

    async fn add_document(
        &self,
        queue: &str,
        document: &Document,
        cache_ttl: Duration,
    ) -> Result<()> {
        let record = document.to_wire()?;
        self.with_state(queue, |state| {
            if !cache_ttl.is_zero() {
                if let Some(expiry) = state.cache.get(&document.id) {
                    if *expiry > Instant::now() {
                        return Err(Error::AlreadyExists);
                    }
                }
                state
                    .cache
                    .insert(document.id.clone(), Instant::now() + cache_ttl);
            }
            state.main.push_back(record);
            Ok(())
        })?;
        self.arrival.notify_waiters();
        Ok(())
    }

    async fn get_document(&self, queue: &str, ttl: Duration) -> Result<Lease> {
        loop {
            // Register for wakeups before checking, so an arrival racing
            // the check is not missed.
            let mut arrival = std::pin::pin!(self.arrival.notified());
            arrival.as_mut().enable();
            if let Some(lease) = self.try_get(queue, ttl)? {
                return Ok(lease);
            }
            arrival.await;
        }
    }

    async fn renew_lock(&self, queue: &str, document_id: &str, ttl: Duration) -> Result<()> {
        self.with_state(queue, |state| {
            state
                .locks
                .insert(document_id.to_string(), Instant::now() + ttl);
        });
        Ok(())
    }

    async fn release_document(&self, queue: &str, lease: &Lease) -> Result<()> {
        self.with_state(queue, |state| {
            state.locks.remove(&lease.document.id);
            match state.processing.iter().rposition(|record| *record == lease.record) {
                Some(position) => {
                    state.processing.remove(position);
                    Ok(())
                }
                None => Err(Error::queue(
                    "release",
                    format!("record for '{}' not on the processing list", lease.document.id),
                )),
            }
        })
    }

    async fn delete_document(&self, queue: &str, lease: &Lease) -> Result<()> {
        self.with_state(queue, |state| {
            match state.main.iter().rposition(|record| *record == lease.record) {
                Some(position) => {
                    state.main.remove(position);
                    Ok(())
                }
                None => Err(Error::queue(
                    "delete",
                    format!("record for '{}' not on the queue", lease.document.id),
                )),
            }
        })
    }

    async fn bookkeep(&self, queues: &[&str]) {
        let now = Instant::now();
        for queue in queues {
            let resurrected = self.with_state(queue, |state| {
                state.cache.retain(|_, expiry| *expiry > now);

                let mut resurrected = 0usize;
                let mut index = 0;
                while index < state.processing.len() {
                    let record = state.processing[index].clone();
                    let Ok(document) = Document::from_wire(&record) else {
                        index += 1;
                        continue;
                    };
                    let locked = state
                        .locks
                        .get(&document.id)
                        .is_some_and(|expiry| *expiry > now);
                    if locked {
                        index += 1;
                        continue;
                    }
                    state.locks.remove(&document.id);
                    state.processing.remove(index);
                    state.main.push_back(record);
                    resurrected += 1;
                }
                resurrected
            });
            if resurrected > 0 {
                self.arrival.notify_waiters();
            }
        }
    }
}
