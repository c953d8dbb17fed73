//! Queue module implementation on Redis lists, strings, and sorted sets.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use condor_core::{Document, Error, Lease, ModuleConfig, QueueModule, Result, params};
use jiff::Timestamp;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};

use crate::TRACING_TARGET;

const PROCESSING_SUFFIX: &str = ":processing";
const LOCK_SUFFIX: &str = ":locks";
const CACHE_SUFFIX: &str = ":cache";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RedisParams {
    url: String,
}

impl Default for RedisParams {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/".to_string(),
        }
    }
}

struct RedisState {
    client: redis::Client,
    manager: ConnectionManager,
}

/// Redis-backed [`QueueModule`].
///
/// Regular operations share one multiplexed connection; the blocking
/// dequeue opens a dedicated connection per call so a parked worker never
/// stalls the others.
#[derive(Default)]
pub struct RedisQueue {
    state: OnceLock<RedisState>,
}

impl RedisQueue {
    /// Creates an unconfigured queue module.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<&RedisState> {
        self.state
            .get()
            .ok_or_else(|| Error::queue("state", "redis queue module is not configured"))
    }
}

fn processing_list(queue: &str) -> String {
    format!("{queue}{PROCESSING_SUFFIX}")
}

fn lock_key(queue: &str, document_id: &str) -> String {
    format!("{queue}{LOCK_SUFFIX}:{document_id}")
}

fn cache_key(queue: &str) -> String {
    format!("{queue}{CACHE_SUFFIX}")
}

#[async_trait]
impl QueueModule for RedisQueue {
    async fn configure(&self, config: &ModuleConfig) -> Result<()> {
        let bound = params::bind(RedisParams::default(), &config.params)?;

        let client = redis::Client::open(bound.url.as_str())
            .map_err(|error| Error::invalid_config(format!("invalid redis url: {error}")))?;
        let mut manager = ConnectionManager::new(client.clone())
            .await
            .map_err(|error| Error::queue("connect", error.to_string()))?;

        // Verify the connection before the pipeline starts leaning on it.
        redis::cmd("PING")
            .query_async::<()>(&mut manager)
            .await
            .map_err(|error| Error::queue("ping", error.to_string()))?;

        self.state
            .set(RedisState { client, manager })
            .map_err(|_| Error::invalid_config("redis queue module configured twice"))
    }

    async fn add_document(
        &self,
        queue: &str,
        document: &Document,
        cache_ttl: Duration,
    ) -> Result<()> {
        let state = self.state()?;
        let record = document.to_wire()?;
        let mut conn = state.manager.clone();

        if !cache_ttl.is_zero() {
            let expiry = Timestamp::now().as_second() + cache_ttl.as_secs() as i64;
            let added: i64 = redis::cmd("ZADD")
                .arg(cache_key(queue))
                .arg("NX")
                .arg(expiry)
                .arg(&document.id)
                .query_async(&mut conn)
                .await
                .map_err(|error| Error::queue("zadd", error.to_string()))?;
            if added == 0 {
                return Err(Error::AlreadyExists);
            }
        }

        if let Err(error) = conn.lpush::<_, _, ()>(queue, record.as_ref()).await {
            if !cache_ttl.is_zero() {
                // Roll the dedup entry back so the enqueue can be retried.
                let _: redis::RedisResult<i64> =
                    conn.zrem(cache_key(queue), &document.id).await;
            }
            return Err(Error::queue("lpush", error.to_string()));
        }
        Ok(())
    }

    async fn get_document(&self, queue: &str, ttl: Duration) -> Result<Lease> {
        let state = self.state()?;
        let mut conn = state
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| Error::queue("connect", error.to_string()))?;

        let record: Vec<u8> = conn
            .brpoplpush(queue, processing_list(queue), 0.0)
            .await
            .map_err(|error| Error::queue("brpoplpush", error.to_string()))?;
        let document = Document::from_wire(&record)?;

        self.renew_lock(queue, &document.id, ttl).await?;

        Ok(Lease {
            record: record.into(),
            document,
        })
    }

    async fn renew_lock(&self, queue: &str, document_id: &str, ttl: Duration) -> Result<()> {
        let state = self.state()?;
        let mut conn = state.manager.clone();
        conn.set_ex::<_, _, ()>(lock_key(queue, document_id), "", ttl.as_secs().max(1))
            .await
            .map_err(|error| Error::queue("set", error.to_string()))
    }

    async fn release_document(&self, queue: &str, lease: &Lease) -> Result<()> {
        self.delete_document(&processing_list(queue), lease).await?;

        let state = self.state()?;
        let mut conn = state.manager.clone();
        let _: redis::RedisResult<i64> =
            conn.del(lock_key(queue, &lease.document.id)).await;
        Ok(())
    }

    async fn delete_document(&self, queue: &str, lease: &Lease) -> Result<()> {
        let state = self.state()?;
        let mut conn = state.manager.clone();
        let removed: i64 = conn
            .lrem(queue, -1, lease.record.as_ref())
            .await
            .map_err(|error| Error::queue("lrem", error.to_string()))?;
        if removed <= 0 {
            return Err(Error::queue(
                "lrem",
                format!("removed {removed} records, expected 1"),
            ));
        }
        Ok(())
    }

    async fn bookkeep(&self, queues: &[&str]) {
        let Ok(state) = self.state() else {
            tracing::warn!(target: TRACING_TARGET, "bookkeeping skipped, module not configured");
            return;
        };
        let mut conn = state.manager.clone();

        for queue in queues {
            // Prune dedup entries whose expiry has passed.
            match conn
                .zrembyscore::<_, _, _, i64>(cache_key(queue), "-inf", Timestamp::now().as_second())
                .await
            {
                Ok(pruned) if pruned > 0 => {
                    tracing::debug!(
                        target: TRACING_TARGET,
                        queue = %queue,
                        pruned,
                        "pruned cached document ids"
                    );
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        queue = %queue,
                        error = %error,
                        "failed to prune cached document ids"
                    );
                }
            }

            // Re-publish processing documents whose locks have expired.
            let records: Vec<Vec<u8>> = match conn.lrange(processing_list(queue), 0, -1).await {
                Ok(records) => records,
                Err(error) => {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        queue = %queue,
                        error = %error,
                        "failed to list processing documents"
                    );
                    continue;
                }
            };

            for record in records {
                let document = match Document::from_wire(&record) {
                    Ok(document) => document,
                    Err(error) => {
                        tracing::warn!(
                            target: TRACING_TARGET,
                            queue = %queue,
                            error = %error,
                            "failed to parse processing document"
                        );
                        continue;
                    }
                };

                let locked: bool = match conn.exists(lock_key(queue, &document.id)).await {
                    Ok(locked) => locked,
                    Err(error) => {
                        tracing::warn!(
                            target: TRACING_TARGET,
                            queue = %queue,
                            item_id = %document.id,
                            error = %error,
                            "failed to look up document lock"
                        );
                        continue;
                    }
                };
                if locked {
                    continue;
                }

                if let Err(error) = self.add_document(queue, &document, Duration::ZERO).await {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        queue = %queue,
                        item_id = %document.id,
                        error = %error,
                        "failed to re-publish expired processing document"
                    );
                    continue;
                }
                if let Err(error) = conn
                    .lrem::<_, _, i64>(processing_list(queue), -1, record.as_slice())
                    .await
                {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        queue = %queue,
                        item_id = %document.id,
                        error = %error,
                        "failed to remove expired processing document"
                    );
                } else {
                    tracing::debug!(
                        target: TRACING_TARGET,
                        queue = %queue,
                        item_id = %document.id,
                        "resurrected expired processing document"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyspace_derivation() {
        assert_eq!(processing_list("condor:listed"), "condor:listed:processing");
        assert_eq!(lock_key("condor:listed", "a1"), "condor:listed:locks:a1");
        assert_eq!(cache_key("condor:listed"), "condor:listed:cache");
    }

    #[test]
    fn params_default_to_local_redis() {
        let bound = params::bind(RedisParams::default(), &serde_json::Map::new()).unwrap();
        assert_eq!(bound.url, "redis://127.0.0.1:6379/");
    }

    #[test]
    fn params_bind_overrides_url() {
        let mut overrides = serde_json::Map::new();
        overrides.insert("url".into(), "redis://queue.internal:6379/2".into());
        let bound = params::bind(RedisParams::default(), &overrides).unwrap();
        assert_eq!(bound.url, "redis://queue.internal:6379/2");
    }

    #[tokio::test]
    async fn operations_require_configuration() {
        let queue = RedisQueue::new();
        let err = queue
            .renew_lock("condor:listed", "a1", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Queue { .. }));
    }
}
