//! Plug-in contracts for pipeline modules.
//!
//! Concrete modules implement exactly one of the four role traits and are
//! registered with a [`Registry`] under a driver name before the pipeline
//! boots. All role traits share the configuration protocol: apply sensible
//! defaults, then overlay the caller's params with [`crate::params::bind`]
//! so that fields absent from the params keep their defaults.
//!
//! Module instances are shared across every worker of their role and must
//! be safe for concurrent use.

mod registry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

pub use registry::Registry;

use crate::Result;
use crate::document::Document;
use crate::stopper::Stopper;

/// Configuration for one module handle: the registered driver name plus a
/// free-form parameter map handed to the module during configuration. The
/// core never interprets the params.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Name the driver was registered under.
    pub driver: String,
    /// Driver-specific parameters.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl ModuleConfig {
    /// Creates a configuration for the given driver with empty params.
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            params: Map::new(),
        }
    }

    /// Adds one parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Module roles recognized by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ModuleRole {
    /// Discovers and fetches documents.
    Input,
    /// Analyzes and scores documents.
    Processor,
    /// Delivers finished documents to a sink.
    Output,
    /// Durable queue backend shared by every worker.
    Queue,
}

/// A registered module instance, tagged with its role.
///
/// Registration names the role explicitly; the orchestrator never probes
/// instances for capabilities.
#[derive(Clone)]
pub enum Module {
    /// An [`InputModule`] instance.
    Input(Arc<dyn InputModule>),
    /// A [`ProcessorModule`] instance.
    Processor(Arc<dyn ProcessorModule>),
    /// An [`OutputModule`] instance.
    Output(Arc<dyn OutputModule>),
    /// A [`QueueModule`] instance.
    Queue(Arc<dyn QueueModule>),
}

impl Module {
    /// Returns the role this module was registered under.
    pub fn role(&self) -> ModuleRole {
        match self {
            Self::Input(_) => ModuleRole::Input,
            Self::Processor(_) => ModuleRole::Processor,
            Self::Output(_) => ModuleRole::Output,
            Self::Queue(_) => ModuleRole::Queue,
        }
    }

    /// Applies a handle's configuration to the underlying instance.
    pub async fn configure(&self, config: &ModuleConfig) -> Result<()> {
        match self {
            Self::Input(module) => module.configure(config).await,
            Self::Processor(module) => module.configure(config).await,
            Self::Output(module) => module.configure(config).await,
            Self::Queue(module) => module.configure(config).await,
        }
    }
}

/// A document leased from a queue, together with the raw record that
/// identifies this enqueue instance.
///
/// The record is the serialized form exactly as dequeued; release and
/// delete match it byte-for-byte against the processing list.
#[derive(Debug, Clone)]
pub struct Lease {
    /// Serialized record as it sits on the processing list.
    pub record: Bytes,
    /// The deserialized document.
    pub document: Document,
}

/// Discovers items on an external source and fetches their content.
#[async_trait]
pub trait InputModule: Send + Sync {
    /// Applies defaults, then overlays the caller's params.
    async fn configure(&self, config: &ModuleConfig) -> Result<()>;

    /// Publishes discovered documents on `documents` until shutdown is
    /// requested or an irrecoverable error occurs. The lister re-invokes
    /// this whenever it returns while the pipeline is running.
    async fn list(&self, stopper: Stopper, documents: mpsc::Sender<Document>) -> Result<()>;

    /// Fetches the full content for `document` in place. Idempotent on the
    /// document identity.
    async fn scrape(&self, document: &mut Document) -> Result<()>;
}

/// Analyzes document content and assigns threat scores.
#[async_trait]
pub trait ProcessorModule: Send + Sync {
    /// Applies defaults, then overlays the caller's params.
    async fn configure(&self, config: &ModuleConfig) -> Result<()>;

    /// Analyzes the content, appending findings to the document's
    /// processed list and raising its score to the maximum observed.
    async fn process(&self, document: &mut Document) -> Result<()>;
}

/// Delivers finished documents to a downstream sink.
#[async_trait]
pub trait OutputModule: Send + Sync {
    /// Applies defaults, then overlays the caller's params.
    async fn configure(&self, config: &ModuleConfig) -> Result<()>;

    /// Delivers one document. May filter on score. Delivery is
    /// at-least-once, so implementations treat this as idempotent by
    /// document id.
    async fn send(&self, document: &Document) -> Result<()>;
}

/// Durable, shared queue backend.
///
/// Each queue is an ordered list of document records with a shadow
/// processing list, per-document lock entries, and a dedup cache. Enqueues
/// go to the tail, dequeues come from the head.
#[async_trait]
pub trait QueueModule: Send + Sync {
    /// Applies defaults, then overlays the caller's params.
    async fn configure(&self, config: &ModuleConfig) -> Result<()>;

    /// Appends `document` to the tail of `queue`.
    ///
    /// With a positive `cache_ttl`, an unexpired dedup entry for the
    /// document id fails with [`Error::AlreadyExists`] without enqueueing.
    /// Otherwise the dedup entry is recorded (absolute expiry now +
    /// `cache_ttl`) before the append, and rolled back if the append
    /// fails. A zero `cache_ttl` skips the dedup cache entirely.
    ///
    /// [`Error::AlreadyExists`]: crate::Error::AlreadyExists
    async fn add_document(
        &self,
        queue: &str,
        document: &Document,
        cache_ttl: Duration,
    ) -> Result<()>;

    /// Blocks until a record is available, atomically moves it to the
    /// queue's processing list, installs a lock entry with the given ttl,
    /// and returns the lease.
    async fn get_document(&self, queue: &str, ttl: Duration) -> Result<Lease>;

    /// Refreshes the lock entry for a leased document.
    async fn renew_lock(&self, queue: &str, document_id: &str, ttl: Duration) -> Result<()>;

    /// Completes a work unit: removes the byte-equal record from the
    /// queue's processing list and deletes the lock entry. Failing to find
    /// the record is an error; the caller logs it and relies on bookkeep.
    async fn release_document(&self, queue: &str, lease: &Lease) -> Result<()>;

    /// Removes a specific record from a specific list. Bookkeeping uses
    /// this to evict stale processing-list copies after resurrection.
    async fn delete_document(&self, queue: &str, lease: &Lease) -> Result<()>;

    /// For each queue: purges dedup entries whose expiry has passed, and
    /// re-enqueues every processing-list record whose lock entry is gone
    /// (tail of the main queue, no dedup check), removing the stale copy.
    /// Errors are logged, never fatal.
    async fn bookkeep(&self, queues: &[&str]);
}
