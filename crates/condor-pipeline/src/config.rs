//! Pipeline configuration.

use std::collections::HashMap;
use std::time::Duration;

use condor_core::ModuleConfig;
use serde::{Deserialize, Serialize};

/// Complete pipeline configuration.
///
/// `modules` maps user-chosen handle names to driver configurations; the
/// stage sections reference those handles. The nominated queue module and
/// every referenced handle must resolve against the registry at boot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Handle name to driver configuration.
    pub modules: HashMap<String, ModuleConfig>,
    /// Input stage settings.
    pub inputs: InputsConfig,
    /// Queue backend nomination.
    pub queues: QueuesConfig,
    /// Scraper stage settings.
    pub scrapers: ScrapersConfig,
    /// Processor stage settings.
    pub processors: ProcessorsConfig,
    /// Output stage settings.
    pub outputs: OutputsConfig,
}

/// Input stage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputsConfig {
    /// Handles of the input modules to run listers for.
    pub modules: Vec<String>,
}

/// Queue backend nomination.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueuesConfig {
    /// Handle of the queue module shared by every worker.
    pub module: String,
}

/// Scraper stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapersConfig {
    /// Number of scraper workers.
    pub threads: usize,
}

impl Default for ScrapersConfig {
    fn default() -> Self {
        Self { threads: 1 }
    }
}

/// Processor stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorsConfig {
    /// Handles of the processor modules, run in declaration order.
    pub modules: Vec<String>,
    /// Number of processor workers.
    pub threads: usize,
}

impl Default for ProcessorsConfig {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
            threads: 1,
        }
    }
}

/// Output stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputsConfig {
    /// Handles of the output modules, run in declaration order.
    pub modules: Vec<String>,
    /// Number of output workers.
    pub threads: usize,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
            threads: 1,
        }
    }
}

/// Operational periods of the pipeline workers.
///
/// The defaults are the production values; tests shrink them to keep
/// scenarios fast.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// Lease duration installed on dequeue and refreshed by the worker.
    pub lock_ttl: Duration,
    /// Dedup window for documents entering the listed queue.
    pub listed_cache_ttl: Duration,
    /// Pause after a failed dequeue before the next attempt.
    pub dequeue_backoff: Duration,
    /// Upper bound for the lister's exponential publish backoff.
    pub publish_backoff_max: Duration,
    /// Interval between bookkeeping passes.
    pub bookkeep_period: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(180),
            listed_cache_ttl: Duration::from_secs(10 * 60),
            dequeue_backoff: Duration::from_secs(5),
            publish_backoff_max: Duration::from_secs(15),
            bookkeep_period: Duration::from_secs(60),
        }
    }
}

impl Timings {
    /// Period at which a worker refreshes its lease: 0.9 of the lock ttl,
    /// guaranteeing a renewal attempt inside every lease window.
    pub fn relock_period(&self) -> Duration {
        self.lock_ttl.mul_f64(0.9).max(Duration::from_millis(1))
    }
}
