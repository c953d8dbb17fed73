//! Scriptable output module.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use condor_core::{Document, Error, ModuleConfig, OutputModule, Result, params};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct MockOutputParams {
    min_score: u32,
}

/// Output module that records every document it accepts.
///
/// Documents below `min_score` are skipped without error, matching the
/// filtering contract of real sinks. `send` can be scripted to fail.
#[derive(Default)]
pub struct MockOutput {
    min_score: AtomicU32,
    fail: AtomicBool,
    send_calls: AtomicUsize,
    received: Mutex<Vec<Document>>,
}

impl MockOutput {
    /// Creates an output accepting every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `send` call fail (or heal again).
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Documents accepted so far, in delivery order.
    pub fn received(&self) -> Vec<Document> {
        self.received.lock().expect("mock state poisoned").clone()
    }

    /// Number of `send` invocations, including skipped and failed ones.
    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OutputModule for MockOutput {
    async fn configure(&self, config: &ModuleConfig) -> Result<()> {
        let defaults = MockOutputParams {
            min_score: self.min_score.load(Ordering::SeqCst),
        };
        let bound = params::bind(defaults, &config.params)?;
        self.min_score.store(bound.min_score, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, document: &Document) -> Result<()> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::module("scripted delivery failure"));
        }
        if document.score < self.min_score.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.received
            .lock()
            .expect("mock state poisoned")
            .push(document.clone());
        Ok(())
    }
}
