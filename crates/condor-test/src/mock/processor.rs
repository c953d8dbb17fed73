//! Scriptable processor module.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use condor_core::{Document, Error, ModuleConfig, ProcessorModule, Result, params};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct MockProcessorParams {
    score: u32,
}

/// Processor module that tags every document with a fixed result and
/// score, or fails on demand.
///
/// The score defaults to the constructor value and can be overridden
/// through the `score` param at configure time, exercising the same
/// binding path real processors use.
pub struct MockProcessor {
    name: String,
    score: AtomicU32,
    fail: AtomicBool,
    process_calls: AtomicUsize,
    processed_ids: Mutex<Vec<String>>,
}

impl MockProcessor {
    /// Creates a processor tagging results with `name` and assigning
    /// `score` to every document it sees.
    pub fn new(name: impl Into<String>, score: u32) -> Self {
        Self {
            name: name.into(),
            score: AtomicU32::new(score),
            fail: AtomicBool::new(false),
            process_calls: AtomicUsize::new(0),
            processed_ids: Mutex::new(Vec::new()),
        }
    }

    /// Number of `process` invocations, including failed ones.
    pub fn process_calls(&self) -> usize {
        self.process_calls.load(Ordering::SeqCst)
    }

    /// Makes every subsequent `process` call fail (or heal again).
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Document ids processed so far, in call order.
    pub fn processed_ids(&self) -> Vec<String> {
        self.processed_ids.lock().expect("mock state poisoned").clone()
    }
}

#[async_trait]
impl ProcessorModule for MockProcessor {
    async fn configure(&self, config: &ModuleConfig) -> Result<()> {
        let defaults = MockProcessorParams {
            score: self.score.load(Ordering::SeqCst),
        };
        let bound = params::bind(defaults, &config.params)?;
        self.score.store(bound.score, Ordering::SeqCst);
        Ok(())
    }

    async fn process(&self, document: &mut Document) -> Result<()> {
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::module("scripted processing failure"));
        }
        let score = self.score.load(Ordering::SeqCst);
        self.processed_ids
            .lock()
            .expect("mock state poisoned")
            .push(document.id.clone());
        document.append_result(
            self.name.clone(),
            serde_json::json!({ "rule": self.name, "score": score }),
        );
        document.raise_score(score);
        Ok(())
    }
}
