//! Scriptable input module.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use condor_core::{Document, Error, InputModule, ModuleConfig, Result, Stopper};
use tokio::sync::mpsc;

/// Input module that yields a scripted list of documents once and then
/// parks until shutdown.
///
/// Scrape results are scripted per document id; ids marked as failing
/// return an error on every scrape attempt.
#[derive(Default)]
pub struct MockInput {
    documents: Vec<Document>,
    content: HashMap<String, Bytes>,
    failing: Mutex<Vec<String>>,
    scrape_delay: Duration,
    list_calls: AtomicUsize,
    scrape_calls: AtomicUsize,
}

impl MockInput {
    /// Creates an input with no scripted documents.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts one document to be yielded by `list`.
    pub fn with_document(mut self, document: Document) -> Self {
        self.documents.push(document);
        self
    }

    /// Scripts the content returned when scraping a document id.
    pub fn with_content(mut self, id: impl Into<String>, content: impl Into<Bytes>) -> Self {
        self.content.insert(id.into(), content.into());
        self
    }

    /// Delays every scrape, keeping the stage action in flight long enough
    /// for tests to race shutdown against it.
    pub fn with_scrape_delay(mut self, delay: Duration) -> Self {
        self.scrape_delay = delay;
        self
    }

    /// Makes every scrape of the given id fail.
    pub fn fail_scrape(&self, id: impl Into<String>) {
        self.failing.lock().expect("mock state poisoned").push(id.into());
    }

    /// Number of times `list` has been invoked.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of scrape attempts across all documents.
    pub fn scrape_calls(&self) -> usize {
        self.scrape_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InputModule for MockInput {
    async fn configure(&self, _config: &ModuleConfig) -> Result<()> {
        Ok(())
    }

    async fn list(&self, stopper: Stopper, documents: mpsc::Sender<Document>) -> Result<()> {
        if self.list_calls.fetch_add(1, Ordering::SeqCst) == 0 {
            for document in &self.documents {
                if documents.send(document.clone()).await.is_err() {
                    return Ok(());
                }
            }
        }
        stopper.cancelled().await;
        Ok(())
    }

    async fn scrape(&self, document: &mut Document) -> Result<()> {
        self.scrape_calls.fetch_add(1, Ordering::SeqCst);
        if !self.scrape_delay.is_zero() {
            tokio::time::sleep(self.scrape_delay).await;
        }
        let failing = self.failing.lock().expect("mock state poisoned");
        if failing.iter().any(|id| *id == document.id) {
            return Err(Error::module("scripted scrape failure"));
        }
        match self.content.get(&document.id) {
            Some(content) => {
                document.content = content.clone();
                Ok(())
            }
            None => Err(Error::module("no scripted content for document")),
        }
    }
}
