//! Per-document actions bound to the stage workers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use condor_core::{Document, Error, InputModule, OutputModule, ProcessorModule, Result};

use crate::TRACING_TARGET_WORKER;

/// One stage's per-document work.
///
/// A failing action leaves the document unreleased; its lease lapses and
/// bookkeeping resurrects it for another attempt.
#[async_trait]
pub trait StageAction: Send + Sync {
    /// Runs the action against one leased document.
    async fn run(&self, document: &mut Document) -> Result<()>;
}

/// Resolves the originating input module and fetches the content.
pub(crate) struct ScrapeAction {
    inputs: HashMap<String, Arc<dyn InputModule>>,
}

impl ScrapeAction {
    pub(crate) fn new(inputs: HashMap<String, Arc<dyn InputModule>>) -> Self {
        Self { inputs }
    }
}

#[async_trait]
impl StageAction for ScrapeAction {
    async fn run(&self, document: &mut Document) -> Result<()> {
        let Some(input) = self.inputs.get(&document.input_module_name) else {
            tracing::warn!(
                target: TRACING_TARGET_WORKER,
                module = %document.input_module_name,
                item_id = %document.id,
                "document references an unconfigured input module"
            );
            return Err(Error::ModuleNotFound {
                name: document.input_module_name.clone(),
            });
        };

        if let Err(error) = input.scrape(document).await {
            tracing::error!(
                target: TRACING_TARGET_WORKER,
                module = %document.input_module_name,
                item_id = %document.id,
                error = %error,
                "scraping failed"
            );
            return Err(Error::module("scraping failed"));
        }
        tracing::debug!(
            target: TRACING_TARGET_WORKER,
            module = %document.input_module_name,
            item_id = %document.id,
            "scraped document"
        );
        Ok(())
    }
}

/// Pipes the document through every configured processor in order.
pub(crate) struct ProcessAction {
    processors: Vec<(String, Arc<dyn ProcessorModule>)>,
}

impl ProcessAction {
    pub(crate) fn new(processors: Vec<(String, Arc<dyn ProcessorModule>)>) -> Self {
        Self { processors }
    }
}

#[async_trait]
impl StageAction for ProcessAction {
    async fn run(&self, document: &mut Document) -> Result<()> {
        for (name, processor) in &self.processors {
            if let Err(error) = processor.process(document).await {
                tracing::error!(
                    target: TRACING_TARGET_WORKER,
                    module = %name,
                    item_id = %document.id,
                    error = %error,
                    "processing failed"
                );
                return Err(Error::module("processing failed"));
            }
            tracing::debug!(
                target: TRACING_TARGET_WORKER,
                module = %name,
                item_id = %document.id,
                "processed document"
            );
        }
        Ok(())
    }
}

/// Fans the document out to every configured output in order.
pub(crate) struct OutputAction {
    outputs: Vec<(String, Arc<dyn OutputModule>)>,
}

impl OutputAction {
    pub(crate) fn new(outputs: Vec<(String, Arc<dyn OutputModule>)>) -> Self {
        Self { outputs }
    }
}

#[async_trait]
impl StageAction for OutputAction {
    async fn run(&self, document: &mut Document) -> Result<()> {
        for (name, output) in &self.outputs {
            if let Err(error) = output.send(document).await {
                tracing::error!(
                    target: TRACING_TARGET_WORKER,
                    module = %name,
                    item_id = %document.id,
                    error = %error,
                    "output failed"
                );
                return Err(Error::module("output failed"));
            }
            tracing::debug!(
                target: TRACING_TARGET_WORKER,
                module = %name,
                item_id = %document.id,
                "sent document"
            );
        }
        Ok(())
    }
}
