//! Pipeline assembly, startup, and graceful shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use condor_core::{Error, Registry, Result, Stopper};

use crate::actions::{OutputAction, ProcessAction, ScrapeAction, StageAction};
use crate::bookkeeper;
use crate::config::{PipelineConfig, Timings};
use crate::lister::Lister;
use crate::signal::shutdown_signal;
use crate::worker::StageWorker;
use crate::{QUEUE_LISTED, QUEUE_PARSED, QUEUE_SCRAPED, TRACING_TARGET_BOOT};

/// A running pipeline: every worker is spawned and accounted for by the
/// contained stopper.
pub struct Pipeline {
    stopper: Stopper,
}

impl Pipeline {
    /// Starts a pipeline with the production timings.
    pub async fn start(config: &PipelineConfig, registry: &Registry) -> Result<Self> {
        Self::start_with(config, registry, Timings::default()).await
    }

    /// Starts a pipeline with explicit timings.
    ///
    /// Configures every module named in the configuration (any failure is
    /// fatal), resolves the nominated queue module, and spawns the
    /// listers, the three stage pools, and the bookkeeper.
    pub async fn start_with(
        config: &PipelineConfig,
        registry: &Registry,
        timings: Timings,
    ) -> Result<Self> {
        let stopper = Stopper::new();

        for name in registry.names() {
            tracing::debug!(target: TRACING_TARGET_BOOT, module = %name, "module registered");
        }

        // Configure every module named in the configuration.
        for (handle, module_config) in &config.modules {
            tracing::debug!(target: TRACING_TARGET_BOOT, module = %handle, "configuring module");
            let module = registry.get(&module_config.driver)?;
            if let Err(error) = module.configure(module_config).await {
                tracing::error!(
                    target: TRACING_TARGET_BOOT,
                    module = %handle,
                    error = %error,
                    "failed to configure module"
                );
                return Err(error);
            }
        }

        // Resolve the nominated queue module and the per-stage module
        // tables, all keyed by handle name.
        let queue = registry.queue(driver(config, &config.queues.module)?)?;

        let mut inputs = HashMap::new();
        for handle in &config.inputs.modules {
            let input = registry.input(driver(config, handle)?)?;
            inputs.insert(handle.clone(), input);
        }

        let mut processors = Vec::new();
        for handle in &config.processors.modules {
            let processor = registry.processor(driver(config, handle)?)?;
            processors.push((handle.clone(), processor));
        }

        let mut outputs = Vec::new();
        for handle in &config.outputs.modules {
            let output = registry.output(driver(config, handle)?)?;
            outputs.push((handle.clone(), output));
        }

        // Listers.
        for (handle, input) in &inputs {
            let lister = Lister {
                stopper: stopper.clone(),
                queue: Arc::clone(&queue),
                input: Arc::clone(input),
                handle: handle.clone(),
                timings,
            };
            tokio::spawn(lister.run(stopper.begin()));
        }

        // Stage pools.
        let scrape_action: Arc<dyn StageAction> = Arc::new(ScrapeAction::new(inputs));
        for _ in 0..config.scrapers.threads {
            let worker = StageWorker {
                stopper: stopper.clone(),
                queue: Arc::clone(&queue),
                source: QUEUE_LISTED,
                destination: Some(QUEUE_SCRAPED),
                action: Arc::clone(&scrape_action),
                role: "scraper",
                timings,
            };
            tokio::spawn(worker.run(stopper.begin()));
        }

        let process_action: Arc<dyn StageAction> = Arc::new(ProcessAction::new(processors));
        for _ in 0..config.processors.threads {
            let worker = StageWorker {
                stopper: stopper.clone(),
                queue: Arc::clone(&queue),
                source: QUEUE_SCRAPED,
                destination: Some(QUEUE_PARSED),
                action: Arc::clone(&process_action),
                role: "processor",
                timings,
            };
            tokio::spawn(worker.run(stopper.begin()));
        }

        let output_action: Arc<dyn StageAction> = Arc::new(OutputAction::new(outputs));
        for _ in 0..config.outputs.threads {
            let worker = StageWorker {
                stopper: stopper.clone(),
                queue: Arc::clone(&queue),
                source: QUEUE_PARSED,
                destination: None,
                action: Arc::clone(&output_action),
                role: "output",
                timings,
            };
            tokio::spawn(worker.run(stopper.begin()));
        }

        // Bookkeeper.
        tokio::spawn(bookkeeper::run(
            stopper.clone(),
            Arc::clone(&queue),
            timings.bookkeep_period,
            stopper.begin(),
        ));

        Ok(Self { stopper })
    }

    /// Requests shutdown and waits for every worker to drain.
    pub async fn shutdown(&self) {
        tracing::info!(target: TRACING_TARGET_BOOT, "stopping pipeline");
        self.stopper.stop().await;
    }
}

/// Configures the registered modules, runs the pipeline, and drains it
/// gracefully on the first interrupt or terminate signal.
pub async fn boot(config: &PipelineConfig, registry: &Registry) -> Result<()> {
    let pipeline = Pipeline::start(config, registry).await?;
    tracing::info!(target: TRACING_TARGET_BOOT, "pipeline started");

    shutdown_signal().await;
    tracing::info!(
        target: TRACING_TARGET_BOOT,
        "received interruption, gracefully stopping"
    );
    pipeline.shutdown().await;
    Ok(())
}

/// Maps a configured handle name to its driver name.
fn driver<'a>(config: &'a PipelineConfig, handle: &str) -> Result<&'a str> {
    config
        .modules
        .get(handle)
        .map(|module_config| module_config.driver.as_str())
        .ok_or_else(|| Error::invalid_config(format!("module '{handle}' is not configured")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use condor_core::{Document, Module, QueueModule};
    use condor_test::{MemoryQueue, MockInput, MockOutput, MockProcessor};

    use super::*;
    use crate::QUEUES;

    fn fast_timings() -> Timings {
        Timings {
            lock_ttl: Duration::from_secs(2),
            listed_cache_ttl: Duration::from_secs(60),
            dequeue_backoff: Duration::from_millis(10),
            publish_backoff_max: Duration::from_millis(50),
            bookkeep_period: Duration::from_millis(25),
        }
    }

    async fn wait_for(what: &str, condition: impl Fn() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {what}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    struct Fixture {
        queue: Arc<MemoryQueue>,
        input: Arc<MockInput>,
        processor: Arc<MockProcessor>,
        output: Arc<MockOutput>,
        registry: Registry,
        config: PipelineConfig,
    }

    /// One input handle ("my-pastebin"), one processor handle ("yara"),
    /// one output handle ("index"), memory queue backend.
    fn fixture(input: MockInput, processor: MockProcessor, output: MockOutput) -> Fixture {
        let queue = Arc::new(MemoryQueue::new());
        let input = Arc::new(input);
        let processor = Arc::new(processor);
        let output = Arc::new(output);

        let mut registry = Registry::new();
        registry.register("memory", Module::Queue(queue.clone()));
        registry.register("mock-input", Module::Input(input.clone()));
        registry.register("mock-processor", Module::Processor(processor.clone()));
        registry.register("mock-output", Module::Output(output.clone()));

        let config: PipelineConfig = serde_json::from_value(serde_json::json!({
            "modules": {
                "queue": { "driver": "memory" },
                "my-pastebin": { "driver": "mock-input" },
                "yara": { "driver": "mock-processor" },
                "index": { "driver": "mock-output" },
            },
            "inputs": { "modules": ["my-pastebin"] },
            "queues": { "module": "queue" },
            "processors": { "modules": ["yara"], "threads": 1 },
            "outputs": { "modules": ["index"], "threads": 1 },
        }))
        .unwrap();

        Fixture {
            queue,
            input,
            processor,
            output,
            registry,
            config,
        }
    }

    fn drained(queue: &MemoryQueue) -> bool {
        QUEUES
            .iter()
            .all(|name| queue.queue_len(name) == 0 && queue.processing_len(name) == 0)
    }

    #[tokio::test]
    async fn happy_path_delivers_scored_document() {
        let fixture = fixture(
            MockInput::new()
                .with_document(Document::new("a1"))
                .with_content("a1", Bytes::from_static(b"hello")),
            MockProcessor::new("yara", 50),
            MockOutput::new(),
        );
        let mut config = fixture.config.clone();
        config
            .modules
            .get_mut("index")
            .unwrap()
            .params
            .insert("min_score".into(), 10.into());

        let pipeline = Pipeline::start_with(&config, &fixture.registry, fast_timings())
            .await
            .unwrap();
        wait_for("document delivery", || fixture.output.received().len() == 1).await;
        wait_for("queue drain", || drained(&fixture.queue)).await;
        pipeline.shutdown().await;

        let received = fixture.output.received();
        assert_eq!(received.len(), 1);
        let document = &received[0];
        assert_eq!(document.id, "a1");
        assert_eq!(document.score, 50);
        assert_eq!(document.content, Bytes::from_static(b"hello"));
        assert_eq!(document.input_module_name, "my-pastebin");
        assert_eq!(document.processed.len(), 1);
        assert_eq!(document.processed[0].module, "yara");
    }

    #[tokio::test]
    async fn duplicate_listing_is_suppressed_within_cache_window() {
        let fixture = fixture(
            MockInput::new()
                .with_document(Document::new("a1"))
                .with_document(Document::new("a1"))
                .with_content("a1", Bytes::from_static(b"hello")),
            MockProcessor::new("yara", 50),
            MockOutput::new(),
        );

        let pipeline =
            Pipeline::start_with(&fixture.config, &fixture.registry, fast_timings())
                .await
                .unwrap();
        wait_for("document delivery", || !fixture.output.received().is_empty()).await;
        wait_for("queue drain", || drained(&fixture.queue)).await;
        pipeline.shutdown().await;

        assert_eq!(fixture.output.received().len(), 1);
        assert!(fixture.queue.cache_contains(QUEUE_LISTED, "a1"));
    }

    #[tokio::test]
    async fn failing_processor_keeps_the_document_retrievable() {
        let fixture = fixture(
            MockInput::new()
                .with_document(Document::new("a1"))
                .with_content("a1", Bytes::from_static(b"hello")),
            MockProcessor::new("yara", 50),
            MockOutput::new(),
        );
        fixture.processor.set_fail(true);

        let pipeline =
            Pipeline::start_with(&fixture.config, &fixture.registry, fast_timings())
                .await
                .unwrap();
        wait_for("first processing attempt", || {
            fixture.processor.process_calls() >= 1
        })
        .await;

        // Simulated crash: the lease lapses, the bookkeeper resurrects the
        // document, and another attempt follows.
        fixture.queue.drop_lock(QUEUE_SCRAPED, "a1");
        wait_for("retry after resurrection", || {
            fixture.processor.process_calls() >= 2
        })
        .await;
        pipeline.shutdown().await;

        // The document never advanced and never disappeared.
        assert!(fixture.output.received().is_empty());
        assert_eq!(fixture.queue.queue_len(QUEUE_PARSED), 0);
        assert_eq!(fixture.queue.processing_len(QUEUE_PARSED), 0);
        let retrievable = fixture.queue.queue_len(QUEUE_SCRAPED)
            + fixture.queue.processing_len(QUEUE_SCRAPED);
        assert_eq!(retrievable, 1);
    }

    #[tokio::test]
    async fn shutdown_mid_scrape_never_loses_the_document() {
        let fixture = fixture(
            MockInput::new()
                .with_document(Document::new("a1"))
                .with_content("a1", Bytes::from_static(b"hello"))
                .with_scrape_delay(Duration::from_millis(500)),
            MockProcessor::new("yara", 50),
            MockOutput::new(),
        );
        // Pin the document at the scraped queue so the assertion below is
        // not racing the downstream stages.
        fixture.processor.set_fail(true);

        let pipeline =
            Pipeline::start_with(&fixture.config, &fixture.registry, fast_timings())
                .await
                .unwrap();
        wait_for("scrape in flight", || fixture.input.scrape_calls() >= 1).await;
        pipeline.shutdown().await;

        // The document is either still on the listed queue (scrape was cut
        // short) or fully moved to the scraped queue; in no case did it
        // vanish mid-transition.
        let on_listed = fixture.queue.queue_len(QUEUE_LISTED)
            + fixture.queue.processing_len(QUEUE_LISTED);
        let on_scraped = fixture.queue.queue_len(QUEUE_SCRAPED)
            + fixture.queue.processing_len(QUEUE_SCRAPED);
        assert_eq!(
            on_listed + on_scraped,
            1,
            "document must survive shutdown on exactly one queue"
        );
    }

    #[tokio::test]
    async fn low_score_documents_are_filtered_but_released() {
        let fixture = fixture(
            MockInput::new()
                .with_document(Document::new("a1"))
                .with_content("a1", Bytes::from_static(b"hello")),
            MockProcessor::new("yara", 5),
            MockOutput::new(),
        );
        let mut config = fixture.config.clone();
        config
            .modules
            .get_mut("index")
            .unwrap()
            .params
            .insert("min_score".into(), 10.into());

        let pipeline = Pipeline::start_with(&config, &fixture.registry, fast_timings())
            .await
            .unwrap();
        wait_for("output invocation", || fixture.output.send_calls() >= 1).await;
        wait_for("queue drain", || drained(&fixture.queue)).await;
        pipeline.shutdown().await;

        // Invoked but skipped, and the document still left the parsed
        // queue for good.
        assert!(fixture.output.received().is_empty());
    }

    #[tokio::test]
    async fn bookkeeper_prunes_expired_cache_entries() {
        let fixture = fixture(
            MockInput::new()
                .with_document(Document::new("a1"))
                .with_content("a1", Bytes::from_static(b"hello")),
            MockProcessor::new("yara", 50),
            MockOutput::new(),
        );

        let pipeline =
            Pipeline::start_with(&fixture.config, &fixture.registry, fast_timings())
                .await
                .unwrap();
        wait_for("document delivery", || fixture.output.received().len() == 1).await;
        assert!(fixture.queue.cache_contains(QUEUE_LISTED, "a1"));

        fixture.queue.expire_cache_entry(QUEUE_LISTED, "a1");
        wait_for("cache prune", || {
            !fixture.queue.cache_contains(QUEUE_LISTED, "a1")
        })
        .await;

        // The same id can be listed again now that the window has passed.
        fixture
            .queue
            .add_document(QUEUE_LISTED, &Document::new("a1"), Duration::from_secs(60))
            .await
            .unwrap();
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn lease_renewal_keeps_other_workers_off_the_document() {
        let fixture = fixture(
            MockInput::new()
                .with_document(Document::new("a1"))
                .with_content("a1", Bytes::from_static(b"hello"))
                .with_scrape_delay(Duration::from_millis(700)),
            MockProcessor::new("yara", 50),
            MockOutput::new(),
        );
        let mut config = fixture.config.clone();
        config.scrapers.threads = 2;

        // A lease far shorter than the scrape: only renewals keep the
        // second scraper from stealing the document.
        let timings = Timings {
            lock_ttl: Duration::from_millis(400),
            ..fast_timings()
        };
        let pipeline = Pipeline::start_with(&config, &fixture.registry, timings)
            .await
            .unwrap();
        wait_for("document delivery", || fixture.output.received().len() == 1).await;
        pipeline.shutdown().await;

        assert_eq!(fixture.input.scrape_calls(), 1);
        assert_eq!(fixture.output.received().len(), 1);
    }

    #[tokio::test]
    async fn output_failure_retries_until_healed() {
        let fixture = fixture(
            MockInput::new()
                .with_document(Document::new("a1"))
                .with_content("a1", Bytes::from_static(b"hello")),
            MockProcessor::new("yara", 50),
            MockOutput::new(),
        );
        fixture.output.set_fail(true);

        let timings = Timings {
            lock_ttl: Duration::from_millis(300),
            ..fast_timings()
        };
        let pipeline =
            Pipeline::start_with(&fixture.config, &fixture.registry, timings)
                .await
                .unwrap();
        wait_for("first delivery attempt", || fixture.output.send_calls() >= 1).await;

        // Once the sink heals, the lapsed lease brings the document back.
        fixture.output.set_fail(false);
        fixture.queue.drop_lock(QUEUE_PARSED, "a1");
        wait_for("delivery after retry", || fixture.output.received().len() == 1).await;
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn processors_run_in_declaration_order() {
        let queue = Arc::new(MemoryQueue::new());
        let input = Arc::new(
            MockInput::new()
                .with_document(Document::new("a1"))
                .with_content("a1", Bytes::from_static(b"hello")),
        );
        let alpha = Arc::new(MockProcessor::new("alpha", 30));
        let beta = Arc::new(MockProcessor::new("beta", 20));
        let output = Arc::new(MockOutput::new());

        let mut registry = Registry::new();
        registry.register("memory", Module::Queue(queue.clone()));
        registry.register("mock-input", Module::Input(input.clone()));
        registry.register("alpha", Module::Processor(alpha.clone()));
        registry.register("beta", Module::Processor(beta.clone()));
        registry.register("mock-output", Module::Output(output.clone()));

        let config: PipelineConfig = serde_json::from_value(serde_json::json!({
            "modules": {
                "queue": { "driver": "memory" },
                "my-pastebin": { "driver": "mock-input" },
                "alpha": { "driver": "alpha" },
                "beta": { "driver": "beta" },
                "index": { "driver": "mock-output" },
            },
            "inputs": { "modules": ["my-pastebin"] },
            "queues": { "module": "queue" },
            "processors": { "modules": ["alpha", "beta"] },
            "outputs": { "modules": ["index"] },
        }))
        .unwrap();

        let pipeline = Pipeline::start_with(&config, &registry, fast_timings())
            .await
            .unwrap();
        wait_for("document delivery", || output.received().len() == 1).await;
        pipeline.shutdown().await;

        let received = output.received();
        let modules: Vec<_> = received[0]
            .processed
            .iter()
            .map(|result| result.module.as_str())
            .collect();
        assert_eq!(modules, ["alpha", "beta"]);
        // The score is the maximum across the chain, not the last value.
        assert_eq!(received[0].score, 30);
    }

    #[tokio::test]
    async fn missing_module_configuration_is_fatal() {
        let fixture = fixture(
            MockInput::new(),
            MockProcessor::new("yara", 50),
            MockOutput::new(),
        );
        let mut config = fixture.config.clone();
        config.queues.module = "ghost".into();

        let result = Pipeline::start_with(&config, &fixture.registry, fast_timings()).await;
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn wrong_role_nomination_is_fatal() {
        let fixture = fixture(
            MockInput::new(),
            MockProcessor::new("yara", 50),
            MockOutput::new(),
        );
        let mut config = fixture.config.clone();
        // Nominate the processor handle as the queue backend.
        config.queues.module = "yara".into();

        let result = Pipeline::start_with(&config, &fixture.registry, fast_timings()).await;
        assert!(matches!(result, Err(Error::WrongRole { .. })));
    }

    #[tokio::test]
    async fn unknown_params_fail_module_configuration() {
        let fixture = fixture(
            MockInput::new(),
            MockProcessor::new("yara", 50),
            MockOutput::new(),
        );
        let mut config = fixture.config.clone();
        config
            .modules
            .get_mut("index")
            .unwrap()
            .params
            .insert("min_scor".into(), 10.into());

        let result = Pipeline::start_with(&config, &fixture.registry, fast_timings()).await;
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }
}
