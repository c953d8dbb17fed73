#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod actions;
mod bookkeeper;
mod config;
mod lister;
mod pipeline;
mod signal;
mod worker;

pub use actions::StageAction;
pub use config::{
    InputsConfig, OutputsConfig, PipelineConfig, ProcessorsConfig, QueuesConfig, ScrapersConfig,
    Timings,
};
pub use pipeline::{Pipeline, boot};

// Tracing target constants for consistent logging
pub const TRACING_TARGET_BOOT: &str = "condor_pipeline::boot";
pub const TRACING_TARGET_LISTER: &str = "condor_pipeline::lister";
pub const TRACING_TARGET_WORKER: &str = "condor_pipeline::worker";
pub const TRACING_TARGET_BOOKKEEPER: &str = "condor_pipeline::bookkeeper";

/// Queue holding freshly discovered documents awaiting scraping.
pub const QUEUE_LISTED: &str = "condor:listed";
/// Queue holding scraped documents awaiting processing.
pub const QUEUE_SCRAPED: &str = "condor:scraped";
/// Queue holding processed documents awaiting output delivery.
pub const QUEUE_PARSED: &str = "condor:parsed";

/// Every queue managed by the pipeline, in stage order.
pub const QUEUES: [&str; 3] = [QUEUE_LISTED, QUEUE_SCRAPED, QUEUE_PARSED];
