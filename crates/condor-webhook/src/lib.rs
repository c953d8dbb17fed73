#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod output;

pub use output::WebhookOutput;

/// Tracing target for webhook delivery.
pub const TRACING_TARGET: &str = "condor_webhook";
