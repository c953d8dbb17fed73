#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod output;

pub use output::ElasticOutput;

/// Tracing target for Elasticsearch operations.
pub const TRACING_TARGET: &str = "condor_elastic";
