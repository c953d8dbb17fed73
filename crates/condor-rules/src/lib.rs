#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod processor;

pub use processor::RulesProcessor;

/// Tracing target for rule scanning.
pub const TRACING_TARGET: &str = "condor_rules";
