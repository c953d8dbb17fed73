#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod queue;

pub use queue::RedisQueue;

/// Tracing target for Redis queue operations.
pub const TRACING_TARGET: &str = "condor_redis";
