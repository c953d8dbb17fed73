#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod memory;
mod mock;

pub use memory::MemoryQueue;
pub use mock::{MockInput, MockOutput, MockProcessor};
