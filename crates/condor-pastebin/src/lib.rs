#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod input;
mod listing;

pub use input::PastebinInput;

/// Tracing target for pastebin operations.
pub const TRACING_TARGET: &str = "condor_pastebin";
