#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod document;
mod error;
mod module;
pub mod params;
mod stopper;

pub use document::{Document, ProcessedData};
pub use error::{BoxedError, Error, Result};
pub use module::{
    InputModule, Lease, Module, ModuleConfig, ModuleRole, OutputModule, ProcessorModule,
    QueueModule, Registry,
};
pub use stopper::{Stopper, WorkerGuard};
