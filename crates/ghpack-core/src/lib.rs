//! Core library for ghpack.
//!
//! The archive pipeline lives under [`io`] (stream source, tar.gz extraction,
//! zip packaging) and is sequenced by [`pipeline::Pipeline`]. [`catalog`]
//! lists what has been materialized, [`forge`] talks to the hosting API and
//! [`export`] mirrors repository records to CSV.

pub mod catalog;
pub mod config;
pub mod export;
pub mod forge;
pub mod io;
pub mod lock;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use pipeline::{FailureKind, Pipeline, PipelineError, Stage};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("ghpack/", env!("CARGO_PKG_VERSION"));
