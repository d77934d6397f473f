//! padclust-io: File I/O and configuration for padclust.
//!
//! This crate provides the memory-mapped raw-stream reader (via memmap2)
//! and its writer, CSV and binary cluster writers, and the JSON run
//! configuration loader.
//!

pub mod config;
mod error;
mod raw;
mod writer;

pub use config::{CalibrationSettings, DriftSettings, RunConfig};
pub use error::{Error, Result};
pub use raw::{
    MappedFileReader, ModuleSummary, RawFileReader, RawFileWriter, RawRecord, RawSummary,
    RAW_MAGIC, RAW_RECORD_SIZE,
};
pub use writer::{ClusterFileWriter, OutputFormat, BINARY_CLUSTER_SIZE};
