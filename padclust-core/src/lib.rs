//! padclust-core: Core types and traits for pad-row cluster finding.
//!
//! This crate provides the cluster record and its type-code encoding,
//! the clusterer configuration, the read-only calibration context,
//! the narrow geometry and coordinate-transform interfaces, and the
//! input/output containers shared by the algorithms and I/O crates.
//!

pub mod calibration;
pub mod cluster;
pub mod config;
pub mod error;
pub mod geometry;
pub mod input;
pub mod output;
pub mod statistics;
pub mod transform;

pub use calibration::{CalibrationSet, ChannelMap, ModuleCalibration, RunStamp};
pub use cluster::{Cluster, ClusterType, SpacePoint, NO_LABEL};
pub use config::{ClustererConfig, Pass};
pub use error::{Error, Result};
pub use geometry::{DriftGeometry, Geometry, RowGeometry, UniformGeometry};
pub use input::{
    Digit, DigitEvent, DigitSource, ExternalCluster, ExternalClusters, RawEvent, RawLink,
    RawSample, RawSource, RowDigits,
};
pub use output::{ClusterContainer, ClusterSink};
pub use statistics::ClusterStatistics;
pub use transform::{
    CorrectionSource, Corrections, DriftTransform, IdentityTransform, StaticCorrections,
    Transform,
};
