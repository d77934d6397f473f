//! padclust-algorithms: Cluster finding on pad-row detectors.
//!
//! The pipeline for one row of one module:
//! - **Signal grid** - dense per-module arena with guard cells
//! - **Peak finder** - local-maximum and threshold tests for seeds
//! - **Cluster builder** - 5x5 window with virtual charge for suppressed samples
//! - **Overlap resolver** - per-axis separation of charge shared with a neighbour
//! - **Emission** - absolute coordinates, physical shape, transform, edge tag
//!
//! [`Clusterer`] drives the pipeline over rows and modules for digit, raw
//! and externally clustered input, sequentially or module-parallel.
//!
pub mod baseline;
mod builder;
mod clusterer;
mod emission;
pub mod grid;
mod peak;
mod shape;
pub mod unfold;
pub mod virtual_charge;

pub use builder::{BuildOutcome, Candidate, ClusterBuilder, Rejection};
pub use clusterer::{Clusterer, ClustererState, EventContext, RowState};
pub use emission::{accepts, Emitter};
pub use grid::{RowView, SignalGrid, GUARD};
pub use peak::PeakFinder;
pub use shape::{ConstantShapeModel, DiffusionShapeModel, ShapeModel};

// Re-export core types used in the public API
pub use padclust_core::{ClusterStatistics, ClustererConfig, Pass};
