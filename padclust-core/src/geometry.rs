//! Narrow geometry interface.
//!
//! The clusterer needs only a handful of per-row and per-module numbers;
//! the full detector description lives elsewhere.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-row layout.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RowGeometry {
    /// Number of pads in the row.
    pub n_pads: u16,
    /// Pad pitch across the row (cm).
    pub pad_width: f32,
    /// Pad pitch along the radial direction (cm).
    pub pad_length: f32,
    /// Radial position of the row centre (cm).
    pub radius: f32,
}

/// Per-module drift description.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DriftGeometry {
    /// Full drift length (cm).
    pub drift_length: f32,
    /// Drift length per time bin (cm).
    pub time_bin_width: f32,
    /// Trigger latency in time bins.
    pub l1_delay_bins: f32,
    /// +1 or -1 depending on the detector side.
    pub z_sign: f32,
}

/// Geometry queries used by the clusterer.
pub trait Geometry: Send + Sync {
    /// Number of pad-rows of a module, `None` for unknown modules.
    fn n_rows(&self, module: u16) -> Option<u16>;

    /// Layout of one row.
    fn row(&self, module: u16, row: u16) -> Option<RowGeometry>;

    /// Drift description of a module.
    fn drift(&self, module: u16) -> Option<DriftGeometry>;

    /// Number of time bins delivered per channel.
    fn n_time_bins(&self) -> u16;

    /// Largest pad count over the rows of a module.
    fn max_pads(&self, module: u16) -> u16 {
        let n_rows = self.n_rows(module).unwrap_or(0);
        (0..n_rows)
            .filter_map(|row| self.row(module, row))
            .map(|r| r.n_pads)
            .max()
            .unwrap_or(0)
    }

    /// Pad count of every row of a module.
    fn pads_per_row(&self, module: u16) -> Vec<u16> {
        let n_rows = self.n_rows(module).unwrap_or(0);
        (0..n_rows)
            .map(|row| self.row(module, row).map_or(0, |r| r.n_pads))
            .collect()
    }
}

/// A detector made of identical trapezoidal modules whose pad count grows
/// linearly with the row index.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct UniformGeometry {
    pub n_modules: u16,
    pub n_rows: u16,
    pub pads_first_row: u16,
    /// Additional pads every second row.
    pub pads_increment: u16,
    pub pad_width: f32,
    pub pad_length: f32,
    pub first_row_radius: f32,
    pub drift_length: f32,
    pub time_bin_width: f32,
    pub l1_delay_bins: f32,
    pub n_time_bins: u16,
}

impl Default for UniformGeometry {
    fn default() -> Self {
        Self {
            n_modules: 36,
            n_rows: 63,
            pads_first_row: 68,
            pads_increment: 2,
            pad_width: 0.4,
            pad_length: 0.75,
            first_row_radius: 85.2,
            drift_length: 250.0,
            time_bin_width: 0.25,
            l1_delay_bins: 0.0,
            n_time_bins: 1000,
        }
    }
}

impl UniformGeometry {
    /// Small single-module geometry, convenient for synthetic data.
    #[must_use]
    pub fn single_module(n_rows: u16, n_pads: u16, n_time_bins: u16) -> Self {
        Self {
            n_modules: 1,
            n_rows,
            pads_first_row: n_pads,
            pads_increment: 0,
            n_time_bins,
            ..Self::default()
        }
    }
}

impl Geometry for UniformGeometry {
    fn n_rows(&self, module: u16) -> Option<u16> {
        (module < self.n_modules).then_some(self.n_rows)
    }

    fn row(&self, module: u16, row: u16) -> Option<RowGeometry> {
        if module >= self.n_modules || row >= self.n_rows {
            return None;
        }
        Some(RowGeometry {
            n_pads: self.pads_first_row + self.pads_increment * (row / 2),
            pad_width: self.pad_width,
            pad_length: self.pad_length,
            radius: self.first_row_radius + f32::from(row) * self.pad_length,
        })
    }

    fn drift(&self, module: u16) -> Option<DriftGeometry> {
        if module >= self.n_modules {
            return None;
        }
        let z_sign = if module < self.n_modules.div_ceil(2) {
            1.0
        } else {
            -1.0
        };
        Some(DriftGeometry {
            drift_length: self.drift_length,
            time_bin_width: self.time_bin_width,
            l1_delay_bins: self.l1_delay_bins,
            z_sign,
        })
    }

    fn n_time_bins(&self) -> u16 {
        self.n_time_bins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_rows() {
        let geom = UniformGeometry::default();
        assert_eq!(geom.n_rows(0), Some(63));
        assert_eq!(geom.n_rows(36), None);
        assert_eq!(geom.row(0, 0).unwrap().n_pads, 68);
        assert_eq!(geom.row(0, 3).unwrap().n_pads, 70);
        assert_eq!(geom.max_pads(0), 68 + 2 * 31);
        assert!(geom.row(0, 63).is_none());
    }

    #[test]
    fn test_detector_sides() {
        let geom = UniformGeometry::default();
        assert!((geom.drift(0).unwrap().z_sign - 1.0).abs() < f32::EPSILON);
        assert!((geom.drift(20).unwrap().z_sign + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_single_module() {
        let geom = UniformGeometry::single_module(4, 40, 200);
        assert_eq!(geom.pads_per_row(0), vec![40, 40, 40, 40]);
        assert_eq!(geom.n_time_bins(), 200);
        assert!(geom.drift(1).is_none());
    }
}
