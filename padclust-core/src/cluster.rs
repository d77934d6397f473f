//! Cluster record and its type-code encoding.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Label value for "no provenance".
pub const NO_LABEL: i32 = -1;

/// Offset between the unfolding overlap percentage and its type code.
const UNFOLDED_CODE_OFFSET: i16 = 4;

/// Offset applied (after negation) to tag edge clusters.
const EDGE_CODE_OFFSET: i16 = 3;

/// Reconstruction kind of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClusterType {
    /// Centre of gravity of the reconstructed 5x5 window.
    #[default]
    Plain,
    /// Charge shared with a neighbouring deposit was separated.
    Unfolded {
        /// Estimated share of the window charge belonging to the neighbour, in percent.
        overlap: u8,
    },
}

impl ClusterType {
    /// Type code without the edge tag.
    #[must_use]
    pub fn base_code(self) -> i16 {
        match self {
            ClusterType::Plain => 0,
            ClusterType::Unfolded { overlap } => i16::from(overlap) + UNFOLDED_CODE_OFFSET,
        }
    }

    /// Type code, negated and shifted when the cluster touches the module boundary.
    #[must_use]
    pub fn code(self, edge: bool) -> i16 {
        let base = self.base_code();
        if edge {
            -(base + EDGE_CODE_OFFSET)
        } else {
            base
        }
    }

    /// Decodes a type code into the kind and the edge flag.
    ///
    /// Returns `None` for codes that no cluster can carry.
    #[must_use]
    pub fn from_code(code: i16) -> Option<(Self, bool)> {
        let (base, edge) = if code < 0 {
            (-code - EDGE_CODE_OFFSET, true)
        } else {
            (code, false)
        };
        match base {
            0 => Some((ClusterType::Plain, edge)),
            b if (UNFOLDED_CODE_OFFSET..=UNFOLDED_CODE_OFFSET + 100).contains(&b) => {
                let overlap = u8::try_from(b - UNFOLDED_CODE_OFFSET).ok()?;
                Some((ClusterType::Unfolded { overlap }, edge))
            }
            _ => None,
        }
    }

    /// Returns true for unfolded clusters.
    #[must_use]
    pub fn is_unfolded(self) -> bool {
        matches!(self, ClusterType::Unfolded { .. })
    }
}

/// Position in the transformed (spatial) frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpacePoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// A reconstructed two-dimensional charge deposit.
///
/// Before emission `pad`/`time_bin` are in sample units and the shape
/// moments are variances in samples squared; the emission stage rescales
/// the moments to physical units (cm²) and may attach spatial coordinates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cluster {
    /// Module (sector/chamber) id.
    pub module: u16,
    /// Pad-row within the module.
    pub row: u16,
    /// Fractional pad position.
    pub pad: f32,
    /// Fractional time-bin position.
    pub time_bin: f32,
    /// Total charge.
    pub q: f32,
    /// Peak (seed) charge.
    pub q_max: f32,
    /// Variance along the pad direction.
    pub sigma_y2: f32,
    /// Variance along the drift direction.
    pub sigma_z2: f32,
    /// Reconstruction kind.
    pub kind: ClusterType,
    /// Cluster touches the module boundary.
    pub edge: bool,
    /// Up to three provenance labels ([`NO_LABEL`] when absent).
    pub labels: [i32; 3],
    /// Spatial coordinates, once transformed.
    pub position: Option<SpacePoint>,
}

impl Default for Cluster {
    fn default() -> Self {
        Self {
            module: 0,
            row: 0,
            pad: 0.0,
            time_bin: 0.0,
            q: 0.0,
            q_max: 0.0,
            sigma_y2: 0.0,
            sigma_z2: 0.0,
            kind: ClusterType::Plain,
            edge: false,
            labels: [NO_LABEL; 3],
            position: None,
        }
    }
}

impl Cluster {
    /// Creates a cluster at the given location with charge only.
    #[must_use]
    pub fn new(module: u16, row: u16, pad: f32, time_bin: f32, q: f32, q_max: f32) -> Self {
        Self {
            module,
            row,
            pad,
            time_bin,
            q,
            q_max,
            ..Default::default()
        }
    }

    /// Sets the shape moments.
    #[must_use]
    pub fn with_shape(mut self, sigma_y2: f32, sigma_z2: f32) -> Self {
        self.sigma_y2 = sigma_y2;
        self.sigma_z2 = sigma_z2;
        self
    }

    /// Sets the reconstruction kind.
    #[must_use]
    pub fn with_kind(mut self, kind: ClusterType) -> Self {
        self.kind = kind;
        self
    }

    /// Combined type code (kind and edge tag).
    #[must_use]
    pub fn type_code(&self) -> i16 {
        self.kind.code(self.edge)
    }

    /// Returns true if at least one provenance label is attached.
    #[must_use]
    pub fn has_labels(&self) -> bool {
        self.labels.iter().any(|&l| l != NO_LABEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_codes() {
        assert_eq!(ClusterType::Plain.code(false), 0);
        assert_eq!(ClusterType::Plain.code(true), -3);
        assert_eq!(ClusterType::from_code(-3), Some((ClusterType::Plain, true)));
    }

    #[test]
    fn test_unfolded_codes() {
        let kind = ClusterType::Unfolded { overlap: 17 };
        assert_eq!(kind.code(false), 21);
        assert_eq!(kind.code(true), -24);
        assert_eq!(ClusterType::from_code(21), Some((kind, false)));
        assert_eq!(ClusterType::from_code(-24), Some((kind, true)));
    }

    #[test]
    fn test_invalid_codes() {
        assert_eq!(ClusterType::from_code(2), None);
        assert_eq!(ClusterType::from_code(105), None);
        assert_eq!(ClusterType::from_code(-1), None);
    }

    #[test]
    fn test_cluster_defaults() {
        let cluster = Cluster::new(1, 2, 10.5, 100.25, 250.0, 80.0).with_shape(0.1, 0.2);
        assert_eq!(cluster.type_code(), 0);
        assert!(!cluster.has_labels());
        assert!(cluster.position.is_none());
        assert!((cluster.sigma_z2 - 0.2).abs() < f32::EPSILON);
    }
}
