//! Seed to cluster candidate.
#![allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]

use crate::grid::RowView;
use crate::shape::ShapeModel;
use crate::unfold::{unfold, wide_window};
use crate::virtual_charge::{build_window, moments};
use padclust_core::{ClusterType, ClustererConfig, DriftGeometry, Pass, RowGeometry};

/// A cluster in seed-relative coordinates, before emission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Pad of the seed sample.
    pub seed_pad: u16,
    /// Time bin of the seed sample.
    pub seed_time_bin: u16,
    /// Pad offset of the centre of gravity from the seed.
    pub d_pad: f32,
    /// Time offset of the centre of gravity from the seed.
    pub d_time: f32,
    pub q: f32,
    pub q_max: f32,
    /// Pad variance, in pads squared.
    pub var_pad: f32,
    /// Time variance, in time bins squared.
    pub var_time: f32,
    pub kind: ClusterType,
}

/// Why a seed did not become a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The window holds no charge.
    Empty,
    /// Narrower than a single deposit can be (second pass only).
    TooNarrow,
}

/// Outcome of building one seed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BuildOutcome {
    Accepted(Candidate),
    Rejected(Rejection),
}

/// Builds candidates from seeds of one row.
pub struct ClusterBuilder<'a> {
    config: &'a ClustererConfig,
    shape: &'a dyn ShapeModel,
    row: RowGeometry,
    drift: DriftGeometry,
}

impl<'a> ClusterBuilder<'a> {
    #[must_use]
    pub fn new(
        config: &'a ClustererConfig,
        shape: &'a dyn ShapeModel,
        row: RowGeometry,
        drift: DriftGeometry,
    ) -> Self {
        Self {
            config,
            shape,
            row,
            drift,
        }
    }

    /// Reconstructs the window around `idx` and decides between a plain
    /// and an unfolded candidate.
    #[must_use]
    pub fn build(&self, view: &RowView<'_>, idx: usize, pass: Pass) -> BuildOutcome {
        let seed_pad = view.pad_of(idx) as u16;
        let seed_time_bin = view.time_of(idx) as u16;
        let q_max = view.at(idx);

        let expected = self
            .shape
            .expected(&self.row, &self.drift, f32::from(seed_time_bin));
        let window = build_window(view, idx, self.config, pass, expected);
        let m = moments(&window);
        if m.sum <= 0.0 {
            return BuildOutcome::Rejected(Rejection::Empty);
        }

        let ratio = |var: f32, exp: f32| if exp > 0.0 { var / exp } else { 1.0 };
        let ratio_pad = ratio(m.var_pad, expected.0);
        let ratio_time = ratio(m.var_time, expected.1);

        if pass == Pass::Second {
            let min = self.config.min_shape_ratio_second_pass;
            if ratio_pad < min || ratio_time < min {
                return BuildOutcome::Rejected(Rejection::TooNarrow);
            }
        }

        let mut candidate = Candidate {
            seed_pad,
            seed_time_bin,
            d_pad: m.mean_pad,
            d_time: m.mean_time,
            q: m.sum,
            q_max,
            var_pad: m.var_pad,
            var_time: m.var_time,
            kind: ClusterType::Plain,
        };

        let max = self.config.max_shape_ratio;
        let single = ratio_pad < max && ratio_time < max;
        if single || !self.config.unfold {
            return BuildOutcome::Accepted(candidate);
        }

        let unfolded = unfold(&wide_window(view, idx));
        candidate.d_pad = unfolded.mean_pad;
        candidate.d_time = unfolded.mean_time;
        candidate.q = unfolded.charge.max(q_max);
        let shape = moments(&unfolded.matrix);
        if shape.sum > 0.0 {
            candidate.var_pad = shape.var_pad;
            candidate.var_time = shape.var_time;
        }
        candidate.kind = ClusterType::Unfolded {
            overlap: unfolded.overlap,
        };
        BuildOutcome::Accepted(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SignalGrid;
    use crate::shape::ConstantShapeModel;
    use approx::assert_relative_eq;

    fn geometry() -> (RowGeometry, DriftGeometry) {
        (
            RowGeometry {
                n_pads: 40,
                pad_width: 0.4,
                pad_length: 0.75,
                radius: 100.0,
            },
            DriftGeometry {
                drift_length: 250.0,
                time_bin_width: 0.25,
                l1_delay_bins: 0.0,
                z_sign: 1.0,
            },
        )
    }

    fn deposit(grid: &mut SignalGrid, pad: f32, time: f32, sigma2: f32, amp: f32) {
        for p in 0..40u16 {
            for t in 0..60u16 {
                let dp = f32::from(p) - pad;
                let dt = f32::from(t) - time;
                let v = amp * (-(dp * dp + dt * dt) / (2.0 * sigma2)).exp();
                if v >= 1.0 {
                    let idx = grid.index(0, p, t).unwrap();
                    let prev = grid.row(0).at(idx);
                    grid.set(0, p, t, prev + v);
                }
            }
        }
    }

    #[test]
    fn test_plain_candidate() {
        let cfg = ClustererConfig::default();
        let shape = ConstantShapeModel::new(0.49, 0.49);
        let (row, drift) = geometry();
        let mut grid = SignalGrid::new(&[40], 60);
        deposit(&mut grid, 20.0, 30.0, 0.49, 1000.0);
        let idx = grid.index(0, 20, 30).unwrap();

        let builder = ClusterBuilder::new(&cfg, &shape, row, drift);
        let BuildOutcome::Accepted(c) = builder.build(&grid.row(0), idx, Pass::First) else {
            panic!("seed rejected");
        };
        assert_eq!(c.kind, ClusterType::Plain);
        assert_eq!((c.seed_pad, c.seed_time_bin), (20, 30));
        assert_relative_eq!(c.d_pad, 0.0, epsilon = 1e-5);
        assert_relative_eq!(c.d_time, 0.0, epsilon = 1e-5);
        assert_relative_eq!(c.var_pad, 0.49, max_relative = 0.02);
        assert!(c.q >= c.q_max);
    }

    #[test]
    fn test_wide_candidate_unfolds() {
        let cfg = ClustererConfig::default();
        let shape = ConstantShapeModel::new(0.49, 0.49);
        let (row, drift) = geometry();
        let mut grid = SignalGrid::new(&[40], 60);
        deposit(&mut grid, 20.0, 30.0, 0.49, 1000.0);
        deposit(&mut grid, 22.0, 30.0, 0.49, 1000.0);
        let idx = grid.index(0, 20, 30).unwrap();
        let view = grid.row(0);

        let builder = ClusterBuilder::new(&cfg, &shape, row, drift);
        let BuildOutcome::Accepted(unfolded) = builder.build(&view, idx, Pass::First) else {
            panic!("seed rejected");
        };
        assert!(unfolded.kind.is_unfolded());
        assert!(unfolded.d_pad.abs() < 0.1);
        assert!(unfolded.q >= unfolded.q_max);

        let no_unfold = cfg.clone().with_unfold(false);
        let builder = ClusterBuilder::new(&no_unfold, &shape, row, drift);
        let BuildOutcome::Accepted(plain) = builder.build(&view, idx, Pass::First) else {
            panic!("seed rejected");
        };
        assert_eq!(plain.kind, ClusterType::Plain);
        assert!(plain.d_pad > 0.1);

        // The neighbour's share no longer widens the pad profile.
        assert!(unfolded.var_pad > 0.0);
        assert!(unfolded.var_pad < plain.var_pad);
    }

    #[test]
    fn test_second_pass_rejects_narrow() {
        let cfg = ClustererConfig::default();
        // Much wider expectation than the deposit.
        let shape = ConstantShapeModel::new(2.0, 2.0);
        let (row, drift) = geometry();
        let mut grid = SignalGrid::new(&[40], 60);
        deposit(&mut grid, 20.0, 30.0, 0.49, 1000.0);
        let idx = grid.index(0, 20, 30).unwrap();
        let builder = ClusterBuilder::new(&cfg, &shape, row, drift);

        assert!(matches!(
            builder.build(&grid.row(0), idx, Pass::First),
            BuildOutcome::Accepted(_)
        ));
        assert_eq!(
            builder.build(&grid.row(0), idx, Pass::Second),
            BuildOutcome::Rejected(Rejection::TooNarrow)
        );
    }
}
