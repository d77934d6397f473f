//! Seed search over the significant samples of one row.
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use crate::grid::RowView;
use padclust_core::{ClustererConfig, DriftGeometry, RowGeometry};

/// Margin, in time bins, kept before the earliest geometrically possible bin.
const EARLY_CUTOFF_MARGIN: f32 = 5.0;

/// Local-maximum and threshold tests for cluster seeds.
#[derive(Debug, Clone)]
pub struct PeakFinder<'a> {
    config: &'a ClustererConfig,
    early_cutoff: f32,
}

impl<'a> PeakFinder<'a> {
    /// Creates a finder without early-time cutoff.
    #[must_use]
    pub fn new(config: &'a ClustererConfig) -> Self {
        Self {
            config,
            early_cutoff: f32::NEG_INFINITY,
        }
    }

    /// Sets the earliest time bin considered for seeds.
    #[must_use]
    pub fn with_early_cutoff(mut self, cutoff: Option<f32>) -> Self {
        self.early_cutoff = cutoff.unwrap_or(f32::NEG_INFINITY);
        self
    }

    /// Earliest time bin a track within the configured inclination can
    /// reach on a row, or `None` when no inclination limit is set.
    #[must_use]
    pub fn early_cutoff(
        config: &ClustererConfig,
        row: &RowGeometry,
        drift: &DriftGeometry,
    ) -> Option<f32> {
        let tan_lambda = config.max_track_inclination?;
        if drift.time_bin_width <= 0.0 {
            return None;
        }
        let z_max = tan_lambda.abs() * row.radius;
        Some(
            (drift.drift_length - z_max) / drift.time_bin_width + drift.l1_delay_bins
                - EARLY_CUTOFF_MARGIN,
        )
    }

    /// Returns true if no direct neighbour beats the sample.
    ///
    /// Equal neighbours earlier in scan order (lower pad, or same pad and
    /// lower time bin) win the tie, so a flat top yields one seed.
    #[inline]
    #[must_use]
    pub fn is_local_max(row: &RowView<'_>, idx: usize) -> bool {
        let q = row.at(idx);
        let stride = row.stride();
        if row.at(idx - stride) >= q || row.at(idx - 1) >= q {
            return false;
        }
        row.at(idx + stride) <= q && row.at(idx + 1) <= q
    }

    /// Applies every seed test to one sample.
    ///
    /// `noise` is indexed by pad; pads without a value count as infinitely
    /// noisy.
    #[must_use]
    pub fn accepts(&self, row: &RowView<'_>, idx: usize, noise: &[f32]) -> bool {
        let cfg = self.config;
        let time_bin = row.time_of(idx);
        if time_bin < 0 {
            return false;
        }
        let time_bin = time_bin as u16;
        if !cfg.in_time_range(time_bin) || f32::from(time_bin) < self.early_cutoff {
            return false;
        }

        let q = row.at(idx);
        if q < cfg.min_max_cut_abs {
            return false;
        }

        let stride = row.stride();
        let time_pair = row.at(idx - 1) + row.at(idx + 1);
        let pad_pair = row.at(idx - stride) + row.at(idx + stride);
        if !cfg.accept_isolated && (time_pair <= 0.0 || pad_pair <= 0.0) {
            return false;
        }
        let time_sum = q + time_pair;
        let pad_sum = q + pad_pair;
        if time_sum < cfg.min_up_down_cut_abs || pad_sum < cfg.min_left_right_cut_abs {
            return false;
        }
        if !Self::is_local_max(row, idx) {
            return false;
        }

        let noise = noise
            .get(row.pad_of(idx) as usize)
            .copied()
            .unwrap_or(f32::INFINITY);
        if noise > cfg.max_noise {
            return false;
        }
        q >= cfg.min_max_cut_sigma * noise
            && time_sum >= cfg.min_up_down_cut_sigma * noise
            && pad_sum >= cfg.min_left_right_cut_sigma * noise
    }

    /// Collects the seeds of a row in scan order.
    pub fn find_into(&self, row: &RowView<'_>, noise: &[f32], seeds: &mut Vec<usize>) {
        seeds.clear();
        seeds.extend(
            row.significant()
                .iter()
                .copied()
                .filter(|&idx| self.accepts(row, idx, noise)),
        );
    }
}
