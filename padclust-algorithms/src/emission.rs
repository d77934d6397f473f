//! Conversion of candidates into committed clusters.
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use crate::builder::Candidate;
use padclust_core::{
    Cluster, ClustererConfig, DriftGeometry, Result, RowDigits, RowGeometry, RunStamp, Transform,
};

/// Charge and noise cuts every emitted cluster must pass.
#[must_use]
pub fn accepts(config: &ClustererConfig, q: f32, q_max: f32, noise: f32) -> bool {
    q > 0.0
        && q_max >= config.min_max_cut_abs
        && q_max >= config.min_max_cut_sigma * noise
        && noise <= config.max_noise
}

/// Emission stage for one row.
pub struct Emitter<'a> {
    config: &'a ClustererConfig,
    transform: &'a dyn Transform,
    stamp: RunStamp,
    module: u16,
    row: u16,
    geometry: RowGeometry,
    drift: DriftGeometry,
}

impl<'a> Emitter<'a> {
    #[must_use]
    pub fn new(
        config: &'a ClustererConfig,
        transform: &'a dyn Transform,
        stamp: RunStamp,
        (module, row): (u16, u16),
        geometry: RowGeometry,
        drift: DriftGeometry,
    ) -> Self {
        Self {
            config,
            transform,
            stamp,
            module,
            row,
            geometry,
            drift,
        }
    }

    /// Returns true if the position lies within one sample of the module's
    /// first or last pad or usable time bin.
    #[must_use]
    pub fn is_edge(&self, pad: f32, time_bin: f32) -> bool {
        let pad = pad.round() as i32;
        let time_bin = time_bin.round() as i32;
        pad <= 0
            || pad >= i32::from(self.geometry.n_pads) - 1
            || time_bin <= i32::from(self.config.first_time_bin)
            || time_bin >= i32::from(self.config.last_time_bin)
    }

    /// Turns a candidate into a cluster and appends it to `out`.
    ///
    /// `noise` is the calibrated noise of the seed channel. Returns
    /// `Ok(false)` if the cluster fails the acceptance cuts.
    ///
    /// # Errors
    /// Returns an error if the coordinate transform fails.
    pub fn emit(
        &self,
        candidate: &Candidate,
        noise: f32,
        digits: Option<&RowDigits>,
        out: &mut Vec<Cluster>,
    ) -> Result<bool> {
        if !accepts(self.config, candidate.q, candidate.q_max, noise) {
            return Ok(false);
        }

        let pad = f32::from(candidate.seed_pad) + candidate.d_pad;
        let time_bin = f32::from(candidate.seed_time_bin) + candidate.d_time;
        let mut cluster = Cluster::new(self.module, self.row, pad, time_bin, candidate.q, candidate.q_max)
            .with_shape(candidate.var_pad, candidate.var_time)
            .with_kind(candidate.kind);

        if let Some(digits) = digits {
            let nearest = |v: f32| v.round().max(0.0) as u16;
            if let Some(labels) = digits.labels_at(nearest(pad), nearest(time_bin)) {
                cluster.labels = labels;
            }
        }

        self.finish(&mut cluster, None)?;
        out.push(cluster);
        Ok(true)
    }

    /// Completes an externally built cluster in place.
    ///
    /// An edge flag delivered with the cluster takes precedence over the
    /// geometric test.
    ///
    /// # Errors
    /// Returns an error if the coordinate transform fails.
    pub fn adjust_in_place(&self, cluster: &mut Cluster, source_edge: Option<bool>) -> Result<()> {
        cluster.module = self.module;
        cluster.row = self.row;
        self.finish(cluster, source_edge)
    }

    fn finish(&self, cluster: &mut Cluster, source_edge: Option<bool>) -> Result<()> {
        cluster.sigma_y2 *= self.geometry.pad_width * self.geometry.pad_width;
        cluster.sigma_z2 *= self.drift.time_bin_width * self.drift.time_bin_width;
        cluster.edge = source_edge.unwrap_or_else(|| self.is_edge(cluster.pad, cluster.time_bin));
        cluster.position = if self.config.compact_output {
            None
        } else {
            Some(self.transform.apply(
                self.module,
                self.row,
                cluster.pad,
                cluster.time_bin,
                self.stamp,
            )?)
        };
        Ok(())
    }
}
