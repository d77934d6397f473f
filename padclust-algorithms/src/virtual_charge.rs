//! Reconstruction of the 5x5 window around a seed.
//!
//! Samples below the readout threshold are replaced by an estimate of the
//! charge the zero suppression removed. The estimate falls off
//! exponentially with the distance from the seed along each axis, scaled by
//! the expected cluster width, and is seeded by the real sample on the
//! opposite side of the seed.
#![allow(clippy::cast_precision_loss)]

use crate::grid::RowView;
use padclust_core::{ClustererConfig, Pass};

/// Side of the reconstructed window.
pub const WINDOW: usize = 5;

/// Centre cell of the window.
pub const CENTRE: usize = WINDOW / 2;

/// Reconstructed window, indexed `[pad][time]`.
pub type Window = [[f32; WINDOW]; WINDOW];

/// Parameters of the virtual-charge estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualChargeParams {
    /// Amplitude under which a neighbour is replaced.
    pub cut: f32,
    /// Overall scale of the estimate.
    pub damping: f32,
    /// Exponential slope per sample, in units of the expected variance.
    pub slope: f32,
}

impl VirtualChargeParams {
    #[must_use]
    pub fn from_config(config: &ClustererConfig) -> Self {
        Self {
            cut: config.below_threshold_cut,
            damping: config.virtual_charge_damping,
            slope: config.virtual_charge_slope,
        }
    }
}

/// Estimated charge of a sub-threshold neighbour at offset `(d_pad, d_time)`.
///
/// `opposite` is the real sample mirrored through the seed. The result
/// lies in `[0, cut]`.
#[must_use]
pub fn virtual_charge(
    params: &VirtualChargeParams,
    seed: f32,
    opposite: f32,
    d_pad: i32,
    d_time: i32,
    pad_variance: f32,
    time_variance: f32,
) -> f32 {
    let excess = seed - params.cut;
    let denom = opposite + params.cut;
    if excess <= 0.0 || denom <= 0.0 {
        return 0.0;
    }
    let mut q = params.damping * excess * excess / denom;
    if d_pad != 0 && pad_variance > 0.0 {
        q *= (-params.slope * d_pad.abs() as f32 / pad_variance).exp();
    }
    if d_time != 0 && time_variance > 0.0 {
        q *= (-params.slope * d_time.abs() as f32 / time_variance).exp();
    }
    q.clamp(0.0, params.cut)
}

/// Copies or reconstructs the 5x5 window around `idx`.
///
/// The first pass substitutes virtual charge for neighbours below
/// `below_threshold_cut` and drops their second-ring extension. Small
/// neighbours (below `small_amplitude_cut`) are kept without extension.
/// The second pass never synthesizes charge.
#[must_use]
pub fn build_window(
    row: &RowView<'_>,
    idx: usize,
    config: &ClustererConfig,
    pass: Pass,
    expected: (f32, f32),
) -> Window {
    let params = VirtualChargeParams::from_config(config);
    let seed = row.at(idx);
    let mut w: Window = [[0.0; WINDOW]; WINDOW];
    w[CENTRE][CENTRE] = seed;

    let c = CENTRE as isize;
    for di in -1isize..=1 {
        for dj in -1isize..=1 {
            if di == 0 && dj == 0 {
                continue;
            }
            let amp = row.offset(idx, di, dj);
            let diagonal = di != 0 && dj != 0;
            let (ni, nj) = ((c + di) as usize, (c + dj) as usize);
            let (fi, fj) = ((c + 2 * di) as usize, (c + 2 * dj) as usize);

            if amp < params.cut && pass == Pass::First {
                let opposite = row.offset(idx, -di, -dj);
                w[ni][nj] = virtual_charge(
                    &params,
                    seed,
                    opposite,
                    di as i32,
                    dj as i32,
                    expected.0,
                    expected.1,
                );
            } else if amp < config.small_amplitude_cut {
                w[ni][nj] = amp;
            } else {
                w[ni][nj] = amp;
                w[fi][fj] = row.offset(idx, 2 * di, 2 * dj);
                if diagonal {
                    w[fi][nj] = row.offset(idx, 2 * di, dj);
                    w[ni][fj] = row.offset(idx, di, 2 * dj);
                } else if di == 0 {
                    w[CENTRE][fj] = row.offset(idx, 0, 2 * dj);
                } else {
                    w[fi][CENTRE] = row.offset(idx, 2 * di, 0);
                }
            }
        }
    }
    w
}

/// Charge-weighted moments of a window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Moments {
    pub sum: f32,
    pub mean_pad: f32,
    pub mean_time: f32,
    pub var_pad: f32,
    pub var_time: f32,
}

/// Computes total charge, offsets from the centre and variances.
#[must_use]
pub fn moments(w: &Window) -> Moments {
    let mut sum = 0.0f32;
    let (mut si, mut sj, mut sii, mut sjj) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
    for (i, column) in w.iter().enumerate() {
        let di = i as f32 - CENTRE as f32;
        for (j, &q) in column.iter().enumerate() {
            let dj = j as f32 - CENTRE as f32;
            sum += q;
            si += q * di;
            sj += q * dj;
            sii += q * di * di;
            sjj += q * dj * dj;
        }
    }
    if sum <= 0.0 {
        return Moments::default();
    }
    let mean_pad = si / sum;
    let mean_time = sj / sum;
    Moments {
        sum,
        mean_pad,
        mean_time,
        var_pad: (sii / sum - mean_pad * mean_pad).max(0.0),
        var_time: (sjj / sum - mean_time * mean_time).max(0.0),
    }
}
