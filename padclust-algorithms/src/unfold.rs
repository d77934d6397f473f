//! Separation of charge shared with a neighbouring deposit.
//!
//! Each axis is treated on its own: the window is collapsed into seven
//! 3-wide marginal sums along the axis, and for the two cells next to the
//! seed a linear extrapolation from both sides decides how much of the
//! cell belongs to the seed deposit.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::needless_range_loop
)]

use crate::grid::RowView;
use crate::virtual_charge::{Window, CENTRE, WINDOW};

/// Side of the unfolding window.
pub const WIDE: usize = 7;

/// Centre cell of the unfolding window.
pub const WIDE_CENTRE: usize = WIDE / 2;

/// Raw samples around a seed, indexed `[pad][time]`.
pub type WideWindow = [[f32; WIDE]; WIDE];

/// Copies the 7x7 raw neighbourhood of a seed. Guard cells read as zero.
#[must_use]
pub fn wide_window(row: &RowView<'_>, idx: usize) -> WideWindow {
    let mut w = [[0.0; WIDE]; WIDE];
    let c = WIDE_CENTRE as isize;
    for (i, column) in w.iter_mut().enumerate() {
        for (j, cell) in column.iter_mut().enumerate() {
            *cell = row.offset(idx, i as isize - c, j as isize - c);
        }
    }
    w
}

/// Result of unfolding one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisUnfold {
    /// Charge-weighted offset of the seed deposit from the seed.
    pub mean: f32,
    /// Charge of the three central sums kept for the seed deposit.
    pub retained: f32,
    /// Charge of the three central sums before separation.
    pub full: f32,
    /// Share kept at offsets -1, 0 and +1.
    pub ratios: [f32; 3],
}

impl AxisUnfold {
    /// Fraction of the central charge given to the neighbour.
    #[must_use]
    pub fn overlap(&self) -> f32 {
        if self.full <= 0.0 {
            return 0.0;
        }
        (self.full - self.retained) / self.full
    }
}

/// Whether the cell at `dk` looks dominated by a second deposit further out.
fn neighbour_dominated(sums: &[f32; WIDE], dk: isize) -> bool {
    let at = |k: isize| sums[(WIDE_CENTRE as isize + k) as usize];
    let (s0, s1, s2) = (at(0), at(dk), at(2 * dk));
    (s1 + 3.0) / (s0 - 3.0) + 1.0 < (s2 - 3.0) / (s1 + 3.0) || (s1 <= s2 && s1 > 2.0)
}

/// Unfolds one axis given its seven marginal sums (seed at index 3).
///
/// When the cell next to the seed is dominated by a deposit further out,
/// its charge is split in the ratio of the two linear extrapolations
/// `4 * inner - outer` taken from the seed side and from the far side.
#[must_use]
pub fn unfold_axis(sums: &[f32; WIDE]) -> AxisUnfold {
    let at = |k: isize| sums[(WIDE_CENTRE as isize + k) as usize];
    let mut ratios = [1.0f32; 3];
    let mut full = 0.0;
    let mut retained = at(0);
    let mut weighted = 0.0;
    for dk in [-1isize, 0, 1] {
        full += at(dk);
        if dk == 0 {
            continue;
        }
        let mut ratio = 1.0;
        if neighbour_dominated(sums, dk) {
            let w11 = (4.0 * at(0) - at(-dk)).max(1e-6);
            let w12 = (4.0 * at(2 * dk) - at(3 * dk)).max(0.0);
            ratio = w11 / (w11 + w12);
        }
        ratios[(dk + 1) as usize] = ratio;
        let amp = at(dk) * ratio;
        retained += amp;
        weighted += dk as f32 * amp;
    }
    let mean = if retained > 0.0 { weighted / retained } else { 0.0 };
    AxisUnfold {
        mean,
        retained,
        full,
        ratios,
    }
}

/// Marginal sums along the pad axis (summed over time -1..=1).
#[must_use]
pub fn pad_sums(w: &WideWindow) -> [f32; WIDE] {
    let c = WIDE_CENTRE;
    let mut sums = [0.0; WIDE];
    for k in 0..WIDE {
        sums[k] = w[k][c - 1] + w[k][c] + w[k][c + 1];
    }
    sums
}

/// Marginal sums along the time axis (summed over pads -1..=1).
#[must_use]
pub fn time_sums(w: &WideWindow) -> [f32; WIDE] {
    let c = WIDE_CENTRE;
    let mut sums = [0.0; WIDE];
    for k in 0..WIDE {
        sums[k] = w[c - 1][k] + w[c][k] + w[c + 1][k];
    }
    sums
}

/// Seed deposit separated from its neighbours.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unfolded {
    /// Pad offset from the seed.
    pub mean_pad: f32,
    /// Time offset from the seed.
    pub mean_time: f32,
    /// Charge kept for the seed deposit.
    pub charge: f32,
    /// Larger of the two per-axis overlap fractions, in percent.
    pub overlap: u8,
    /// 5x5 window with the neighbour's share removed.
    pub matrix: Window,
}

/// Unfolds both axes of a wide window and rebuilds the 5x5 matrix.
#[must_use]
pub fn unfold(w: &WideWindow) -> Unfolded {
    let pad = unfold_axis(&pad_sums(w));
    let time = unfold_axis(&time_sums(w));

    let mut mratio = [[1.0f32; 3]; 3];
    for (i, row) in mratio.iter_mut().enumerate() {
        for (j, r) in row.iter_mut().enumerate() {
            *r = pad.ratios[i] * time.ratios[j];
        }
    }

    let overlap_fraction = pad.overlap().max(time.overlap()).clamp(0.0, 1.0);
    let overlap = (100.0 * overlap_fraction) as u8;
    let matrix = if overlap == 0 {
        straight_copy(w)
    } else {
        reconstruct(w, &mratio)
    };

    Unfolded {
        mean_pad: pad.mean,
        mean_time: time.mean,
        charge: 0.5 * (pad.retained + time.retained),
        overlap,
        matrix,
    }
}

fn straight_copy(w: &WideWindow) -> Window {
    let mut m = [[0.0; WINDOW]; WINDOW];
    let shift = WIDE_CENTRE - CENTRE;
    for i in 0..WINDOW {
        for j in 0..WINDOW {
            m[i][j] = w[i + shift][j + shift];
        }
    }
    m
}

fn reconstruct(w: &WideWindow, mratio: &[[f32; 3]; 3]) -> Window {
    let raw = |di: isize, dj: isize| {
        w[(WIDE_CENTRE as isize + di) as usize][(WIDE_CENTRE as isize + dj) as usize]
    };
    let seed = raw(0, 0);
    let mut m = [[0.0; WINDOW]; WINDOW];
    let mut put = |di: isize, dj: isize, v: f32| {
        m[(CENTRE as isize + di) as usize][(CENTRE as isize + dj) as usize] = v;
    };

    for di in -1isize..=1 {
        for dj in -1isize..=1 {
            let ratio = mratio[(di + 1) as usize][(dj + 1) as usize];
            let diagonal = di != 0 && dj != 0;
            if (ratio - 1.0).abs() < f32::EPSILON {
                put(di, dj, raw(di, dj));
                if diagonal {
                    put(2 * di, dj, raw(2 * di, dj));
                    put(di, 2 * dj, raw(di, 2 * dj));
                }
                put(2 * di, 2 * dj, raw(2 * di, 2 * dj));
                continue;
            }

            let inner = ratio * raw(di, dj);
            put(di, dj, inner);
            if diagonal {
                let along_pad = (inner / (raw(0, dj) + 1.0)).min(1.0);
                put(2 * di, dj, along_pad * inner);
                let along_time = (inner / (raw(di, 0) + 1.0)).min(1.0);
                put(di, 2 * dj, along_time * inner);
            } else if seed > 0.0 {
                put(2 * di, 2 * dj, inner / seed * inner);
            }
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn gaussian_sums(centres: &[f32], sigma: f32, amp: f32) -> [f32; WIDE] {
        let mut sums = [0.0; WIDE];
        for (k, s) in sums.iter_mut().enumerate() {
            let x = k as f32 - WIDE_CENTRE as f32;
            *s = centres
                .iter()
                .map(|c| amp * (-(x - c).powi(2) / (2.0 * sigma * sigma)).exp())
                .sum();
        }
        sums
    }

    #[test]
    fn test_single_deposit_untouched() {
        let sums = gaussian_sums(&[0.0], 0.7, 1000.0);
        let axis = unfold_axis(&sums);
        assert_eq!(axis.ratios, [1.0, 1.0, 1.0]);
        assert_relative_eq!(axis.retained, axis.full);
        assert_relative_eq!(axis.mean, 0.0, epsilon = 1e-6);
        assert_relative_eq!(axis.overlap(), 0.0);
    }

    #[test]
    fn test_neighbour_two_samples_away() {
        let sums = gaussian_sums(&[0.0, 2.0], 0.7, 1000.0);
        let axis = unfold_axis(&sums);
        assert_relative_eq!(axis.ratios[0], 1.0);
        assert_relative_eq!(axis.ratios[1], 1.0);
        assert!(axis.ratios[2] > 0.0 && axis.ratios[2] < 1.0);
        // The shared cell is split evenly between two equal deposits.
        assert_relative_eq!(axis.ratios[2], 0.5, epsilon = 0.05);
        assert!(axis.overlap() > 0.1 && axis.overlap() < 0.3);
        // Without the neighbour's share the seed deposit is centred again.
        assert_relative_eq!(axis.mean, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_sums_collapse_the_other_axis() {
        let mut w = [[0.0; WIDE]; WIDE];
        w[3][3] = 10.0;
        w[3][2] = 1.0;
        w[3][5] = 7.0;
        w[1][3] = 2.0;
        let pads = pad_sums(&w);
        let times = time_sums(&w);
        assert_relative_eq!(pads[3], 11.0);
        assert_relative_eq!(pads[1], 2.0);
        assert_relative_eq!(times[3], 10.0);
        assert_relative_eq!(times[5], 7.0);
        assert_relative_eq!(times[2], 1.0);
        assert_relative_eq!(times[1], 0.0);
    }

    #[test]
    fn test_no_overlap_copies_window() {
        let mut w = [[0.0; WIDE]; WIDE];
        for (i, column) in w.iter_mut().enumerate() {
            for (j, cell) in column.iter_mut().enumerate() {
                let d = (i as f32 - 3.0).abs() + (j as f32 - 3.0).abs();
                *cell = 100.0 / (1.0 + d * d);
            }
        }
        let u = unfold(&w);
        assert_eq!(u.overlap, 0);
        for i in 0..WINDOW {
            for j in 0..WINDOW {
                assert_relative_eq!(u.matrix[i][j], w[i + 1][j + 1]);
            }
        }
        assert_relative_eq!(u.mean_pad, 0.0, epsilon = 1e-6);
        assert_relative_eq!(u.mean_time, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_overlap_removes_neighbour_share() {
        let mut w = [[0.0; WIDE]; WIDE];
        let sigma2 = 2.0 * 0.7f32 * 0.7;
        for (i, column) in w.iter_mut().enumerate() {
            for (j, cell) in column.iter_mut().enumerate() {
                let t = j as f32 - 3.0;
                let p = i as f32 - 3.0;
                let g = |c: f32| 1000.0 * (-((p - c).powi(2) + t * t) / sigma2).exp();
                *cell = g(0.0) + g(2.0);
            }
        }
        let u = unfold(&w);
        assert!(u.overlap > 0);
        // Shared column reduced, far side untouched.
        assert!(u.matrix[3][2] < w[4][3]);
        assert_relative_eq!(u.matrix[1][2], w[2][3]);
        assert_relative_eq!(u.mean_pad, 0.0, epsilon = 1e-3);
        assert_relative_eq!(u.mean_time, 0.0, epsilon = 1e-5);
        let pad = unfold_axis(&pad_sums(&w));
        let time = unfold_axis(&time_sums(&w));
        assert_relative_eq!(u.charge, 0.5 * (pad.retained + time.retained));
    }
}
