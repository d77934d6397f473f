//! Dense signal buffer for one module.
//!
//! Every row is stored as a `(pads + 2 * GUARD) x (time bins + 2 * GUARD)`
//! block with the time bin as the fast axis, so neighbours along time are
//! at `±1` and neighbours along the pad direction at `±stride`. The guard
//! cells stay zero, which lets the 7-wide unfolding window run off the
//! module edge without bounds checks. Non-zero cells are also listed per
//! row, so scanning and clearing touch only the occupied cells.
//!
//! The arena is sized once per module for its widest row and reused for
//! every row, sector and event.
#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]

/// Guard margin on each side of both axes.
pub const GUARD: usize = 3;

/// Signal arena for all rows of one module.
#[derive(Debug, Default)]
pub struct SignalGrid {
    bins: Vec<f32>,
    significant: Vec<Vec<usize>>,
    pads_per_row: Vec<u16>,
    n_time_bins: usize,
    stride: usize,
    row_len: usize,
}

impl SignalGrid {
    /// Creates an arena for the given row layout.
    #[must_use]
    pub fn new(pads_per_row: &[u16], n_time_bins: u16) -> Self {
        let mut grid = Self::default();
        grid.reshape(pads_per_row, n_time_bins);
        grid
    }

    /// Prepares the arena for another module layout.
    ///
    /// Capacity is kept, so after the first (largest) module no further
    /// allocation takes place. All cells are cleared.
    pub fn reshape(&mut self, pads_per_row: &[u16], n_time_bins: u16) {
        let max_pads = pads_per_row.iter().copied().max().unwrap_or(0);
        self.n_time_bins = usize::from(n_time_bins);
        self.stride = self.n_time_bins + 2 * GUARD;
        self.row_len = (usize::from(max_pads) + 2 * GUARD) * self.stride;
        self.pads_per_row.clear();
        self.pads_per_row.extend_from_slice(pads_per_row);

        let total = self.row_len * pads_per_row.len();
        self.bins.clear();
        self.bins.resize(total, 0.0);

        self.significant.resize_with(pads_per_row.len(), Vec::new);
        for sig in &mut self.significant {
            sig.clear();
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.pads_per_row.len()
    }

    /// Number of pads of a row.
    #[must_use]
    pub fn n_pads(&self, row: u16) -> u16 {
        self.pads_per_row.get(usize::from(row)).copied().unwrap_or(0)
    }

    /// Number of real (non-guard) time bins.
    #[must_use]
    pub fn n_time_bins(&self) -> usize {
        self.n_time_bins
    }

    /// Distance between pad neighbours in the flat index.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Flat in-row index of a cell, `None` outside the module.
    #[inline]
    #[must_use]
    pub fn index(&self, row: u16, pad: u16, time_bin: u16) -> Option<usize> {
        if usize::from(row) >= self.n_rows()
            || pad >= self.n_pads(row)
            || usize::from(time_bin) >= self.n_time_bins
        {
            return None;
        }
        Some((usize::from(pad) + GUARD) * self.stride + usize::from(time_bin) + GUARD)
    }

    /// Stores a charge sample and registers it for scanning.
    ///
    /// Non-positive values are ignored. Returns false if the cell lies
    /// outside the module.
    pub fn set(&mut self, row: u16, pad: u16, time_bin: u16, value: f32) -> bool {
        let Some(idx) = self.index(row, pad, time_bin) else {
            return false;
        };
        if value <= 0.0 {
            return true;
        }
        let offset = usize::from(row) * self.row_len;
        let cell = &mut self.bins[offset + idx];
        if *cell <= 0.0 {
            self.significant[usize::from(row)].push(idx);
        }
        *cell = value;
        true
    }

    /// Stores a value without registering it; call [`Self::rescan_row`]
    /// once the row has been post-processed.
    pub fn write(&mut self, row: u16, pad: u16, time_bin: u16, value: f32) -> bool {
        let Some(idx) = self.index(row, pad, time_bin) else {
            return false;
        };
        self.bins[usize::from(row) * self.row_len + idx] = value;
        true
    }

    /// Real time bins of one pad, for in-place post-processing.
    pub fn pad_series_mut(&mut self, row: u16, pad: u16) -> Option<&mut [f32]> {
        let start = self.index(row, pad, 0)?;
        let offset = usize::from(row) * self.row_len;
        let n = self.n_time_bins;
        Some(&mut self.bins[offset + start..offset + start + n])
    }

    /// Rebuilds the list of significant cells of a row from its content.
    ///
    /// Negative values left by post-processing are reset to zero.
    pub fn rescan_row(&mut self, row: u16) {
        let r = usize::from(row);
        if r >= self.n_rows() {
            return;
        }
        let n_pads = usize::from(self.pads_per_row[r]);
        let offset = r * self.row_len;
        let sig = &mut self.significant[r];
        sig.clear();
        for pad in 0..n_pads {
            let start = (pad + GUARD) * self.stride + GUARD;
            for idx in start..start + self.n_time_bins {
                let cell = &mut self.bins[offset + idx];
                if *cell > 0.0 {
                    sig.push(idx);
                } else {
                    *cell = 0.0;
                }
            }
        }
    }

    /// Sorts the significant cells of a row into ascending scan order.
    pub fn sort_row(&mut self, row: u16) {
        if let Some(sig) = self.significant.get_mut(usize::from(row)) {
            sig.sort_unstable();
            sig.dedup();
        }
    }

    /// Number of significant cells in a row.
    #[must_use]
    pub fn occupancy(&self, row: u16) -> usize {
        self.significant
            .get(usize::from(row))
            .map_or(0, Vec::len)
    }

    /// Read-only view of one row.
    ///
    /// # Panics
    /// Panics if `row` is not a row of the current layout.
    #[must_use]
    pub fn row(&self, row: u16) -> RowView<'_> {
        let r = usize::from(row);
        let offset = r * self.row_len;
        RowView {
            bins: &self.bins[offset..offset + self.row_len],
            significant: &self.significant[r],
            stride: self.stride,
            n_pads: self.pads_per_row[r],
            n_time_bins: self.n_time_bins,
        }
    }

    /// Zeroes the occupied cells of a row so it can be reused.
    pub fn clear_row(&mut self, row: u16) {
        let r = usize::from(row);
        if r >= self.n_rows() {
            return;
        }
        let offset = r * self.row_len;
        for &idx in &self.significant[r] {
            self.bins[offset + idx] = 0.0;
        }
        self.significant[r].clear();
    }

    /// Zeroes every row.
    pub fn clear(&mut self) {
        self.bins.fill(0.0);
        for sig in &mut self.significant {
            sig.clear();
        }
    }
}

/// Read-only view of one row of the arena.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    bins: &'a [f32],
    significant: &'a [usize],
    stride: usize,
    n_pads: u16,
    n_time_bins: usize,
}

impl<'a> RowView<'a> {
    /// Occupied cells, in the order they were registered.
    #[must_use]
    pub fn significant(&self) -> &'a [usize] {
        self.significant
    }

    /// Distance between pad neighbours.
    #[inline]
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of pads.
    #[must_use]
    pub fn n_pads(&self) -> u16 {
        self.n_pads
    }

    /// Number of real time bins.
    #[must_use]
    pub fn n_time_bins(&self) -> usize {
        self.n_time_bins
    }

    /// Value at a flat index.
    #[inline]
    #[must_use]
    pub fn at(&self, idx: usize) -> f32 {
        self.bins[idx]
    }

    /// Value at a pad/time offset from `idx`; zero outside the buffer.
    #[inline]
    #[must_use]
    pub fn offset(&self, idx: usize, d_pad: isize, d_time: isize) -> f32 {
        let target = idx as isize + d_pad * self.stride as isize + d_time;
        if target < 0 {
            return 0.0;
        }
        self.bins.get(target as usize).copied().unwrap_or(0.0)
    }

    /// Pad of a flat index (may be negative inside the guard).
    #[inline]
    #[must_use]
    pub fn pad_of(&self, idx: usize) -> isize {
        (idx / self.stride) as isize - GUARD as isize
    }

    /// Time bin of a flat index (may be negative inside the guard).
    #[inline]
    #[must_use]
    pub fn time_of(&self, idx: usize) -> isize {
        (idx % self.stride) as isize - GUARD as isize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_view() {
        let mut grid = SignalGrid::new(&[10, 12], 50);
        assert!(grid.set(1, 11, 49, 7.0));
        assert!(!grid.set(1, 12, 0, 7.0));
        assert!(!grid.set(0, 10, 0, 7.0));
        assert!(!grid.set(0, 0, 50, 7.0));
        assert!(!grid.set(2, 0, 0, 7.0));

        let view = grid.row(1);
        assert_eq!(view.significant().len(), 1);
        let idx = view.significant()[0];
        assert_eq!(view.pad_of(idx), 11);
        assert_eq!(view.time_of(idx), 49);
        assert!((view.at(idx) - 7.0).abs() < f32::EPSILON);
        // Guard cells read as zero.
        assert!(view.offset(idx, 1, 0).abs() < f32::EPSILON);
        assert!(view.offset(idx, 0, 3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_duplicate_and_non_positive() {
        let mut grid = SignalGrid::new(&[10], 20);
        assert!(grid.set(0, 2, 2, 5.0));
        assert!(grid.set(0, 2, 2, 6.0));
        assert!(grid.set(0, 3, 3, 0.0));
        assert!(grid.set(0, 3, 4, -2.0));
        assert_eq!(grid.occupancy(0), 1);
    }

    #[test]
    fn test_clear_row_reuses_buffer() {
        let mut grid = SignalGrid::new(&[8, 8], 16);
        grid.set(0, 1, 1, 3.0);
        grid.set(1, 2, 2, 4.0);
        grid.clear_row(0);
        assert_eq!(grid.occupancy(0), 0);
        assert_eq!(grid.occupancy(1), 1);
        let idx = grid.index(0, 1, 1).unwrap();
        assert!(grid.row(0).at(idx).abs() < f32::EPSILON);
    }

    #[test]
    fn test_rescan_after_write() {
        let mut grid = SignalGrid::new(&[4], 8);
        grid.write(0, 1, 2, 9.0);
        grid.write(0, 1, 3, -1.0);
        grid.write(0, 3, 0, 2.0);
        assert_eq!(grid.occupancy(0), 0);
        grid.rescan_row(0);
        assert_eq!(grid.occupancy(0), 2);
        let idx = grid.index(0, 1, 3).unwrap();
        assert!(grid.row(0).at(idx).abs() < f32::EPSILON);
    }

    #[test]
    fn test_reshape_keeps_capacity() {
        let mut grid = SignalGrid::new(&[20, 20, 20], 100);
        let capacity = grid.bins.capacity();
        grid.set(2, 5, 5, 1.0);
        grid.reshape(&[10, 10], 100);
        assert_eq!(grid.n_rows(), 2);
        assert_eq!(grid.bins.capacity(), capacity);
        assert_eq!(grid.occupancy(0), 0);
        assert_eq!(grid.occupancy(1), 0);
    }

    #[test]
    fn test_pad_series() {
        let mut grid = SignalGrid::new(&[4], 6);
        grid.write(0, 2, 5, 3.0);
        let series = grid.pad_series_mut(0, 2).unwrap();
        assert_eq!(series.len(), 6);
        assert!((series[5] - 3.0).abs() < f32::EPSILON);
        assert!(grid.pad_series_mut(0, 4).is_none());
    }
}
