//! Read-only calibration context.
//!
//! Calibration values are produced elsewhere; the clusterer only reads
//! them for the duration of one event.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Run number and timestamp selecting the calibration/correction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunStamp {
    pub run: u32,
    pub timestamp: u64,
}

impl RunStamp {
    /// Creates a new run stamp.
    #[must_use]
    pub fn new(run: u32, timestamp: u64) -> Self {
        Self { run, timestamp }
    }
}

/// Per-channel values of one module, indexed by (row, pad).
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelMap {
    rows: Vec<Vec<f32>>,
}

impl ChannelMap {
    /// Creates a map from explicit per-row values.
    #[must_use]
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Self {
        Self { rows }
    }

    /// Creates a map with the same value on every channel.
    #[must_use]
    pub fn uniform(pads_per_row: &[u16], value: f32) -> Self {
        Self {
            rows: pads_per_row
                .iter()
                .map(|&n| vec![value; usize::from(n)])
                .collect(),
        }
    }

    /// Returns the value of a channel.
    #[inline]
    #[must_use]
    pub fn get(&self, row: u16, pad: u16) -> Option<f32> {
        self.rows
            .get(usize::from(row))
            .and_then(|r| r.get(usize::from(pad)))
            .copied()
    }

    /// Overrides the value of a channel. Returns false if it does not exist.
    pub fn set(&mut self, row: u16, pad: u16, value: f32) -> bool {
        match self
            .rows
            .get_mut(usize::from(row))
            .and_then(|r| r.get_mut(usize::from(pad)))
        {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Values of one row.
    #[must_use]
    pub fn row(&self, row: u16) -> Option<&[f32]> {
        self.rows.get(usize::from(row)).map(Vec::as_slice)
    }

    /// Number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }
}

/// Calibration of one module.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModuleCalibration {
    /// Relative pad gain (samples are divided by it).
    pub gain: ChannelMap,
    /// Pad noise (RMS, ADC counts).
    pub noise: ChannelMap,
    /// Pad pedestal, needed by the raw-stream path only.
    pub pedestal: Option<ChannelMap>,
}

impl ModuleCalibration {
    /// Uniform calibration for a module layout.
    #[must_use]
    pub fn uniform(pads_per_row: &[u16], gain: f32, noise: f32, pedestal: Option<f32>) -> Self {
        Self {
            gain: ChannelMap::uniform(pads_per_row, gain),
            noise: ChannelMap::uniform(pads_per_row, noise),
            pedestal: pedestal.map(|p| ChannelMap::uniform(pads_per_row, p)),
        }
    }

    /// Gain of a channel; unknown channels have zero gain.
    #[inline]
    #[must_use]
    pub fn gain(&self, row: u16, pad: u16) -> f32 {
        self.gain.get(row, pad).unwrap_or(0.0)
    }

    /// Noise of a channel; unknown channels are infinitely noisy.
    #[inline]
    #[must_use]
    pub fn noise(&self, row: u16, pad: u16) -> f32 {
        self.noise.get(row, pad).unwrap_or(f32::INFINITY)
    }

    /// Pedestal of a channel; zero when no pedestal map is present.
    #[inline]
    #[must_use]
    pub fn pedestal(&self, row: u16, pad: u16) -> f32 {
        self.pedestal
            .as_ref()
            .and_then(|p| p.get(row, pad))
            .unwrap_or(0.0)
    }
}

/// Calibration of every module for the current run/timestamp.
#[derive(Debug, Clone, Default)]
pub struct CalibrationSet {
    stamp: RunStamp,
    modules: BTreeMap<u16, ModuleCalibration>,
}

impl CalibrationSet {
    /// Creates an empty set valid for the given run stamp.
    #[must_use]
    pub fn new(stamp: RunStamp) -> Self {
        Self {
            stamp,
            modules: BTreeMap::new(),
        }
    }

    /// Adds or replaces the calibration of a module.
    pub fn insert(&mut self, module: u16, calibration: ModuleCalibration) {
        self.modules.insert(module, calibration);
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with_module(mut self, module: u16, calibration: ModuleCalibration) -> Self {
        self.insert(module, calibration);
        self
    }

    /// Calibration of a module, if present.
    #[must_use]
    pub fn module(&self, module: u16) -> Option<&ModuleCalibration> {
        self.modules.get(&module)
    }

    /// Run stamp this set is valid for.
    #[must_use]
    pub fn stamp(&self) -> RunStamp {
        self.stamp
    }

    /// Number of calibrated modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns true if no module is calibrated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_map_lookup() {
        let mut map = ChannelMap::uniform(&[4, 6], 1.0);
        assert_eq!(map.get(1, 5), Some(1.0));
        assert_eq!(map.get(0, 4), None);
        assert_eq!(map.get(2, 0), None);
        assert!(map.set(0, 3, 0.8));
        assert!(!map.set(5, 0, 0.8));
        assert_eq!(map.row(0), Some(&[1.0, 1.0, 1.0, 0.8][..]));
    }

    #[test]
    fn test_module_calibration_defaults() {
        let cal = ModuleCalibration::uniform(&[10], 1.0, 1.5, None);
        assert!((cal.gain(0, 9) - 1.0).abs() < f32::EPSILON);
        assert!(cal.gain(0, 10).abs() < f32::EPSILON);
        assert!(cal.noise(3, 0).is_infinite());
        assert!(cal.pedestal(0, 0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_calibration_set() {
        let set = CalibrationSet::new(RunStamp::new(7, 1000))
            .with_module(2, ModuleCalibration::uniform(&[10], 1.0, 1.0, Some(50.0)));
        assert_eq!(set.len(), 1);
        assert!(set.module(2).is_some());
        assert!(set.module(3).is_none());
        assert_eq!(set.stamp().run, 7);
    }
}
