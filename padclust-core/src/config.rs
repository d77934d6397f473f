//! Clusterer configuration.

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Clustering pass.
///
/// The second pass is used when re-clustering with adjusted calibration:
/// no virtual charge is synthesized and abnormally narrow candidates are
/// treated as remnants of the first pass and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Pass {
    #[default]
    First,
    Second,
}

/// Configuration for the cluster finder.
///
/// Amplitudes are in gain-corrected ADC counts, noise-scaled cuts are
/// multiples of the channel noise.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClustererConfig {
    /// First usable time bin.
    pub first_time_bin: u16,
    /// Last usable time bin (inclusive).
    pub last_time_bin: u16,
    /// Minimum seed amplitude.
    pub min_max_cut_abs: f32,
    /// Minimum 3-sample sum along the pad direction.
    pub min_left_right_cut_abs: f32,
    /// Minimum 3-sample sum along the time direction.
    pub min_up_down_cut_abs: f32,
    /// Minimum seed amplitude in units of channel noise.
    pub min_max_cut_sigma: f32,
    /// Minimum pad-direction 3-sample sum in units of channel noise.
    pub min_left_right_cut_sigma: f32,
    /// Minimum time-direction 3-sample sum in units of channel noise.
    pub min_up_down_cut_sigma: f32,
    /// Channels noisier than this never seed a cluster.
    pub max_noise: f32,
    /// Accept seeds without a non-zero neighbour along each axis.
    pub accept_isolated: bool,
    /// Enable overlap resolution.
    pub unfold: bool,
    /// Defer the coordinate transform (spatial coordinates stay unset).
    pub compact_output: bool,
    /// Samples at or below this amplitude are dropped on input.
    pub zero_suppression: f32,
    /// Largest track dip (tan λ) from the vertex; earlier time bins are
    /// geometrically impossible and skipped. `None` disables the cutoff.
    pub max_track_inclination: Option<f32>,
    /// Raw path: estimate the per-pad baseline from the event itself.
    pub calc_pedestal: bool,
    /// Raw path: samples below this many noise sigmas are zeroed.
    pub noise_sigma_cut: f32,
    /// Neighbours below this amplitude get a virtual charge.
    pub below_threshold_cut: f32,
    /// Neighbours below this amplitude do not extend to the second ring.
    pub small_amplitude_cut: f32,
    /// Damping of the virtual charge model.
    pub virtual_charge_damping: f32,
    /// Slope of the exponential virtual charge falloff.
    pub virtual_charge_slope: f32,
    /// Largest measured/expected variance ratio accepted as a single deposit.
    pub max_shape_ratio: f32,
    /// Second pass: smaller variance ratios are rejected.
    pub min_shape_ratio_second_pass: f32,
}

impl Default for ClustererConfig {
    fn default() -> Self {
        Self {
            first_time_bin: 0,
            last_time_bin: 1000,
            min_max_cut_abs: 3.0,
            min_left_right_cut_abs: 5.0,
            min_up_down_cut_abs: 5.0,
            min_max_cut_sigma: 3.0,
            min_left_right_cut_sigma: 5.0,
            min_up_down_cut_sigma: 5.0,
            max_noise: 5.0,
            accept_isolated: false,
            unfold: true,
            compact_output: false,
            zero_suppression: 2.0,
            max_track_inclination: None,
            calc_pedestal: false,
            noise_sigma_cut: 3.0,
            below_threshold_cut: 2.0,
            small_amplitude_cut: 4.0,
            virtual_charge_damping: 0.5,
            virtual_charge_slope: 1.2,
            max_shape_ratio: 1.2,
            min_shape_ratio_second_pass: 0.6,
        }
    }
}

impl ClustererConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the usable time-bin range (inclusive).
    #[must_use]
    pub fn with_time_range(mut self, first: u16, last: u16) -> Self {
        self.first_time_bin = first;
        self.last_time_bin = last;
        self
    }

    /// Sets the absolute seed and 3-sum thresholds.
    #[must_use]
    pub fn with_abs_cuts(mut self, max: f32, left_right: f32, up_down: f32) -> Self {
        self.min_max_cut_abs = max;
        self.min_left_right_cut_abs = left_right;
        self.min_up_down_cut_abs = up_down;
        self
    }

    /// Sets the noise-scaled seed and 3-sum thresholds.
    #[must_use]
    pub fn with_sigma_cuts(mut self, max: f32, left_right: f32, up_down: f32) -> Self {
        self.min_max_cut_sigma = max;
        self.min_left_right_cut_sigma = left_right;
        self.min_up_down_cut_sigma = up_down;
        self
    }

    /// Sets the maximum tolerable channel noise.
    #[must_use]
    pub fn with_max_noise(mut self, max_noise: f32) -> Self {
        self.max_noise = max_noise;
        self
    }

    /// Enables or disables isolated-sample acceptance.
    #[must_use]
    pub fn with_accept_isolated(mut self, accept: bool) -> Self {
        self.accept_isolated = accept;
        self
    }

    /// Enables or disables overlap resolution.
    #[must_use]
    pub fn with_unfold(mut self, unfold: bool) -> Self {
        self.unfold = unfold;
        self
    }

    /// Enables or disables compact (untransformed) output.
    #[must_use]
    pub fn with_compact_output(mut self, compact: bool) -> Self {
        self.compact_output = compact;
        self
    }

    /// Sets the input zero-suppression level.
    #[must_use]
    pub fn with_zero_suppression(mut self, level: f32) -> Self {
        self.zero_suppression = level;
        self
    }

    /// Sets the maximum track inclination used for the early-time cutoff.
    #[must_use]
    pub fn with_max_track_inclination(mut self, tan_lambda: Option<f32>) -> Self {
        self.max_track_inclination = tan_lambda;
        self
    }

    /// Enables or disables event baseline estimation on the raw path.
    #[must_use]
    pub fn with_calc_pedestal(mut self, calc: bool) -> Self {
        self.calc_pedestal = calc;
        self
    }

    /// Returns true if the time bin is inside the usable range.
    #[inline]
    #[must_use]
    pub fn in_time_range(&self, time_bin: u16) -> bool {
        (self.first_time_bin..=self.last_time_bin).contains(&time_bin)
    }

    /// Checks the configuration for inconsistent values.
    ///
    /// # Errors
    /// Returns [`Error::Config`] describing the first inconsistency found.
    pub fn validate(&self) -> Result<()> {
        if self.first_time_bin > self.last_time_bin {
            return Err(Error::Config(format!(
                "first time bin {} after last time bin {}",
                self.first_time_bin, self.last_time_bin
            )));
        }
        if self.below_threshold_cut > self.small_amplitude_cut {
            return Err(Error::Config(format!(
                "below-threshold cut {} exceeds small-amplitude cut {}",
                self.below_threshold_cut, self.small_amplitude_cut
            )));
        }
        if !(0.0..=1.0).contains(&self.virtual_charge_damping) {
            return Err(Error::Config(format!(
                "virtual charge damping {} outside [0, 1]",
                self.virtual_charge_damping
            )));
        }
        if self.max_shape_ratio <= self.min_shape_ratio_second_pass {
            return Err(Error::Config(format!(
                "shape ratio band [{}, {}] is empty",
                self.min_shape_ratio_second_pass, self.max_shape_ratio
            )));
        }
        if self.max_noise <= 0.0 {
            return Err(Error::Config("max noise must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ClustererConfig::new()
            .with_time_range(10, 400)
            .with_abs_cuts(4.0, 6.0, 7.0)
            .with_unfold(false)
            .with_accept_isolated(true);

        assert_eq!(config.first_time_bin, 10);
        assert_eq!(config.last_time_bin, 400);
        assert!((config.min_up_down_cut_abs - 7.0).abs() < f32::EPSILON);
        assert!(!config.unfold);
        assert!(config.accept_isolated);
        assert!(config.in_time_range(10));
        assert!(config.in_time_range(400));
        assert!(!config.in_time_range(401));
    }

    #[test]
    fn test_default_validates() {
        assert!(ClustererConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_range() {
        let config = ClustererConfig::new().with_time_range(50, 10);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = ClustererConfig::new();
        config.below_threshold_cut = 5.0;
        assert!(config.validate().is_err());
    }
}
