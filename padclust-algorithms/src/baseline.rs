//! Event-by-event pedestal and noise estimation for raw pad series.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use padclust_core::ClustererConfig;

/// Window, in RMS, of samples used for the truncated noise estimate.
const NOISE_WINDOW: f32 = 3.0;

/// Tolerance, in ADC counts, within which the calibrated pedestal is kept.
const PEDESTAL_TOLERANCE: f32 = 1.0;

/// Baseline of one pad series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub pedestal: f32,
    pub noise: f32,
}

/// Estimates the baseline of a series as its median and the noise as the
/// RMS of the samples within three RMS of the median.
///
/// `scratch` is reused between calls. Returns `None` for an empty series.
#[must_use]
pub fn estimate(series: &[f32], scratch: &mut Vec<f32>) -> Option<Baseline> {
    if series.is_empty() {
        return None;
    }
    scratch.clear();
    scratch.extend_from_slice(series);
    scratch.sort_unstable_by(f32::total_cmp);
    let pedestal = scratch[scratch.len() / 2];

    let rms = |limit: f32| {
        let (mut n, mut sum2) = (0usize, 0.0f32);
        for &v in series {
            let d = v - pedestal;
            if d.abs() <= limit {
                n += 1;
                sum2 += d * d;
            }
        }
        if n == 0 {
            0.0
        } else {
            (sum2 / n as f32).sqrt()
        }
    };
    let full = rms(f32::INFINITY);
    let noise = rms(NOISE_WINDOW * full);
    Some(Baseline { pedestal, noise })
}

/// Subtracts the baseline from a raw pad series and suppresses everything
/// that is not signal.
///
/// The worse of the event and calibrated noise is used; the calibrated
/// pedestal is kept when the event estimate agrees within one count.
/// Samples outside the usable time range, at or below zero suppression,
/// or below `noise_sigma_cut` times the noise are zeroed; the rest are
/// divided by the gain.
pub fn suppress(
    series: &mut [f32],
    config: &ClustererConfig,
    calibrated: Baseline,
    gain: f32,
    scratch: &mut Vec<f32>,
) {
    let Some(event) = estimate(series, scratch) else {
        return;
    };
    let noise = event.noise.max(calibrated.noise);
    let pedestal = if (event.pedestal - calibrated.pedestal).abs() <= PEDESTAL_TOLERANCE {
        calibrated.pedestal
    } else {
        event.pedestal
    };

    for (t, v) in series.iter_mut().enumerate() {
        let signal = *v - pedestal;
        let in_range = u16::try_from(t).is_ok_and(|t| config.in_time_range(t));
        *v = if !in_range
            || gain <= 0.0
            || signal <= config.zero_suppression
            || signal < config.noise_sigma_cut * noise
        {
            0.0
        } else {
            signal / gain
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn flat_with_pulse() -> Vec<f32> {
        let mut series: Vec<f32> = (0..100)
            .map(|t| if t % 2 == 0 { 50.5 } else { 49.5 })
            .collect();
        series[40] = 90.0;
        series[41] = 130.0;
        series[42] = 110.0;
        series
    }

    #[test]
    fn test_estimate_ignores_pulse() {
        let mut scratch = Vec::new();
        let b = estimate(&flat_with_pulse(), &mut scratch).unwrap();
        assert_relative_eq!(b.pedestal, 50.5);
        // Pulse samples sit far outside three RMS and are excluded.
        assert!(b.noise < 1.5, "noise {}", b.noise);
        assert!(estimate(&[], &mut scratch).is_none());
    }

    #[test]
    fn test_suppress_keeps_pulse() {
        let cfg = ClustererConfig::default();
        let mut scratch = Vec::new();
        let mut series = flat_with_pulse();
        let calibrated = Baseline {
            pedestal: 50.0,
            noise: 1.0,
        };
        suppress(&mut series, &cfg, calibrated, 2.0, &mut scratch);
        // Calibrated pedestal kept (within one count of 50.5).
        assert_relative_eq!(series[41], 40.0);
        assert_relative_eq!(series[40], 20.0);
        assert_relative_eq!(series[42], 30.0);
        let rest: f32 = series
            .iter()
            .enumerate()
            .filter(|(t, _)| !(40..=42).contains(t))
            .map(|(_, v)| *v)
            .sum();
        assert_relative_eq!(rest, 0.0);
    }

    #[test]
    fn test_suppress_uses_event_pedestal_when_shifted() {
        let cfg = ClustererConfig::default().with_time_range(0, 41);
        let mut scratch = Vec::new();
        let mut series = flat_with_pulse();
        let calibrated = Baseline {
            pedestal: 40.0,
            noise: 1.0,
        };
        suppress(&mut series, &cfg, calibrated, 1.0, &mut scratch);
        assert_relative_eq!(series[41], 79.5);
        // Outside the usable range.
        assert_relative_eq!(series[42], 0.0);
    }
}
