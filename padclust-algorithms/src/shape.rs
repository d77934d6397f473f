//! Expected single-deposit cluster width as a function of drift depth.

use padclust_core::{DriftGeometry, RowGeometry};

/// Source of the expected pad and time variances, in sample units.
pub trait ShapeModel: Send + Sync {
    /// Expected `(pad variance, time variance)` at a time bin.
    fn expected(&self, row: &RowGeometry, drift: &DriftGeometry, time_bin: f32) -> (f32, f32);
}

/// Fixed variances, independent of drift.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantShapeModel {
    pub pad_variance: f32,
    pub time_variance: f32,
}

impl ConstantShapeModel {
    #[must_use]
    pub fn new(pad_variance: f32, time_variance: f32) -> Self {
        Self {
            pad_variance,
            time_variance,
        }
    }
}

impl ShapeModel for ConstantShapeModel {
    fn expected(&self, _row: &RowGeometry, _drift: &DriftGeometry, _time_bin: f32) -> (f32, f32) {
        (self.pad_variance, self.time_variance)
    }
}

/// Diffusion-driven widths.
///
/// The pad variance is the pad response (a quarter pad squared) plus the
/// transverse diffusion over the drift distance; the time variance adds the
/// longitudinal diffusion, the electronics time response and the smearing
/// of an inclined track over the pad length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffusionShapeModel {
    /// Transverse diffusion coefficient (cm / sqrt(cm)).
    pub diffusion_t: f32,
    /// Longitudinal diffusion coefficient (cm / sqrt(cm)).
    pub diffusion_l: f32,
    /// Width of the electronics time response (cm).
    pub time_response: f32,
    /// Typical track dip angle tangent used for the angular term.
    pub tan_lambda: f32,
}

impl Default for DiffusionShapeModel {
    fn default() -> Self {
        Self {
            diffusion_t: 0.0209,
            diffusion_l: 0.0221,
            time_response: 0.06,
            tan_lambda: 0.0,
        }
    }
}

impl DiffusionShapeModel {
    /// Pad response contribution, in pads squared.
    const PAD_RESPONSE: f32 = 0.25;

    #[must_use]
    pub fn new(diffusion_t: f32, diffusion_l: f32) -> Self {
        Self {
            diffusion_t,
            diffusion_l,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_time_response(mut self, width: f32) -> Self {
        self.time_response = width;
        self
    }

    #[must_use]
    pub fn with_tan_lambda(mut self, tan_lambda: f32) -> Self {
        self.tan_lambda = tan_lambda;
        self
    }
}

impl ShapeModel for DiffusionShapeModel {
    fn expected(&self, row: &RowGeometry, drift: &DriftGeometry, time_bin: f32) -> (f32, f32) {
        let dz = drift.time_bin_width;
        if dz <= 0.0 || row.pad_width <= 0.0 {
            return (Self::PAD_RESPONSE, Self::PAD_RESPONSE);
        }
        let depth = ((time_bin - drift.l1_delay_bins) * dz).clamp(0.0, drift.drift_length);

        let pad = Self::PAD_RESPONSE
            + depth * self.diffusion_t * self.diffusion_t / (row.pad_width * row.pad_width);

        let angular = (row.pad_length * self.tan_lambda).powi(2) / 12.0;
        let time = (angular + depth * self.diffusion_l * self.diffusion_l) / (dz * dz)
            + (self.time_response / dz).powi(2);
        (pad, time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn layout() -> (RowGeometry, DriftGeometry) {
        (
            RowGeometry {
                n_pads: 60,
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

    #[test]
    fn test_constant_model() {
        let (row, drift) = layout();
        let model = ConstantShapeModel::new(0.5, 0.7);
        assert_eq!(model.expected(&row, &drift, 10.0), (0.5, 0.7));
        assert_eq!(model.expected(&row, &drift, 900.0), (0.5, 0.7));
    }

    #[test]
    fn test_diffusion_grows_with_depth() {
        let (row, drift) = layout();
        let model = DiffusionShapeModel::default();
        let (pad_near, time_near) = model.expected(&row, &drift, 0.0);
        let (pad_far, time_far) = model.expected(&row, &drift, 400.0);
        assert_relative_eq!(pad_near, 0.25);
        assert_relative_eq!(time_near, 0.0576, epsilon = 1e-5);
        assert!(pad_far > pad_near);
        assert!(time_far > time_near);

        // 100 cm of drift.
        let expected_pad = 0.25 + 100.0 * 0.0209 * 0.0209 / 0.16;
        assert_relative_eq!(pad_far, expected_pad, epsilon = 1e-4);
    }

    #[test]
    fn test_angular_term() {
        let (row, drift) = layout();
        let flat = DiffusionShapeModel::default();
        let dipped = flat.with_tan_lambda(1.0);
        let (_, t0) = flat.expected(&row, &drift, 100.0);
        let (_, t1) = dipped.expected(&row, &drift, 100.0);
        assert_relative_eq!(t1 - t0, 0.75 * 0.75 / 12.0 / 0.0625, epsilon = 1e-4);
    }
}
