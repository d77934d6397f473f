//! Coordinate transform from module-local (row, pad, time bin) to space.
//!
//! A transform caches correction state for a validity window. Callers
//! select the state with [`Transform::prepare`] once per event; the
//! per-cluster [`Transform::apply`] is read-only and safe to share between
//! worker threads.

use crate::geometry::Geometry;
use crate::{Error, Result, RunStamp, SpacePoint};

/// Coordinate transform.
pub trait Transform: Send + Sync {
    /// Transform name.
    fn name(&self) -> &'static str;

    /// Selects the correction state for a run stamp.
    ///
    /// Returns `true` when the correction state had to be re-fetched.
    ///
    /// # Errors
    /// Returns an error if no correction state exists for the stamp.
    fn prepare(&mut self, stamp: RunStamp) -> Result<bool>;

    /// Transforms one position.
    ///
    /// # Errors
    /// Returns an error if the transform was not prepared for `stamp` or
    /// the module/row is unknown.
    fn apply(
        &self,
        module: u16,
        row: u16,
        pad: f32,
        time_bin: f32,
        stamp: RunStamp,
    ) -> Result<SpacePoint>;
}

/// Maps (row, pad, time bin) to (x, y, z) unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl Transform for IdentityTransform {
    fn name(&self) -> &'static str {
        "Identity"
    }

    fn prepare(&mut self, _stamp: RunStamp) -> Result<bool> {
        Ok(false)
    }

    fn apply(
        &self,
        _module: u16,
        row: u16,
        pad: f32,
        time_bin: f32,
        _stamp: RunStamp,
    ) -> Result<SpacePoint> {
        Ok(SpacePoint {
            x: f32::from(row),
            y: pad,
            z: time_bin,
        })
    }
}

/// Drift corrections valid for a time window within one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corrections {
    pub run: u32,
    /// First timestamp covered.
    pub valid_from: u64,
    /// First timestamp no longer covered.
    pub valid_until: u64,
    /// Multiplicative drift velocity correction.
    pub drift_velocity_scale: f32,
    /// Additive z offset (cm).
    pub z_offset: f32,
}

impl Corrections {
    /// Returns true if the corrections cover the stamp.
    #[must_use]
    pub fn covers(&self, stamp: RunStamp) -> bool {
        self.run == stamp.run && (self.valid_from..self.valid_until).contains(&stamp.timestamp)
    }
}

/// Source of correction state (database, file, constants).
pub trait CorrectionSource: Send + Sync {
    /// Fetches the corrections valid at `stamp`.
    ///
    /// # Errors
    /// Returns an error if the source has nothing for the stamp.
    fn fetch(&self, stamp: RunStamp) -> Result<Corrections>;
}

/// Constant corrections re-issued for fixed-length validity windows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticCorrections {
    pub drift_velocity_scale: f32,
    pub z_offset: f32,
    /// Validity window length in timestamp units.
    pub window: u64,
}

impl Default for StaticCorrections {
    fn default() -> Self {
        Self {
            drift_velocity_scale: 1.0,
            z_offset: 0.0,
            window: 600,
        }
    }
}

impl CorrectionSource for StaticCorrections {
    fn fetch(&self, stamp: RunStamp) -> Result<Corrections> {
        if self.window == 0 {
            return Err(Error::Transform("zero-length validity window".into()));
        }
        let valid_from = stamp.timestamp - stamp.timestamp % self.window;
        Ok(Corrections {
            run: stamp.run,
            valid_from,
            valid_until: valid_from.saturating_add(self.window),
            drift_velocity_scale: self.drift_velocity_scale,
            z_offset: self.z_offset,
        })
    }
}

/// Linear drift transform in the module-local frame.
///
/// `x` is the row radius, `y` the pad centre across the row and `z` the
/// drift coordinate measured from the central electrode.
pub struct DriftTransform<G: Geometry, S: CorrectionSource> {
    geometry: G,
    source: S,
    current: Option<Corrections>,
    refreshes: usize,
}

impl<G: Geometry, S: CorrectionSource> DriftTransform<G, S> {
    /// Creates an unprepared transform.
    pub fn new(geometry: G, source: S) -> Self {
        Self {
            geometry,
            source,
            current: None,
            refreshes: 0,
        }
    }

    /// Number of times the correction state was fetched.
    pub fn refreshes(&self) -> usize {
        self.refreshes
    }

    /// Currently selected corrections.
    pub fn current(&self) -> Option<&Corrections> {
        self.current.as_ref()
    }
}

impl<G: Geometry, S: CorrectionSource> Transform for DriftTransform<G, S> {
    fn name(&self) -> &'static str {
        "Drift"
    }

    fn prepare(&mut self, stamp: RunStamp) -> Result<bool> {
        if self.current.is_some_and(|c| c.covers(stamp)) {
            return Ok(false);
        }
        let corrections = self.source.fetch(stamp)?;
        if !corrections.covers(stamp) {
            return Err(Error::Transform(format!(
                "corrections fetched for run {} do not cover timestamp {}",
                stamp.run, stamp.timestamp
            )));
        }
        self.current = Some(corrections);
        self.refreshes += 1;
        Ok(true)
    }

    fn apply(
        &self,
        module: u16,
        row: u16,
        pad: f32,
        time_bin: f32,
        stamp: RunStamp,
    ) -> Result<SpacePoint> {
        let corrections = self
            .current
            .filter(|c| c.covers(stamp))
            .ok_or_else(|| {
                Error::Transform(format!(
                    "not prepared for run {} timestamp {}",
                    stamp.run, stamp.timestamp
                ))
            })?;
        let row_geom = self
            .geometry
            .row(module, row)
            .ok_or(Error::UnknownModule { module, row })?;
        let drift = self
            .geometry
            .drift(module)
            .ok_or(Error::UnknownModule { module, row })?;

        let y = (pad + 0.5 - f32::from(row_geom.n_pads) / 2.0) * row_geom.pad_width;
        let drifted = (time_bin - drift.l1_delay_bins)
            * drift.time_bin_width
            * corrections.drift_velocity_scale;
        let z = drift.z_sign * (drift.drift_length - drifted) + corrections.z_offset;

        Ok(SpacePoint {
            x: row_geom.radius,
            y,
            z,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UniformGeometry;
    use approx::assert_relative_eq;

    fn transform() -> DriftTransform<UniformGeometry, StaticCorrections> {
        DriftTransform::new(
            UniformGeometry::single_module(10, 20, 500),
            StaticCorrections::default(),
        )
    }

    #[test]
    fn test_prepare_caches_within_window() {
        let mut t = transform();
        assert!(t.prepare(RunStamp::new(1, 100)).unwrap());
        assert!(!t.prepare(RunStamp::new(1, 599)).unwrap());
        assert_eq!(t.refreshes(), 1);
        assert!(t.prepare(RunStamp::new(1, 600)).unwrap());
        assert!(t.prepare(RunStamp::new(2, 600)).unwrap());
        assert_eq!(t.refreshes(), 3);
    }

    #[test]
    fn test_apply_requires_prepare() {
        let t = transform();
        let result = t.apply(0, 0, 1.0, 1.0, RunStamp::new(1, 0));
        assert!(matches!(result, Err(Error::Transform(_))));
    }

    #[test]
    fn test_apply_linear_drift() {
        let mut t = transform();
        let stamp = RunStamp::new(1, 10);
        t.prepare(stamp).unwrap();

        // Row 0 radius 85.2, 20 pads of 0.4 cm: pad 9.5 sits on the row centre.
        let p = t.apply(0, 0, 9.5, 100.0, stamp).unwrap();
        assert_relative_eq!(p.x, 85.2);
        assert_relative_eq!(p.y, 0.0);
        assert_relative_eq!(p.z, 250.0 - 25.0);

        let edge = t.apply(0, 0, 0.0, 0.0, stamp).unwrap();
        assert_relative_eq!(edge.y, -3.8, epsilon = 1e-5);
        assert_relative_eq!(edge.z, 250.0);

        assert!(matches!(
            t.apply(0, 10, 0.0, 0.0, stamp),
            Err(Error::UnknownModule { .. })
        ));
    }

    #[test]
    fn test_identity() {
        let p = IdentityTransform
            .apply(3, 4, 5.5, 6.5, RunStamp::default())
            .unwrap();
        assert_eq!(
            p,
            SpacePoint {
                x: 4.0,
                y: 5.5,
                z: 6.5
            }
        );
    }
}
