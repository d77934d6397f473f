//! JSON run configuration.
//!
//! ```json
//! {
//!   "clusterer": { "first_time_bin": 0, "last_time_bin": 500, "unfold": true },
//!   "geometry": { "n_modules": 2, "n_rows": 8, "pads_first_row": 60 },
//!   "calibration": { "gain": 1.0, "noise": 1.0, "pedestal": 50.0, "run": 1 },
//!   "drift": { "drift_velocity_scale": 1.0, "z_offset": 0.0 }
//! }
//! ```
//!
//! Every section and field is optional.

use crate::Result;
use padclust_algorithms::{Clusterer, DiffusionShapeModel};
use padclust_core::{
    CalibrationSet, ClustererConfig, DriftTransform, Error as CoreError, Geometry,
    ModuleCalibration, RunStamp, StaticCorrections, UniformGeometry,
};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Uniform per-channel calibration applied to every module.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSettings {
    pub gain: f32,
    pub noise: f32,
    /// Calibrated pedestal for raw input; `None` treats raw input as
    /// pedestal-subtracted.
    pub pedestal: Option<f32>,
    pub run: u32,
    pub timestamp: u64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            gain: 1.0,
            noise: 1.0,
            pedestal: None,
            run: 0,
            timestamp: 0,
        }
    }
}

/// Drift corrections and diffusion parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftSettings {
    pub drift_velocity_scale: f32,
    pub z_offset: f32,
    /// Correction validity window, in timestamp units.
    pub window: u64,
    pub diffusion_t: f32,
    pub diffusion_l: f32,
    pub time_response: f32,
}

impl Default for DriftSettings {
    fn default() -> Self {
        let shape = DiffusionShapeModel::default();
        let corrections = StaticCorrections::default();
        Self {
            drift_velocity_scale: corrections.drift_velocity_scale,
            z_offset: corrections.z_offset,
            window: corrections.window,
            diffusion_t: shape.diffusion_t,
            diffusion_l: shape.diffusion_l,
            time_response: shape.time_response,
        }
    }
}

/// Everything needed to run the clusterer over a file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunConfig {
    pub clusterer: ClustererConfig,
    pub geometry: UniformGeometry,
    pub calibration: CalibrationSettings,
    pub drift: DriftSettings,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct JsonConfig {
    clusterer: ClustererConfig,
    geometry: UniformGeometry,
    calibration: JsonCalibration,
    drift: JsonDrift,
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonCalibration {
    gain: f32,
    noise: f32,
    pedestal: Option<f32>,
    run: u32,
    timestamp: u64,
}

impl Default for JsonCalibration {
    fn default() -> Self {
        let d = CalibrationSettings::default();
        Self {
            gain: d.gain,
            noise: d.noise,
            pedestal: d.pedestal,
            run: d.run,
            timestamp: d.timestamp,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonDrift {
    drift_velocity_scale: f32,
    z_offset: f32,
    window: u64,
    diffusion_t: f32,
    diffusion_l: f32,
    time_response: f32,
}

impl Default for JsonDrift {
    fn default() -> Self {
        let d = DriftSettings::default();
        Self {
            drift_velocity_scale: d.drift_velocity_scale,
            z_offset: d.z_offset,
            window: d.window,
            diffusion_t: d.diffusion_t,
            diffusion_l: d.diffusion_l,
            time_response: d.time_response,
        }
    }
}

impl RunConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// holds inconsistent values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let json_config: JsonConfig = serde_json::from_reader(reader)?;
        Self::from_json_config(json_config)
    }

    /// Loads a configuration from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the string is not valid JSON or holds
    /// inconsistent values.
    pub fn from_json(json: &str) -> Result<Self> {
        let json_config: JsonConfig = serde_json::from_str(json)?;
        Self::from_json_config(json_config)
    }

    fn from_json_config(config: JsonConfig) -> Result<Self> {
        config.clusterer.validate()?;
        let JsonCalibration {
            gain,
            noise,
            pedestal,
            run,
            timestamp,
        } = config.calibration;
        if gain <= 0.0 {
            return Err(CoreError::Config(format!("gain must be positive, got {gain}")).into());
        }
        if config.drift.window == 0 {
            return Err(CoreError::Config("correction window must be non-zero".into()).into());
        }
        if config.geometry.n_time_bins == 0 || config.geometry.pads_first_row == 0 {
            return Err(CoreError::Config("geometry has no pads or time bins".into()).into());
        }
        Ok(Self {
            clusterer: config.clusterer,
            geometry: config.geometry,
            calibration: CalibrationSettings {
                gain,
                noise,
                pedestal,
                run,
                timestamp,
            },
            drift: DriftSettings {
                drift_velocity_scale: config.drift.drift_velocity_scale,
                z_offset: config.drift.z_offset,
                window: config.drift.window,
                diffusion_t: config.drift.diffusion_t,
                diffusion_l: config.drift.diffusion_l,
                time_response: config.drift.time_response,
            },
        })
    }

    /// Run stamp of the calibration.
    #[must_use]
    pub fn stamp(&self) -> RunStamp {
        RunStamp::new(self.calibration.run, self.calibration.timestamp)
    }

    /// Builds a uniform calibration for every module of the geometry.
    #[must_use]
    pub fn calibration_set(&self) -> CalibrationSet {
        let c = &self.calibration;
        let mut set = CalibrationSet::new(self.stamp());
        for module in 0..self.geometry.n_modules {
            let pads = self.geometry.pads_per_row(module);
            set.insert(
                module,
                ModuleCalibration::uniform(&pads, c.gain, c.noise, c.pedestal),
            );
        }
        set
    }

    #[must_use]
    pub fn shape_model(&self) -> DiffusionShapeModel {
        DiffusionShapeModel::new(self.drift.diffusion_t, self.drift.diffusion_l)
            .with_time_response(self.drift.time_response)
    }

    #[must_use]
    pub fn corrections(&self) -> StaticCorrections {
        StaticCorrections {
            drift_velocity_scale: self.drift.drift_velocity_scale,
            z_offset: self.drift.z_offset,
            window: self.drift.window,
        }
    }

    /// Unprepared drift transform over the configured geometry.
    #[must_use]
    pub fn transform(&self) -> DriftTransform<UniformGeometry, StaticCorrections> {
        DriftTransform::new(self.geometry.clone(), self.corrections())
    }

    /// Builds the clusterer.
    ///
    /// # Errors
    /// Returns an error if the clusterer configuration is inconsistent.
    pub fn clusterer(&self) -> Result<Clusterer<UniformGeometry>> {
        let clusterer = Clusterer::with_shape_model(
            self.clusterer.clone(),
            self.geometry.clone(),
            self.shape_model(),
        )?;
        Ok(clusterer)
    }
}
