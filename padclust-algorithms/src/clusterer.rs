//! Row/module orchestration.
//!
//! A [`Clusterer`] holds the read-only configuration, geometry and shape
//! model. Everything that changes while processing lives in a
//! [`ClustererState`], so one clusterer can drive any number of workers,
//! each with its own signal arena.
//!
//! Every row goes through the same cycle:
//!
//! ```text
//! Idle -> GridLoaded -> RowScanned -> Flushed -> Idle
//! ```
//!
//! Samples arrive through one of three paths: simulated digits (per row),
//! a raw stream (loaded and baseline-corrected for the whole module before
//! the first row is scanned) or externally built clusters, which skip the
//! seed search and are only filtered and completed.

use crate::baseline::{self, Baseline};
use crate::builder::{BuildOutcome, ClusterBuilder};
use crate::emission::{accepts, Emitter};
use crate::grid::SignalGrid;
use crate::peak::PeakFinder;
use crate::shape::{DiffusionShapeModel, ShapeModel};
use log::{debug, warn};
use padclust_core::{
    CalibrationSet, Cluster, ClusterContainer, ClusterSink, ClusterStatistics, ClustererConfig,
    DigitSource, DriftGeometry, Error, ExternalCluster, ExternalClusters, Geometry,
    ModuleCalibration, Pass, RawSource, Result, RowDigits, RunStamp, Transform,
};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Position of a row in the processing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowState {
    #[default]
    Idle,
    GridLoaded,
    RowScanned,
    Flushed,
}

impl RowState {
    /// State name, for diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            RowState::Idle => "Idle",
            RowState::GridLoaded => "GridLoaded",
            RowState::RowScanned => "RowScanned",
            RowState::Flushed => "Flushed",
        }
    }

    /// The only state reachable from this one.
    #[must_use]
    pub fn next(self) -> RowState {
        match self {
            RowState::Idle => RowState::GridLoaded,
            RowState::GridLoaded => RowState::RowScanned,
            RowState::RowScanned => RowState::Flushed,
            RowState::Flushed => RowState::Idle,
        }
    }
}

/// Read-only per-event inputs: calibration snapshot and coordinate transform.
///
/// The transform must have been prepared for the calibration's run stamp.
#[derive(Clone, Copy)]
pub struct EventContext<'a> {
    pub calibration: &'a CalibrationSet,
    pub transform: &'a dyn Transform,
}

impl<'a> EventContext<'a> {
    #[must_use]
    pub fn new(calibration: &'a CalibrationSet, transform: &'a dyn Transform) -> Self {
        Self {
            calibration,
            transform,
        }
    }

    /// Run and timestamp of the event.
    #[must_use]
    pub fn stamp(&self) -> RunStamp {
        self.calibration.stamp()
    }
}

/// Mutable per-worker state.
#[derive(Debug, Default)]
pub struct ClustererState {
    grid: SignalGrid,
    row_state: RowState,
    seeds: Vec<usize>,
    clusters: Vec<Cluster>,
    touched: Vec<(u16, u16)>,
    scratch: Vec<f32>,
    stats: ClusterStatistics,
}

impl ClustererState {
    /// Current row state.
    #[must_use]
    pub fn row_state(&self) -> RowState {
        self.row_state
    }

    /// Counters accumulated since the last [`Self::take_statistics`].
    #[must_use]
    pub fn statistics(&self) -> &ClusterStatistics {
        &self.stats
    }

    /// Returns and resets the counters.
    pub fn take_statistics(&mut self) -> ClusterStatistics {
        std::mem::take(&mut self.stats)
    }

    /// Moves the row cycle forward.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTransition`] unless `to` directly follows
    /// the current state.
    pub fn advance(&mut self, to: RowState) -> Result<()> {
        if self.row_state.next() != to {
            return Err(Error::InvalidTransition {
                from: self.row_state.name(),
                to: to.name(),
            });
        }
        self.row_state = to;
        Ok(())
    }

    fn begin_module(&mut self, pads_per_row: &[u16], n_time_bins: u16) {
        self.grid.reshape(pads_per_row, n_time_bins);
        self.row_state = RowState::Idle;
        self.seeds.clear();
        self.clusters.clear();
        self.touched.clear();
    }
}

/// Everything a module needs that is resolved once per module.
struct ModuleSetup<'c> {
    module: u16,
    calibration: &'c ModuleCalibration,
    drift: DriftGeometry,
    n_rows: u16,
}

/// Pad-row cluster finder.
pub struct Clusterer<G, M = DiffusionShapeModel> {
    config: ClustererConfig,
    geometry: G,
    shape: M,
}

impl<G: Geometry> Clusterer<G> {
    /// Creates a clusterer with the default diffusion shape model.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the configuration is inconsistent.
    pub fn new(config: ClustererConfig, geometry: G) -> Result<Self> {
        Self::with_shape_model(config, geometry, DiffusionShapeModel::default())
    }
}

impl<G: Geometry, M: ShapeModel> Clusterer<G, M> {
    /// Creates a clusterer with an explicit shape model.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the configuration is inconsistent.
    pub fn with_shape_model(config: ClustererConfig, geometry: G, shape: M) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            geometry,
            shape,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ClustererConfig {
        &self.config
    }

    /// Returns the geometry.
    #[must_use]
    pub fn geometry(&self) -> &G {
        &self.geometry
    }

    /// Creates an empty worker state; its arena is sized by the first module.
    #[must_use]
    pub fn create_state(&self) -> ClustererState {
        ClustererState::default()
    }

    fn setup<'c>(
        &self,
        state: &mut ClustererState,
        ctx: &EventContext<'c>,
        module: u16,
    ) -> Result<ModuleSetup<'c>> {
        let calibration = ctx
            .calibration
            .module(module)
            .ok_or(Error::MissingCalibration { module })?;
        let n_rows = self
            .geometry
            .n_rows(module)
            .ok_or(Error::UnknownModule { module, row: 0 })?;
        let drift = self
            .geometry
            .drift(module)
            .ok_or(Error::UnknownModule { module, row: 0 })?;
        state.begin_module(
            &self.geometry.pads_per_row(module),
            self.geometry.n_time_bins(),
        );
        Ok(ModuleSetup {
            module,
            calibration,
            drift,
            n_rows,
        })
    }

    /// Clusters one module from simulated digits.
    ///
    /// Each digit is divided by the gain of its channel; digits at or
    /// below zero suppression are dropped.
    ///
    /// # Errors
    /// Module-scoped: missing calibration, unknown module, a digit outside
    /// the module, or a transform failure.
    pub fn process_digits<D, S>(
        &self,
        state: &mut ClustererState,
        ctx: &EventContext<'_>,
        source: &D,
        module: u16,
        pass: Pass,
        sink: &mut S,
    ) -> Result<()>
    where
        D: DigitSource + ?Sized,
        S: ClusterSink + ?Sized,
    {
        let setup = self.setup(state, ctx, module)?;
        let rows = source.rows(module);
        if let Some(&row) = rows.iter().find(|&&row| row >= setup.n_rows) {
            let (pad, time_bin) = source
                .row(module, row)
                .and_then(|digits| digits.iter().next())
                .map_or((0, 0), |d| (d.pad, d.time_bin));
            return Err(Error::SampleOutOfRange {
                module,
                row,
                pad,
                time_bin,
            });
        }
        for row in rows {
            let Some(digits) = source.row(module, row) else {
                continue;
            };
            state.advance(RowState::GridLoaded)?;
            for digit in digits.iter() {
                if digit.amplitude <= self.config.zero_suppression {
                    continue;
                }
                let gain = setup.calibration.gain(row, digit.pad);
                let value = if gain > 0.0 {
                    digit.amplitude / gain
                } else {
                    0.0
                };
                if !state.grid.set(row, digit.pad, digit.time_bin, value) {
                    return Err(Error::SampleOutOfRange {
                        module,
                        row,
                        pad: digit.pad,
                        time_bin: digit.time_bin,
                    });
                }
                state.stats.samples_loaded += 1;
            }
            state.grid.sort_row(row);
            self.scan_row(state, ctx, &setup, row, Some(digits), pass)?;
            Self::flush_row(state, module, row, sink)?;
        }
        state.stats.modules_processed += 1;
        debug!(
            "module {module}: {} clusters from {} digits",
            state.stats.emitted(),
            state.stats.samples_loaded
        );
        Ok(())
    }

    /// Clusters one module from the raw stream.
    ///
    /// The front-end delivers samples unordered across channels, so the
    /// whole module is loaded (and, with `calc_pedestal`, baseline
    /// corrected) before the first row is scanned.
    ///
    /// # Errors
    /// Module-scoped: missing calibration (including the pedestal map when
    /// `calc_pedestal` is set), unknown module, a sample outside the module,
    /// or a transform failure.
    pub fn process_raw<R, S>(
        &self,
        state: &mut ClustererState,
        ctx: &EventContext<'_>,
        source: &R,
        module: u16,
        pass: Pass,
        sink: &mut S,
    ) -> Result<()>
    where
        R: RawSource + ?Sized,
        S: ClusterSink + ?Sized,
    {
        let setup = self.setup(state, ctx, module)?;
        if self.config.calc_pedestal && setup.calibration.pedestal.is_none() {
            return Err(Error::MissingCalibration { module });
        }
        self.load_raw(state, &setup, source)?;

        for row in 0..setup.n_rows {
            state.advance(RowState::GridLoaded)?;
            if self.config.calc_pedestal {
                state.grid.rescan_row(row);
            } else {
                state.grid.sort_row(row);
            }
            self.scan_row(state, ctx, &setup, row, None, pass)?;
            Self::flush_row(state, module, row, sink)?;
        }
        state.stats.modules_processed += 1;
        debug!(
            "module {module}: {} clusters from {} raw samples",
            state.stats.emitted(),
            state.stats.samples_loaded
        );
        Ok(())
    }

    fn load_raw<R: RawSource + ?Sized>(
        &self,
        state: &mut ClustererState,
        setup: &ModuleSetup<'_>,
        source: &R,
    ) -> Result<()> {
        let module = setup.module;
        let calibration = setup.calibration;
        for link in source.links(module) {
            for s in link.samples {
                let amplitude = f32::from(s.amplitude);
                let stored = if self.config.calc_pedestal {
                    state.touched.push((s.row, s.pad));
                    state.grid.write(s.row, s.pad, s.time_bin, amplitude)
                } else if amplitude <= self.config.zero_suppression {
                    state.grid.index(s.row, s.pad, s.time_bin).is_some()
                } else {
                    let gain = calibration.gain(s.row, s.pad);
                    let value = if gain > 0.0 { amplitude / gain } else { 0.0 };
                    state.grid.set(s.row, s.pad, s.time_bin, value)
                };
                if !stored {
                    return Err(Error::SampleOutOfRange {
                        module,
                        row: s.row,
                        pad: s.pad,
                        time_bin: s.time_bin,
                    });
                }
                state.stats.samples_loaded += 1;
            }
        }

        if self.config.calc_pedestal {
            state.touched.sort_unstable();
            state.touched.dedup();
            for &(row, pad) in &state.touched {
                let calibrated = Baseline {
                    pedestal: calibration.pedestal(row, pad),
                    noise: calibration.noise(row, pad),
                };
                let gain = calibration.gain(row, pad);
                if let Some(series) = state.grid.pad_series_mut(row, pad) {
                    baseline::suppress(series, &self.config, calibrated, gain, &mut state.scratch);
                }
            }
        }
        Ok(())
    }

    /// Filters and completes externally built clusters of one module.
    ///
    /// Charges are divided by the gain at the nearest pad; clusters on
    /// channels without gain, or failing the acceptance cuts, are dropped.
    ///
    /// # Errors
    /// Module-scoped: missing calibration, unknown module or row, or a
    /// transform failure.
    pub fn process_external<S: ClusterSink + ?Sized>(
        &self,
        state: &mut ClustererState,
        ctx: &EventContext<'_>,
        module: u16,
        rows: BTreeMap<u16, Vec<ExternalCluster>>,
        sink: &mut S,
    ) -> Result<()> {
        let setup = self.setup(state, ctx, module)?;
        for (row, clusters) in rows {
            let geometry = self
                .geometry
                .row(module, row)
                .ok_or(Error::UnknownModule { module, row })?;
            state.advance(RowState::GridLoaded)?;

            let emitter = Emitter::new(
                &self.config,
                ctx.transform,
                ctx.stamp(),
                (module, row),
                geometry,
                setup.drift,
            );
            let last_pad = f32::from(geometry.n_pads.saturating_sub(1));
            for ExternalCluster { mut cluster, edge } in clusters {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let pad = cluster.pad.round().clamp(0.0, last_pad) as u16;
                let gain = setup.calibration.gain(row, pad);
                let noise = setup.calibration.noise(row, pad);
                if gain <= 0.0 {
                    state.stats.external_dropped += 1;
                    continue;
                }
                cluster.q /= gain;
                cluster.q_max /= gain;
                if !accepts(&self.config, cluster.q, cluster.q_max, noise) {
                    state.stats.external_dropped += 1;
                    continue;
                }
                emitter.adjust_in_place(&mut cluster, edge)?;
                if cluster.edge {
                    state.stats.edge += 1;
                }
                state.clusters.push(cluster);
                state.stats.external_kept += 1;
            }
            state.advance(RowState::RowScanned)?;
            Self::flush_row(state, module, row, sink)?;
        }
        state.stats.modules_processed += 1;
        Ok(())
    }

    /// Seed search, building and emission over the loaded row.
    fn scan_row(
        &self,
        state: &mut ClustererState,
        ctx: &EventContext<'_>,
        setup: &ModuleSetup<'_>,
        row: u16,
        digits: Option<&RowDigits>,
        pass: Pass,
    ) -> Result<()> {
        let module = setup.module;
        let geometry = self
            .geometry
            .row(module, row)
            .ok_or(Error::UnknownModule { module, row })?;
        let noise = setup.calibration.noise.row(row).unwrap_or(&[]);

        let finder = PeakFinder::new(&self.config).with_early_cutoff(PeakFinder::early_cutoff(
            &self.config,
            &geometry,
            &setup.drift,
        ));
        let view = state.grid.row(row);
        finder.find_into(&view, noise, &mut state.seeds);

        let builder = ClusterBuilder::new(&self.config, &self.shape, geometry, setup.drift);
        let emitter = Emitter::new(
            &self.config,
            ctx.transform,
            ctx.stamp(),
            (module, row),
            geometry,
            setup.drift,
        );
        for &idx in &state.seeds {
            state.stats.seeds += 1;
            let candidate = match builder.build(&view, idx, pass) {
                BuildOutcome::Accepted(candidate) => candidate,
                BuildOutcome::Rejected(_) => {
                    state.stats.rejected += 1;
                    continue;
                }
            };
            let seed_noise = noise
                .get(usize::from(candidate.seed_pad))
                .copied()
                .unwrap_or(f32::INFINITY);
            if !emitter.emit(&candidate, seed_noise, digits, &mut state.clusters)? {
                state.stats.rejected += 1;
                continue;
            }
            if candidate.kind.is_unfolded() {
                state.stats.unfolded += 1;
            } else {
                state.stats.plain += 1;
            }
            if state.clusters.last().is_some_and(|c| c.edge) {
                state.stats.edge += 1;
            }
        }
        state.advance(RowState::RowScanned)
    }

    /// Hands the row's clusters to the sink and clears the row for reuse.
    fn flush_row<S: ClusterSink + ?Sized>(
        state: &mut ClustererState,
        module: u16,
        row: u16,
        sink: &mut S,
    ) -> Result<()> {
        state.advance(RowState::Flushed)?;
        sink.flush_row(module, row, &mut state.clusters)?;
        state.clusters.clear();
        state.grid.clear_row(row);
        state.advance(RowState::Idle)
    }

    /// Clusters every module of a digit event, in ascending module order.
    ///
    /// A failing module is logged and skipped; its partial output is
    /// discarded.
    ///
    /// # Errors
    /// Returns the sink's error if it fails to accept a module's clusters.
    pub fn run_digits<D, S>(
        &self,
        state: &mut ClustererState,
        ctx: &EventContext<'_>,
        source: &D,
        pass: Pass,
        sink: &mut S,
    ) -> Result<ClusterStatistics>
    where
        D: DigitSource + ?Sized,
        S: ClusterSink + ?Sized,
    {
        let mut stats = ClusterStatistics::default();
        for module in source.modules() {
            let mut out = ClusterContainer::new();
            let result = self.process_digits(state, ctx, source, module, pass, &mut out);
            if settle(module, result, &state.take_statistics(), &mut stats) {
                out.drain_into(sink)?;
            }
        }
        Ok(stats)
    }

    /// Clusters every module of a raw event, in ascending module order.
    ///
    /// # Errors
    /// Returns the sink's error if it fails to accept a module's clusters.
    pub fn run_raw<R, S>(
        &self,
        state: &mut ClustererState,
        ctx: &EventContext<'_>,
        source: &R,
        pass: Pass,
        sink: &mut S,
    ) -> Result<ClusterStatistics>
    where
        R: RawSource + ?Sized,
        S: ClusterSink + ?Sized,
    {
        let mut stats = ClusterStatistics::default();
        for module in source.modules() {
            let mut out = ClusterContainer::new();
            let result = self.process_raw(state, ctx, source, module, pass, &mut out);
            if settle(module, result, &state.take_statistics(), &mut stats) {
                out.drain_into(sink)?;
            }
        }
        Ok(stats)
    }

    /// Filters and completes every module of an external cluster set.
    ///
    /// # Errors
    /// Returns the sink's error if it fails to accept a module's clusters.
    pub fn run_external<S: ClusterSink + ?Sized>(
        &self,
        state: &mut ClustererState,
        ctx: &EventContext<'_>,
        mut clusters: ExternalClusters,
        sink: &mut S,
    ) -> Result<ClusterStatistics> {
        let mut stats = ClusterStatistics::default();
        for module in clusters.modules() {
            let rows = clusters.take_module(module);
            let mut out = ClusterContainer::new();
            let result = self.process_external(state, ctx, module, rows, &mut out);
            if settle(module, result, &state.take_statistics(), &mut stats) {
                out.drain_into(sink)?;
            }
        }
        Ok(stats)
    }
}

impl<G, M> Clusterer<G, M>
where
    G: Geometry,
    M: ShapeModel,
{
    /// Module-parallel version of [`Self::run_digits`].
    ///
    /// Each rayon worker owns one [`ClustererState`]; results are merged
    /// in ascending module order, so the output matches the sequential
    /// driver.
    pub fn par_run_digits<D>(
        &self,
        ctx: &EventContext<'_>,
        source: &D,
        pass: Pass,
    ) -> (ClusterContainer, ClusterStatistics)
    where
        D: DigitSource + ?Sized,
    {
        let modules = source.modules();
        let results: Vec<ModuleResult> = modules
            .par_iter()
            .map_init(
                || self.create_state(),
                |state, &module| {
                    let mut out = ClusterContainer::new();
                    let result = self.process_digits(state, ctx, source, module, pass, &mut out);
                    (module, result, out, state.take_statistics())
                },
            )
            .collect();
        merge_results(results)
    }

    /// Module-parallel version of [`Self::run_raw`].
    pub fn par_run_raw<R>(
        &self,
        ctx: &EventContext<'_>,
        source: &R,
        pass: Pass,
    ) -> (ClusterContainer, ClusterStatistics)
    where
        R: RawSource + ?Sized,
    {
        let modules = source.modules();
        let results: Vec<ModuleResult> = modules
            .par_iter()
            .map_init(
                || self.create_state(),
                |state, &module| {
                    let mut out = ClusterContainer::new();
                    let result = self.process_raw(state, ctx, source, module, pass, &mut out);
                    (module, result, out, state.take_statistics())
                },
            )
            .collect();
        merge_results(results)
    }
}

type ModuleResult = (u16, Result<()>, ClusterContainer, ClusterStatistics);

/// Folds a module's statistics in on success, or records it as skipped.
///
/// Returns true if the module's output should be committed.
fn settle(
    module: u16,
    result: Result<()>,
    module_stats: &ClusterStatistics,
    stats: &mut ClusterStatistics,
) -> bool {
    match result {
        Ok(()) => {
            stats.merge(module_stats);
            true
        }
        Err(e) => {
            warn!("skipping module {module}: {e}");
            stats.modules_skipped.push(module);
            false
        }
    }
}

fn merge_results(results: Vec<ModuleResult>) -> (ClusterContainer, ClusterStatistics) {
    let mut container = ClusterContainer::new();
    let mut stats = ClusterStatistics::default();
    for (module, result, out, module_stats) in results {
        if settle(module, result, &module_stats, &mut stats) {
            container.merge(out);
        }
    }
    (container, stats)
}
