use approx::assert_relative_eq;
use padclust_algorithms::{Clusterer, ClustererState, ConstantShapeModel, EventContext};
use padclust_core::{
    CalibrationSet, Cluster, ClusterContainer, ClustererConfig, Digit, DigitEvent, DriftTransform,
    ExternalCluster, ExternalClusters, Geometry, IdentityTransform, ModuleCalibration, Pass,
    RawEvent, RawSample, RunStamp, StaticCorrections, Transform, UniformGeometry,
};

const N_TIME_BINS: u16 = 200;

fn geometry() -> UniformGeometry {
    UniformGeometry::single_module(2, 40, N_TIME_BINS)
}

fn clusterer(config: ClustererConfig) -> Clusterer<UniformGeometry, ConstantShapeModel> {
    Clusterer::with_shape_model(config, geometry(), ConstantShapeModel::new(0.5, 0.5)).unwrap()
}

fn calibration(gain: f32, pedestal: Option<f32>) -> CalibrationSet {
    let pads = geometry().pads_per_row(0);
    CalibrationSet::new(RunStamp::new(12, 3_000))
        .with_module(0, ModuleCalibration::uniform(&pads, gain, 1.0, pedestal))
}

const PULSE: [(u16, u16, u16); 5] = [
    (10, 100, 60),
    (9, 100, 20),
    (11, 100, 20),
    (10, 99, 20),
    (10, 101, 20),
];

#[test]
fn test_raw_pedestal_path_matches_digits() {
    let mut raw = RawEvent::new();
    for pad in 8..=12u16 {
        for time in 0..N_TIME_BINS {
            let amplitude = PULSE
                .iter()
                .find(|&&(p, t, _)| p == pad && t == time)
                .map_or(if time % 2 == 0 { 51 } else { 49 }, |&(_, _, a)| 50 + a);
            raw.push(0, pad % 3, RawSample::new(0, pad, time, amplitude));
        }
    }
    let mut digits = DigitEvent::new();
    for &(pad, time, amp) in &PULSE {
        digits.push(0, 0, Digit::new(pad, time, f32::from(amp)));
    }

    let config = ClustererConfig::default()
        .with_time_range(0, N_TIME_BINS - 1)
        .with_calc_pedestal(true);
    let clusterer = clusterer(config);
    let calib = calibration(1.0, Some(50.0));
    let transform = IdentityTransform;
    let ctx = EventContext::new(&calib, &transform);
    let mut state = ClustererState::default();

    let mut from_raw = ClusterContainer::new();
    let stats = clusterer.run_raw(&mut state, &ctx, &raw, Pass::First, &mut from_raw).unwrap();
    assert_eq!(stats.samples_loaded, 5 * usize::from(N_TIME_BINS));
    assert_eq!(from_raw.len(), 1);

    let mut from_digits = ClusterContainer::new();
    clusterer.run_digits(&mut state, &ctx, &digits, Pass::First, &mut from_digits).unwrap();
    assert_eq!(from_raw, from_digits);
}

#[test]
fn test_raw_out_of_range_skips_module() {
    let mut raw = RawEvent::new();
    for &(pad, time, amp) in &PULSE {
        raw.push(0, 0, RawSample::new(1, pad, time, amp));
    }
    raw.push(0, 1, RawSample::new(5, 3, 3, 40));

    let clusterer = clusterer(ClustererConfig::default());
    let calib = calibration(1.0, None);
    let transform = IdentityTransform;
    let ctx = EventContext::new(&calib, &transform);

    let (out, stats) = clusterer.par_run_raw(&ctx, &raw, Pass::First);
    assert!(out.is_empty());
    assert_eq!(stats.modules_skipped, vec![0]);
}

#[test]
fn test_external_clusters_filtered_and_completed() {
    let mut clusters = ExternalClusters::new();
    // Kept: charges halved by the gain.
    clusters.push(ExternalCluster::new(
        Cluster::new(0, 1, 12.3, 80.0, 200.0, 40.0).with_shape(1.0, 2.0),
    ));
    // Dropped: peak falls under the absolute cut after gain correction.
    clusters.push(ExternalCluster::new(Cluster::new(0, 1, 20.0, 80.0, 10.0, 5.0)));
    // Kept, edge flag taken from the source although it sits mid-module.
    clusters.push(ExternalCluster::new(Cluster::new(0, 0, 20.0, 90.0, 60.0, 30.0)).with_edge(true));
    // Module without calibration.
    clusters.push(ExternalCluster::new(Cluster::new(3, 0, 20.0, 90.0, 60.0, 30.0)));

    let clusterer = clusterer(ClustererConfig::default());
    let calib = calibration(2.0, None);
    let transform = IdentityTransform;
    let ctx = EventContext::new(&calib, &transform);
    let mut state = ClustererState::default();
    let mut out = ClusterContainer::new();
    let stats = clusterer.run_external(&mut state, &ctx, clusters, &mut out).unwrap();

    assert_eq!(stats.external_kept, 2);
    assert_eq!(stats.external_dropped, 1);
    assert_eq!(stats.modules_skipped, vec![3]);

    let edge = &out.row(0, 0)[0];
    assert!(edge.edge);
    assert_eq!(edge.type_code(), -3);

    let kept = out.row(0, 1);
    assert_eq!(kept.len(), 1);
    assert_relative_eq!(kept[0].q, 100.0);
    assert_relative_eq!(kept[0].q_max, 20.0);
    assert_relative_eq!(kept[0].sigma_y2, 0.16, epsilon = 1e-6);
    assert_relative_eq!(kept[0].sigma_z2, 0.125, epsilon = 1e-6);
    assert!(!kept[0].edge);
    assert!(kept[0].position.is_some());
}

#[test]
fn test_drift_transform_positions() {
    let mut digits = DigitEvent::new();
    for &(pad, time, amp) in &PULSE {
        digits.push(0, 1, Digit::new(pad, time, f32::from(amp)));
    }
    let calib = calibration(1.0, None);
    let mut transform = DriftTransform::new(geometry(), StaticCorrections::default());
    assert!(transform.prepare(calib.stamp()).unwrap());
    assert!(!transform.prepare(calib.stamp()).unwrap());

    let ctx = EventContext::new(&calib, &transform);
    let clusterer = clusterer(ClustererConfig::default());
    let mut state = ClustererState::default();
    let mut out = ClusterContainer::new();
    clusterer.run_digits(&mut state, &ctx, &digits, Pass::First, &mut out).unwrap();

    let c = &out.row(0, 1)[0];
    let p = c.position.unwrap();
    let row = geometry().row(0, 1).unwrap();
    let drift = geometry().drift(0).unwrap();
    assert_relative_eq!(p.x, row.radius);
    assert_relative_eq!(p.y, (10.5 - 20.0) * row.pad_width, epsilon = 1e-5);
    assert_relative_eq!(
        p.z,
        drift.z_sign * (drift.drift_length - 100.0 * drift.time_bin_width),
        epsilon = 1e-4
    );

    let compact = clusterer_compact();
    let mut out = ClusterContainer::new();
    compact.run_digits(&mut state, &ctx, &digits, Pass::First, &mut out).unwrap();
    assert!(out.row(0, 1)[0].position.is_none());
}

fn clusterer_compact() -> Clusterer<UniformGeometry, ConstantShapeModel> {
    clusterer(ClustererConfig::default().with_compact_output(true))
}

#[test]
fn test_unprepared_transform_skips_module() {
    let mut digits = DigitEvent::new();
    for &(pad, time, amp) in &PULSE {
        digits.push(0, 1, Digit::new(pad, time, f32::from(amp)));
    }
    let calib = calibration(1.0, None);
    let transform = DriftTransform::new(geometry(), StaticCorrections::default());
    let ctx = EventContext::new(&calib, &transform);
    let clusterer = clusterer(ClustererConfig::default());
    let mut state = ClustererState::default();
    let mut out = ClusterContainer::new();
    let stats = clusterer.run_digits(&mut state, &ctx, &digits, Pass::First, &mut out).unwrap();
    assert_eq!(stats.modules_skipped, vec![0]);
    assert!(out.is_empty());
}
