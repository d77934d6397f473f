//! Input containers for the three clustering paths.
//!
//! - simulated digits, per (module, row), with provenance labels
//! - raw front-end samples, grouped per link within a module
//! - clusters built elsewhere, adjusted in place

use crate::cluster::{Cluster, NO_LABEL};
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One simulated (pad, time-bin) sample.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Digit {
    pub pad: u16,
    pub time_bin: u16,
    pub amplitude: f32,
    pub labels: [i32; 3],
}

impl Digit {
    /// Creates an unlabelled digit.
    #[must_use]
    pub fn new(pad: u16, time_bin: u16, amplitude: f32) -> Self {
        Self {
            pad,
            time_bin,
            amplitude,
            labels: [NO_LABEL; 3],
        }
    }

    /// Attaches provenance labels.
    #[must_use]
    pub fn with_labels(mut self, labels: [i32; 3]) -> Self {
        self.labels = labels;
        self
    }
}

/// Digits of one pad-row, kept sorted by (pad, time bin).
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RowDigits {
    digits: Vec<Digit>,
}

impl RowDigits {
    /// Creates a row from unordered digits.
    #[must_use]
    pub fn from_digits(mut digits: Vec<Digit>) -> Self {
        digits.sort_by_key(|d| (d.pad, d.time_bin));
        Self { digits }
    }

    /// Inserts a digit, keeping the order.
    pub fn push(&mut self, digit: Digit) {
        let key = (digit.pad, digit.time_bin);
        let at = self
            .digits
            .partition_point(|d| (d.pad, d.time_bin) < key);
        self.digits.insert(at, digit);
    }

    /// Provenance labels of the digit at (pad, time bin), if any.
    #[must_use]
    pub fn labels_at(&self, pad: u16, time_bin: u16) -> Option<[i32; 3]> {
        self.digits
            .binary_search_by_key(&(pad, time_bin), |d| (d.pad, d.time_bin))
            .ok()
            .map(|i| self.digits[i].labels)
    }

    /// Iterates over the digits.
    pub fn iter(&self) -> impl Iterator<Item = &Digit> {
        self.digits.iter()
    }

    /// Number of digits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.digits.len()
    }

    /// Returns true if the row holds no digits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }
}

/// Per (module, row) access to simulated digits.
pub trait DigitSource: Sync {
    /// Modules with data, ascending.
    fn modules(&self) -> Vec<u16>;

    /// Rows of a module that hold digits, ascending.
    fn rows(&self, module: u16) -> Vec<u16>;

    /// Digits of one row.
    fn row(&self, module: u16, row: u16) -> Option<&RowDigits>;
}

/// In-memory digit container for one event.
#[derive(Debug, Clone, Default)]
pub struct DigitEvent {
    modules: BTreeMap<u16, BTreeMap<u16, RowDigits>>,
}

impl DigitEvent {
    /// Creates an empty event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a digit.
    pub fn push(&mut self, module: u16, row: u16, digit: Digit) {
        self.modules
            .entry(module)
            .or_default()
            .entry(row)
            .or_default()
            .push(digit);
    }

    /// Replaces the digits of a row.
    pub fn insert_row(&mut self, module: u16, row: u16, digits: RowDigits) {
        self.modules.entry(module).or_default().insert(row, digits);
    }

    /// Total number of digits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules
            .values()
            .flat_map(BTreeMap::values)
            .map(RowDigits::len)
            .sum()
    }

    /// Returns true if the event holds no digits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DigitSource for DigitEvent {
    fn modules(&self) -> Vec<u16> {
        self.modules.keys().copied().collect()
    }

    fn rows(&self, module: u16) -> Vec<u16> {
        self.modules
            .get(&module)
            .map(|rows| rows.keys().copied().collect())
            .unwrap_or_default()
    }

    fn row(&self, module: u16, row: u16) -> Option<&RowDigits> {
        self.modules.get(&module).and_then(|rows| rows.get(&row))
    }
}

/// One raw front-end sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawSample {
    pub row: u16,
    pub pad: u16,
    pub time_bin: u16,
    pub amplitude: u16,
}

impl RawSample {
    /// Creates a raw sample.
    #[must_use]
    pub fn new(row: u16, pad: u16, time_bin: u16, amplitude: u16) -> Self {
        Self {
            row,
            pad,
            time_bin,
            amplitude,
        }
    }
}

/// Samples delivered by one front-end link, in arrival order.
#[derive(Debug, Clone, Copy)]
pub struct RawLink<'a> {
    pub link: u16,
    pub samples: &'a [RawSample],
}

/// Raw stream grouped per module and front-end link.
pub trait RawSource: Sync {
    /// Modules with data, ascending.
    fn modules(&self) -> Vec<u16>;

    /// Links of one module.
    fn links(&self, module: u16) -> Vec<RawLink<'_>>;
}

/// In-memory raw event.
#[derive(Debug, Clone, Default)]
pub struct RawEvent {
    modules: BTreeMap<u16, BTreeMap<u16, Vec<RawSample>>>,
}

impl RawEvent {
    /// Creates an empty event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample to a link.
    pub fn push(&mut self, module: u16, link: u16, sample: RawSample) {
        self.modules
            .entry(module)
            .or_default()
            .entry(link)
            .or_default()
            .push(sample);
    }

    /// Iterates over (module, link, sample) in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, u16, &RawSample)> {
        self.modules.iter().flat_map(|(&module, links)| {
            links.iter().flat_map(move |(&link, samples)| {
                samples.iter().map(move |s| (module, link, s))
            })
        })
    }

    /// Total number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    /// Returns true if the event holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RawSource for RawEvent {
    fn modules(&self) -> Vec<u16> {
        self.modules.keys().copied().collect()
    }

    fn links(&self, module: u16) -> Vec<RawLink<'_>> {
        self.modules.get(&module).map_or_else(Vec::new, |links| {
            links
                .iter()
                .map(|(&link, samples)| RawLink {
                    link,
                    samples: samples.as_slice(),
                })
                .collect()
        })
    }
}

/// A cluster built by an external finder.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalCluster {
    /// Cluster in sample units (position, charge, variances).
    pub cluster: Cluster,
    /// Authoritative edge flag, when the external finder provides one.
    pub edge: Option<bool>,
}

impl ExternalCluster {
    /// Wraps a cluster without an edge flag.
    #[must_use]
    pub fn new(cluster: Cluster) -> Self {
        Self {
            cluster,
            edge: None,
        }
    }

    /// Sets the authoritative edge flag.
    #[must_use]
    pub fn with_edge(mut self, edge: bool) -> Self {
        self.edge = Some(edge);
        self
    }
}

/// Pre-clustered input, per (module, row).
#[derive(Debug, Clone, Default)]
pub struct ExternalClusters {
    modules: BTreeMap<u16, BTreeMap<u16, Vec<ExternalCluster>>>,
}

impl ExternalClusters {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cluster; module and row are taken from the cluster itself.
    pub fn push(&mut self, cluster: ExternalCluster) {
        self.modules
            .entry(cluster.cluster.module)
            .or_default()
            .entry(cluster.cluster.row)
            .or_default()
            .push(cluster);
    }

    /// Modules with data, ascending.
    #[must_use]
    pub fn modules(&self) -> Vec<u16> {
        self.modules.keys().copied().collect()
    }

    /// Removes and returns the rows of one module.
    pub fn take_module(&mut self, module: u16) -> BTreeMap<u16, Vec<ExternalCluster>> {
        self.modules.remove(&module).unwrap_or_default()
    }

    /// Total number of clusters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    /// Returns true if the container holds no clusters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
