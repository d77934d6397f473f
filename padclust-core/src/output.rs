//! Output containers.

use crate::{Cluster, Result};
use std::collections::BTreeMap;

/// Receives the clusters of one row once the row has been scanned.
pub trait ClusterSink {
    /// Takes the clusters of one row; `clusters` is left empty.
    ///
    /// # Errors
    /// Returns [`crate::Error::Output`] if the clusters cannot be stored.
    fn flush_row(&mut self, module: u16, row: u16, clusters: &mut Vec<Cluster>) -> Result<()>;
}

/// In-memory cluster store ordered by (module, row).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterContainer {
    rows: BTreeMap<(u16, u16), Vec<Cluster>>,
}

impl ClusterContainer {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clusters of one row.
    #[must_use]
    pub fn row(&self, module: u16, row: u16) -> &[Cluster] {
        self.rows.get(&(module, row)).map_or(&[], Vec::as_slice)
    }

    /// Iterates over all clusters in (module, row) order.
    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.rows.values().flatten()
    }

    /// Total number of clusters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    /// Returns true if the container holds no clusters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.values().all(Vec::is_empty)
    }

    /// Moves all clusters of `other` into this container.
    pub fn merge(&mut self, other: ClusterContainer) {
        for (key, mut clusters) in other.rows {
            self.rows.entry(key).or_default().append(&mut clusters);
        }
    }

    /// Replays every row, in (module, row) order, into another sink.
    ///
    /// # Errors
    /// Propagates the first error of `sink`.
    pub fn drain_into<S: ClusterSink + ?Sized>(self, sink: &mut S) -> Result<()> {
        for ((module, row), mut clusters) in self.rows {
            sink.flush_row(module, row, &mut clusters)?;
        }
        Ok(())
    }

    /// Consumes the container into a flat list.
    #[must_use]
    pub fn into_vec(self) -> Vec<Cluster> {
        self.rows.into_values().flatten().collect()
    }
}

impl ClusterSink for ClusterContainer {
    fn flush_row(&mut self, module: u16, row: u16, clusters: &mut Vec<Cluster>) -> Result<()> {
        if clusters.is_empty() {
            return Ok(());
        }
        self.rows.entry((module, row)).or_default().append(clusters);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_clears_buffer() {
        let mut container = ClusterContainer::new();
        let mut row = vec![
            Cluster::new(1, 4, 2.0, 3.0, 10.0, 5.0),
            Cluster::new(1, 4, 8.0, 3.0, 12.0, 6.0),
        ];
        container.flush_row(1, 4, &mut row).unwrap();
        assert!(row.is_empty());
        assert_eq!(container.row(1, 4).len(), 2);
        assert!(container.row(1, 5).is_empty());
    }

    #[test]
    fn test_drain_into_keeps_order() {
        let mut first = ClusterContainer::new();
        first
            .flush_row(2, 0, &mut vec![Cluster::new(2, 0, 1.0, 1.0, 5.0, 5.0)])
            .unwrap();
        first
            .flush_row(1, 3, &mut vec![Cluster::new(1, 3, 1.0, 1.0, 5.0, 5.0)])
            .unwrap();
        let mut target = ClusterContainer::new();
        first.drain_into(&mut target).unwrap();
        let modules: Vec<u16> = target.iter().map(|c| c.module).collect();
        assert_eq!(modules, vec![1, 2]);
    }

    #[test]
    fn test_merge_keeps_order() {
        let mut a = ClusterContainer::new();
        let mut b = ClusterContainer::new();
        a.flush_row(2, 0, &mut vec![Cluster::new(2, 0, 1.0, 1.0, 1.0, 1.0)])
            .unwrap();
        b.flush_row(1, 0, &mut vec![Cluster::new(1, 0, 1.0, 1.0, 1.0, 1.0)])
            .unwrap();
        a.merge(b);
        let modules: Vec<u16> = a.iter().map(|c| c.module).collect();
        assert_eq!(modules, vec![1, 2]);
        assert_eq!(a.len(), 2);
    }
}
