//! Clustering counters.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Counters accumulated while clustering an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterStatistics {
    /// Samples loaded into the signal grid.
    pub samples_loaded: usize,
    /// Local maxima passed to the cluster builder.
    pub seeds: usize,
    /// Plain clusters emitted.
    pub plain: usize,
    /// Unfolded clusters emitted.
    pub unfolded: usize,
    /// Emitted clusters tagged as edge clusters.
    pub edge: usize,
    /// Candidates rejected by the builder or the acceptance cuts.
    pub rejected: usize,
    /// External clusters kept.
    pub external_kept: usize,
    /// External clusters dropped by the filter.
    pub external_dropped: usize,
    /// Modules processed to completion.
    pub modules_processed: usize,
    /// Modules skipped after a module-scoped failure.
    pub modules_skipped: Vec<u16>,
}

impl ClusterStatistics {
    /// Total emitted clusters.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.plain + self.unfolded + self.external_kept
    }

    /// Adds the counters of `other`.
    pub fn merge(&mut self, other: &ClusterStatistics) {
        self.samples_loaded += other.samples_loaded;
        self.seeds += other.seeds;
        self.plain += other.plain;
        self.unfolded += other.unfolded;
        self.edge += other.edge;
        self.rejected += other.rejected;
        self.external_kept += other.external_kept;
        self.external_dropped += other.external_dropped;
        self.modules_processed += other.modules_processed;
        self.modules_skipped
            .extend_from_slice(&other.modules_skipped);
        self.modules_skipped.sort_unstable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge() {
        let mut a = ClusterStatistics {
            plain: 3,
            modules_skipped: vec![5],
            ..Default::default()
        };
        let b = ClusterStatistics {
            plain: 1,
            unfolded: 2,
            external_kept: 4,
            modules_skipped: vec![1],
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.emitted(), 10);
        assert_eq!(a.modules_skipped, vec![1, 5]);
    }
}
