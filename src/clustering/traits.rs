//! The clusterer contract consumed by the multimodal prior.
//!
//! A clusterer partitions a stream of scalar values into clusters
//! identified by small integer indices. It never calls back into its owner:
//! cluster lifecycle changes are returned from [`Clusterer1d::add`] as
//! [`ClusterEvent`]s, and the owner reacts once the call has returned.
use crate::clustering::x_means::XMeansOnline1d;
use serde::{Deserialize, Serialize};

/// A change to the set of clusters caused by one `add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterEvent {
    /// Cluster `source` was replaced by `left` and `right`.
    Split { source: usize, left: usize, right: usize },
    /// Clusters `left` and `right` were replaced by `target`.
    Merge { left: usize, right: usize, target: usize },
}

/// Result of adding one value.
///
/// Fields
/// ------
/// - `assignments`: `(cluster index, weight)` pairs whose weights sum to
///   the count that was added. Indices refer to the clusters as they are
///   after every event in `events`.
/// - `events`: splits and merges, in the order they happened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterUpdate {
    pub assignments: Vec<(usize, f64)>,
    pub events: Vec<ClusterEvent>,
}

/// Clusterer1d — online clustering of scalar values.
///
/// Required
/// --------
/// - `add(x, count)`: assign `x` with weight `count` and update clusters.
/// - `probability(index)`: fraction of the total weight in a cluster, `0`
///   for an unknown index.
/// - `sample(index, count)`: `count` representative points of a cluster,
///   or `None` if the index is unknown.
/// - `propagate_forwards_by_time(time)`: age cluster weights by
///   `exp(−decay_rate · time)`.
/// - `to_state()`: serializable form used for persistence.
pub trait Clusterer1d: Send + std::fmt::Debug {
    fn add(&mut self, x: f64, count: f64) -> ClusterUpdate;
    fn probability(&self, index: usize) -> f64;
    fn sample(&self, index: usize, count: usize) -> Option<Vec<f64>>;
    fn number_clusters(&self) -> usize;
    fn has_cluster(&self, index: usize) -> bool;
    fn cluster_indices(&self) -> Vec<usize>;
    fn propagate_forwards_by_time(&mut self, time: f64);
    fn decay_rate(&self) -> f64;
    fn set_decay_rate(&mut self, decay_rate: f64);
    fn clear(&mut self);
    fn checksum(&self, seed: u64) -> u64;
    fn clone_box(&self) -> Box<dyn Clusterer1d>;
    fn to_state(&self) -> ClustererState;
}

impl Clone for Box<dyn Clusterer1d> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Persisted form of a boxed clusterer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "state")]
pub enum ClustererState {
    XMeans(XMeansOnline1d),
}

impl ClustererState {
    pub fn restore(self) -> Box<dyn Clusterer1d> {
        match self {
            ClustererState::XMeans(clusterer) => Box::new(clusterer),
        }
    }
}
