//! Online x-means clustering of scalar values.
//!
//! Purpose
//! -------
//! Discover the modes of a one-dimensional stream without fixing their
//! number up front. Clusters are normal components that split when the
//! Bayesian information criterion favours two components over one, and
//! neighbouring clusters merge when it favours one over two.
//!
//! Key behaviors
//! -------------
//! - Each cluster keeps a weighted mean/variance accumulator and a bounded
//!   sketch of weighted centroids sorted by position. The sketch stands in
//!   for the raw points when a split is evaluated.
//! - A value goes to its most likely cluster, or is shared with the runner
//!   up when that cluster's posterior exceeds the soft assignment threshold.
//! - Splits use the best cut of the sketch; the within-centroid variance the
//!   sketch cannot see is attributed equally to both halves.
//! - Split and merge thresholds differ so a freshly split pair is never
//!   merged straight back.
//! - Indices are recycled: a new cluster takes the smallest index not in
//!   use.
//!
//! Invariants & assumptions
//! ------------------------
//! - Sketch weights sum to the cluster count up to rounding.
//! - Clusters are kept sorted by mean.
use crate::clustering::errors::{ClusterError, ClusterResult};
use crate::clustering::traits::{ClusterEvent, ClusterUpdate, Clusterer1d, ClustererState};
use crate::statistics::{quantile_points, Checksum, MeanVarAccumulator};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::f64::consts::PI;
use tracing::{debug, error};

const MINIMUM_RELATIVE_VARIANCE: f64 = 1e-8;

/// XMeansOptions — tuning of [`XMeansOnline1d`].
///
/// Fields
/// ------
/// - `minimum_cluster_count`: smallest count either half of a split may
///   have. Default `24`.
/// - `minimum_cluster_fraction`: smallest share of the total count either
///   half of a split may have, in `[0, 0.5)`. Default `0`.
/// - `split_margin`: BIC improvement required to split. Default `6`.
/// - `merge_margin`: neighbours merge when two components improve the BIC
///   by less than this. Must not exceed `split_margin`. Default `0`.
/// - `soft_assignment_threshold`: runner-up posterior above which a value
///   is shared between two clusters, in `[0, 0.5]`. Default `0.05`.
/// - `sketch_size`: centroids kept per cluster, at least 4. Default `32`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XMeansOptions {
    pub minimum_cluster_count: f64,
    pub minimum_cluster_fraction: f64,
    pub split_margin: f64,
    pub merge_margin: f64,
    pub soft_assignment_threshold: f64,
    pub sketch_size: usize,
}

impl XMeansOptions {
    pub fn new(
        minimum_cluster_count: f64, minimum_cluster_fraction: f64, split_margin: f64, merge_margin: f64,
        soft_assignment_threshold: f64, sketch_size: usize,
    ) -> ClusterResult<Self> {
        if !minimum_cluster_count.is_finite() || minimum_cluster_count < 0.0 {
            return Err(ClusterError::InvalidOption {
                name: "minimum_cluster_count",
                value: minimum_cluster_count,
                reason: "must be finite and non-negative",
            });
        }
        if !(0.0..0.5).contains(&minimum_cluster_fraction) {
            return Err(ClusterError::InvalidOption {
                name: "minimum_cluster_fraction",
                value: minimum_cluster_fraction,
                reason: "must lie in [0, 0.5)",
            });
        }
        if !split_margin.is_finite() {
            return Err(ClusterError::InvalidOption {
                name: "split_margin",
                value: split_margin,
                reason: "must be finite",
            });
        }
        if !merge_margin.is_finite() || merge_margin > split_margin {
            return Err(ClusterError::InvalidOption {
                name: "merge_margin",
                value: merge_margin,
                reason: "must be finite and not exceed the split margin",
            });
        }
        if !(0.0..=0.5).contains(&soft_assignment_threshold) {
            return Err(ClusterError::InvalidOption {
                name: "soft_assignment_threshold",
                value: soft_assignment_threshold,
                reason: "must lie in [0, 0.5]",
            });
        }
        if sketch_size < 4 {
            return Err(ClusterError::SketchTooSmall(sketch_size));
        }
        Ok(XMeansOptions {
            minimum_cluster_count,
            minimum_cluster_fraction,
            split_margin,
            merge_margin,
            soft_assignment_threshold,
            sketch_size,
        })
    }
}

impl Default for XMeansOptions {
    fn default() -> Self {
        XMeansOptions {
            minimum_cluster_count: 24.0,
            minimum_cluster_fraction: 0.0,
            split_margin: 6.0,
            merge_margin: 0.0,
            soft_assignment_threshold: 0.05,
            sketch_size: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Centroid {
    x: f64,
    weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Cluster {
    index: usize,
    moments: MeanVarAccumulator,
    sketch: Vec<Centroid>,
}

impl Cluster {
    fn new(index: usize) -> Self {
        Cluster { index, moments: MeanVarAccumulator::new(), sketch: Vec::new() }
    }

    fn count(&self) -> f64 {
        self.moments.count()
    }

    fn add(&mut self, x: f64, weight: f64, sketch_size: usize) {
        self.moments.add(x, weight);
        let at = self.sketch.partition_point(|c| c.x < x);
        match self.sketch.get_mut(at) {
            Some(c) if c.x == x => c.weight += weight,
            _ => self.sketch.insert(at, Centroid { x, weight }),
        }
        compress(&mut self.sketch, sketch_size);
    }

    fn log_likelihood(&self, x: f64, total: f64) -> f64 {
        let v = floor_variance(self.moments.variance(), self.moments.mean());
        let d = x - self.moments.mean();
        (self.count() / total).ln() - 0.5 * (2.0 * PI * v).ln() - d * d / (2.0 * v)
    }
}

/// A candidate two-way cut of a cluster.
struct Partition {
    at: usize,
    left: MeanVarAccumulator,
    right: MeanVarAccumulator,
    gain: f64,
}

/// XMeansOnline1d — online BIC-driven split/merge clusterer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XMeansOnline1d {
    options: XMeansOptions,
    decay_rate: f64,
    clusters: Vec<Cluster>,
}

impl XMeansOnline1d {
    pub fn new(options: XMeansOptions, decay_rate: f64) -> Self {
        XMeansOnline1d { options, decay_rate: sanitize_decay_rate(decay_rate), clusters: Vec::new() }
    }

    pub fn options(&self) -> &XMeansOptions {
        &self.options
    }

    /// `(index, moments)` of every cluster in order of increasing mean.
    pub fn clusters(&self) -> impl Iterator<Item = (usize, &MeanVarAccumulator)> + '_ {
        self.clusters.iter().map(|c| (c.index, &c.moments))
    }

    fn total_count(&self) -> f64 {
        self.clusters.iter().map(Cluster::count).sum()
    }

    fn position(&self, index: usize) -> Option<usize> {
        self.clusters.iter().position(|c| c.index == index)
    }

    fn next_index(&self) -> usize {
        (0..).find(|i| self.position(*i).is_none()).unwrap_or(self.clusters.len())
    }

    fn assign(&self, x: f64, count: f64) -> Vec<(usize, f64)> {
        if self.clusters.len() == 1 {
            return vec![(self.clusters[0].index, count)];
        }
        let total = self.total_count();
        let mut ranked: Vec<(usize, f64)> = self
            .clusters
            .iter()
            .map(|c| (c.index, if c.count() > 0.0 { c.log_likelihood(x, total) } else { f64::NEG_INFINITY }))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        let (best, runner_up) = (ranked[0], ranked[1]);
        let p = 1.0 / (1.0 + (best.1 - runner_up.1).exp());
        if !(p >= self.options.soft_assignment_threshold) || p == 0.0 {
            return vec![(best.0, count)];
        }
        vec![(best.0, count * (1.0 - p)), (runner_up.0, count * p)]
    }

    /// Best cut of the cluster at `position`, if any cut is admissible.
    fn best_partition(&self, position: usize) -> Option<Partition> {
        let cluster = &self.clusters[position];
        let n = cluster.count();
        let sketch = &cluster.sketch;
        if sketch.len() < 2 || n < 2.0 * self.options.minimum_cluster_count {
            return None;
        }
        let mut all = MeanVarAccumulator::new();
        for c in sketch {
            all.add(c.x, c.weight);
        }
        let w = all.count();
        if w <= 0.0 {
            return None;
        }
        let residual = (cluster.moments.variance() - all.variance()).max(0.0);
        let minimum_count = self
            .options
            .minimum_cluster_count
            .max(self.options.minimum_cluster_fraction * self.total_count());

        let mut best: Option<Partition> = None;
        for at in 1..sketch.len() {
            let mut left = MeanVarAccumulator::new();
            let mut right = MeanVarAccumulator::new();
            sketch[..at].iter().for_each(|c| left.add(c.x, c.weight));
            sketch[at..].iter().for_each(|c| right.add(c.x, c.weight));
            let left = MeanVarAccumulator::from_moments(n * left.count() / w, left.mean(), left.variance() + residual);
            let right =
                MeanVarAccumulator::from_moments(n * right.count() / w, right.mean(), right.variance() + residual);
            if left.count() < minimum_count || right.count() < minimum_count {
                continue;
            }
            let gain = bic_gain(&left, &right);
            if best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(Partition { at, left, right, gain });
            }
        }
        best
    }

    fn maybe_split(&mut self, index: usize) -> Option<ClusterEvent> {
        let position = self.position(index)?;
        let partition = self.best_partition(position)?;
        if partition.gain <= self.options.split_margin {
            return None;
        }
        let right_index = self.next_index();
        let source = &mut self.clusters[position];
        let right_sketch = source.sketch.split_off(partition.at);
        source.moments = partition.left;
        self.clusters.push(Cluster { index: right_index, moments: partition.right, sketch: right_sketch });
        self.sort();
        debug!(source = index, left = index, right = right_index, gain = partition.gain, "split cluster");
        Some(ClusterEvent::Split { source: index, left: index, right: right_index })
    }

    fn maybe_merge(&mut self) -> Vec<ClusterEvent> {
        let mut events = Vec::new();
        while self.clusters.len() > 1 {
            let (at, gain) = self
                .clusters
                .windows(2)
                .enumerate()
                .map(|(i, pair)| (i, bic_gain(&pair[0].moments, &pair[1].moments)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .unwrap_or((0, f64::INFINITY));
            if !(gain < self.options.merge_margin) {
                break;
            }
            let right = self.clusters.remove(at + 1);
            let left = self.clusters.remove(at);
            let target = self.next_index();
            let mut merged = Cluster::new(target);
            merged.moments = left.moments + right.moments;
            merged.sketch = left.sketch;
            for c in right.sketch {
                let at = merged.sketch.partition_point(|m| m.x < c.x);
                merged.sketch.insert(at, c);
            }
            compress(&mut merged.sketch, self.options.sketch_size);
            self.clusters.push(merged);
            self.sort();
            debug!(left = left.index, right = right.index, target, gain, "merged clusters");
            events.push(ClusterEvent::Merge { left: left.index, right: right.index, target });
        }
        events
    }

    fn sort(&mut self) {
        self.clusters.sort_by(|a, b| a.moments.mean().total_cmp(&b.moments.mean()));
    }
}

impl Clusterer1d for XMeansOnline1d {
    fn add(&mut self, x: f64, count: f64) -> ClusterUpdate {
        if !x.is_finite() || !count.is_finite() || count <= 0.0 {
            error!(x, count, "discarding invalid value for clustering");
            return ClusterUpdate::default();
        }
        if self.clusters.is_empty() {
            let mut cluster = Cluster::new(0);
            cluster.add(x, count, self.options.sketch_size);
            self.clusters.push(cluster);
            return ClusterUpdate { assignments: vec![(0, count)], events: Vec::new() };
        }

        let assignments = self.assign(x, count);
        for &(index, weight) in &assignments {
            if let Some(position) = self.position(index) {
                self.clusters[position].add(x, weight, self.options.sketch_size);
            }
        }
        self.sort();

        let mut events: Vec<ClusterEvent> =
            assignments.iter().filter_map(|&(index, _)| self.maybe_split(index)).collect();
        events.extend(self.maybe_merge());

        let assignments = if events.is_empty() { assignments } else { self.assign(x, count) };
        ClusterUpdate { assignments, events }
    }

    fn probability(&self, index: usize) -> f64 {
        let total = self.total_count();
        match self.position(index) {
            Some(position) if total > 0.0 => self.clusters[position].count() / total,
            _ => 0.0,
        }
    }

    fn sample(&self, index: usize, count: usize) -> Option<Vec<f64>> {
        let moments = &self.clusters[self.position(index)?].moments;
        let (mean, sd) = (moments.mean(), moments.variance().sqrt());
        match Normal::new(mean, sd) {
            Ok(normal) if sd > 0.0 => Some(quantile_points(count, |p| normal.inverse_cdf(p))),
            _ => Some(vec![mean; count]),
        }
    }

    fn number_clusters(&self) -> usize {
        self.clusters.len()
    }

    fn has_cluster(&self, index: usize) -> bool {
        self.position(index).is_some()
    }

    fn cluster_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.clusters.iter().map(|c| c.index).collect();
        indices.sort_unstable();
        indices
    }

    fn propagate_forwards_by_time(&mut self, time: f64) {
        if !time.is_finite() || time < 0.0 {
            error!(time, "bad propagation time");
            return;
        }
        let alpha = (-self.decay_rate * time).exp();
        for cluster in &mut self.clusters {
            cluster.moments.age(alpha);
            cluster.sketch.iter_mut().for_each(|c| c.weight *= alpha);
        }
    }

    fn decay_rate(&self) -> f64 {
        self.decay_rate
    }

    fn set_decay_rate(&mut self, decay_rate: f64) {
        self.decay_rate = sanitize_decay_rate(decay_rate);
    }

    fn clear(&mut self) {
        self.clusters.clear();
    }

    fn checksum(&self, seed: u64) -> u64 {
        let mut seed = self.decay_rate.checksum(seed);
        for cluster in &self.clusters {
            seed = cluster.index.checksum(seed);
            seed = cluster.moments.checksum(seed);
            for c in &cluster.sketch {
                seed = c.weight.checksum(c.x.checksum(seed));
            }
        }
        seed
    }

    fn clone_box(&self) -> Box<dyn Clusterer1d> {
        Box::new(self.clone())
    }

    fn to_state(&self) -> ClustererState {
        ClustererState::XMeans(self.clone())
    }
}

fn sanitize_decay_rate(decay_rate: f64) -> f64 {
    if decay_rate.is_finite() && decay_rate >= 0.0 {
        decay_rate
    } else {
        error!(decay_rate, "invalid clusterer decay rate, using 0");
        0.0
    }
}

fn floor_variance(variance: f64, mean: f64) -> f64 {
    variance.max(MINIMUM_RELATIVE_VARIANCE * mean.abs().max(1.0).powi(2))
}

/// BIC of one normal minus BIC of a hard two-component mixture.
///
/// Positive values favour keeping the components apart.
fn bic_gain(left: &MeanVarAccumulator, right: &MeanVarAccumulator) -> f64 {
    let (nl, nr) = (left.count(), right.count());
    if nl <= 0.0 || nr <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let both = *left + *right;
    let n = nl + nr;
    let v = floor_variance(both.variance(), both.mean());
    let vl = floor_variance(left.variance(), left.mean());
    let vr = floor_variance(right.variance(), right.mean());
    let one = n * v.ln() + 2.0 * n.ln();
    let two = nl * vl.ln() + nr * vr.ln() - 2.0 * (nl * (nl / n).ln() + nr * (nr / n).ln()) + 5.0 * n.ln();
    one - two
}

/// Merge the closest neighbours until at most `size` centroids remain.
fn compress(sketch: &mut Vec<Centroid>, size: usize) {
    while sketch.len() > size {
        let at = (0..sketch.len() - 1)
            .min_by(|&i, &j| (sketch[i + 1].x - sketch[i].x).total_cmp(&(sketch[j + 1].x - sketch[j].x)))
            .unwrap_or(0);
        let right = sketch.remove(at + 1);
        let left = &mut sketch[at];
        let weight = left.weight + right.weight;
        if weight > 0.0 {
            left.x = (left.weight * left.x + right.weight * right.x) / weight;
        }
        left.weight = weight;
    }
}
