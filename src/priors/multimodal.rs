//! Multimodal prior: one child prior per cluster of the data.
//!
//! Purpose
//! -------
//! Model data with several well separated modes. An online clusterer
//! partitions the stream, and every cluster owns a child prior (a "mode")
//! cloned from a non-informative seed. The marginal likelihood is the
//! mixture of the modes weighted by cluster probability.
//!
//! Key behaviors
//! -------------
//! - The clusterer reports splits and merges as events from its `add`
//!   call; this prior replays each event on its modes before the value
//!   itself is assigned.
//! - Split children are seeded from resamples of the source cluster, merge
//!   targets from resamples of the two parent modes. At most
//!   `maximum_seed_weight` of the count is fed in a first pass; the rest
//!   follows in a second pass so the children stay close to the data.
//! - Seasonal variance scales are folded into the sample before
//!   clustering: `x ← mean + (x − mean)/√scale`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Every live cluster owns exactly one mode and vice versa.
//! - The mode sample counts sum to the prior's count within
//!   `invariant_tolerance` (relative). Violations are logged, not fatal.
use crate::clustering::traits::{ClusterEvent, Clusterer1d};
use crate::priors::core::{check_batch, clean_batch, PriorCore};
use crate::priors::errors::{PriorError, PriorResult};
use crate::priors::mixture::{self, Component};
use crate::priors::normal::IMPROPER_CDF;
use crate::priors::offset::{self, ADJUST_OFFSET_SAMPLE_SIZE};
use crate::priors::state::{ModeState, MultimodalState, PriorState};
use crate::priors::traits::{
    Bounds, DataType, LikelihoodOutcome, Prior, ProbabilityCalculation, SampleWeight, Tail,
    TailProbability,
};
use crate::statistics::checksum::Checksum;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// MultimodalOptions — resampling sizes and tolerances.
///
/// Fields
/// ------
/// - `split_resample_size`: points drawn from a cluster to seed each split
///   child. Default `50`.
/// - `merge_resample_size`: points drawn from each parent mode to seed a
///   merge target. Default `25`.
/// - `maximum_seed_weight`: count fed in the first seeding pass. Default `4`.
/// - `invariant_tolerance`: relative tolerance of the sample count check.
///   Default `1e-3`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultimodalOptions {
    pub split_resample_size: usize,
    pub merge_resample_size: usize,
    pub maximum_seed_weight: f64,
    pub invariant_tolerance: f64,
}

impl MultimodalOptions {
    pub fn new(
        split_resample_size: usize, merge_resample_size: usize, maximum_seed_weight: f64,
        invariant_tolerance: f64,
    ) -> PriorResult<Self> {
        if split_resample_size == 0 {
            return Err(PriorError::InvalidOption {
                name: "split_resample_size",
                value: 0.0,
                reason: "must be at least one",
            });
        }
        if merge_resample_size == 0 {
            return Err(PriorError::InvalidOption {
                name: "merge_resample_size",
                value: 0.0,
                reason: "must be at least one",
            });
        }
        if !maximum_seed_weight.is_finite() || maximum_seed_weight <= 0.0 {
            return Err(PriorError::InvalidOption {
                name: "maximum_seed_weight",
                value: maximum_seed_weight,
                reason: "must be finite and positive",
            });
        }
        if !invariant_tolerance.is_finite() || invariant_tolerance <= 0.0 {
            return Err(PriorError::InvalidOption {
                name: "invariant_tolerance",
                value: invariant_tolerance,
                reason: "must be finite and positive",
            });
        }
        Ok(MultimodalOptions {
            split_resample_size,
            merge_resample_size,
            maximum_seed_weight,
            invariant_tolerance,
        })
    }
}

impl Default for MultimodalOptions {
    fn default() -> Self {
        MultimodalOptions {
            split_resample_size: 50,
            merge_resample_size: 25,
            maximum_seed_weight: 4.0,
            invariant_tolerance: 1e-3,
        }
    }
}

/// A cluster index and the prior fitted to that cluster.
#[derive(Debug, Clone)]
pub struct Mode {
    index: usize,
    prior: Box<dyn Prior>,
}

impl Mode {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn prior(&self) -> &dyn Prior {
        &*self.prior
    }
}

/// MultimodalPrior — a clusterer plus one child prior per cluster.
#[derive(Debug, Clone)]
pub struct MultimodalPrior {
    core: PriorCore,
    options: MultimodalOptions,
    clusterer: Box<dyn Clusterer1d>,
    seed: Box<dyn Prior>,
    modes: Vec<Mode>,
}

impl MultimodalPrior {
    /// Build an empty prior.
    ///
    /// The seed is reset to non-informative at its current offset and is
    /// never updated afterwards; the clusterer adopts `decay_rate`.
    pub fn new(
        data_type: DataType, mut clusterer: Box<dyn Clusterer1d>, mut seed: Box<dyn Prior>,
        decay_rate: f64,
    ) -> Self {
        let core = PriorCore::new(data_type, decay_rate);
        clusterer.clear();
        clusterer.set_decay_rate(core.decay_rate());
        let offset = seed.offset();
        seed.set_to_non_informative(offset, core.decay_rate());
        seed.set_data_type(data_type);
        MultimodalPrior { core, options: MultimodalOptions::default(), clusterer, seed, modes: Vec::new() }
    }

    pub fn with_options(mut self, options: MultimodalOptions) -> Self {
        self.options = options;
        self
    }

    /// Rebuild from persisted state, checking modes against clusters.
    pub fn from_state(state: MultimodalState) -> PriorResult<Self> {
        let clusterer = state.clusterer.restore();
        let seed = state.seed.restore()?;
        let modes = state
            .modes
            .into_iter()
            .map(|m| Ok(Mode { index: m.index, prior: m.prior.restore()? }))
            .collect::<PriorResult<Vec<Mode>>>()?;

        let mut mode_indices: Vec<usize> = modes.iter().map(|m| m.index).collect();
        mode_indices.sort_unstable();
        let mut cluster_indices = clusterer.cluster_indices();
        cluster_indices.sort_unstable();
        if mode_indices != cluster_indices {
            return Err(PriorError::Restore(format!(
                "modes {mode_indices:?} do not match clusters {cluster_indices:?}"
            )));
        }
        Ok(MultimodalPrior { core: state.core, options: state.options, clusterer, seed, modes })
    }

    pub fn options(&self) -> &MultimodalOptions {
        &self.options
    }

    pub fn number_modes(&self) -> usize {
        self.modes.len()
    }

    pub fn modes(&self) -> &[Mode] {
        &self.modes
    }

    pub fn clusterer(&self) -> &dyn Clusterer1d {
        &*self.clusterer
    }

    pub fn seed_prior(&self) -> &dyn Prior {
        &*self.seed
    }

    /// Check the mode/cluster correspondence and the sample count sum,
    /// logging any violation.
    pub fn check_invariants(&self) -> bool {
        let mut ok = true;
        if self.modes.len() != self.clusterer.number_clusters() {
            error!(
                modes = self.modes.len(),
                clusters = self.clusterer.number_clusters(),
                "mode count differs from cluster count"
            );
            ok = false;
        }
        for mode in &self.modes {
            if !self.clusterer.has_cluster(mode.index) {
                error!(index = mode.index, "mode has no cluster");
                ok = false;
            }
        }
        let total = self.core.number_samples();
        let modes: f64 = self.modes.iter().map(|m| m.prior.number_samples()).sum();
        if (modes - total).abs() > self.options.invariant_tolerance * total.max(1.0) {
            error!(modes, total, "mode sample counts do not sum to the total");
            ok = false;
        }
        ok
    }

    fn components(&self) -> Vec<Component<'_>> {
        self.modes.iter().map(|m| (self.clusterer.probability(m.index), &*m.prior)).collect()
    }

    fn single(&self) -> Option<&dyn Prior> {
        match self.modes.as_slice() {
            [mode] => Some(&*mode.prior),
            _ => None,
        }
    }

    fn position(&self, index: usize) -> Option<usize> {
        self.modes.iter().position(|m| m.index == index)
    }

    fn new_mode_prior(&self) -> Box<dyn Prior> {
        let mut prior = self.seed.clone();
        prior.set_data_type(self.core.data_type());
        prior.set_decay_rate(self.core.decay_rate());
        prior
    }

    fn apply_event(&mut self, event: ClusterEvent) {
        match event {
            ClusterEvent::Split { source, left, right } => self.split(source, left, right),
            ClusterEvent::Merge { left, right, target } => self.merge(left, right, target),
        }
    }

    /// Replace mode `source` by two modes seeded from the new clusters.
    fn split(&mut self, source: usize, left: usize, right: usize) {
        let n = match self.position(source) {
            Some(position) => self.modes.remove(position).prior.number_samples(),
            None => {
                error!(source, "split of an unknown mode");
                0.0
            }
        };
        let (pl, pr) = (self.clusterer.probability(left), self.clusterer.probability(right));
        let (pl, pr) = if pl + pr > 0.0 { (pl / (pl + pr), pr / (pl + pr)) } else { (0.5, 0.5) };
        debug!(source, left, right, n, pl, pr, "splitting mode");

        for (index, p) in [(left, pl), (right, pr)] {
            let mut prior = self.new_mode_prior();
            if n > 0.0 {
                match self.clusterer.sample(index, self.options.split_resample_size) {
                    Some(samples) if !samples.is_empty() => {
                        let size = samples.len() as f64;
                        let target = p * n;
                        let seeded = target.min(self.options.maximum_seed_weight);
                        let seed_weights = vec![SampleWeight::count(seeded / size); samples.len()];
                        prior.add_samples(&samples, &seed_weights);
                        if target > seeded {
                            let rest = (target - seeded) / size;
                            prior.add_samples(&samples, &vec![SampleWeight::count(rest); samples.len()]);
                        }
                    }
                    _ => error!(index, "no samples for split cluster"),
                }
            }
            self.modes.push(Mode { index, prior });
        }
    }

    /// Replace modes `left` and `right` by one mode seeded from both.
    fn merge(&mut self, left: usize, right: usize, target: usize) {
        let mut parents: Vec<(Vec<f64>, f64)> = Vec::with_capacity(2);
        for index in [left, right] {
            let Some(position) = self.position(index) else {
                error!(index, "merge of an unknown mode");
                continue;
            };
            let mode = self.modes.remove(position);
            let n = mode.prior.number_samples();
            let mut samples = mode.prior.sample_marginal_likelihood(self.options.merge_resample_size);
            samples.retain(|x| x.is_finite());
            if samples.is_empty() && n > 0.0 {
                samples.push(mode.prior.marginal_likelihood_mean());
            }
            parents.push((samples, n));
        }
        debug!(left, right, target, "merging modes");

        let mut prior = self.new_mode_prior();
        let size: f64 = parents.iter().map(|(s, _)| s.len() as f64).sum();
        let n: f64 = parents.iter().map(|(_, n)| n).sum();
        let z = if size > 0.0 {
            parents.iter().map(|(s, n)| s.len() as f64 * n).sum::<f64>() / size
        } else {
            0.0
        };
        if z > 0.0 {
            let (samples, relative): (Vec<f64>, Vec<f64>) = parents
                .iter()
                .flat_map(|(s, n)| s.iter().map(move |&x| (x, n / z)))
                .unzip();
            let seeded = n.min(self.options.maximum_seed_weight);
            let pass = |scale: f64| -> Vec<SampleWeight> {
                relative.iter().map(|w| SampleWeight::count(w * scale)).collect()
            };
            prior.add_samples(&samples, &pass(seeded / size));
            if n > seeded {
                prior.add_samples(&samples, &pass((n - seeded) / size));
            }
        }
        self.modes.push(Mode { index: target, prior });
    }

    fn reset_modes(
        modes: &mut [Mode], offset: f64, decay_rate: f64,
        resamples: &[(Vec<f64>, Vec<SampleWeight>)],
    ) {
        for (mode, (samples, weights)) in modes.iter_mut().zip(resamples) {
            mode.prior.set_to_non_informative(offset, decay_rate);
            if !samples.is_empty() {
                mode.prior.add_samples(samples, weights);
            }
        }
    }

    /// Negative log-likelihood with each sample credited to its best mode.
    fn offset_cost(modes: &[Mode], samples: &[f64], weights: &[SampleWeight]) -> f64 {
        let mut total = 0.0;
        for (&x, w) in samples.iter().zip(weights) {
            let best = modes
                .iter()
                .map(|m| m.prior.joint_log_marginal_likelihood(&[x], &[w.unit()]))
                .filter(|outcome| outcome.is_success())
                .map(|outcome| outcome.value)
                .fold(f64::NEG_INFINITY, f64::max);
            if !best.is_finite() {
                return f64::MAX;
            }
            total += w.count * best;
        }
        -total
    }
}

impl Prior for MultimodalPrior {
    fn data_type(&self) -> DataType {
        self.core.data_type()
    }

    fn set_data_type(&mut self, data_type: DataType) {
        self.core.set_data_type(data_type);
        self.seed.set_data_type(data_type);
        for mode in &mut self.modes {
            mode.prior.set_data_type(data_type);
        }
    }

    fn decay_rate(&self) -> f64 {
        self.core.decay_rate()
    }

    fn set_decay_rate(&mut self, decay_rate: f64) {
        self.core.set_decay_rate(decay_rate);
        self.clusterer.set_decay_rate(self.core.decay_rate());
        for mode in &mut self.modes {
            mode.prior.set_decay_rate(self.core.decay_rate());
        }
    }

    fn offset_margin(&self) -> f64 {
        self.seed.offset_margin()
    }

    fn is_non_informative(&self) -> bool {
        match self.modes.as_slice() {
            [] => true,
            [mode] => mode.prior.is_non_informative(),
            _ => false,
        }
    }

    fn needs_offset(&self) -> bool {
        self.seed.needs_offset() || self.modes.iter().any(|m| m.prior.needs_offset())
    }

    fn offset(&self) -> f64 {
        self.modes.iter().map(|m| m.prior.offset()).fold(0.0, f64::max)
    }

    fn participates_in_model_selection(&self) -> bool {
        self.modes.len() > 1
    }

    fn unmarginalized_parameters(&self) -> f64 {
        (self.modes.len().max(1) - 1) as f64
    }

    fn number_samples(&self) -> f64 {
        self.core.number_samples()
    }

    /// Forget every mode and cluster. New modes come from the seed, so the
    /// offset argument is not used.
    fn set_to_non_informative(&mut self, _offset: f64, decay_rate: f64) {
        self.core.reset(decay_rate);
        self.clusterer.clear();
        self.clusterer.set_decay_rate(self.core.decay_rate());
        self.modes.clear();
    }

    fn adjust_offset(&mut self, samples: &[f64], weights: &[SampleWeight]) {
        if self.modes.is_empty() || !self.needs_offset() {
            return;
        }
        let margin = self.offset_margin();
        let current = self.offset();
        let Some(lower) = offset::required_offset(current, margin, samples) else {
            return;
        };
        let decay_rate = self.core.decay_rate();
        let resamples: Vec<(Vec<f64>, Vec<SampleWeight>)> = self
            .modes
            .iter()
            .map(|m| offset::resample(&*m.prior, ADJUST_OFFSET_SAMPLE_SIZE))
            .collect();

        let best = offset::choose_offset(lower, current, margin, |trial| {
            let mut modes = self.modes.clone();
            Self::reset_modes(&mut modes, trial, decay_rate, &resamples);
            Self::offset_cost(&modes, samples, weights)
        });
        debug!(current, offset = best, "adjusting multimodal offset");

        Self::reset_modes(&mut self.modes, best, decay_rate, &resamples);
        let total = self.modes.iter().map(|m| m.prior.number_samples()).sum();
        self.core.set_number_samples(total);
    }

    fn add_samples(&mut self, samples: &[f64], weights: &[SampleWeight]) {
        if !check_batch(samples, weights) {
            return;
        }
        let (samples, weights) = clean_batch(samples, weights);
        if samples.is_empty() {
            return;
        }
        self.adjust_offset(&samples, &weights);

        let mean = if self.is_non_informative() { 0.0 } else { self.marginal_likelihood_mean() };
        for (&x, w) in samples.iter().zip(&weights) {
            if w.count <= 0.0 {
                continue;
            }
            let scale = w.seasonal_variance_scale;
            let x = if scale != 1.0 { mean + (x - mean) / scale.sqrt() } else { x };

            let update = self.clusterer.add(x, w.count);
            for &event in &update.events {
                self.apply_event(event);
            }
            self.core.add_samples(&[x], &[*w]);

            let unit = SampleWeight::default().with_count_variance_scale(w.count_variance_scale);
            for (index, count) in update.assignments {
                let position = match self.position(index) {
                    Some(position) => position,
                    None => {
                        let prior = self.new_mode_prior();
                        self.modes.push(Mode { index, prior });
                        self.modes.len() - 1
                    }
                };
                self.modes[position].prior.add_samples(&[x], &[SampleWeight { count, ..unit }]);
            }
            if !update.events.is_empty() {
                self.check_invariants();
            }
        }
    }

    fn propagate_forwards_by_time(&mut self, time: f64) {
        if self.is_non_informative() {
            return;
        }
        let Some(alpha) = self.core.decay_factor(time) else {
            return;
        };
        self.clusterer.propagate_forwards_by_time(time);
        for mode in &mut self.modes {
            mode.prior.propagate_forwards_by_time(time);
        }
        self.core.age(alpha);
    }

    fn marginal_likelihood_support(&self) -> (f64, f64) {
        if self.modes.is_empty() {
            return self.seed.marginal_likelihood_support();
        }
        self.modes.iter().fold((f64::MAX, f64::MIN), |(lo, hi), m| {
            let (a, b) = m.prior.marginal_likelihood_support();
            (lo.min(a), hi.max(b))
        })
    }

    fn marginal_likelihood_mean(&self) -> f64 {
        match (self.modes.is_empty(), self.single()) {
            (true, _) => self.seed.marginal_likelihood_mean(),
            (_, Some(prior)) => prior.marginal_likelihood_mean(),
            _ => mixture::mean(&self.components()),
        }
    }

    fn nearest_marginal_likelihood_mean(&self, value: f64) -> f64 {
        match (self.modes.is_empty(), self.single()) {
            (true, _) => self.seed.marginal_likelihood_mean(),
            (_, Some(prior)) => prior.marginal_likelihood_mean(),
            _ => mixture::nearest_mean(&self.components(), value),
        }
    }

    fn marginal_likelihood_mode(&self, weight: &SampleWeight) -> f64 {
        match (self.modes.is_empty(), self.single()) {
            (true, _) => self.seed.marginal_likelihood_mode(weight),
            (_, Some(prior)) => prior.marginal_likelihood_mode(weight),
            _ => mixture::mode(&self.components(), weight),
        }
    }

    fn marginal_likelihood_variance(&self, weight: &SampleWeight) -> f64 {
        match (self.modes.is_empty(), self.single()) {
            (true, _) => f64::INFINITY,
            (_, Some(prior)) => prior.marginal_likelihood_variance(weight),
            _ => mixture::variance(&self.components(), weight),
        }
    }

    fn marginal_likelihood_confidence_interval(
        &self, percentage: f64, weight: &SampleWeight,
    ) -> (f64, f64) {
        match (self.modes.is_empty(), self.single()) {
            (true, _) => self.marginal_likelihood_support(),
            (_, Some(prior)) => prior.marginal_likelihood_confidence_interval(percentage, weight),
            _ => mixture::confidence_interval(&self.components(), percentage, weight),
        }
    }

    fn joint_log_marginal_likelihood(
        &self, samples: &[f64], weights: &[SampleWeight],
    ) -> LikelihoodOutcome {
        if !check_batch(samples, weights) {
            return LikelihoodOutcome::failed();
        }
        if self.is_non_informative() {
            return LikelihoodOutcome::overflowed();
        }
        match self.single() {
            Some(prior) => prior.joint_log_marginal_likelihood(samples, weights),
            None => mixture::joint_log_marginal_likelihood(&self.components(), samples, weights),
        }
    }

    fn sample_marginal_likelihood(&self, count: usize) -> Vec<f64> {
        match (self.modes.is_empty(), self.single()) {
            (true, _) => Vec::new(),
            (_, Some(prior)) => prior.sample_marginal_likelihood(count),
            _ => mixture::sample(&self.components(), count),
        }
    }

    fn minus_log_joint_cdf(&self, samples: &[f64], weights: &[SampleWeight]) -> Option<Bounds> {
        if !check_batch(samples, weights) {
            return None;
        }
        if self.is_non_informative() {
            return Some(Bounds::exact(-IMPROPER_CDF.ln()));
        }
        match self.single() {
            Some(prior) => prior.minus_log_joint_cdf(samples, weights),
            None => mixture::minus_log_joint_cdf(&self.components(), samples, weights, false),
        }
    }

    fn minus_log_joint_cdf_complement(
        &self, samples: &[f64], weights: &[SampleWeight],
    ) -> Option<Bounds> {
        if !check_batch(samples, weights) {
            return None;
        }
        if self.is_non_informative() {
            return Some(Bounds::exact(-IMPROPER_CDF.ln()));
        }
        match self.single() {
            Some(prior) => prior.minus_log_joint_cdf_complement(samples, weights),
            None => mixture::minus_log_joint_cdf(&self.components(), samples, weights, true),
        }
    }

    fn probability_of_less_likely_samples(
        &self, calculation: ProbabilityCalculation, samples: &[f64], weights: &[SampleWeight],
    ) -> Option<TailProbability> {
        if !check_batch(samples, weights) {
            return None;
        }
        if self.is_non_informative() {
            return Some(TailProbability { lower: 1.0, upper: 1.0, tail: Tail::Undetermined });
        }
        match self.single() {
            Some(prior) => prior.probability_of_less_likely_samples(calculation, samples, weights),
            None => mixture::probability_of_less_likely_samples(
                &self.components(),
                calculation,
                samples,
                weights,
            ),
        }
    }

    fn print(&self, indent: &str) -> String {
        if self.is_non_informative() {
            return format!("{indent}multimodal non-informative");
        }
        let child = format!("{indent}  ");
        let mut out = format!("{indent}multimodal {} modes", self.modes.len());
        for mode in &self.modes {
            out.push_str(&format!(
                "\n{indent} mode {} weight {:.3}\n{}",
                mode.index,
                self.clusterer.probability(mode.index),
                mode.prior.print(&child)
            ));
        }
        out
    }

    fn checksum(&self, seed: u64) -> u64 {
        let seed = self.core.checksum(seed);
        let seed = self.clusterer.checksum(seed);
        let seed = self.seed.checksum(seed);
        self.modes.iter().fold(self.modes.len().checksum(seed), |acc, mode| {
            mode.prior.checksum(mode.index.checksum(acc))
        })
    }

    fn clone_box(&self) -> Box<dyn Prior> {
        Box::new(self.clone())
    }

    fn to_state(&self) -> PriorState {
        PriorState::Multimodal(MultimodalState {
            core: self.core.clone(),
            options: self.options.clone(),
            clusterer: self.clusterer.to_state(),
            seed: Box::new(self.seed.to_state()),
            modes: self
                .modes
                .iter()
                .map(|m| ModeState { index: m.index, prior: m.prior.to_state() })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::x_means::{XMeansOnline1d, XMeansOptions};
    use crate::priors::normal::NormalMeanPrecConjugate;
    use crate::priors::traits::unit_weights;
    use rand::distributions::Distribution;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use statrs::distribution::Normal;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // Mode discovery through clusterer events, the mode/cluster invariants,
    // ageing and persistence of the multimodal prior with normal modes.
    // -------------------------------------------------------------------------

    fn prior(decay_rate: f64) -> MultimodalPrior {
        let clusterer = Box::new(XMeansOnline1d::new(XMeansOptions::default(), decay_rate));
        let seed = Box::new(NormalMeanPrecConjugate::non_informative(DataType::Continuous, decay_rate));
        MultimodalPrior::new(DataType::Continuous, clusterer, seed, decay_rate)
    }

    fn two_mode_samples() -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(7);
        let a = Normal::new(0.0, 1.0).unwrap();
        let b = Normal::new(20.0, 1.0).unwrap();
        let a: Vec<f64> = (0..300).map(|_| a.sample(&mut rng)).collect();
        let b: Vec<f64> = (0..300).map(|_| b.sample(&mut rng)).collect();
        a.iter().zip(&b).flat_map(|(x, y)| [*x, *y]).collect()
    }

    #[test]
    // Purpose
    // -------
    // Two separated populations end up in two modes whose counts sum to
    // the total.
    //
    // Given
    // -----
    // - 300 values each from N(0, 1) and N(20, 1), interleaved.
    //
    // Expect
    // ------
    // - two modes, invariants hold, the mixture mean is near 10 and the
    //   modes are more likely than the gap between them.
    fn discovers_two_modes() {
        // Arrange
        let mut prior = prior(0.0);
        let samples = two_mode_samples();

        // Act
        prior.add_samples(&samples, &unit_weights(samples.len()));

        // Assert
        assert_eq!(prior.number_modes(), 2);
        assert!(prior.check_invariants());
        assert!(prior.participates_in_model_selection());
        assert_eq!(prior.unmarginalized_parameters(), 1.0);
        assert_eq!(prior.number_samples(), 600.0);
        let mean = prior.marginal_likelihood_mean();
        assert!((mean - 10.0).abs() < 0.5, "mean = {mean}");
        let w = unit_weights(1);
        let at_mode = prior.joint_log_marginal_likelihood(&[0.0], &w);
        let in_gap = prior.joint_log_marginal_likelihood(&[10.0], &w);
        assert!(at_mode.is_success() && in_gap.is_success());
        assert!(at_mode.value > in_gap.value + 10.0);
        let nearest = prior.nearest_marginal_likelihood_mean(18.0);
        assert!((nearest - 20.0).abs() < 0.5, "nearest = {nearest}");
    }

    #[test]
    // Purpose
    // -------
    // An empty prior is non-informative and answers queries with the
    // improper defaults.
    fn empty_prior_is_non_informative() {
        // Arrange
        let prior = prior(0.0);
        let w = unit_weights(1);

        // Assert
        assert!(prior.is_non_informative());
        assert!(!prior.participates_in_model_selection());
        assert!(prior.seed_prior().is_non_informative());
        assert_eq!(prior.clusterer().number_clusters(), 0);
        assert!(prior.joint_log_marginal_likelihood(&[1.0], &w).is_overflowed());
        assert!(prior.joint_log_marginal_likelihood(&[], &[]).is_failed());
        assert!(prior.sample_marginal_likelihood(10).is_empty());
        let bounds = prior.minus_log_joint_cdf(&[1.0], &w).unwrap();
        assert!((bounds.lower - 2f64.ln()).abs() < 1e-12);
        let tail = prior
            .probability_of_less_likely_samples(ProbabilityCalculation::TwoSided, &[1.0], &w)
            .unwrap();
        assert_eq!((tail.lower, tail.upper), (1.0, 1.0));
    }

    #[test]
    // Purpose
    // -------
    // Propagation ages the prior, its clusterer and every mode alike.
    //
    // Given
    // -----
    // - the two-mode prior with decay rate 0.1, propagated by one unit.
    //
    // Expect
    // ------
    // - the count is scaled by e^−0.1 and the invariants still hold.
    fn propagation_ages_modes_and_total() {
        // Arrange
        let mut prior = prior(0.1);
        let samples = two_mode_samples();
        prior.add_samples(&samples, &unit_weights(samples.len()));
        let before = prior.number_samples();

        // Act
        prior.propagate_forwards_by_time(1.0);

        // Assert
        let expected = before * (-0.1f64).exp();
        assert!((prior.number_samples() - expected).abs() < 1e-9);
        assert!(prior.check_invariants());
    }

    #[test]
    // Purpose
    // -------
    // Resetting clears modes and clusters together.
    fn reset_clears_modes() {
        // Arrange
        let mut prior = prior(0.0);
        let samples = two_mode_samples();
        prior.add_samples(&samples, &unit_weights(samples.len()));

        // Act
        prior.set_to_non_informative(0.0, 0.2);

        // Assert
        assert_eq!(prior.number_modes(), 0);
        assert_eq!(prior.clusterer().number_clusters(), 0);
        assert_eq!(prior.decay_rate(), 0.2);
        assert_eq!(prior.clusterer().decay_rate(), 0.2);
        assert!(prior.check_invariants());
    }

    #[test]
    // Purpose
    // -------
    // Persisted state restores to an identical prior, and state whose
    // modes disagree with its clusters is refused.
    fn state_round_trip_and_mismatch() {
        // Arrange
        let mut prior = prior(0.0);
        let samples = two_mode_samples();
        prior.add_samples(&samples, &unit_weights(samples.len()));

        // Act
        let json = serde_json::to_string(&prior.to_state()).unwrap();
        let state: PriorState = serde_json::from_str(&json).unwrap();
        let restored = state.restore().unwrap();

        // Assert
        assert_eq!(restored.checksum(0), prior.checksum(0));
        let PriorState::Multimodal(mut broken) = prior.to_state() else {
            panic!("expected multimodal state");
        };
        broken.modes.pop();
        assert!(matches!(MultimodalPrior::from_state(broken), Err(PriorError::Restore(_))));
    }

    #[test]
    fn options_are_validated() {
        assert!(MultimodalOptions::new(0, 25, 4.0, 1e-3).is_err());
        assert!(MultimodalOptions::new(50, 25, f64::NAN, 1e-3).is_err());
        assert!(MultimodalOptions::new(50, 25, 4.0, 0.0).is_err());
        assert_eq!(MultimodalOptions::new(50, 25, 4.0, 1e-3).unwrap(), MultimodalOptions::default());
    }
}
