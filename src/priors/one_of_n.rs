//! Bayesian model selection over competing prior families.
//!
//! Purpose
//! -------
//! Hold several candidate priors fitted to the same data together with
//! their posterior model probabilities. Every batch updates each candidate
//! and multiplies its weight by the batch's marginal likelihood under that
//! candidate, so the weights track which family explains the data best.
//!
//! Key behaviors
//! -------------
//! - Weights live in log space and are re-normalized after every mutation.
//! - Candidates with unmarginalized parameters (e.g. the number of modes of
//!   a multimodal prior) pay a BIC penalty of `(ln N_before − ln N_after)/2`
//!   per parameter.
//! - The log factor a single batch can apply is floored at
//!   `max(n · model_penalty(N), min LL − maximum_log_factor_per_sample · n)`
//!   so one extreme sample cannot eliminate a candidate early on.
//! - A candidate whose participation flips is reinstated at
//!   `max log weight + log_initial_weight`; non-participating candidates
//!   are driven to the weight floor.
//! - Any non-finite weight after an update resets the whole prior.
//!
//! Conventions
//! -----------
//! - Queries mix candidates by weight. Low-weight candidates are dropped
//!   from means and variances (`minimum_significant_weight`) and from
//!   intervals (`maximum_relative_error`).
use crate::priors::core::{check_batch, clean_batch, total_count, PriorCore};
use crate::priors::errors::{PriorError, PriorResult};
use crate::priors::model_weight::{self, LogWeight, LOG_WEIGHT_FLOOR};
use crate::priors::normal::IMPROPER_CDF;
use crate::priors::state::{CandidateState, OneOfNState, PriorState};
use crate::priors::traits::{
    Bounds, DataType, LikelihoodOutcome, Prior, ProbabilityCalculation, SampleWeight, Tail,
    TailProbability,
};
use crate::statistics::accumulators::MeanAccumulator;
use crate::statistics::checksum::Checksum;
use crate::statistics::sampling::weighted_allocation;
use crate::statistics::tools::{log_sum_exp, truncate};
use serde::{Deserialize, Serialize};
use tracing::{error, trace, warn};

/// Candidates below this weight are omitted from `print`.
const PRINT_WEIGHT: f64 = 0.05;

/// OneOfNOptions — weight bookkeeping constants.
///
/// Fields
/// ------
/// - `log_initial_weight`: log weight, relative to the best candidate, at
///   which a candidate is reinstated. Default `ln(1e-6)`.
/// - `minimum_significant_weight`: weight above which a candidate enters
///   means and variances. Default `0.01`.
/// - `maximum_relative_error`: target relative error of truncated sums.
///   Default `1e-3`.
/// - `maximum_log_factor_per_sample`: per-sample bound on how far below
///   the best candidate a batch may push a weight. Default `100`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneOfNOptions {
    pub log_initial_weight: f64,
    pub minimum_significant_weight: f64,
    pub maximum_relative_error: f64,
    pub maximum_log_factor_per_sample: f64,
}

impl OneOfNOptions {
    pub fn new(
        log_initial_weight: f64, minimum_significant_weight: f64, maximum_relative_error: f64,
        maximum_log_factor_per_sample: f64,
    ) -> PriorResult<Self> {
        if !log_initial_weight.is_finite() || log_initial_weight > 0.0 {
            return Err(PriorError::InvalidOption {
                name: "log_initial_weight",
                value: log_initial_weight,
                reason: "must be finite and not positive",
            });
        }
        if !(minimum_significant_weight > 0.0 && minimum_significant_weight < 1.0) {
            return Err(PriorError::InvalidOption {
                name: "minimum_significant_weight",
                value: minimum_significant_weight,
                reason: "must lie in (0, 1)",
            });
        }
        if !(maximum_relative_error > 0.0 && maximum_relative_error < 1.0) {
            return Err(PriorError::InvalidOption {
                name: "maximum_relative_error",
                value: maximum_relative_error,
                reason: "must lie in (0, 1)",
            });
        }
        if !maximum_log_factor_per_sample.is_finite() || maximum_log_factor_per_sample <= 0.0 {
            return Err(PriorError::InvalidOption {
                name: "maximum_log_factor_per_sample",
                value: maximum_log_factor_per_sample,
                reason: "must be finite and positive",
            });
        }
        Ok(OneOfNOptions {
            log_initial_weight,
            minimum_significant_weight,
            maximum_relative_error,
            maximum_log_factor_per_sample,
        })
    }
}

impl Default for OneOfNOptions {
    fn default() -> Self {
        OneOfNOptions {
            log_initial_weight: 1e-6f64.ln(),
            minimum_significant_weight: 0.01,
            maximum_relative_error: 1e-3,
            maximum_log_factor_per_sample: 100.0,
        }
    }
}

/// Largest per-sample log factor by which a candidate may fall behind
/// after `number_samples` samples.
fn model_penalty(number_samples: f64) -> f64 {
    -(10.0 + number_samples)
}

#[derive(Debug, Clone)]
struct Candidate {
    weight: LogWeight,
    prior: Box<dyn Prior>,
}

/// OneOfNPrior — weighted ensemble of candidate priors.
#[derive(Debug, Clone)]
pub struct OneOfNPrior {
    core: PriorCore,
    options: OneOfNOptions,
    candidates: Vec<Candidate>,
}

impl OneOfNPrior {
    /// Candidates with equal initial weights.
    ///
    /// Errors
    /// ------
    /// - `PriorError::NoCandidates` if `models` is empty.
    pub fn new(models: Vec<Box<dyn Prior>>, data_type: DataType, decay_rate: f64) -> PriorResult<Self> {
        let n = models.len() as f64;
        Self::with_weights(models.into_iter().map(|m| (1.0 / n, m)).collect(), data_type, decay_rate)
    }

    /// Candidates with explicit initial weights, normalized to sum to one.
    ///
    /// Errors
    /// ------
    /// - `PriorError::NoCandidates` if `models` is empty.
    /// - `PriorError::InvalidCandidateWeight` for a weight that is not
    ///   finite and positive.
    pub fn with_weights(
        models: Vec<(f64, Box<dyn Prior>)>, data_type: DataType, decay_rate: f64,
    ) -> PriorResult<Self> {
        if models.is_empty() {
            return Err(PriorError::NoCandidates);
        }
        let core = PriorCore::new(data_type, decay_rate);
        let mut candidates = Vec::with_capacity(models.len());
        for (index, (weight, mut prior)) in models.into_iter().enumerate() {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(PriorError::InvalidCandidateWeight { index, weight });
            }
            prior.set_data_type(data_type);
            prior.set_decay_rate(core.decay_rate());
            candidates.push(Candidate { weight: LogWeight::new(weight), prior });
        }
        let mut prior = OneOfNPrior { core, options: OneOfNOptions::default(), candidates };
        prior.normalize();
        Ok(prior)
    }

    pub fn with_options(mut self, options: OneOfNOptions) -> Self {
        self.options = options;
        self
    }

    pub fn from_state(state: OneOfNState) -> PriorResult<Self> {
        if state.candidates.is_empty() {
            return Err(PriorError::Restore("model selection state has no candidates".to_string()));
        }
        let candidates = state
            .candidates
            .into_iter()
            .map(|c| Ok(Candidate { weight: c.weight, prior: c.prior.restore()? }))
            .collect::<PriorResult<Vec<Candidate>>>()?;
        Ok(OneOfNPrior { core: state.core, options: state.options, candidates })
    }

    pub fn options(&self) -> &OneOfNOptions {
        &self.options
    }

    /// Normalized linear weights, in candidate order.
    pub fn weights(&self) -> Vec<f64> {
        self.candidates.iter().map(|c| c.weight.weight()).collect()
    }

    pub fn log_weights(&self) -> Vec<f64> {
        self.candidates.iter().map(|c| c.weight.log_weight()).collect()
    }

    pub fn models(&self) -> Vec<&dyn Prior> {
        self.candidates.iter().map(|c| &*c.prior).collect()
    }

    /// Log weights at full precision, for diagnostics.
    pub fn debug_weights(&self) -> String {
        self.candidates
            .iter()
            .map(|c| format!("{:.15e}", c.weight.log_weight()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn normalize(&mut self) -> bool {
        let mut weights: Vec<LogWeight> = self.candidates.iter().map(|c| c.weight).collect();
        let ok = model_weight::normalize(&mut weights);
        for (candidate, weight) in self.candidates.iter_mut().zip(weights) {
            candidate.weight = weight;
        }
        ok
    }

    fn bad_weights(&self) -> bool {
        self.candidates.iter().any(|c| !c.weight.log_weight().is_finite())
    }

    fn participating(&self) -> impl Iterator<Item = &Candidate> + '_ {
        self.candidates.iter().filter(|c| c.prior.participates_in_model_selection())
    }

    fn minus_log_cdf_impl(
        &self, complement: bool, samples: &[f64], weights: &[SampleWeight],
    ) -> Option<Bounds> {
        if !check_batch(samples, weights) {
            return None;
        }
        if self.is_non_informative() {
            let f = if complement { 1.0 - IMPROPER_CDF } else { IMPROPER_CDF };
            return Some(Bounds::exact(-f.ln()));
        }

        let mut ranked: Vec<&Candidate> = self.participating().collect();
        ranked.sort_by(|a, b| b.weight.log_weight().total_cmp(&a.weight.log_weight()));

        let log_error = self.options.maximum_relative_error.ln();
        let (mut lowers, mut uppers) = (Vec::new(), Vec::new());
        let (mut max_lower, mut max_upper) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        let mut remainder = f64::NEG_INFINITY;
        for (i, candidate) in ranked.iter().enumerate() {
            let log_weight = candidate.weight.log_weight();
            let bounds = if complement {
                candidate.prior.minus_log_joint_cdf_complement(samples, weights)
            } else {
                candidate.prior.minus_log_joint_cdf(samples, weights)
            };
            let Some(bounds) = bounds else {
                error!(complement, samples = ?samples, "failed computing candidate c.d.f.");
                return None;
            };
            let (li, ui) = (log_weight - bounds.lower, log_weight - bounds.upper);
            lowers.push(li);
            uppers.push(ui);
            max_lower = max_lower.max(li);
            max_upper = max_upper.max(ui);

            if let Some(next) = ranked.get(i + 1) {
                remainder = ((ranked.len() - i - 1) as f64).ln() + next.weight.log_weight();
                if remainder < max_lower + log_error && remainder < max_upper + log_error {
                    break;
                }
            }
        }

        let lower = -log_sum_exp(&lowers);
        let mut upper = -log_sum_exp(&uppers);
        if lowers.len() < ranked.len() {
            upper -= (remainder + upper).exp().ln_1p();
        }
        Some(Bounds { lower: lower.max(0.0), upper: upper.max(0.0) })
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        0.5 * (values[mid - 1] + values[mid])
    }
}

impl Prior for OneOfNPrior {
    fn data_type(&self) -> DataType {
        self.core.data_type()
    }

    fn set_data_type(&mut self, data_type: DataType) {
        self.core.set_data_type(data_type);
        for candidate in &mut self.candidates {
            candidate.prior.set_data_type(data_type);
        }
    }

    fn decay_rate(&self) -> f64 {
        self.core.decay_rate()
    }

    fn set_decay_rate(&mut self, decay_rate: f64) {
        self.core.set_decay_rate(decay_rate);
        for candidate in &mut self.candidates {
            candidate.prior.set_decay_rate(self.core.decay_rate());
        }
    }

    fn offset_margin(&self) -> f64 {
        self.candidates.iter().map(|c| c.prior.offset_margin()).fold(0.0, f64::max)
    }

    fn is_non_informative(&self) -> bool {
        self.participating().any(|c| c.prior.is_non_informative())
    }

    fn needs_offset(&self) -> bool {
        self.candidates.iter().any(|c| c.prior.needs_offset())
    }

    fn offset(&self) -> f64 {
        self.candidates.iter().map(|c| c.prior.offset()).fold(0.0, f64::max)
    }

    fn number_samples(&self) -> f64 {
        self.core.number_samples()
    }

    fn set_to_non_informative(&mut self, offset: f64, decay_rate: f64) {
        self.core.reset(decay_rate);
        for candidate in &mut self.candidates {
            candidate.weight.age(0.0);
            candidate.prior.set_to_non_informative(offset, self.core.decay_rate());
        }
        self.normalize();
    }

    fn adjust_offset(&mut self, samples: &[f64], weights: &[SampleWeight]) {
        for candidate in &mut self.candidates {
            candidate.prior.adjust_offset(samples, weights);
        }
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

        let before = self.core.number_samples().ln();
        self.core.add_samples(&samples, &weights);
        let penalty = (before - self.core.number_samples().ln()) / 2.0;

        // Checked before the candidates see the batch.
        let non_informative = self.is_non_informative();

        // Per candidate: None if the likelihood failed, f64::MIN if it
        // overflowed or the candidate sits out. Every candidate still sees
        // the batch.
        let mut log_likelihoods: Vec<Option<f64>> = Vec::with_capacity(self.candidates.len());
        let mut reinstate = Vec::with_capacity(self.candidates.len());
        let mut min_log_likelihood = f64::INFINITY;
        for candidate in &mut self.candidates {
            let participates = candidate.prior.participates_in_model_selection();
            let outcome = if participates {
                candidate.prior.joint_log_marginal_likelihood(&samples, &weights)
            } else {
                LikelihoodOutcome::overflowed()
            };
            if outcome.is_failed() {
                error!(samples = ?samples, "failed to compute candidate log-likelihood");
                log_likelihoods.push(None);
            } else if outcome.is_overflowed() {
                log_likelihoods.push(Some(f64::MIN));
            } else {
                let parameters = candidate.prior.unmarginalized_parameters();
                let mut value = outcome.value;
                if parameters > 0.0 && penalty.is_finite() {
                    value += parameters * penalty;
                }
                min_log_likelihood = min_log_likelihood.min(value);
                log_likelihoods.push(Some(value));
            }
            candidate.prior.add_samples(&samples, &weights);
            reinstate.push(participates != candidate.prior.participates_in_model_selection());
        }

        if !non_informative && min_log_likelihood.is_finite() {
            trace!(log_likelihoods = ?log_likelihoods, "candidate log-likelihoods");
            let n = total_count(&weights);
            let floor = (n * model_penalty(self.core.number_samples()))
                .max(min_log_likelihood - n * self.options.maximum_log_factor_per_sample);

            let mut max_log_weight = f64::NEG_INFINITY;
            for (candidate, log_likelihood) in self.candidates.iter_mut().zip(&log_likelihoods) {
                if let Some(log_likelihood) = *log_likelihood {
                    let least = if candidate.prior.participates_in_model_selection() {
                        floor
                    } else {
                        LOG_WEIGHT_FLOOR - candidate.weight.log_weight()
                    };
                    candidate.weight.add_log_factor(log_likelihood.max(least));
                }
                max_log_weight = max_log_weight.max(candidate.weight.log_weight());
            }
            for (candidate, reinstate) in self.candidates.iter_mut().zip(reinstate) {
                if reinstate {
                    candidate.weight.set_log_weight(max_log_weight + self.options.log_initial_weight);
                }
            }
        }

        if self.bad_weights() || !self.normalize() {
            warn!(weights = %self.debug_weights(), samples = ?samples, "model selection update failed; resetting");
            let (margin, decay_rate) = (self.offset_margin(), self.core.decay_rate());
            self.set_to_non_informative(margin, decay_rate);
        }
    }

    fn propagate_forwards_by_time(&mut self, time: f64) {
        let Some(alpha) = self.core.decay_factor(time) else {
            return;
        };
        for candidate in &mut self.candidates {
            candidate.weight.age(alpha);
            candidate.prior.propagate_forwards_by_time(time);
        }
        self.core.age(alpha);
        self.normalize();
    }

    /// Intersection of the participating candidates' supports.
    fn marginal_likelihood_support(&self) -> (f64, f64) {
        self.participating().fold((f64::MIN, f64::MAX), |(lo, hi), c| {
            let (a, b) = c.prior.marginal_likelihood_support();
            (lo.max(a), hi.min(b))
        })
    }

    fn marginal_likelihood_mean(&self) -> f64 {
        if self.is_non_informative() {
            return median(self.participating().map(|c| c.prior.marginal_likelihood_mean()).collect());
        }
        self.candidates
            .iter()
            .map(|c| (c.weight.weight(), c))
            .filter(|(w, _)| *w > self.options.minimum_significant_weight)
            .map(|(w, c)| w * c.prior.marginal_likelihood_mean())
            .sum()
    }

    fn nearest_marginal_likelihood_mean(&self, value: f64) -> f64 {
        self.candidates
            .iter()
            .map(|c| (c.weight.weight(), c))
            .filter(|(w, _)| *w > self.options.minimum_significant_weight)
            .map(|(w, c)| w * c.prior.nearest_marginal_likelihood_mean(value))
            .sum()
    }

    /// Candidate modes averaged with weight `wᵢ · Lᵢ(modeᵢ)`.
    fn marginal_likelihood_mode(&self, weight: &SampleWeight) -> f64 {
        let mut mode = MeanAccumulator::default();
        for candidate in self.participating() {
            let x = candidate.prior.marginal_likelihood_mode(weight);
            let outcome = candidate.prior.joint_log_marginal_likelihood(&[x], &[weight.unit()]);
            let likelihood = if outcome.is_success() { outcome.value.exp() } else { 0.0 };
            mode.add(x, candidate.weight.weight() * likelihood);
        }
        let (lower, upper) = self.marginal_likelihood_support();
        truncate(mode.mean(), lower, upper)
    }

    fn marginal_likelihood_variance(&self, weight: &SampleWeight) -> f64 {
        if self.is_non_informative() {
            return f64::INFINITY;
        }
        self.candidates
            .iter()
            .map(|c| (c.weight.weight(), c))
            .filter(|(w, _)| *w > self.options.minimum_significant_weight)
            .map(|(w, c)| w * c.prior.marginal_likelihood_variance(weight))
            .sum()
    }

    /// Weighted mean of the candidate intervals; accurate when one
    /// candidate dominates.
    fn marginal_likelihood_confidence_interval(
        &self, percentage: f64, weight: &SampleWeight,
    ) -> (f64, f64) {
        let (mut lower, mut upper) = (MeanAccumulator::default(), MeanAccumulator::default());
        for candidate in &self.candidates {
            let w = candidate.weight.weight();
            if w >= self.options.maximum_relative_error {
                let (a, b) = candidate.prior.marginal_likelihood_confidence_interval(percentage, weight);
                lower.add(a, w);
                upper.add(b, w);
            }
        }
        (lower.mean(), upper.mean())
    }

    fn joint_log_marginal_likelihood(
        &self, samples: &[f64], weights: &[SampleWeight],
    ) -> LikelihoodOutcome {
        if !check_batch(samples, weights) {
            return LikelihoodOutcome::failed();
        }
        let mut terms = Vec::with_capacity(self.candidates.len());
        for candidate in self.participating() {
            let outcome = candidate.prior.joint_log_marginal_likelihood(samples, weights);
            if outcome.is_failed() {
                return outcome;
            }
            if !outcome.is_overflowed() {
                terms.push(outcome.value + candidate.weight.log_weight());
            }
        }
        if terms.is_empty() {
            return LikelihoodOutcome::overflowed();
        }
        let result = LikelihoodOutcome::from_value(log_sum_exp(&terms));
        if result.is_failed() {
            error!(weights = %self.debug_weights(), samples = ?samples, "failed to compute log likelihood");
        } else if result.is_overflowed() {
            error!(weights = %self.debug_weights(), "log likelihood overflowed");
        }
        result
    }

    fn sample_marginal_likelihood(&self, count: usize) -> Vec<f64> {
        if count == 0 || self.is_non_informative() {
            return Vec::new();
        }
        let weights = self.weights();
        let allocation = weighted_allocation(&weights, count);
        let (lower, upper) = self.marginal_likelihood_support();
        let (lower, upper) = (lower + lower.abs() * f64::EPSILON, upper - upper.abs() * f64::EPSILON);
        self.candidates
            .iter()
            .zip(allocation)
            .flat_map(|(c, n)| c.prior.sample_marginal_likelihood(n))
            .map(|x| truncate(x, lower, upper))
            .collect()
    }

    fn minus_log_joint_cdf(&self, samples: &[f64], weights: &[SampleWeight]) -> Option<Bounds> {
        self.minus_log_cdf_impl(false, samples, weights)
    }

    fn minus_log_joint_cdf_complement(
        &self, samples: &[f64], weights: &[SampleWeight],
    ) -> Option<Bounds> {
        self.minus_log_cdf_impl(true, samples, weights)
    }

    /// `P(R) = Σ P(R | m) P(m)` over candidates in decreasing weight,
    /// stopping once the remaining weight cannot matter.
    fn probability_of_less_likely_samples(
        &self, calculation: ProbabilityCalculation, samples: &[f64], weights: &[SampleWeight],
    ) -> Option<TailProbability> {
        if !check_batch(samples, weights) {
            return None;
        }
        if self.is_non_informative() {
            return Some(TailProbability { lower: 1.0, upper: 1.0, tail: Tail::Undetermined });
        }

        let mut ranked: Vec<(f64, &Candidate)> =
            self.participating().map(|c| (c.weight.weight(), c)).collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

        let (mut lower, mut upper) = (0.0, 0.0);
        let mut tail = (f64::NEG_INFINITY, Tail::Undetermined);
        for (i, (weight, candidate)) in ranked.iter().enumerate() {
            let remaining = (self.candidates.len() - i) as f64;
            if lower > remaining * weight / self.options.maximum_relative_error {
                break;
            }
            let p = candidate.prior.probability_of_less_likely_samples(calculation, samples, weights)?;
            lower += weight * p.lower;
            upper += weight * p.upper;
            let size = weight * (p.lower + p.upper);
            if size > tail.0 {
                tail = (size, p.tail);
            }
        }

        if !(0.0..=1.001).contains(&lower) || !(0.0..=1.001).contains(&upper) {
            error!(lower, upper, weights = %self.debug_weights(), "bad probability bounds");
        }
        let lower = if lower.is_nan() { 0.0 } else { truncate(lower, 0.0, 1.0) };
        let upper = if upper.is_nan() { 1.0 } else { truncate(upper, 0.0, 1.0) };
        Some(TailProbability { lower, upper, tail: tail.1 })
    }

    fn print(&self, indent: &str) -> String {
        let mut out = format!("{indent}one-of-n");
        if self.is_non_informative() {
            out.push_str(" non-informative");
        }
        out.push_str(&format!(":\n{indent} # samples {:.3}", self.core.number_samples()));
        for candidate in &self.candidates {
            let weight = candidate.weight.weight();
            if weight >= PRINT_WEIGHT {
                out.push('\n');
                out.push_str(&candidate.prior.print(&format!("{indent} weight {weight:.3}  ")));
            }
        }
        out
    }

    fn checksum(&self, seed: u64) -> u64 {
        let seed = self.core.checksum(seed);
        self.candidates.iter().fold(self.candidates.len().checksum(seed), |acc, candidate| {
            candidate.prior.checksum(candidate.weight.checksum(acc))
        })
    }

    fn clone_box(&self) -> Box<dyn Prior> {
        Box::new(self.clone())
    }

    fn to_state(&self) -> PriorState {
        PriorState::OneOfN(OneOfNState {
            core: self.core.clone(),
            options: self.options.clone(),
            candidates: self
                .candidates
                .iter()
                .map(|c| CandidateState { weight: c.weight, prior: c.prior.to_state() })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priors::log_normal::LogNormalMeanPrecConjugate;
    use crate::priors::normal::NormalMeanPrecConjugate;
    use crate::priors::traits::unit_weights;
    use rand::distributions::Distribution;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use statrs::distribution::{LogNormal, Normal};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // Weight dynamics, queries and persistence of a normal versus
    // log-normal ensemble.
    // -------------------------------------------------------------------------

    fn ensemble(decay_rate: f64) -> OneOfNPrior {
        let models: Vec<Box<dyn Prior>> = vec![
            Box::new(NormalMeanPrecConjugate::non_informative(DataType::Continuous, decay_rate)),
            Box::new(LogNormalMeanPrecConjugate::non_informative(DataType::Continuous, 0.0, decay_rate)),
        ];
        OneOfNPrior::new(models, DataType::Continuous, decay_rate).unwrap()
    }

    fn feed<D: Distribution<f64>>(prior: &mut OneOfNPrior, dist: D, seed: u64, n: usize) {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..n {
            let x = dist.sample(&mut rng);
            prior.add_samples(&[x], &unit_weights(1));
            assert!(prior.log_weights().iter().all(|w| w.is_finite()));
        }
    }

    /// A normal prior whose likelihood is replaced by `outcome` for any batch
    /// with a sample at or above `trigger`.
    #[derive(Debug, Clone)]
    struct Scripted {
        inner: NormalMeanPrecConjugate,
        trigger: f64,
        outcome: LikelihoodOutcome,
    }

    impl Scripted {
        fn boxed(trigger: f64, outcome: LikelihoodOutcome) -> Box<dyn Prior> {
            let inner = NormalMeanPrecConjugate::non_informative(DataType::Continuous, 0.0);
            Box::new(Scripted { inner, trigger, outcome })
        }
    }

    impl Prior for Scripted {
        fn data_type(&self) -> DataType {
            self.inner.data_type()
        }
        fn set_data_type(&mut self, data_type: DataType) {
            self.inner.set_data_type(data_type)
        }
        fn decay_rate(&self) -> f64 {
            self.inner.decay_rate()
        }
        fn set_decay_rate(&mut self, decay_rate: f64) {
            self.inner.set_decay_rate(decay_rate)
        }
        fn is_non_informative(&self) -> bool {
            self.inner.is_non_informative()
        }
        fn needs_offset(&self) -> bool {
            self.inner.needs_offset()
        }
        fn offset(&self) -> f64 {
            self.inner.offset()
        }
        fn number_samples(&self) -> f64 {
            self.inner.number_samples()
        }
        fn set_to_non_informative(&mut self, offset: f64, decay_rate: f64) {
            self.inner.set_to_non_informative(offset, decay_rate)
        }
        fn adjust_offset(&mut self, samples: &[f64], weights: &[SampleWeight]) {
            self.inner.adjust_offset(samples, weights)
        }
        fn add_samples(&mut self, samples: &[f64], weights: &[SampleWeight]) {
            self.inner.add_samples(samples, weights)
        }
        fn propagate_forwards_by_time(&mut self, time: f64) {
            self.inner.propagate_forwards_by_time(time)
        }
        fn marginal_likelihood_support(&self) -> (f64, f64) {
            self.inner.marginal_likelihood_support()
        }
        fn marginal_likelihood_mean(&self) -> f64 {
            self.inner.marginal_likelihood_mean()
        }
        fn marginal_likelihood_mode(&self, weight: &SampleWeight) -> f64 {
            self.inner.marginal_likelihood_mode(weight)
        }
        fn marginal_likelihood_variance(&self, weight: &SampleWeight) -> f64 {
            self.inner.marginal_likelihood_variance(weight)
        }
        fn marginal_likelihood_confidence_interval(
            &self, percentage: f64, weight: &SampleWeight,
        ) -> (f64, f64) {
            self.inner.marginal_likelihood_confidence_interval(percentage, weight)
        }
        fn joint_log_marginal_likelihood(
            &self, samples: &[f64], weights: &[SampleWeight],
        ) -> LikelihoodOutcome {
            if samples.iter().any(|&x| x >= self.trigger) {
                self.outcome
            } else {
                self.inner.joint_log_marginal_likelihood(samples, weights)
            }
        }
        fn sample_marginal_likelihood(&self, count: usize) -> Vec<f64> {
            self.inner.sample_marginal_likelihood(count)
        }
        fn minus_log_joint_cdf(&self, samples: &[f64], weights: &[SampleWeight]) -> Option<Bounds> {
            self.inner.minus_log_joint_cdf(samples, weights)
        }
        fn minus_log_joint_cdf_complement(
            &self, samples: &[f64], weights: &[SampleWeight],
        ) -> Option<Bounds> {
            self.inner.minus_log_joint_cdf_complement(samples, weights)
        }
        fn probability_of_less_likely_samples(
            &self, calculation: ProbabilityCalculation, samples: &[f64], weights: &[SampleWeight],
        ) -> Option<TailProbability> {
            self.inner.probability_of_less_likely_samples(calculation, samples, weights)
        }
        fn print(&self, indent: &str) -> String {
            self.inner.print(indent)
        }
        fn checksum(&self, seed: u64) -> u64 {
            Prior::checksum(&self.inner, seed)
        }
        fn clone_box(&self) -> Box<dyn Prior> {
            Box::new(self.clone())
        }
        fn to_state(&self) -> PriorState {
            self.inner.to_state()
        }
    }

    fn with_scripted(scripted: Box<dyn Prior>) -> OneOfNPrior {
        let models: Vec<Box<dyn Prior>> = vec![
            Box::new(NormalMeanPrecConjugate::non_informative(DataType::Continuous, 0.0)),
            scripted,
        ];
        OneOfNPrior::new(models, DataType::Continuous, 0.0).unwrap()
    }

    #[test]
    // Purpose
    // -------
    // Normal data select the normal candidate.
    //
    // Given
    // -----
    // - 1000 samples of N(10, 2²), one at a time.
    //
    // Expect
    // ------
    // - normal weight above 0.95, finite log weights throughout and the
    //   weights summing to one.
    fn selects_normal_for_normal_data() {
        // Arrange
        let mut prior = ensemble(0.0);

        // Act
        feed(&mut prior, Normal::new(10.0, 2.0).unwrap(), 5, 1000);

        // Assert
        let weights = prior.weights();
        assert!(weights[0] > 0.95, "weights = {weights:?}");
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!((prior.marginal_likelihood_mean() - 10.0).abs() < 0.3);
        assert_eq!(prior.number_samples(), 1000.0);
    }

    #[test]
    // Purpose
    // -------
    // Skewed data select the log-normal candidate.
    fn selects_log_normal_for_skewed_data() {
        // Arrange
        let mut prior = ensemble(0.0);

        // Act
        feed(&mut prior, LogNormal::new(1.0, 0.5).unwrap(), 9, 1000);

        // Assert
        let weights = prior.weights();
        assert!(weights[1] > 0.95, "weights = {weights:?}");
    }

    #[test]
    // Purpose
    // -------
    // A fresh ensemble is non-informative and answers with the improper
    // defaults.
    fn fresh_ensemble_is_non_informative() {
        // Arrange
        let prior = ensemble(0.0);
        let w = unit_weights(1);

        // Assert
        assert!(prior.is_non_informative());
        assert!(prior.weights().iter().all(|w| (w - 0.5).abs() < 1e-12));
        assert_eq!(prior.marginal_likelihood_variance(&SampleWeight::default()), f64::INFINITY);
        assert!(prior.sample_marginal_likelihood(5).is_empty());
        let bounds = prior.minus_log_joint_cdf(&[1.0], &w).unwrap();
        assert!((bounds.upper - 2f64.ln()).abs() < 1e-12);
        let tail = prior
            .probability_of_less_likely_samples(ProbabilityCalculation::OneSidedBelow, &[1.0], &w)
            .unwrap();
        assert_eq!(tail.tail, Tail::Undetermined);
        assert!(prior.joint_log_marginal_likelihood(&[1.0, 2.0], &w).is_failed());
    }

    #[test]
    // Purpose
    // -------
    // Construction rejects empty candidate lists and invalid weights.
    fn construction_errors() {
        assert_eq!(
            OneOfNPrior::new(Vec::new(), DataType::Continuous, 0.0).unwrap_err(),
            PriorError::NoCandidates
        );
        let models: Vec<(f64, Box<dyn Prior>)> = vec![(
            -1.0,
            Box::new(NormalMeanPrecConjugate::non_informative(DataType::Continuous, 0.0)),
        )];
        assert!(matches!(
            OneOfNPrior::with_weights(models, DataType::Continuous, 0.0),
            Err(PriorError::InvalidCandidateWeight { index: 0, .. })
        ));
        assert!(OneOfNOptions::new(0.5, 0.01, 1e-3, 100.0).is_err());
    }

    #[test]
    // Purpose
    // -------
    // Propagation pulls the weights toward equality and ages the count.
    //
    // Given
    // -----
    // - the ensemble after 200 normal samples, decay rate 0.5, propagated
    //   by two units.
    //
    // Expect
    // ------
    // - the losing candidate's weight grows, the count shrinks by e^−1 and
    //   the weights still sum to one.
    fn propagation_relaxes_weights() {
        // Arrange
        let mut prior = ensemble(0.5);
        feed(&mut prior, Normal::new(10.0, 2.0).unwrap(), 3, 200);
        let before = prior.weights()[1];
        let count = prior.number_samples();

        // Act
        prior.propagate_forwards_by_time(2.0);

        // Assert
        assert!(prior.weights()[1] > before);
        assert!((prior.number_samples() - count * (-1.0f64).exp()).abs() < 1e-9);
        assert!((prior.weights().iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    // Purpose
    // -------
    // Queries on a fitted ensemble are consistent with its support and
    // tail bounds are ordered probabilities.
    fn fitted_queries() {
        // Arrange
        let mut prior = ensemble(0.0);
        feed(&mut prior, Normal::new(10.0, 2.0).unwrap(), 21, 300);
        let w = unit_weights(1);

        // Act
        let (a, b) = prior.marginal_likelihood_confidence_interval(95.0, &SampleWeight::default());
        let mode = prior.marginal_likelihood_mode(&SampleWeight::default());
        let tail = prior
            .probability_of_less_likely_samples(ProbabilityCalculation::TwoSided, &[16.0], &w)
            .unwrap();
        let samples = prior.sample_marginal_likelihood(20);

        // Assert
        assert!(a < 10.0 && 10.0 < b, "interval = ({a}, {b})");
        assert!((mode - 10.0).abs() < 1.0, "mode = {mode}");
        assert!(tail.lower <= tail.upper && tail.upper < 0.05, "tail = {tail:?}");
        assert_eq!(tail.tail, Tail::Right);
        assert_eq!(samples.len(), 20);
        let (lo, hi) = prior.marginal_likelihood_support();
        assert!(samples.iter().all(|&x| lo <= x && x <= hi));
    }

    #[test]
    // Purpose
    // -------
    // A persisted ensemble restores with identical checksum and weights.
    fn state_round_trip() {
        // Arrange
        let mut prior = ensemble(0.1);
        feed(&mut prior, Normal::new(10.0, 2.0).unwrap(), 13, 50);

        // Act
        let json = serde_json::to_string(&prior.to_state()).unwrap();
        let state: PriorState = serde_json::from_str(&json).unwrap();
        let restored = state.restore().unwrap();

        // Assert
        assert_eq!(restored.checksum(7), prior.checksum(7));
        assert_eq!(restored.print(""), prior.print(""));
    }

    #[test]
    // Purpose
    // -------
    // A candidate whose likelihood cannot be computed keeps its weight for
    // the round but still learns from every batch.
    //
    // Given
    // -----
    // - a normal candidate and a candidate whose likelihood always fails.
    // - 30 samples of N(10, 2²), one at a time.
    //
    // Expect
    // ------
    // - both candidates have seen all 30 samples.
    // - the failing candidate is informative afterwards.
    fn failed_candidate_still_receives_samples() {
        // Arrange
        let mut prior = with_scripted(Scripted::boxed(f64::NEG_INFINITY, LikelihoodOutcome::failed()));

        // Act
        feed(&mut prior, Normal::new(10.0, 2.0).unwrap(), 31, 30);

        // Assert
        let models = prior.models();
        assert_eq!(models[0].number_samples(), 30.0);
        assert_eq!(models[1].number_samples(), 30.0);
        assert!(!models[1].is_non_informative());
        assert_eq!(prior.number_samples(), 30.0);
    }

    #[test]
    // Purpose
    // -------
    // Extreme batches never leave a non-finite log weight behind.
    //
    // Given
    // -----
    // - the normal/log-normal ensemble after 100 samples of N(10, 2²).
    // - single samples far out in both directions, a batch with a huge
    //   count and a batch straddling zero.
    //
    // Expect
    // ------
    // - every log weight is finite after each update.
    fn extreme_batches_keep_log_weights_finite() {
        // Arrange
        let mut prior = ensemble(0.0);
        feed(&mut prior, Normal::new(10.0, 2.0).unwrap(), 41, 100);
        let batches: Vec<(Vec<f64>, Vec<SampleWeight>)> = vec![
            (vec![1e9], unit_weights(1)),
            (vec![-1e9], unit_weights(1)),
            (vec![0.0], vec![SampleWeight::count(1e6)]),
            (vec![5e8, -5e8, 1e-300], unit_weights(3)),
            (vec![10.0], vec![SampleWeight::count(1.0).with_seasonal_variance_scale(1e-12)]),
        ];

        for (samples, weights) in &batches {
            // Act
            prior.add_samples(samples, weights);

            // Assert
            assert!(
                prior.log_weights().iter().all(|w| w.is_finite()),
                "after {samples:?}: {}",
                prior.debug_weights()
            );
        }
    }

    #[test]
    // Purpose
    // -------
    // A likelihood that drives a weight to infinity resets the ensemble.
    //
    // Given
    // -----
    // - a normal candidate and a candidate reporting a log-likelihood of
    //   +∞ for samples at or above 100.
    // - 50 samples of N(10, 2²), then the sample 100.
    //
    // Expect
    // ------
    // - informative before the bad update, non-informative after it.
    // - equal, finite weights and no samples after the reset.
    fn non_finite_weight_resets_to_non_informative() {
        // Arrange
        let spike = LikelihoodOutcome::success(f64::INFINITY);
        let mut prior = with_scripted(Scripted::boxed(100.0, spike));
        feed(&mut prior, Normal::new(10.0, 2.0).unwrap(), 51, 50);
        assert!(!prior.is_non_informative());

        // Act
        prior.add_samples(&[100.0], &unit_weights(1));

        // Assert
        assert!(prior.is_non_informative());
        assert!(prior.log_weights().iter().all(|w| w.is_finite()));
        assert!(prior.weights().iter().all(|w| (w - 0.5).abs() < 1e-12));
        assert_eq!(prior.number_samples(), 0.0);
    }
}
