//! Log-normal data with unknown mean and precision in log space.
//!
//! Purpose
//! -------
//! Model positive, right-skewed values. The prior is the normal-gamma
//! conjugate prior over `y = ln(x + offset)`; the offset extends the
//! support to `(−offset, ∞)` and moves when a sample comes too close to the
//! support boundary.
//!
//! Key behaviors
//! -------------
//! - Likelihoods are the Student-t predictive of `y` times the Jacobian
//!   `1 / (x + offset)`.
//! - The mode of the log-t marginal is closed form: the stationary points
//!   of `g(y) = ln t(y) − y` solve a quadratic.
//! - Two-sided tail probabilities locate the second point of the density
//!   level set by a bracketed root search.
//! - Offsets are chosen by the likelihood search in
//!   [`offset`](crate::priors::offset).
//!
//! Invariants & assumptions
//! ------------------------
//! - After `add_samples`, every sample added so far satisfies
//!   `x + offset ≥ offset_margin` at the time it was added.
//! - Mean and variance use the log-normal moments of the predictive scale;
//!   the log-t marginal has no finite moments.
use crate::priors::core::{
    check_batch, clean_batch, combine_tail_probabilities, total_count, PriorCore,
};
use crate::priors::normal::{NormalGamma, IMPROPER_CDF};
use crate::priors::offset::{self, ADJUST_OFFSET_SAMPLE_SIZE};
use crate::priors::state::PriorState;
use crate::priors::traits::{
    Bounds, DataType, LikelihoodOutcome, Prior, ProbabilityCalculation, SampleWeight, Tail,
    TailProbability,
};
use crate::statistics::checksum::Checksum;
use crate::statistics::sampling::quantile_points;
use crate::statistics::solvers::find_root;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, StudentsT};
use tracing::{debug, error};

/// Default margin between the smallest sample and the support boundary.
pub const DEFAULT_OFFSET_MARGIN: f64 = 0.2;

const LEVEL_SET_TOLERANCE: f64 = 1e-10;
const LEVEL_SET_MAX_ITERATIONS: u64 = 100;

/// Stationary points `(local minimum, mode)` of `ln t(y) − y` for a
/// Student-t with location `m`, squared scale `s2` and `nu` degrees of
/// freedom, or `None` when the function is monotone decreasing.
fn stationary_points(m: f64, s2: f64, nu: f64) -> Option<(f64, f64)> {
    let b = nu + 1.0;
    let discriminant = b * b - 4.0 * nu * s2;
    if !(discriminant >= 0.0) {
        return None;
    }
    let r = discriminant.sqrt();
    Some((m + 0.5 * (-b - r), m + 0.5 * (-b + r)))
}

/// Two-sided tail of `y0` under the density of `x = exp(y)`.
///
/// Returns `(lower, upper, tail)`. Mass below the local minimum of the
/// density, where the log-t density diverges, is only counted in the upper
/// bound.
fn two_sided_log_t(t: &StudentsT, y0: f64) -> (f64, f64, Tail) {
    let g = |y: f64| t.ln_pdf(y) - y;
    let Some((y_min, y_mode)) = stationary_points(t.location(), t.scale() * t.scale(), t.freedom())
    else {
        let p = t.sf(y0);
        return (p, p, Tail::Right);
    };
    let g0 = g(y0);
    let level = |y: f64| g(y) - g0;

    if y0 <= y_mode {
        if y0 < y_min {
            let p = t.cdf(y0);
            return (p, p, Tail::Left);
        }
        let mut step = t.scale().max(1e-3);
        let mut hi = y_mode + step;
        for _ in 0..64 {
            if level(hi) < 0.0 {
                break;
            }
            step *= 2.0;
            hi = y_mode + step;
        }
        let y1 = if level(y_mode) <= 0.0 {
            y_mode
        } else {
            find_root(level, y_mode, hi, LEVEL_SET_TOLERANCE, LEVEL_SET_MAX_ITERATIONS).unwrap_or(hi)
        };
        let p = (t.cdf(y0) + t.sf(y1)).min(1.0);
        ((p - t.cdf(y_min)).max(0.0), p, Tail::Left)
    } else {
        let divergent = t.cdf(y_min);
        if level(y_min) > 0.0 {
            let p = t.sf(y0);
            return (p, (p + divergent).min(1.0), Tail::Right);
        }
        let y1 = if level(y_mode) <= 0.0 {
            y_mode
        } else {
            find_root(level, y_min, y_mode, LEVEL_SET_TOLERANCE, LEVEL_SET_MAX_ITERATIONS)
                .unwrap_or(y_min)
        };
        let p = (t.cdf(y1) + t.sf(y0)).min(1.0);
        ((p - divergent).max(0.0), p, Tail::Right)
    }
}

/// LogNormalMeanPrecConjugate — log-normal data with unknown parameters.
///
/// Purpose
/// -------
/// Compete with the normal family for positive, skewed residuals, and act
/// as a mode prior inside a multimodal prior.
///
/// Key behaviors
/// -------------
/// - `needs_offset()` is always true; a sample below
///   `offset_margin − offset` triggers an offset search before the update.
/// - A non-informative prior adopts the smallest admissible offset
///   directly; an informative one is rebuilt at the best trial offset from
///   resamples of its current marginal likelihood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogNormalMeanPrecConjugate {
    core: PriorCore,
    params: NormalGamma,
    offset: f64,
    offset_margin: f64,
}

impl LogNormalMeanPrecConjugate {
    /// A non-informative prior with support `(−offset, ∞)`.
    pub fn non_informative(data_type: DataType, offset: f64, decay_rate: f64) -> Self {
        LogNormalMeanPrecConjugate {
            core: PriorCore::new(data_type, decay_rate),
            params: NormalGamma::non_informative(),
            offset,
            offset_margin: DEFAULT_OFFSET_MARGIN,
        }
    }

    /// A prior with explicit log-space parameters.
    pub fn new(data_type: DataType, offset: f64, params: NormalGamma, decay_rate: f64) -> Self {
        LogNormalMeanPrecConjugate { params, ..Self::non_informative(data_type, offset, decay_rate) }
    }

    pub fn with_offset_margin(mut self, margin: f64) -> Self {
        self.offset_margin = if margin.is_finite() && margin >= 0.0 { margin } else { DEFAULT_OFFSET_MARGIN };
        self
    }

    pub fn params(&self) -> &NormalGamma {
        &self.params
    }

    fn shift(&self) -> f64 {
        if self.core.is_integer() { 0.5 } else { 0.0 }
    }

    fn to_log(&self, x: f64) -> f64 {
        (x + self.offset + self.shift()).ln()
    }

    fn from_log(&self, y: f64) -> f64 {
        y.exp() - self.offset - self.shift()
    }

    /// Log-space points of a batch, `None` if any sample is outside the
    /// support.
    fn log_points(
        &self, samples: &[f64], weights: &[SampleWeight],
    ) -> Option<Vec<(f64, f64, f64)>> {
        samples
            .iter()
            .zip(weights)
            .map(|(&x, w)| {
                let y = self.to_log(x);
                y.is_finite().then_some((y, w.count, w.variance_scale()))
            })
            .collect()
    }

    fn extra_square_deviation(&self, weights: &[SampleWeight]) -> f64 {
        if self.core.is_integer() { total_count(weights) / 12.0 } else { 0.0 }
    }

    /// Condition the parameters on a batch without touching the offset.
    fn update(&mut self, samples: &[f64], weights: &[SampleWeight]) {
        match self.log_points(samples, weights) {
            Some(points) => {
                let extra = self.extra_square_deviation(weights);
                self.params.update(&points, extra);
            }
            None => error!(offset = self.offset, samples = ?samples, "samples outside log-normal support"),
        }
    }

    /// Rebuild at `offset` from resamples, keeping the sample count.
    fn refill(&mut self, offset: f64, resamples: &[f64], weights: &[SampleWeight]) {
        self.params = NormalGamma::non_informative();
        self.offset = offset;
        if !resamples.is_empty() {
            self.update(resamples, weights);
        }
    }

    fn cdfs(&self, samples: &[f64], weights: &[SampleWeight]) -> Option<Vec<f64>> {
        samples
            .iter()
            .zip(weights)
            .map(|(&x, w)| {
                let t = self.params.predictive(w.variance_scale())?;
                let y = self.to_log(x);
                Some(if y.is_finite() { t.cdf(y) } else { 0.0 })
            })
            .collect()
    }

    fn minus_log_cdf_impl(
        &self, complement: bool, samples: &[f64], weights: &[SampleWeight],
    ) -> Option<Bounds> {
        if !check_batch(samples, weights) {
            return None;
        }
        if self.is_non_informative() {
            let improper = if complement { 1.0 - IMPROPER_CDF } else { IMPROPER_CDF };
            return Some(Bounds::exact(-improper.ln()));
        }
        let cdfs = self.cdfs(samples, weights)?;
        let value: f64 = cdfs
            .iter()
            .zip(weights)
            .map(|(&f, w)| -w.count * (if complement { 1.0 - f } else { f }).ln())
            .sum();
        Some(Bounds::exact(value.max(0.0)))
    }
}

impl Prior for LogNormalMeanPrecConjugate {
    fn data_type(&self) -> DataType {
        self.core.data_type()
    }

    fn set_data_type(&mut self, data_type: DataType) {
        self.core.set_data_type(data_type);
    }

    fn decay_rate(&self) -> f64 {
        self.core.decay_rate()
    }

    fn set_decay_rate(&mut self, decay_rate: f64) {
        self.core.set_decay_rate(decay_rate);
    }

    fn offset_margin(&self) -> f64 {
        self.offset_margin
    }

    fn is_non_informative(&self) -> bool {
        self.params.is_non_informative()
    }

    fn needs_offset(&self) -> bool {
        true
    }

    fn offset(&self) -> f64 {
        self.offset
    }

    fn number_samples(&self) -> f64 {
        self.core.number_samples()
    }

    fn set_to_non_informative(&mut self, offset: f64, decay_rate: f64) {
        self.params = NormalGamma::non_informative();
        self.offset = offset;
        self.core.reset(decay_rate);
    }

    fn adjust_offset(&mut self, samples: &[f64], weights: &[SampleWeight]) {
        let Some(lower) = offset::required_offset(self.offset, self.offset_margin, samples) else {
            return;
        };
        if self.is_non_informative() {
            self.offset = lower;
            return;
        }
        let (resamples, resample_weights) = offset::resample(&*self, ADJUST_OFFSET_SAMPLE_SIZE);
        let current = self.offset;
        let best = offset::choose_offset(lower, current, self.offset_margin, |trial| {
            let mut prior = self.clone();
            prior.refill(trial, &resamples, &resample_weights);
            offset::likelihood_cost(prior.joint_log_marginal_likelihood(samples, weights))
        });
        debug!(from = current, to = best, "moved log-normal offset");
        self.refill(best, &resamples, &resample_weights);
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
        self.core.add_samples(&samples, &weights);
        self.update(&samples, &weights);
    }

    fn propagate_forwards_by_time(&mut self, time: f64) {
        let Some(alpha) = self.core.decay_factor(time) else {
            return;
        };
        self.params.age(alpha);
        self.core.age(alpha);
    }

    fn marginal_likelihood_support(&self) -> (f64, f64) {
        (-self.offset, f64::MAX)
    }

    fn marginal_likelihood_mean(&self) -> f64 {
        if self.is_non_informative() {
            return self.from_log(self.params.mean);
        }
        let s2 = self.params.predictive_scale2(1.0);
        self.from_log(self.params.mean + 0.5 * s2)
    }

    fn marginal_likelihood_mode(&self, weight: &SampleWeight) -> f64 {
        if self.is_non_informative() {
            return self.marginal_likelihood_mean();
        }
        let s2 = self.params.predictive_scale2(weight.variance_scale());
        match stationary_points(self.params.mean, s2, 2.0 * self.params.shape) {
            Some((_, mode)) => self.from_log(mode),
            None => -self.offset,
        }
    }

    fn marginal_likelihood_variance(&self, weight: &SampleWeight) -> f64 {
        if self.is_non_informative() || self.params.shape <= 1.0 {
            return f64::INFINITY;
        }
        let s2 = self.params.predictive_scale2(weight.variance_scale());
        (s2.exp() - 1.0) * (2.0 * self.params.mean + s2).exp()
    }

    fn marginal_likelihood_confidence_interval(
        &self, percentage: f64, weight: &SampleWeight,
    ) -> (f64, f64) {
        let Some(t) = self.params.predictive(weight.variance_scale()) else {
            return self.marginal_likelihood_support();
        };
        let q = 0.5 * (1.0 - percentage.clamp(0.0, 100.0) / 100.0);
        if q <= 0.0 {
            return self.marginal_likelihood_support();
        }
        (self.from_log(t.inverse_cdf(q)), self.from_log(t.inverse_cdf(1.0 - q)))
    }

    fn joint_log_marginal_likelihood(
        &self, samples: &[f64], weights: &[SampleWeight],
    ) -> LikelihoodOutcome {
        if !check_batch(samples, weights) {
            return LikelihoodOutcome::failed();
        }
        if samples.iter().any(|x| !x.is_finite()) || weights.iter().any(|w| !w.is_valid()) {
            return LikelihoodOutcome::failed();
        }
        if self.is_non_informative() {
            return LikelihoodOutcome::overflowed();
        }
        let Some(points) = self.log_points(samples, weights) else {
            return LikelihoodOutcome::overflowed();
        };
        let outcome =
            self.params.joint_log_likelihood(&points, self.extra_square_deviation(weights));
        if !outcome.is_success() {
            return outcome;
        }
        let jacobian: f64 = points.iter().map(|&(y, n, _)| n * y).sum();
        LikelihoodOutcome::from_value(outcome.value - jacobian)
    }

    fn sample_marginal_likelihood(&self, count: usize) -> Vec<f64> {
        let Some(t) = self.params.predictive(1.0) else {
            return Vec::new();
        };
        quantile_points(count, |p| self.from_log(t.inverse_cdf(p)))
    }

    fn minus_log_joint_cdf(&self, samples: &[f64], weights: &[SampleWeight]) -> Option<Bounds> {
        self.minus_log_cdf_impl(false, samples, weights)
    }

    fn minus_log_joint_cdf_complement(
        &self, samples: &[f64], weights: &[SampleWeight],
    ) -> Option<Bounds> {
        self.minus_log_cdf_impl(true, samples, weights)
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
        let mut parts = Vec::with_capacity(samples.len());
        for (&x, w) in samples.iter().zip(weights) {
            let t = self.params.predictive(w.variance_scale())?;
            let y = self.to_log(x);
            if !y.is_finite() {
                parts.push((w.count, 0.0, 0.0, Tail::Left));
                continue;
            }
            let (lower, upper, tail) = match calculation {
                ProbabilityCalculation::TwoSided => two_sided_log_t(&t, y),
                ProbabilityCalculation::OneSidedBelow => (t.cdf(y), t.cdf(y), Tail::Left),
                ProbabilityCalculation::OneSidedAbove => (t.sf(y), t.sf(y), Tail::Right),
            };
            parts.push((w.count, lower, upper, tail));
        }
        Some(combine_tail_probabilities(&parts))
    }

    fn print(&self, indent: &str) -> String {
        if self.is_non_informative() {
            return format!("{indent}log-normal non-informative (offset {:.4})", self.offset);
        }
        format!(
            "{indent}log-normal location = {:.6} scale = {:.6} offset = {:.4}",
            self.params.mean,
            self.params.predictive_scale2(1.0).sqrt(),
            self.offset
        )
    }

    fn checksum(&self, seed: u64) -> u64 {
        let seed = self.core.checksum(seed);
        let seed = self.params.checksum(seed);
        let seed = self.offset.checksum(seed);
        self.offset_margin.checksum(seed)
    }

    fn clone_box(&self) -> Box<dyn Prior> {
        Box::new(self.clone())
    }

    fn to_state(&self) -> PriorState {
        PriorState::LogNormal(self.clone())
    }
}
