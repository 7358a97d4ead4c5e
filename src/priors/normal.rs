//! Normal data with unknown mean and precision.
//!
//! Purpose
//! -------
//! Implement the normal-gamma conjugate prior ([`NormalGamma`]) and the
//! [`NormalMeanPrecConjugate`] family built on it. The log-normal family
//! reuses [`NormalGamma`] in log space.
//!
//! Key behaviors
//! -------------
//! - Posterior: `τ ~ Gamma(a, b)`, `μ | τ ~ N(m, 1/(p τ))`. A sample `x`
//!   with count `n` and variance scale `v` contributes `n/v` to the
//!   precision weight of the mean and `n/2` to the shape.
//! - The predictive distribution of one sample with variance scale `v` is
//!   Student-t with `2a` degrees of freedom, location `m` and squared scale
//!   `b (p v + 1) / (a p)`.
//! - Ageing by `α` multiplies `p` by `α` and scales `a` and `b` by a common
//!   factor pulling `a` toward its non-informative value, so the expected
//!   precision `a / b` is unchanged.
//!
//! Invariants & assumptions
//! ------------------------
//! - The non-informative state is `(m, p, a, b) = (0, 0, 1, 0)`; any state
//!   with `p = 0` or `b = 0` is treated as non-informative and its joint
//!   likelihood is reported as overflowed.
//!
//! Conventions
//! -----------
//! - Integer data are smoothed by a `+0.5` continuity shift on input and a
//!   `1/12` per-count variance correction; queries undo the shift.
use crate::priors::core::{
    check_batch, clean_batch, combine_tail_probabilities, total_count, PriorCore,
};
use crate::priors::state::PriorState;
use crate::priors::traits::{
    Bounds, DataType, LikelihoodOutcome, Prior, ProbabilityCalculation, SampleWeight, Tail,
    TailProbability,
};
use crate::statistics::checksum::Checksum;
use crate::statistics::sampling::quantile_points;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, StudentsT};
use statrs::function::gamma::ln_gamma;

const NON_INFORMATIVE_MEAN: f64 = 0.0;
const NON_INFORMATIVE_PRECISION: f64 = 0.0;
const NON_INFORMATIVE_SHAPE: f64 = 1.0;
const NON_INFORMATIVE_RATE: f64 = 0.0;
const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// C.d.f. value reported by a non-informative prior.
pub(crate) const IMPROPER_CDF: f64 = 0.5;

/// Weighted summary of a batch `(y, count, variance scale)`.
struct BatchMoments {
    count: f64,
    weight: f64,
    mean: f64,
    square_deviation: f64,
    log_scales: f64,
}

impl BatchMoments {
    fn of(points: &[(f64, f64, f64)], extra_square_deviation: f64) -> Option<Self> {
        let count: f64 = points.iter().map(|p| p.1).sum();
        let weight: f64 = points.iter().map(|p| p.1 / p.2).sum();
        if !(weight > 0.0) {
            return None;
        }
        let mean = points.iter().map(|p| p.1 / p.2 * p.0).sum::<f64>() / weight;
        let square_deviation = points
            .iter()
            .map(|p| p.1 / p.2 * (p.0 - mean) * (p.0 - mean))
            .sum::<f64>()
            + extra_square_deviation;
        let log_scales = points.iter().map(|p| p.1 * p.2.ln()).sum();
        Some(BatchMoments { count, weight, mean, square_deviation, log_scales })
    }
}

/// NormalGamma — parameters of the normal-gamma conjugate prior.
///
/// Fields
/// ------
/// - `mean` (`m`), `precision` (`p`): the conditional prior of the mean.
/// - `shape` (`a`), `rate` (`b`): the gamma prior of the noise precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalGamma {
    pub mean: f64,
    pub precision: f64,
    pub shape: f64,
    pub rate: f64,
}

impl Default for NormalGamma {
    fn default() -> Self {
        Self::non_informative()
    }
}

impl NormalGamma {
    pub fn non_informative() -> Self {
        NormalGamma {
            mean: NON_INFORMATIVE_MEAN,
            precision: NON_INFORMATIVE_PRECISION,
            shape: NON_INFORMATIVE_SHAPE,
            rate: NON_INFORMATIVE_RATE,
        }
    }

    pub fn is_non_informative(&self) -> bool {
        self.precision <= NON_INFORMATIVE_PRECISION || self.rate <= NON_INFORMATIVE_RATE
    }

    fn posterior(&self, moments: &BatchMoments) -> NormalGamma {
        let p = self.precision;
        let w = moments.weight;
        let d = moments.mean - self.mean;
        NormalGamma {
            mean: (p * self.mean + w * moments.mean) / (p + w),
            precision: p + w,
            shape: self.shape + 0.5 * moments.count,
            rate: self.rate + 0.5 * (moments.square_deviation + p * w * d * d / (p + w)),
        }
    }

    /// Condition on a batch of `(y, count, variance scale)` points.
    pub fn update(&mut self, points: &[(f64, f64, f64)], extra_square_deviation: f64) {
        if let Some(moments) = BatchMoments::of(points, extra_square_deviation) {
            *self = self.posterior(&moments);
        }
    }

    /// Exact joint log marginal likelihood of a batch.
    ///
    /// The ratio of normal-gamma normalizers before and after conditioning,
    /// times the Gaussian constants of the batch.
    pub fn joint_log_likelihood(
        &self, points: &[(f64, f64, f64)], extra_square_deviation: f64,
    ) -> LikelihoodOutcome {
        if self.is_non_informative() {
            return LikelihoodOutcome::overflowed();
        }
        let Some(moments) = BatchMoments::of(points, extra_square_deviation) else {
            return LikelihoodOutcome::failed();
        };
        let post = self.posterior(&moments);
        let value = -0.5 * moments.count * LN_2PI - 0.5 * moments.log_scales
            + 0.5 * (self.precision.ln() - post.precision.ln())
            + self.shape * self.rate.ln()
            - post.shape * post.rate.ln()
            + ln_gamma(post.shape)
            - ln_gamma(self.shape);
        LikelihoodOutcome::from_value(value)
    }

    /// Age by `alpha`, holding the expected precision fixed.
    pub fn age(&mut self, alpha: f64) {
        let alpha = alpha.clamp(0.0, 1.0);
        let beta = 1.0 - alpha;
        self.precision = alpha * self.precision + beta * NON_INFORMATIVE_PRECISION;
        if self.shape > 0.0 {
            let factor = ((alpha * self.shape + beta * NON_INFORMATIVE_SHAPE) / self.shape).min(1.0);
            self.shape *= factor;
            self.rate *= factor;
        }
    }

    /// Squared scale of the predictive Student-t.
    pub fn predictive_scale2(&self, variance_scale: f64) -> f64 {
        self.rate * (self.precision * variance_scale + 1.0) / (self.shape * self.precision)
    }

    /// Predictive distribution of one sample, `None` while non-informative.
    pub fn predictive(&self, variance_scale: f64) -> Option<StudentsT> {
        if self.is_non_informative() {
            return None;
        }
        let scale = self.predictive_scale2(variance_scale).sqrt();
        StudentsT::new(self.mean, scale, 2.0 * self.shape).ok()
    }

    /// Variance of the predictive distribution, `+∞` when it does not exist.
    pub fn predictive_variance(&self, variance_scale: f64) -> f64 {
        if self.is_non_informative() || self.shape <= 1.0 {
            return f64::INFINITY;
        }
        self.rate * (self.precision * variance_scale + 1.0) / (self.precision * (self.shape - 1.0))
    }
}

impl Checksum for NormalGamma {
    fn checksum(&self, seed: u64) -> u64 {
        let seed = self.mean.checksum(seed);
        let seed = self.precision.checksum(seed);
        let seed = self.shape.checksum(seed);
        self.rate.checksum(seed)
    }
}

/// NormalMeanPrecConjugate — normal data with unknown mean and precision.
///
/// Purpose
/// -------
/// Model residuals that are plausibly Gaussian. Every query is closed
/// form: likelihoods and c.d.f.s come from the Student-t predictive.
///
/// Notes
/// -----
/// - Support is the whole real line; no offset is ever needed.
/// - Non-informative queries: c.d.f. bounds are `−ln 0.5`, tail
///   probabilities are `1`, confidence intervals are the support.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalMeanPrecConjugate {
    core: PriorCore,
    params: NormalGamma,
}

impl NormalMeanPrecConjugate {
    /// A non-informative prior.
    pub fn non_informative(data_type: DataType, decay_rate: f64) -> Self {
        NormalMeanPrecConjugate {
            core: PriorCore::new(data_type, decay_rate),
            params: NormalGamma::non_informative(),
        }
    }

    /// A prior with explicit parameters.
    pub fn new(data_type: DataType, params: NormalGamma, decay_rate: f64) -> Self {
        NormalMeanPrecConjugate { core: PriorCore::new(data_type, decay_rate), params }
    }

    pub fn params(&self) -> &NormalGamma {
        &self.params
    }

    fn shift(&self) -> f64 {
        if self.core.is_integer() { 0.5 } else { 0.0 }
    }

    fn points(&self, samples: &[f64], weights: &[SampleWeight]) -> Vec<(f64, f64, f64)> {
        let shift = self.shift();
        samples.iter().zip(weights).map(|(&x, w)| (x + shift, w.count, w.variance_scale())).collect()
    }

    fn extra_square_deviation(&self, weights: &[SampleWeight]) -> f64 {
        if self.core.is_integer() { total_count(weights) / 12.0 } else { 0.0 }
    }

    /// Predictive c.d.f. at each sample, or `None` if it can't be formed.
    fn cdfs(&self, samples: &[f64], weights: &[SampleWeight]) -> Option<Vec<f64>> {
        let shift = self.shift();
        samples
            .iter()
            .zip(weights)
            .map(|(&x, w)| self.params.predictive(w.variance_scale()).map(|t| t.cdf(x + shift)))
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

impl Prior for NormalMeanPrecConjugate {
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

    fn is_non_informative(&self) -> bool {
        self.params.is_non_informative()
    }

    fn needs_offset(&self) -> bool {
        false
    }

    fn offset(&self) -> f64 {
        0.0
    }

    fn number_samples(&self) -> f64 {
        self.core.number_samples()
    }

    fn set_to_non_informative(&mut self, _offset: f64, decay_rate: f64) {
        self.params = NormalGamma::non_informative();
        self.core.reset(decay_rate);
    }

    fn adjust_offset(&mut self, _samples: &[f64], _weights: &[SampleWeight]) {}

    fn add_samples(&mut self, samples: &[f64], weights: &[SampleWeight]) {
        if !check_batch(samples, weights) {
            return;
        }
        let (samples, weights) = clean_batch(samples, weights);
        if samples.is_empty() {
            return;
        }
        self.core.add_samples(&samples, &weights);
        let points = self.points(&samples, &weights);
        let extra = self.extra_square_deviation(&weights);
        self.params.update(&points, extra);
    }

    fn propagate_forwards_by_time(&mut self, time: f64) {
        let Some(alpha) = self.core.decay_factor(time) else {
            return;
        };
        self.params.age(alpha);
        self.core.age(alpha);
    }

    fn marginal_likelihood_support(&self) -> (f64, f64) {
        (f64::MIN, f64::MAX)
    }

    fn marginal_likelihood_mean(&self) -> f64 {
        self.params.mean - self.shift()
    }

    fn marginal_likelihood_mode(&self, _weight: &SampleWeight) -> f64 {
        self.params.mean - self.shift()
    }

    fn marginal_likelihood_variance(&self, weight: &SampleWeight) -> f64 {
        self.params.predictive_variance(weight.variance_scale())
    }

    fn marginal_likelihood_confidence_interval(
        &self, percentage: f64, weight: &SampleWeight,
    ) -> (f64, f64) {
        let Some(t) = self.params.predictive(weight.variance_scale()) else {
            return self.marginal_likelihood_support();
        };
        let q = 0.5 * (1.0 - percentage.clamp(0.0, 100.0) / 100.0);
        let shift = self.shift();
        if q <= 0.0 {
            return self.marginal_likelihood_support();
        }
        (t.inverse_cdf(q) - shift, t.inverse_cdf(1.0 - q) - shift)
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
        let points = self.points(samples, weights);
        self.params.joint_log_likelihood(&points, self.extra_square_deviation(weights))
    }

    fn sample_marginal_likelihood(&self, count: usize) -> Vec<f64> {
        let Some(t) = self.params.predictive(1.0) else {
            return Vec::new();
        };
        let shift = self.shift();
        quantile_points(count, |p| t.inverse_cdf(p) - shift)
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
        let cdfs = self.cdfs(samples, weights)?;
        let centre = self.params.mean - self.shift();
        let parts: Vec<(f64, f64, f64, Tail)> = samples
            .iter()
            .zip(weights)
            .zip(cdfs)
            .map(|((&x, w), f)| {
                let (p, tail) = match calculation {
                    ProbabilityCalculation::TwoSided => {
                        let tail = if x < centre {
                            Tail::Left
                        } else if x > centre {
                            Tail::Right
                        } else {
                            Tail::Undetermined
                        };
                        ((2.0 * f.min(1.0 - f)).min(1.0), tail)
                    }
                    ProbabilityCalculation::OneSidedBelow => (f, Tail::Left),
                    ProbabilityCalculation::OneSidedAbove => (1.0 - f, Tail::Right),
                };
                (w.count, p, p, tail)
            })
            .collect();
        Some(combine_tail_probabilities(&parts))
    }

    fn print(&self, indent: &str) -> String {
        if self.is_non_informative() {
            return format!("{indent}normal non-informative");
        }
        format!(
            "{indent}normal mean = {:.6} sd = {:.6}",
            self.marginal_likelihood_mean(),
            self.params.predictive_variance(1.0).sqrt()
        )
    }

    fn checksum(&self, seed: u64) -> u64 {
        let seed = self.core.checksum(seed);
        self.params.checksum(seed)
    }

    fn clone_box(&self) -> Box<dyn Prior> {
        Box::new(self.clone())
    }

    fn to_state(&self) -> PriorState {
        PriorState::Normal(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priors::traits::unit_weights;
    use rand::distributions::Distribution;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use statrs::distribution::Normal;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // Conjugate updates, exact likelihoods, ageing, tails and sampling of the
    // normal family.
    // -------------------------------------------------------------------------

    fn normal_samples(seed: u64, mean: f64, sd: f64, n: usize) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(mean, sd).unwrap();
        (0..n).map(|_| normal.sample(&mut rng)).collect()
    }

    fn fitted(samples: &[f64]) -> NormalMeanPrecConjugate {
        let mut prior = NormalMeanPrecConjugate::non_informative(DataType::Continuous, 0.0);
        prior.add_samples(samples, &unit_weights(samples.len()));
        prior
    }

    #[test]
    // Purpose
    // -------
    // The posterior predictive recovers the generating mean and variance.
    //
    // Given
    // -----
    // - 2000 samples of N(5, 2²).
    //
    // Expect
    // ------
    // - mean within 0.2 of 5, variance within 0.4 of 4, and the sample
    //   count is 2000.
    fn recovers_mean_and_variance() {
        // Arrange
        let samples = normal_samples(11, 5.0, 2.0, 2000);

        // Act
        let prior = fitted(&samples);

        // Assert
        let mean = prior.marginal_likelihood_mean();
        let variance = prior.marginal_likelihood_variance(&SampleWeight::default());
        assert!((mean - 5.0).abs() < 0.2, "mean = {mean}");
        assert!((variance - 4.0).abs() < 0.4, "variance = {variance}");
        assert_eq!(prior.number_samples(), 2000.0);
    }

    #[test]
    // Purpose
    // -------
    // The joint likelihood obeys the chain rule and a single sample's
    // likelihood equals the Student-t predictive density.
    fn joint_likelihood_chain_rule() {
        // Arrange
        let prior = fitted(&normal_samples(3, 0.0, 1.0, 20));
        let w = unit_weights(1);

        // Act
        let joint = prior.joint_log_marginal_likelihood(&[0.3, -1.2], &unit_weights(2));
        let first = prior.joint_log_marginal_likelihood(&[0.3], &w);
        let mut updated = prior.clone();
        updated.add_samples(&[0.3], &w);
        let second = updated.joint_log_marginal_likelihood(&[-1.2], &w);
        let density = prior.params().predictive(1.0).unwrap().ln_pdf(0.3);

        // Assert
        assert!(joint.is_success());
        assert!((joint.value - (first.value + second.value)).abs() < 1e-9);
        assert!((first.value - density).abs() < 1e-9);
    }

    #[test]
    // Purpose
    // -------
    // Non-informative priors overflow and reject mismatched input.
    fn non_informative_likelihood_overflows() {
        // Arrange
        let prior = NormalMeanPrecConjugate::non_informative(DataType::Continuous, 0.0);

        // Act
        let outcome = prior.joint_log_marginal_likelihood(&[1.0], &unit_weights(1));
        let mismatched = prior.joint_log_marginal_likelihood(&[1.0, 2.0], &unit_weights(1));

        // Assert
        assert!(prior.is_non_informative());
        assert!(outcome.is_overflowed());
        assert_eq!(outcome.value, f64::MIN);
        assert!(mismatched.is_failed());
    }

    #[test]
    // Purpose
    // -------
    // Ageing loses evidence but keeps the expected precision.
    fn ageing_holds_expected_precision() {
        // Arrange
        let mut prior = fitted(&normal_samples(5, 1.0, 1.0, 100));
        prior.set_decay_rate(0.1);
        let before = *prior.params();

        // Act
        prior.propagate_forwards_by_time(2.0);
        prior.propagate_forwards_by_time(-1.0);

        // Assert
        let after = *prior.params();
        assert!(after.precision < before.precision);
        assert!(after.shape < before.shape);
        assert!((after.shape / after.rate - before.shape / before.rate).abs() < 1e-9);
        assert!((prior.number_samples() - 100.0 * (-0.2f64).exp()).abs() < 1e-9);
    }

    #[test]
    // Purpose
    // -------
    // Central samples are likely; a far right sample has a small two-sided
    // probability in the right tail.
    fn tail_probabilities() {
        // Arrange
        let prior = fitted(&normal_samples(8, 0.0, 1.0, 500));
        let w = unit_weights(1);

        // Act
        let centre = prior
            .probability_of_less_likely_samples(
                ProbabilityCalculation::TwoSided,
                &[prior.marginal_likelihood_mean()],
                &w,
            )
            .unwrap();
        let far = prior
            .probability_of_less_likely_samples(ProbabilityCalculation::TwoSided, &[5.0], &w)
            .unwrap();
        let below = prior
            .probability_of_less_likely_samples(ProbabilityCalculation::OneSidedBelow, &[5.0], &w)
            .unwrap();

        // Assert
        assert!(centre.lower > 0.99);
        assert!(far.upper < 1e-4);
        assert_eq!(far.tail, Tail::Right);
        assert!(below.lower > 0.99);
        assert_eq!(below.tail, Tail::Left);
    }

    #[test]
    // Purpose
    // -------
    // Deterministic samples are centred on the mean and lie inside a wide
    // confidence interval.
    fn sampling_and_confidence_interval() {
        // Arrange
        let prior = fitted(&normal_samples(9, 3.0, 0.5, 300));

        // Act
        let samples = prior.sample_marginal_likelihood(40);
        let (a, b) = prior.marginal_likelihood_confidence_interval(99.9, &SampleWeight::default());

        // Assert
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        assert_eq!(samples.len(), 40);
        assert!((mean - prior.marginal_likelihood_mean()).abs() < 1e-4);
        assert!(samples.iter().all(|&x| x > a && x < b));
        assert_eq!(samples, prior.sample_marginal_likelihood(40));
    }

    #[test]
    // Purpose
    // -------
    // Persistence round-trips reproduce the checksum.
    fn serde_round_trip() {
        // Arrange
        let prior = fitted(&normal_samples(2, -1.0, 3.0, 50));

        // Act
        let json = serde_json::to_string(&prior).unwrap();
        let restored: NormalMeanPrecConjugate = serde_json::from_str(&json).unwrap();

        // Assert
        assert_eq!(restored.checksum(0), prior.checksum(0));
    }
}
