//! Queries on a weighted mixture of priors.
//!
//! Purpose
//! -------
//! Evaluate the marginal likelihood of `Σᵢ wᵢ · Lᵢ(x)` where each `Lᵢ` is
//! the marginal likelihood of a child prior. The multimodal prior uses
//! these routines with weights taken from its clusterer.
//!
//! Key behaviors
//! -------------
//! - Weights are normalized internally; non-positive weights drop their
//!   component.
//! - A child that fails makes the whole query fail; a child that overflows
//!   simply contributes nothing.
//! - Two-sided tail probabilities integrate the mixture over the region
//!   where its density is below the density at the sample. The region is
//!   found by scanning a grid spanning every component and refining each
//!   crossing with a root search.
//!
//! Conventions
//! -----------
//! - Components are `(weight, prior)` pairs.
//! - Sample counts multiply per-sample log-likelihoods: a sample with count
//!   `n` contributes `n · ln Σᵢ wᵢ Lᵢ(x)`.
use crate::priors::core::{check_batch, combine_tail_probabilities};
use crate::priors::traits::{
    Bounds, FloatingPointStatus, LikelihoodOutcome, Prior, ProbabilityCalculation, SampleWeight,
    Tail, TailProbability,
};
use crate::statistics::sampling::weighted_allocation;
use crate::statistics::solvers::find_root;
use crate::statistics::tools::log_sum_exp;

/// A weighted child of a mixture.
pub type Component<'a> = (f64, &'a dyn Prior);

const GRID_SIZE: usize = 64;
const SCAN_PERCENTAGE: f64 = 99.99;
const ROOT_TOLERANCE: f64 = 1e-8;
const ROOT_MAX_ITERATIONS: u64 = 100;
const FINITE_LIMIT: f64 = f64::MAX / 4.0;

fn normalized<'a>(components: &[Component<'a>]) -> Vec<Component<'a>> {
    let valid: Vec<Component<'a>> =
        components.iter().copied().filter(|(w, _)| w.is_finite() && *w > 0.0).collect();
    let z: f64 = valid.iter().map(|(w, _)| w).sum();
    valid.into_iter().map(|(w, p)| (w / z, p)).collect()
}

/// `ln Σᵢ wᵢ Lᵢ(x)` for one sample with unit count, `None` on failure.
fn log_density(components: &[Component<'_>], x: f64, weight: &SampleWeight) -> Option<f64> {
    let unit = [weight.unit()];
    let mut terms = Vec::with_capacity(components.len());
    for &(w, prior) in components {
        let outcome = prior.joint_log_marginal_likelihood(&[x], &unit);
        match outcome.status {
            FloatingPointStatus::Failed => return None,
            FloatingPointStatus::Overflowed => {}
            FloatingPointStatus::Success => terms.push(w.ln() + outcome.value),
        }
    }
    Some(log_sum_exp(&terms))
}

/// Mixture c.d.f. (or its complement) at `x`, as `(lower, upper)` bounds.
fn cdf_bounds(
    components: &[Component<'_>], x: f64, weight: &SampleWeight, complement: bool,
) -> Option<(f64, f64)> {
    if x == f64::NEG_INFINITY {
        return Some(if complement { (1.0, 1.0) } else { (0.0, 0.0) });
    }
    if x == f64::INFINITY {
        return Some(if complement { (0.0, 0.0) } else { (1.0, 1.0) });
    }
    let unit = [weight.unit()];
    let (mut lower, mut upper) = (0.0, 0.0);
    for &(w, prior) in components {
        let bounds = if complement {
            prior.minus_log_joint_cdf_complement(&[x], &unit)?
        } else {
            prior.minus_log_joint_cdf(&[x], &unit)?
        };
        lower += w * (-bounds.upper).exp();
        upper += w * (-bounds.lower).exp();
    }
    Some((lower.clamp(0.0, 1.0), upper.clamp(0.0, 1.0)))
}

fn cdf(components: &[Component<'_>], x: f64, weight: &SampleWeight) -> f64 {
    cdf_bounds(components, x, weight, false).map_or(f64::NAN, |(l, u)| 0.5 * (l + u))
}

/// Joint log marginal likelihood of a batch.
pub fn joint_log_marginal_likelihood(
    components: &[Component<'_>], samples: &[f64], weights: &[SampleWeight],
) -> LikelihoodOutcome {
    if !check_batch(samples, weights) {
        return LikelihoodOutcome::failed();
    }
    let components = normalized(components);
    let mut result = 0.0;
    for (&x, w) in samples.iter().zip(weights) {
        let Some(value) = log_density(&components, x, w) else {
            return LikelihoodOutcome::failed();
        };
        if value == f64::NEG_INFINITY {
            return LikelihoodOutcome::overflowed();
        }
        result += w.count * value;
    }
    LikelihoodOutcome::from_value(result)
}

/// Bounds on `−ln Π F(xᵢ)^{nᵢ}` (or the complement) for the mixture.
pub fn minus_log_joint_cdf(
    components: &[Component<'_>], samples: &[f64], weights: &[SampleWeight], complement: bool,
) -> Option<Bounds> {
    if !check_batch(samples, weights) {
        return None;
    }
    let components = normalized(components);
    let (mut lower, mut upper) = (0.0, 0.0);
    for (&x, w) in samples.iter().zip(weights) {
        let (f_lower, f_upper) = cdf_bounds(&components, x, w, complement)?;
        lower -= w.count * f_upper.ln();
        upper -= w.count * f_lower.ln();
    }
    Some(Bounds { lower: lower.max(0.0), upper: upper.max(0.0) })
}

pub fn mean(components: &[Component<'_>]) -> f64 {
    normalized(components).iter().map(|(w, p)| w * p.marginal_likelihood_mean()).sum()
}

/// Mean of the component whose mean is nearest `value`.
pub fn nearest_mean(components: &[Component<'_>], value: f64) -> f64 {
    components
        .iter()
        .map(|(_, p)| p.marginal_likelihood_mean())
        .min_by(|a, b| (a - value).abs().total_cmp(&(b - value).abs()))
        .unwrap_or(value)
}

/// Law of total variance over the components.
pub fn variance(components: &[Component<'_>], weight: &SampleWeight) -> f64 {
    let components = normalized(components);
    let m = mean(&components);
    let mut result = 0.0;
    for (w, prior) in &components {
        let v = prior.marginal_likelihood_variance(weight);
        if !v.is_finite() {
            return f64::INFINITY;
        }
        let mi = prior.marginal_likelihood_mean();
        result += w * (v + (mi - m) * (mi - m));
    }
    result
}

/// The component mode at which the mixture density is largest.
pub fn mode(components: &[Component<'_>], weight: &SampleWeight) -> f64 {
    let components = normalized(components);
    components
        .iter()
        .map(|(_, p)| p.marginal_likelihood_mode(weight))
        .filter_map(|x| log_density(&components, x, weight).map(|f| (x, f)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map_or_else(|| mean(&components), |(x, _)| x)
}

/// Central interval holding `percentage` percent of the mixture mass.
///
/// Each mixture quantile lies between the smallest and largest matching
/// component quantile, which brackets the root search.
pub fn confidence_interval(
    components: &[Component<'_>], percentage: f64, weight: &SampleWeight,
) -> (f64, f64) {
    let components = normalized(components);
    let intervals: Vec<(f64, f64)> = components
        .iter()
        .map(|(_, p)| p.marginal_likelihood_confidence_interval(percentage, weight))
        .collect();
    if intervals.is_empty() {
        return (0.0, 0.0);
    }
    let q = 0.5 * (1.0 - percentage.clamp(0.0, 100.0) / 100.0);
    let quantile = |q: f64, ends: Vec<f64>| -> f64 {
        let lo = ends.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = ends.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let fallback = components.iter().zip(&ends).map(|((w, _), x)| w * x).sum::<f64>();
        if !(lo.abs() < FINITE_LIMIT && hi.abs() < FINITE_LIMIT) {
            return fallback;
        }
        if hi - lo <= 0.0 {
            return lo;
        }
        find_root(|x| cdf(&components, x, weight) - q, lo, hi, ROOT_TOLERANCE, ROOT_MAX_ITERATIONS)
            .unwrap_or(fallback)
    };
    let lower = quantile(q, intervals.iter().map(|i| i.0).collect());
    let upper = quantile(1.0 - q, intervals.iter().map(|i| i.1).collect());
    (lower, upper)
}

/// `count` deterministic samples allocated by component weight.
pub fn sample(components: &[Component<'_>], count: usize) -> Vec<f64> {
    let components = normalized(components);
    let weights: Vec<f64> = components.iter().map(|(w, _)| *w).collect();
    let allocation = weighted_allocation(&weights, count);
    components
        .iter()
        .zip(allocation)
        .flat_map(|((_, p), n)| p.sample_marginal_likelihood(n))
        .collect()
}

/// Probability mass of the region where the mixture density is below its
/// value at `x`.
fn two_sided(components: &[Component<'_>], x: f64, weight: &SampleWeight) -> Option<f64> {
    let fx = log_density(components, x, weight)?;
    if fx == f64::NEG_INFINITY {
        return Some(0.0);
    }
    let level = |y: f64| log_density(components, y, weight).unwrap_or(f64::NEG_INFINITY) - fx;

    let (mut lo, mut hi) = (x, x);
    for (_, prior) in components {
        let (a, b) = prior.marginal_likelihood_confidence_interval(SCAN_PERCENTAGE, weight);
        if a.abs() < FINITE_LIMIT {
            lo = lo.min(a);
        }
        if b.abs() < FINITE_LIMIT {
            hi = hi.max(b);
        }
    }
    if hi - lo <= 0.0 {
        lo -= 1.0;
        hi += 1.0;
    }
    let mut grid: Vec<f64> = (0..GRID_SIZE)
        .map(|i| lo + (hi - lo) * i as f64 / (GRID_SIZE - 1) as f64)
        .chain(components.iter().map(|(_, p)| p.marginal_likelihood_mode(weight)))
        .chain(std::iter::once(x))
        .filter(|y| y.is_finite())
        .collect();
    grid.sort_by(f64::total_cmp);
    grid.dedup();

    let values: Vec<f64> = grid.iter().map(|&y| level(y)).collect();
    let mut probability = 0.0;
    let mut start = (values[0] < 0.0).then_some(f64::NEG_INFINITY);
    for i in 1..grid.len() {
        let (a, b) = (grid[i - 1], grid[i]);
        let (ga, gb) = (values[i - 1], values[i]);
        if (ga < 0.0) == (gb < 0.0) {
            continue;
        }
        let crossing = if ga.is_finite() && gb.is_finite() {
            find_root(level, a, b, ROOT_TOLERANCE, ROOT_MAX_ITERATIONS).unwrap_or(0.5 * (a + b))
        } else {
            0.5 * (a + b)
        };
        match start.take() {
            Some(s) => probability += cdf(components, crossing, weight) - cdf(components, s, weight),
            None => start = Some(crossing),
        }
    }
    if let Some(s) = start {
        probability += 1.0 - cdf(components, s, weight);
    }
    Some(probability.clamp(0.0, 1.0))
}

/// Tail probability of a batch under the mixture.
pub fn probability_of_less_likely_samples(
    components: &[Component<'_>], calculation: ProbabilityCalculation, samples: &[f64],
    weights: &[SampleWeight],
) -> Option<TailProbability> {
    if !check_batch(samples, weights) {
        return None;
    }
    let components = normalized(components);
    let mut parts = Vec::with_capacity(samples.len());
    for (&x, w) in samples.iter().zip(weights) {
        let part = match calculation {
            ProbabilityCalculation::TwoSided => {
                let p = two_sided(&components, x, w)?;
                let tail = if cdf(&components, x, w) < 0.5 { Tail::Left } else { Tail::Right };
                (w.count, p, p, tail)
            }
            ProbabilityCalculation::OneSidedBelow => {
                let (l, u) = cdf_bounds(&components, x, w, false)?;
                (w.count, l, u, Tail::Left)
            }
            ProbabilityCalculation::OneSidedAbove => {
                let (l, u) = cdf_bounds(&components, x, w, true)?;
                (w.count, l, u, Tail::Right)
            }
        };
        parts.push(part);
    }
    Some(combine_tail_probabilities(&parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priors::normal::{NormalGamma, NormalMeanPrecConjugate};
    use crate::priors::traits::{unit_weights, DataType};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // An equal mixture of two tight, well separated normal components.
    // -------------------------------------------------------------------------

    fn component(mean: f64) -> NormalMeanPrecConjugate {
        // Tight posterior: unit noise variance known from 10⁴ samples.
        let params = NormalGamma { mean, precision: 1e4, shape: 5e3, rate: 5e3 };
        NormalMeanPrecConjugate::new(DataType::Continuous, params, 0.0)
    }

    #[test]
    // Purpose
    // -------
    // Moments follow the law of total variance and samples are allocated
    // by weight.
    fn moments_and_sampling() {
        // Arrange
        let (a, b) = (component(0.0), component(10.0));
        let components: [Component<'_>; 2] = [(1.0, &a), (1.0, &b)];

        // Act
        let m = mean(&components);
        let v = variance(&components, &SampleWeight::default());
        let samples = sample(&components, 20);

        // Assert
        assert!((m - 5.0).abs() < 1e-9);
        assert!((v - 26.0).abs() < 0.01, "variance = {v}");
        assert_eq!(samples.len(), 20);
        assert_eq!(samples.iter().filter(|&&x| x < 5.0).count(), 10);
        assert!((nearest_mean(&components, 8.0) - 10.0).abs() < 1e-9);
    }

    #[test]
    // Purpose
    // -------
    // The likelihood at a component mean is half that component's density.
    fn likelihood_of_equal_mixture() {
        // Arrange
        let (a, b) = (component(0.0), component(10.0));
        let components: [Component<'_>; 2] = [(0.5, &a), (0.5, &b)];
        let single = a.joint_log_marginal_likelihood(&[0.0], &unit_weights(1)).value;

        // Act
        let outcome = joint_log_marginal_likelihood(&components, &[0.0], &unit_weights(1));

        // Assert
        assert!(outcome.is_success());
        assert!((outcome.value - (single + 0.5f64.ln())).abs() < 1e-6);
    }

    #[test]
    // Purpose
    // -------
    // Two-sided tails follow the level set of the bimodal density.
    //
    // Given
    // -----
    // - x = 1.5, one standard deviation and a half from the left mode.
    //
    // Expect
    // ------
    // - p ≈ P(|Z| > 1.5) ≈ 0.1336; the valley at x = 5 is very unlikely.
    fn two_sided_uses_level_set() {
        // Arrange
        let (a, b) = (component(0.0), component(10.0));
        let components: [Component<'_>; 2] = [(1.0, &a), (1.0, &b)];
        let w = unit_weights(1);
        let calc = ProbabilityCalculation::TwoSided;

        // Act
        let near = probability_of_less_likely_samples(&components, calc, &[1.5], &w).unwrap();
        let valley = probability_of_less_likely_samples(&components, calc, &[5.0], &w).unwrap();

        // Assert
        assert!((near.lower - 0.1336).abs() < 0.005, "near = {near:?}");
        assert!(valley.upper < 1e-4, "valley = {valley:?}");
        assert_eq!(near.tail, Tail::Left);
    }

    #[test]
    // Purpose
    // -------
    // The 50% interval of a symmetric bimodal mixture is symmetric about
    // the centre and its ends carry a quarter of the mass each.
    fn confidence_interval_quartiles() {
        // Arrange
        let (a, b) = (component(0.0), component(10.0));
        let components: [Component<'_>; 2] = [(1.0, &a), (1.0, &b)];
        let w = SampleWeight::default();

        // Act
        let (lower, upper) = confidence_interval(&components, 50.0, &w);

        // Assert
        assert!((lower + upper - 10.0).abs() < 1e-3, "interval = ({lower}, {upper})");
        assert!((cdf(&normalized(&components), lower, &w) - 0.25).abs() < 1e-4);
    }
}
