//! Offset search for priors with non-negative support.
//!
//! A prior whose support starts at `−offset` cannot accept a sample below
//! that point, and becomes numerically fragile for samples just above it.
//! When a batch contains a sample below `offset + margin` the offset has to
//! grow to at least `margin − min(samples)`. Any larger offset is also
//! admissible, so the new offset is chosen to maximize the likelihood of
//! the batch given a prior rebuilt at the trial offset from resamples of
//! the current marginal likelihood.
//!
//! The helpers here are family agnostic; each family supplies the cost of a
//! trial offset and applies the winner itself.
use crate::priors::traits::{LikelihoodOutcome, Prior, SampleWeight};
use crate::statistics::solvers::minimize;
use tracing::{debug, warn};

/// Number of marginal likelihood resamples used to rebuild a prior at a
/// trial offset.
pub const ADJUST_OFFSET_SAMPLE_SIZE: usize = 50;

const ADJUST_OFFSET_TRIALS: usize = 20;
const ADJUST_OFFSET_MAX_ITERATIONS: u64 = 20;

/// Smallest admissible offset for `samples`, or `None` when `current`
/// already keeps every sample at least `margin` inside the support.
pub fn required_offset(current: f64, margin: f64, samples: &[f64]) -> Option<f64> {
    let minimum = samples.iter().copied().filter(|x| x.is_finite()).fold(f64::INFINITY, f64::min);
    if !minimum.is_finite() || minimum + current >= margin {
        return None;
    }
    let offset = margin - minimum;
    Some(offset + offset.abs() * f64::EPSILON)
}

/// Representative samples of `prior` weighted so that together they carry
/// the prior's sample count.
pub fn resample(prior: &dyn Prior, size: usize) -> (Vec<f64>, Vec<SampleWeight>) {
    let samples: Vec<f64> =
        prior.sample_marginal_likelihood(size).into_iter().filter(|x| x.is_finite()).collect();
    if samples.is_empty() {
        return (samples, Vec::new());
    }
    let weight = SampleWeight::count(prior.number_samples() / samples.len() as f64);
    let weights = vec![weight; samples.len()];
    (samples, weights)
}

/// Cost of a trial: the negative joint log-likelihood, or `f64::MAX` when
/// the likelihood is unusable.
pub fn likelihood_cost(outcome: LikelihoodOutcome) -> f64 {
    if outcome.is_success() {
        -outcome.value
    } else {
        f64::MAX
    }
}

/// choose_offset — minimize `cost` over offsets `≥ lower`.
///
/// Parameters
/// ----------
/// - `lower`: smallest admissible offset (from [`required_offset`]).
/// - `current`: the offset in use before the batch.
/// - `margin`: the family's offset margin.
/// - `cost`: cost of a trial offset; smaller is better.
///
/// Returns
/// -------
/// The best of a uniform grid over `[lower, lower + width]`, with
/// `width = 2·max(lower − current, margin)`, refined by Brent minimization
/// between the neighbours of the best grid point. The refinement is only
/// accepted if it improves on the grid.
pub fn choose_offset<F: Fn(f64) -> f64>(lower: f64, current: f64, margin: f64, cost: F) -> f64 {
    let width = 2.0 * (lower - current).max(margin).max(lower.abs() * 1e-6).max(f64::EPSILON);
    let step = width / (ADJUST_OFFSET_TRIALS - 1) as f64;
    let trials: Vec<f64> = (0..ADJUST_OFFSET_TRIALS).map(|i| lower + step * i as f64).collect();
    let costs: Vec<f64> = trials.iter().map(|&t| cost(t)).collect();

    let (best, best_cost) = costs
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, &c)| (i, c))
        .unwrap_or((0, f64::MAX));
    if best_cost == f64::MAX {
        warn!(lower, "no trial offset gives a usable likelihood; using the smallest");
        return lower;
    }

    let a = trials[best.saturating_sub(1)];
    let b = trials[(best + 1).min(ADJUST_OFFSET_TRIALS - 1)];
    match minimize(&cost, a, b, ADJUST_OFFSET_MAX_ITERATIONS) {
        Ok((offset, refined)) if refined < best_cost && offset >= lower => {
            debug!(offset, cost = refined, "refined offset");
            offset
        }
        _ => trials[best],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // No shift is needed while every sample stays `margin` inside the
    // support; otherwise the offset must reach `margin − min`.
    fn required_offset_cases() {
        assert_eq!(required_offset(0.0, 0.2, &[1.0, 0.5]), None);
        let offset = required_offset(0.0, 0.2, &[1.0, -0.3]).unwrap();
        assert!((offset - 0.5).abs() < 1e-12);
        assert!(offset >= 0.5);
    }

    #[test]
    // Purpose
    // -------
    // The search lands on the minimum of a smooth cost inside the range.
    //
    // Given
    // -----
    // - cost (t − 1.3)², lower bound 1, current offset 0, margin 0.2.
    //
    // Expect
    // ------
    // - an offset close to 1.3.
    fn choose_offset_minimizes_cost() {
        // Act
        let offset = choose_offset(1.0, 0.0, 0.2, |t| (t - 1.3) * (t - 1.3));

        // Assert
        assert!((offset - 1.3).abs() < 1e-3, "offset = {offset}");
    }

    #[test]
    // Purpose
    // -------
    // A cost that is unusable everywhere falls back to the lower bound.
    fn choose_offset_falls_back_to_lower() {
        assert_eq!(choose_offset(2.0, 1.0, 0.2, |_| f64::MAX), 2.0);
    }
}
