//! Weighted moment accumulators.
//!
//! Purpose
//! -------
//! Summarize a stream of weighted observations by their count and low-order
//! moments so that online models never have to store raw samples. Every
//! accumulator can be aged (its count multiplied by a factor in `(0, 1]`)
//! and combined with another accumulator fit on a disjoint sample set.
//!
//! Key behaviors
//! -------------
//! - [`MeanAccumulator`]: weighted count and mean.
//! - [`MeanVarAccumulator`]: weighted count, mean and maximum-likelihood
//!   variance, updated with the weighted Welford recurrence.
//! - [`VectorMeanAccumulator`]: weighted count and component-wise mean of a
//!   fixed-length vector; the sufficient statistic of the online regression.
//!
//! Invariants & assumptions
//! ------------------------
//! - `count >= 0` at all times; `add` ignores weights that are not finite
//!   and strictly positive.
//! - Ageing scales the count only. Means and variances are unchanged, so an
//!   aged accumulator behaves like one fit on proportionally fewer points.
//! - Combination is exact: `a + b` equals the accumulator obtained by adding
//!   the samples of `a` and `b` to one accumulator, up to rounding.
use crate::statistics::checksum::Checksum;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

#[inline]
fn valid_weight(weight: f64) -> bool {
    weight.is_finite() && weight > 0.0
}

/// MeanAccumulator — weighted count and mean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanAccumulator {
    count: f64,
    mean: f64,
}

impl MeanAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an accumulator directly from its moments.
    pub fn from_moments(count: f64, mean: f64) -> Self {
        MeanAccumulator { count: count.max(0.0), mean }
    }

    /// Add `x` with weight `weight`.
    pub fn add(&mut self, x: f64, weight: f64) {
        if !valid_weight(weight) || !x.is_finite() {
            return;
        }
        self.count += weight;
        self.mean += weight / self.count * (x - self.mean);
    }

    /// Multiply the count by `factor`.
    pub fn age(&mut self, factor: f64) {
        self.count *= factor.clamp(0.0, 1.0);
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }
}

impl AddAssign for MeanAccumulator {
    fn add_assign(&mut self, rhs: Self) {
        let count = self.count + rhs.count;
        if count > 0.0 {
            self.mean = (self.count * self.mean + rhs.count * rhs.mean) / count;
        }
        self.count = count;
    }
}

impl std::ops::Add for MeanAccumulator {
    type Output = MeanAccumulator;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl Checksum for MeanAccumulator {
    fn checksum(&self, seed: u64) -> u64 {
        self.mean.checksum(self.count.checksum(seed))
    }
}

/// MeanVarAccumulator — weighted count, mean and ML variance.
///
/// The variance is the maximum-likelihood (biased) estimate
/// `Σ wᵢ (xᵢ − x̄)² / Σ wᵢ`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanVarAccumulator {
    count: f64,
    mean: f64,
    variance: f64,
}

impl MeanVarAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an accumulator from `(count, mean, ML variance)`.
    ///
    /// Negative counts and variances are clamped to zero.
    pub fn from_moments(count: f64, mean: f64, variance: f64) -> Self {
        MeanVarAccumulator { count: count.max(0.0), mean, variance: variance.max(0.0) }
    }

    pub fn add(&mut self, x: f64, weight: f64) {
        if !valid_weight(weight) || !x.is_finite() {
            return;
        }
        let count = self.count + weight;
        let delta = x - self.mean;
        let mean = self.mean + weight / count * delta;
        self.variance = ((self.count * self.variance + weight * delta * (x - mean)) / count).max(0.0);
        self.mean = mean;
        self.count = count;
    }

    pub fn age(&mut self, factor: f64) {
        self.count *= factor.clamp(0.0, 1.0);
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Maximum-likelihood variance.
    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// Bias-corrected variance, `n/(n-1)` times the ML variance.
    ///
    /// Returns the ML variance when `count <= 1`.
    pub fn unbiased_variance(&self) -> f64 {
        if self.count > 1.0 { self.variance * self.count / (self.count - 1.0) } else { self.variance }
    }
}

impl AddAssign for MeanVarAccumulator {
    fn add_assign(&mut self, rhs: Self) {
        let count = self.count + rhs.count;
        if count <= 0.0 {
            *self = MeanVarAccumulator::default();
            return;
        }
        let mean = (self.count * self.mean + rhs.count * rhs.mean) / count;
        let dl = self.mean - mean;
        let dr = rhs.mean - mean;
        self.variance = (self.count * (self.variance + dl * dl)
            + rhs.count * (rhs.variance + dr * dr))
            / count;
        self.mean = mean;
        self.count = count;
    }
}

impl std::ops::Add for MeanVarAccumulator {
    type Output = MeanVarAccumulator;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl Checksum for MeanVarAccumulator {
    fn checksum(&self, seed: u64) -> u64 {
        let seed = self.count.checksum(seed);
        let seed = self.mean.checksum(seed);
        self.variance.checksum(seed)
    }
}

/// VectorMeanAccumulator — weighted count and component-wise mean.
///
/// Fields
/// ------
/// - `count`: total weight added so far.
/// - `mean`: component-wise weighted mean; its length is fixed at
///   construction.
///
/// Notes
/// -----
/// - The mean is exposed mutably through [`VectorMeanAccumulator::mean_mut`]
///   because the regression re-expresses its statistics in place when the
///   abscissa or ordinate is shifted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMeanAccumulator {
    count: f64,
    mean: Array1<f64>,
}

impl VectorMeanAccumulator {
    pub fn zeros(dimension: usize) -> Self {
        VectorMeanAccumulator { count: 0.0, mean: Array1::zeros(dimension) }
    }

    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    /// Add the vector `x` with weight `weight`.
    ///
    /// Panics
    /// ------
    /// - Panics if `x.len() != self.dimension()`; this is a logic error in
    ///   the caller.
    pub fn add(&mut self, x: ArrayView1<f64>, weight: f64) {
        assert_eq!(x.len(), self.mean.len(), "vector dimension mismatch");
        if !valid_weight(weight) || x.iter().any(|v| !v.is_finite()) {
            return;
        }
        self.count += weight;
        let alpha = weight / self.count;
        self.mean.zip_mut_with(&x, |m, &xi| *m += alpha * (xi - *m));
    }

    pub fn age(&mut self, factor: f64) {
        self.count *= factor.clamp(0.0, 1.0);
    }

    /// Multiply the count by an arbitrary non-negative factor.
    pub fn scale(&mut self, factor: f64) {
        if factor.is_finite() && factor >= 0.0 {
            self.count *= factor;
        }
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn mean_mut(&mut self) -> &mut Array1<f64> {
        &mut self.mean
    }
}

impl AddAssign<&VectorMeanAccumulator> for VectorMeanAccumulator {
    fn add_assign(&mut self, rhs: &VectorMeanAccumulator) {
        assert_eq!(rhs.mean.len(), self.mean.len(), "vector dimension mismatch");
        let count = self.count + rhs.count;
        if count > 0.0 {
            let (wl, wr) = (self.count / count, rhs.count / count);
            self.mean.zip_mut_with(&rhs.mean, |m, &r| *m = wl * *m + wr * r);
        }
        self.count = count;
    }
}

impl Checksum for VectorMeanAccumulator {
    fn checksum(&self, seed: u64) -> u64 {
        self.mean.checksum(self.count.checksum(seed))
    }
}
