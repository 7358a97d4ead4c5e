//! Online weighted polynomial least squares.
//!
//! Purpose
//! -------
//! Fit `y ≈ Σ_{i=0..=N} cᵢ xⁱ` to a stream of weighted points without storing
//! them. The fit is summarized by `3(N + 1) − 1` weighted means: the power
//! sums `E[xⁱ]` for `i = 0..=2N` (the distinct entries of the Gramian) and
//! the cross moments `E[xⁱ y]` for `i = 0..=N` (the right-hand side of the
//! normal equations).
//!
//! Key behaviors
//! -------------
//! - [`LeastSquaresOnline::add`] folds one point in O(N).
//! - [`LeastSquaresOnline::parameters`] solves the normal equations through
//!   an SVD of the Gramian and walks a degree ladder: whenever the ratio of
//!   the largest to the smallest singular value exceeds the maximum
//!   condition number, the next lower degree is tried, ending with the mean
//!   of `y`.
//! - [`LeastSquaresOnline::shift_abscissa`] and
//!   [`LeastSquaresOnline::shift_ordinate`] re-express the statistics for a
//!   translated coordinate system via the binomial expansion of `(x + dx)ⁱ`.
//! - [`LeastSquaresOnline::age`] discounts old evidence and optionally pulls
//!   the higher-order terms back toward a mean-only fit.
//! - Accumulators fit on disjoint point sets combine with `+`.
//!
//! Invariants & assumptions
//! ------------------------
//! - The statistic vector always has length `3(N + 1) − 1`; deserialization
//!   rejects any other length.
//! - The count is non-negative. Points with non-finite coordinates or
//!   non-positive weight are logged and ignored.
//! - Accuracy of the power sums degrades as `|E[x]|` grows, so long-running
//!   callers re-centre the abscissa with `shift_abscissa`.
//!
//! Conventions
//! -----------
//! - Coefficients are returned lowest order first: `[c₀, c₁, …, c_N]`.
//! - Statistic layout: index `i ∈ [0, 2N]` holds `E[xⁱ]`, index
//!   `2N + 1 + i` holds `E[xⁱ y]`.
//!
//! Downstream usage
//! ----------------
//! - The adaptive seasonal bucketing keeps one linear fit per bucket.
//!
//! Testing notes
//! -------------
//! - Unit tests cover the quadratic recovery scenario, the degree ladder,
//!   shift round trips, mean reversion and interval means. Property tests
//!   for the combination law and the local-minimum property live in
//!   `tests/regression_properties.rs`.
use crate::regression::errors::{RegressionError, RegressionResult};
use crate::statistics::{binomial, Checksum, VectorMeanAccumulator};
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Deserializer, Serialize};
use std::ops::AddAssign;
use tracing::{error, trace};

/// Default cap on the Gramian condition number.
pub const DEFAULT_MAX_CONDITION: f64 = 1e15;

/// Minimum spread of the abscissa, `√(12 var(x))`, before a fit is used
/// for prediction instead of the mean.
pub const MINIMUM_RANGE_TO_PREDICT: f64 = 1.0;

/// LeastSquaresOnline — degree-`N` online least-squares accumulator.
///
/// Fields
/// ------
/// - `statistic`: [`VectorMeanAccumulator`] of dimension `3(N + 1) − 1`
///   holding the weighted means described in the module docs.
///
/// Notes
/// -----
/// - `N` is the polynomial degree, so a fit has `N + 1` coefficients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeastSquaresOnline<const N: usize> {
    statistic: VectorMeanAccumulator,
}

impl<const N: usize> LeastSquaresOnline<N> {
    /// Number of fitted coefficients.
    pub const PARAMETERS: usize = N + 1;
    const DIMENSION: usize = 3 * (N + 1) - 1;
    const Y_OFFSET: usize = 2 * (N + 1) - 1;

    pub fn new() -> Self {
        LeastSquaresOnline { statistic: VectorMeanAccumulator::zeros(Self::DIMENSION) }
    }

    /// Add the point `(x, y)` with weight `weight`.
    pub fn add(&mut self, x: f64, y: f64, weight: f64) {
        if !x.is_finite() || !y.is_finite() {
            error!(x, y, "discarding non-finite regression point");
            return;
        }
        if !weight.is_finite() || weight <= 0.0 {
            error!(weight, "discarding regression point with invalid weight");
            return;
        }
        let mut d = Array1::<f64>::zeros(Self::DIMENSION);
        let mut xi = 1.0;
        for i in 0..Self::PARAMETERS {
            d[i] = xi;
            d[i + Self::Y_OFFSET] = xi * y;
            xi *= x;
        }
        for i in Self::PARAMETERS..Self::Y_OFFSET {
            d[i] = xi;
            xi *= x;
        }
        self.statistic.add(d.view(), weight);
    }

    /// Re-express the statistics as if every abscissa had been moved by `dx`.
    ///
    /// Uses `E[(x + dx)ⁱ] = Σ_{j≤i} (i j) dx^{i−j} E[xʲ]` and the analogous
    /// identity for the cross moments. Higher powers are updated first so
    /// each update reads the unshifted lower powers.
    pub fn shift_abscissa(&mut self, dx: f64) {
        if self.statistic.count() == 0.0 || dx == 0.0 {
            return;
        }
        let top = Self::Y_OFFSET - 1;
        let mut powers = vec![1.0; top + 1];
        for k in 1..=top {
            powers[k] = powers[k - 1] * dx;
        }
        let s = self.statistic.mean_mut();
        for i in (1..=top).rev() {
            for j in 0..i {
                let bij = binomial(i as u64, j as u64) * powers[i - j];
                s[i] += bij * s[j];
                if i < Self::PARAMETERS {
                    s[i + Self::Y_OFFSET] += bij * s[j + Self::Y_OFFSET];
                }
            }
        }
    }

    /// Re-express the statistics as if every ordinate had been moved by `dy`.
    pub fn shift_ordinate(&mut self, dy: f64) {
        if self.statistic.count() == 0.0 || dy == 0.0 {
            return;
        }
        let s = self.statistic.mean_mut();
        for i in 0..Self::PARAMETERS {
            s[i + Self::Y_OFFSET] += s[i] * dy;
        }
    }

    /// Re-express the statistics as if `y ↦ y + gradient · x`.
    pub fn shift_gradient(&mut self, gradient: f64) {
        if self.statistic.count() == 0.0 || gradient == 0.0 || Self::PARAMETERS < 2 {
            return;
        }
        let s = self.statistic.mean_mut();
        for i in 0..Self::PARAMETERS {
            s[i + Self::Y_OFFSET] += s[i + 1] * gradient;
        }
    }

    /// Multiply the effective number of points by `factor`.
    pub fn scale(&mut self, factor: f64) -> &mut Self {
        self.statistic.scale(factor);
        self
    }

    /// Copy of `self` with the count multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        let mut result = self.clone();
        result.scale(factor);
        result
    }

    /// parameters — coefficients of the best well-conditioned fit.
    ///
    /// Parameters
    /// ----------
    /// - `max_condition`: `f64`
    ///   Largest acceptable ratio of the Gramian's extreme singular values.
    ///
    /// Returns
    /// -------
    /// `RegressionResult<Array1<f64>>`
    ///   `N + 1` coefficients, lowest order first. When the full system is
    ///   ill conditioned the trailing coefficients of the accepted lower
    ///   degree fit are zero. An empty accumulator yields all zeros.
    ///
    /// Errors
    /// ------
    /// - `RegressionError::InvalidMaxCondition` if `max_condition` is not
    ///   finite or is below one.
    pub fn parameters(&self, max_condition: f64) -> RegressionResult<Array1<f64>> {
        validate_max_condition(max_condition)?;
        let mut result = Array1::zeros(Self::PARAMETERS);
        for n in (1..=Self::PARAMETERS).rev() {
            if n == 1 {
                result[0] = self.mean();
                return Ok(result);
            }
            let gramian = self.gramian(n);
            let svd = gramian.svd(true, true);
            if !well_conditioned(svd.singular_values.as_slice(), max_condition) {
                trace!(degree = n - 1, "gramian ill conditioned, lowering degree");
                continue;
            }
            let rhs = DVector::from_fn(n, |i, _| self.statistic.mean()[i + Self::Y_OFFSET]);
            if let Ok(solution) = svd.solve(&rhs, 0.0) {
                for i in 0..n {
                    result[i] = solution[i];
                }
                return Ok(result);
            }
        }
        Ok(result)
    }

    /// covariances — parameter covariance `σ² (XᵀX)⁻¹` with the degree ladder.
    ///
    /// Returns
    /// -------
    /// `RegressionResult<Array2<f64>>`
    ///   An `(N + 1) × (N + 1)` matrix whose leading block corresponds to the
    ///   accepted degree; the remaining entries are zero.
    ///
    /// Errors
    /// ------
    /// - `RegressionError::InvalidMaxCondition` for a bad condition cap.
    /// - `RegressionError::InvalidVariance` for a negative or non-finite
    ///   variance.
    /// - `RegressionError::NoData` when the count is zero.
    pub fn covariances(&self, variance: f64, max_condition: f64) -> RegressionResult<Array2<f64>> {
        validate_max_condition(max_condition)?;
        if !variance.is_finite() || variance < 0.0 {
            return Err(RegressionError::InvalidVariance(variance));
        }
        let count = self.count();
        if count <= 0.0 {
            return Err(RegressionError::NoData);
        }
        let mut result = Array2::zeros((Self::PARAMETERS, Self::PARAMETERS));
        for n in (1..=Self::PARAMETERS).rev() {
            if n == 1 {
                result[[0, 0]] = variance / count;
                return Ok(result);
            }
            let svd = self.gramian(n).svd(true, true);
            if !well_conditioned(svd.singular_values.as_slice(), max_condition) {
                continue;
            }
            if let Ok(inverse) = svd.pseudo_inverse(0.0) {
                for i in 0..n {
                    for j in 0..n {
                        result[[i, j]] = inverse[(i, j)] * variance / count;
                    }
                }
                return Ok(result);
            }
        }
        Ok(result)
    }

    /// Spread of the abscissa, `√(12 var(x))`; the width of a uniform
    /// distribution with the same variance.
    pub fn range(&self) -> f64 {
        if Self::Y_OFFSET < 3 {
            return 0.0;
        }
        let s = self.statistic.mean();
        (12.0 * (s[2] - s[1] * s[1]).max(0.0)).sqrt()
    }

    /// Age the fit by `factor`.
    ///
    /// With `mean_revert`, each cross moment is pulled toward the value it
    /// would have if `x` and `y` were uncorrelated:
    /// `E[xⁱy] ← f E[xⁱy] + (1 − f) E[xⁱ] E[y]`.
    pub fn age(&mut self, factor: f64, mean_revert: bool) {
        if mean_revert {
            let s = self.statistic.mean_mut();
            let mean_y = s[Self::Y_OFFSET];
            for i in 1..Self::PARAMETERS {
                s[i + Self::Y_OFFSET] = factor * s[i + Self::Y_OFFSET] + (1.0 - factor) * s[i] * mean_y;
            }
        }
        self.statistic.age(factor);
    }

    /// Effective number of points.
    pub fn count(&self) -> f64 {
        self.statistic.count()
    }

    /// Weighted mean of the ordinates.
    pub fn mean(&self) -> f64 {
        self.statistic.mean()[Self::Y_OFFSET]
    }

    /// Average of the fitted polynomial over `[a, b]`.
    ///
    /// Errors
    /// ------
    /// - `RegressionError::InvalidInterval` when `a > b` or either end is
    ///   not finite.
    pub fn mean_over(&self, a: f64, b: f64) -> RegressionResult<f64> {
        if !a.is_finite() || !b.is_finite() || a > b {
            return Err(RegressionError::InvalidInterval { a, b });
        }
        let params = self.parameters(DEFAULT_MAX_CONDITION)?;
        if b == a {
            return Ok(evaluate(&params, a));
        }
        let (mut ai, mut bi) = (a, b);
        let mut integral = 0.0;
        for (i, c) in params.iter().enumerate() {
            integral += c * (bi - ai) / (i + 1) as f64;
            ai *= a;
            bi *= b;
        }
        Ok(integral / (b - a))
    }

    /// Predict at `x`, using the mean until the abscissa range is at least
    /// [`MINIMUM_RANGE_TO_PREDICT`].
    pub fn predict(&self, x: f64, max_condition: f64) -> RegressionResult<f64> {
        if self.range() < MINIMUM_RANGE_TO_PREDICT {
            return Ok(self.mean());
        }
        Ok(evaluate(&self.parameters(max_condition)?, x))
    }

    pub fn statistic(&self) -> &VectorMeanAccumulator {
        &self.statistic
    }

    fn gramian(&self, n: usize) -> DMatrix<f64> {
        let s = self.statistic.mean();
        DMatrix::from_fn(n, n, |i, j| s[i + j])
    }
}

/// Evaluate `Σ cᵢ xⁱ` with Horner's rule.
pub fn evaluate(params: &Array1<f64>, x: f64) -> f64 {
    params.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

fn validate_max_condition(max_condition: f64) -> RegressionResult<()> {
    if !max_condition.is_finite() || max_condition < 1.0 {
        return Err(RegressionError::InvalidMaxCondition(max_condition));
    }
    Ok(())
}

fn well_conditioned(singular_values: &[f64], max_condition: f64) -> bool {
    let max = singular_values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = singular_values.iter().copied().fold(f64::INFINITY, f64::min);
    min.is_finite() && max.is_finite() && min > 0.0 && max <= max_condition * min
}

impl<const N: usize> Default for LeastSquaresOnline<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> AddAssign<&LeastSquaresOnline<N>> for LeastSquaresOnline<N> {
    fn add_assign(&mut self, rhs: &LeastSquaresOnline<N>) {
        self.statistic += &rhs.statistic;
    }
}

impl<const N: usize> AddAssign for LeastSquaresOnline<N> {
    fn add_assign(&mut self, rhs: LeastSquaresOnline<N>) {
        *self += &rhs;
    }
}

impl<const N: usize> std::ops::Add for LeastSquaresOnline<N> {
    type Output = LeastSquaresOnline<N>;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += &rhs;
        self
    }
}

impl<const N: usize> Checksum for LeastSquaresOnline<N> {
    fn checksum(&self, seed: u64) -> u64 {
        self.statistic.checksum(seed)
    }
}

impl<const N: usize> std::fmt::Display for LeastSquaresOnline<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params = self.parameters(DEFAULT_MAX_CONDITION).map_err(|_| std::fmt::Error)?;
        for i in (1..params.len()).rev() {
            write!(f, "{} x^{} + ", params[i], i)?;
        }
        write!(f, "{}", params[0])
    }
}

impl<'de, const N: usize> Deserialize<'de> for LeastSquaresOnline<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            statistic: VectorMeanAccumulator,
        }

        let raw = Raw::deserialize(deserializer)?;
        if raw.statistic.dimension() != Self::DIMENSION {
            return Err(serde::de::Error::custom(format!(
                "regression statistic has dimension {}, expected {}",
                raw.statistic.dimension(),
                Self::DIMENSION
            )));
        }
        Ok(LeastSquaresOnline { statistic: raw.statistic })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::distributions::Distribution;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use statrs::distribution::Normal;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Recovery of known polynomial coefficients.
    // - The degree ladder on degenerate designs.
    // - Abscissa/ordinate shifts, ageing with mean reversion, interval means.
    // - Serde validation of the statistic dimension.
    //
    // They intentionally DO NOT cover:
    // - Randomized laws (combination, local minimum); see the integration
    //   property tests.
    // -------------------------------------------------------------------------

    fn quadratic_fit() -> LeastSquaresOnline<2> {
        let mut rng = StdRng::seed_from_u64(17);
        let noise = Normal::new(0.0, 0.01).unwrap();
        let mut regression = LeastSquaresOnline::<2>::new();
        for i in 0..50 {
            let x = i as f64;
            regression.add(x, 0.2 * x * x + 2.0 * x + noise.sample(&mut rng), 1.0);
        }
        regression
    }

    #[test]
    // Purpose
    // -------
    // Recover the coefficients of y = 0.2 x² + 2 x from 50 noisy points.
    //
    // Given
    // -----
    // - x = 0..49, seeded Gaussian noise with standard deviation 0.01.
    //
    // Expect
    // ------
    // - Coefficients within 3% of {0, 2, 0.2} (absolute 0.03 for the
    //   intercept).
    fn recovers_quadratic_coefficients() {
        // Arrange
        let regression = quadratic_fit();

        // Act
        let params = regression.parameters(DEFAULT_MAX_CONDITION).expect("valid condition cap");

        // Assert
        assert!(params[0].abs() < 0.03, "c0 = {}", params[0]);
        assert!((params[1] - 2.0).abs() < 0.03 * 2.0, "c1 = {}", params[1]);
        assert!((params[2] - 0.2).abs() < 0.03 * 0.2, "c2 = {}", params[2]);
    }

    #[test]
    // Purpose
    // -------
    // A design with a single distinct abscissa is singular for degree ≥ 1,
    // so the ladder must fall back to the mean.
    fn singular_design_falls_back_to_mean() {
        // Arrange
        let mut regression = LeastSquaresOnline::<2>::new();
        regression.add(3.0, 1.0, 1.0);
        regression.add(3.0, 5.0, 1.0);

        // Act
        let params = regression.parameters(1e10).expect("valid cap");

        // Assert
        assert!((params[0] - 3.0).abs() < 1e-12);
        assert_eq!(params[1], 0.0);
        assert_eq!(params[2], 0.0);
    }

    #[test]
    // Purpose
    // -------
    // Two distinct abscissae support a line but not a parabola.
    fn two_support_points_fit_a_line() {
        // Arrange
        let mut regression = LeastSquaresOnline::<2>::new();
        for _ in 0..3 {
            regression.add(0.0, 1.0, 1.0);
            regression.add(2.0, 5.0, 1.0);
        }

        // Act
        let params = regression.parameters(1e10).expect("valid cap");

        // Assert
        assert!((params[0] - 1.0).abs() < 1e-9, "params = {params}");
        assert!((params[1] - 2.0).abs() < 1e-9, "params = {params}");
        assert_eq!(params[2], 0.0);
    }

    #[test]
    // Purpose
    // -------
    // Shifting the abscissa by c re-expresses the fit in x' = x + c, so the
    // shifted fit evaluated at x + c matches the original at x; shifting
    // back restores the parameters.
    fn abscissa_shift_round_trip() {
        // Arrange
        let mut regression = quadratic_fit();
        let before = regression.parameters(DEFAULT_MAX_CONDITION).unwrap();

        // Act
        regression.shift_abscissa(7.5);
        let shifted = regression.parameters(DEFAULT_MAX_CONDITION).unwrap();
        regression.shift_abscissa(-7.5);
        let after = regression.parameters(DEFAULT_MAX_CONDITION).unwrap();

        // Assert
        for x in [0.0, 10.0, 25.0] {
            let expected = evaluate(&before, x);
            let actual = evaluate(&shifted, x + 7.5);
            assert!((expected - actual).abs() < 1e-6 * expected.abs().max(1.0));
        }
        for i in 0..3 {
            assert!((before[i] - after[i]).abs() < 1e-6 * before[i].abs().max(1.0));
        }
    }

    #[test]
    // Purpose
    // -------
    // Shifting ordinates moves the intercept only.
    fn ordinate_shift_moves_intercept() {
        // Arrange
        let mut regression = quadratic_fit();
        let before = regression.parameters(DEFAULT_MAX_CONDITION).unwrap();

        // Act
        regression.shift_ordinate(3.0);
        let after = regression.parameters(DEFAULT_MAX_CONDITION).unwrap();

        // Assert
        assert!((after[0] - before[0] - 3.0).abs() < 1e-6);
        assert!((after[1] - before[1]).abs() < 1e-6);
        assert!((after[2] - before[2]).abs() < 1e-8);
    }

    #[test]
    // Purpose
    // -------
    // Mean-reverting age shrinks the slope toward zero and scales the count.
    fn mean_reverting_age_flattens_slope() {
        // Arrange
        let mut regression = LeastSquaresOnline::<1>::new();
        for i in 0..20 {
            regression.add(i as f64, 3.0 * i as f64, 1.0);
        }
        let slope_before = regression.parameters(DEFAULT_MAX_CONDITION).unwrap()[1];

        // Act
        regression.age(0.5, true);
        let slope_after = regression.parameters(DEFAULT_MAX_CONDITION).unwrap()[1];

        // Assert
        assert!((regression.count() - 10.0).abs() < 1e-12);
        assert!((slope_after - 0.5 * slope_before).abs() < 1e-9, "slope = {slope_after}");
    }

    #[test]
    // Purpose
    // -------
    // The interval mean of a line over [a, b] is its value at the midpoint.
    fn interval_mean_of_line() {
        // Arrange
        let mut regression = LeastSquaresOnline::<1>::new();
        for i in 0..10 {
            regression.add(i as f64, 1.0 + 2.0 * i as f64, 1.0);
        }

        // Act
        let mean = regression.mean_over(2.0, 6.0).unwrap();

        // Assert
        assert!((mean - 9.0).abs() < 1e-9);
        assert!(matches!(
            regression.mean_over(6.0, 2.0),
            Err(RegressionError::InvalidInterval { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Covariance of the mean-only fit is σ²/n; invalid requests error.
    fn covariances_of_constant_design() {
        // Arrange
        let mut regression = LeastSquaresOnline::<1>::new();
        for _ in 0..4 {
            regression.add(1.0, 2.0, 1.0);
        }

        // Act
        let cov = regression.covariances(2.0, 1e10).unwrap();

        // Assert
        assert!((cov[[0, 0]] - 0.5).abs() < 1e-12);
        assert_eq!(cov[[1, 1]], 0.0);
        assert_eq!(
            LeastSquaresOnline::<1>::new().covariances(1.0, DEFAULT_MAX_CONDITION),
            Err(RegressionError::NoData)
        );
        assert!(matches!(
            regression.parameters(0.5),
            Err(RegressionError::InvalidMaxCondition(_))
        ));
    }

    #[test]
    // Purpose
    // -------
    // Non-finite points and invalid weights leave the accumulator untouched.
    fn invalid_points_are_ignored() {
        let mut regression = LeastSquaresOnline::<1>::new();
        regression.add(f64::NAN, 1.0, 1.0);
        regression.add(1.0, 1.0, 0.0);
        assert_eq!(regression.count(), 0.0);
    }

    #[test]
    // Purpose
    // -------
    // Deserialization rejects a statistic of the wrong dimension.
    fn deserialize_rejects_wrong_dimension() {
        // Arrange
        let linear = LeastSquaresOnline::<1>::new();
        let json = serde_json::to_string(&linear).unwrap();

        // Act
        let as_quadratic: Result<LeastSquaresOnline<2>, _> = serde_json::from_str(&json);
        let as_linear: LeastSquaresOnline<1> = serde_json::from_str(&json).unwrap();

        // Assert
        assert!(as_quadratic.is_err());
        assert_eq!(as_linear, linear);
    }
}
