//! Property tests for online least squares.
//!
//! Purpose
//! -------
//! - Check the algebraic laws of [`LeastSquaresOnline`] on randomized,
//!   well-conditioned point sets rather than hand-picked fixtures.
//!
//! Coverage
//! --------
//! - Combination: fitting two disjoint sets and adding the accumulators
//!   gives the fit of the union.
//! - Local minimum: perturbing any fitted coefficient never lowers the
//!   weighted residual sum of squares.
//! - Translation: after `shift_abscissa(dx)` the fit evaluated at `x + dx`
//!   reproduces the original fit at `x`.
//!
//! Exclusions
//! ----------
//! - The degree ladder and serde validation, covered by unit tests.
use anomaly_core::regression::{evaluate, LeastSquaresOnline, DEFAULT_MAX_CONDITION};
use ndarray::Array1;
use proptest::prelude::*;

/// Weighted points `(x, y, w)` with `x ∈ [0, 10)`.
fn points(min: usize, max: usize) -> impl Strategy<Value = Vec<(f64, f64, f64)>> {
    prop::collection::vec((0.0..10.0f64, -100.0..100.0f64, 0.1..5.0f64), min..max)
}

fn fit<const N: usize>(points: &[(f64, f64, f64)]) -> LeastSquaresOnline<N> {
    let mut regression = LeastSquaresOnline::<N>::new();
    for &(x, y, w) in points {
        regression.add(x, y, w);
    }
    regression
}

fn residual_sum_of_squares(params: &Array1<f64>, points: &[(f64, f64, f64)]) -> f64 {
    points.iter().map(|&(x, y, w)| w * (y - evaluate(params, x)).powi(2)).sum()
}

fn close(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance * (1.0 + a.abs().max(b.abs()))
}

proptest! {
    #[test]
    fn combined_fits_match_single_fit(a in points(10, 30), b in points(10, 30)) {
        let separate = fit::<2>(&a) + fit::<2>(&b);
        let union: Vec<_> = a.iter().chain(&b).copied().collect();
        let single = fit::<2>(&union);
        prop_assume!(single.range() >= 1.0);

        prop_assert!(close(separate.count(), single.count(), 1e-12));
        let lhs = separate.parameters(DEFAULT_MAX_CONDITION).unwrap();
        let rhs = single.parameters(DEFAULT_MAX_CONDITION).unwrap();
        for (l, r) in lhs.iter().zip(rhs.iter()) {
            prop_assert!(close(*l, *r, 1e-6), "combined {lhs} vs single {rhs}");
        }
    }

    #[test]
    fn parameters_are_a_local_minimum(pts in points(8, 40)) {
        let regression = fit::<1>(&pts);
        prop_assume!(regression.range() >= 1.0);
        let params = regression.parameters(DEFAULT_MAX_CONDITION).unwrap();
        let best = residual_sum_of_squares(&params, &pts);

        for i in 0..params.len() {
            for sign in [-1.0, 1.0] {
                let mut perturbed = params.clone();
                perturbed[i] += sign * 1e-3 * (1.0 + params[i].abs());
                let rss = residual_sum_of_squares(&perturbed, &pts);
                prop_assert!(best <= rss * (1.0 + 1e-9) + 1e-9, "rss {best} > {rss}");
            }
        }
    }

    #[test]
    fn shifted_fit_is_a_translation(pts in points(10, 30), dx in -5.0..5.0f64) {
        let original = fit::<2>(&pts);
        prop_assume!(original.range() >= 1.5);
        let mut shifted = original.clone();
        shifted.shift_abscissa(dx);

        prop_assert!(close(shifted.range(), original.range(), 1e-6));
        for x in [0.0, 2.5, 5.0, 7.5, 10.0] {
            let before = original.predict(x, DEFAULT_MAX_CONDITION).unwrap();
            let after = shifted.predict(x + dx, DEFAULT_MAX_CONDITION).unwrap();
            prop_assert!(close(before, after, 1e-6), "at {x}: {before} vs {after}");
        }
    }
}
