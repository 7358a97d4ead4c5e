//! Bracketed scalar solvers backed by `argmin`.
//!
//! Purpose
//! -------
//! Provide the two one-dimensional searches the priors need: locating the
//! second point of a likelihood level set (root finding) and choosing an
//! offset that maximizes the data likelihood (minimization). Both use
//! `argmin`'s Brent solvers through an adapter that turns a plain closure
//! into an `argmin` cost function.
//!
//! Conventions
//! -----------
//! - Intervals are closed and must be finite with `lower < upper`.
//! - The closure is evaluated only inside the interval.
use crate::statistics::errors::{NumericError, NumericResult};
use argmin::core::{CostFunction, Executor, State};
use argmin::solver::brent::{BrentOpt, BrentRoot};

/// Adapter exposing `Fn(f64) -> f64` as an `argmin` cost function.
struct ScalarObjective<F> {
    f: F,
}

impl<F: Fn(f64) -> f64> CostFunction for ScalarObjective<F> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, x: &f64) -> Result<f64, argmin::core::Error> {
        Ok((self.f)(*x))
    }
}

fn validate_interval(lower: f64, upper: f64) -> NumericResult<()> {
    if !lower.is_finite() || !upper.is_finite() || lower >= upper {
        return Err(NumericError::InvalidInterval { lower, upper });
    }
    Ok(())
}

/// find_root — Brent root search on a sign-changing bracket.
///
/// Parameters
/// ----------
/// - `f`: continuous function on `[lower, upper]`.
/// - `lower`, `upper`: bracket with `f(lower) · f(upper) ≤ 0`.
/// - `tolerance`: absolute tolerance on the root location.
/// - `max_iters`: iteration cap passed to the executor.
///
/// Returns
/// -------
/// `NumericResult<f64>`
///   The root estimate. An end point is returned directly when `f` vanishes
///   there.
///
/// Errors
/// ------
/// - `NumericError::InvalidInterval` for a malformed interval.
/// - `NumericError::NonFiniteValue` if `f` is not finite at an end point.
/// - `NumericError::RootNotBracketed` when there is no sign change.
/// - `NumericError::Solver` if the executor fails.
pub fn find_root<F: Fn(f64) -> f64>(
    f: F, lower: f64, upper: f64, tolerance: f64, max_iters: u64,
) -> NumericResult<f64> {
    validate_interval(lower, upper)?;
    let (fl, fu) = (f(lower), f(upper));
    for (at, value) in [(lower, fl), (upper, fu)] {
        if !value.is_finite() {
            return Err(NumericError::NonFiniteValue { at, value });
        }
    }
    if fl == 0.0 {
        return Ok(lower);
    }
    if fu == 0.0 {
        return Ok(upper);
    }
    if fl.signum() == fu.signum() {
        return Err(NumericError::RootNotBracketed { lower, upper });
    }

    let solver = BrentRoot::new(lower, upper, tolerance);
    let result = Executor::new(ScalarObjective { f }, solver)
        .configure(|state| state.max_iters(max_iters))
        .run()?;
    result
        .state()
        .get_param()
        .copied()
        .ok_or_else(|| NumericError::Solver("root search returned no parameter".to_string()))
}

/// minimize — Brent minimization of a unimodal function on an interval.
///
/// Returns
/// -------
/// `NumericResult<(f64, f64)>`
///   The minimizing argument and the objective value there.
///
/// Errors
/// ------
/// - `NumericError::InvalidInterval` for a malformed interval.
/// - `NumericError::Solver` if the executor fails or yields no parameter.
pub fn minimize<F: Fn(f64) -> f64>(
    f: F, lower: f64, upper: f64, max_iters: u64,
) -> NumericResult<(f64, f64)> {
    validate_interval(lower, upper)?;
    let solver = BrentOpt::new(lower, upper);
    let result = Executor::new(ScalarObjective { f }, solver)
        .configure(|state| state.max_iters(max_iters))
        .run()?;
    let state = result.state();
    let x = state
        .get_best_param()
        .copied()
        .ok_or_else(|| NumericError::Solver("minimization returned no parameter".to_string()))?;
    Ok((x, state.get_best_cost()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // Closed-form root and minimum locations; bracket validation.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // The root of x² − 2 on [0, 2] is √2.
    fn root_of_quadratic() {
        // Act
        let root = find_root(|x| x * x - 2.0, 0.0, 2.0, 1e-12, 100).expect("bracketed root");

        // Assert
        assert!((root - 2f64.sqrt()).abs() < 1e-8, "root = {root}");
    }

    #[test]
    // Purpose
    // -------
    // An interval without a sign change is rejected before running argmin.
    fn unbracketed_root_is_an_error() {
        let err = find_root(|x| x * x + 1.0, -1.0, 1.0, 1e-12, 100).unwrap_err();
        assert_eq!(err, NumericError::RootNotBracketed { lower: -1.0, upper: 1.0 });
    }

    #[test]
    // Purpose
    // -------
    // Brent minimization recovers the vertex of a parabola.
    fn minimum_of_parabola() {
        // Act
        let (x, fx) = minimize(|x| (x - 0.3) * (x - 0.3) + 1.0, -2.0, 2.0, 200).expect("minimum");

        // Assert
        assert!((x - 0.3).abs() < 1e-4, "x = {x}");
        assert!((fx - 1.0).abs() < 1e-8);
    }

    #[test]
    // Purpose
    // -------
    // Reversed intervals are invalid.
    fn reversed_interval_is_invalid() {
        assert!(matches!(
            minimize(|x| x, 1.0, 0.0, 10),
            Err(NumericError::InvalidInterval { .. })
        ));
    }
}
