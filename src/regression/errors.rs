//! regression::errors — error types for the online least-squares fit.
//!
//! Purpose
//! -------
//! Report invalid requests made of an online regression. Numerical
//! degeneracy of the fit itself is *not* an error: an ill-conditioned
//! Gramian makes the fit fall back to a lower polynomial degree.
//!
//! Conventions
//! -----------
//! - Messages describe the violated constraint in domain terms.
//! - Under `python-bindings`, errors map to `ValueError`.

#[cfg(feature = "python-bindings")]
use pyo3::{PyErr, exceptions::PyValueError};

pub type RegressionResult<T> = Result<T, RegressionError>;

/// RegressionError — invalid requests of an online regression.
///
/// Variants
/// --------
/// - `InvalidMaxCondition(value)`
///   The maximum condition number is not finite or is below one.
/// - `InvalidVariance(value)`
///   The residual variance passed to `covariances` is negative or not
///   finite.
/// - `InvalidInterval { a, b }`
///   An averaging interval has non-finite or reversed end points.
/// - `NoData`
///   A quantity that requires at least one point was requested from an
///   empty accumulator.
#[derive(Debug, Clone, PartialEq)]
pub enum RegressionError {
    // ---- Parameter validation ----
    InvalidMaxCondition(f64),
    InvalidVariance(f64),
    InvalidInterval { a: f64, b: f64 },

    // ---- State ----
    NoData,
}

impl std::error::Error for RegressionError {}

impl std::fmt::Display for RegressionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegressionError::InvalidMaxCondition(value) => {
                write!(f, "Maximum condition number must be finite and >= 1, got {value}")
            }
            RegressionError::InvalidVariance(value) => {
                write!(f, "Residual variance must be finite and non-negative, got {value}")
            }
            RegressionError::InvalidInterval { a, b } => {
                write!(f, "Averaging interval [{a}, {b}] must be finite with a <= b")
            }
            RegressionError::NoData => write!(f, "Regression has no data"),
        }
    }
}

#[cfg(feature = "python-bindings")]
impl From<RegressionError> for PyErr {
    fn from(err: RegressionError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // Each variant's message embeds its payload.
    fn display_embeds_payload() {
        assert!(RegressionError::InvalidMaxCondition(0.5).to_string().contains("0.5"));
        assert!(RegressionError::InvalidInterval { a: 2.0, b: 1.0 }.to_string().contains("[2, 1]"));
        assert_eq!(RegressionError::NoData.to_string(), "Regression has no data");
    }
}
