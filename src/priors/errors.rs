//! priors::errors — construction and restore failures for priors.
//!
//! Streaming calls on a prior never fail: bad input is logged and ignored,
//! and numerical trouble is reported through
//! [`FloatingPointStatus`](crate::priors::traits::FloatingPointStatus).
//! [`PriorError`] therefore only covers mistakes made when a prior is
//! configured or rebuilt from persisted state.

#[cfg(feature = "python-bindings")]
use pyo3::{PyErr, exceptions::PyValueError};

pub type PriorResult<T> = Result<T, PriorError>;

/// PriorError — rejected prior configuration or persisted state.
///
/// Variants
/// --------
/// - `InvalidOption { name, value, reason }`
///   A numeric option of a composite prior is out of range.
/// - `NoCandidates`
///   A model-selection prior was built without any candidate models.
/// - `InvalidCandidateWeight { index, weight }`
///   A supplied candidate weight is not finite and strictly positive.
/// - `Restore(msg)`
///   Persisted state is internally inconsistent and cannot be restored.
#[derive(Debug, Clone, PartialEq)]
pub enum PriorError {
    // ---- Configuration ----
    InvalidOption { name: &'static str, value: f64, reason: &'static str },
    NoCandidates,
    InvalidCandidateWeight { index: usize, weight: f64 },

    // ---- Persistence ----
    Restore(String),
}

impl std::error::Error for PriorError {}

impl std::fmt::Display for PriorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Configuration ----
            PriorError::InvalidOption { name, value, reason } => {
                write!(f, "Invalid prior option {name} = {value}: {reason}")
            }
            PriorError::NoCandidates => {
                write!(f, "Model selection needs at least one candidate model")
            }
            PriorError::InvalidCandidateWeight { index, weight } => {
                write!(f, "Candidate {index} has invalid weight {weight}")
            }

            // ---- Persistence ----
            PriorError::Restore(msg) => write!(f, "Failed to restore prior: {msg}"),
        }
    }
}

#[cfg(feature = "python-bindings")]
impl From<PriorError> for PyErr {
    fn from(err: PriorError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}
