//! seasonal::errors — error types for adaptive seasonal bucketing.
//!
//! Only configuration mistakes are errors. Samples that fall outside the
//! bucketed interval are logged and dropped on the streaming path.

#[cfg(feature = "python-bindings")]
use pyo3::{PyErr, exceptions::PyValueError};

pub type BucketingResult<T> = Result<T, BucketingError>;

/// BucketingError — invalid configuration of an adaptive bucketing.
///
/// Variants
/// --------
/// - `InvalidInterval { start, end }`
///   The bucketed interval is empty, reversed or not finite.
/// - `NoBuckets`
///   Zero buckets were requested.
/// - `InvalidMinimumBucketLength(value)`
///   The minimum bucket length is negative or not finite.
/// - `InvalidDecayRate(value)`
///   The decay rate is not finite.
#[derive(Debug, Clone, PartialEq)]
pub enum BucketingError {
    // ---- Interval ----
    InvalidInterval { start: f64, end: f64 },
    NoBuckets,

    // ---- Construction ----
    InvalidMinimumBucketLength(f64),
    InvalidDecayRate(f64),
}

impl std::error::Error for BucketingError {}

impl std::fmt::Display for BucketingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BucketingError::InvalidInterval { start, end } => {
                write!(f, "Bucketing interval [{start}, {end}) must be finite and non-empty")
            }
            BucketingError::NoBuckets => write!(f, "Bucketing needs at least one bucket"),
            BucketingError::InvalidMinimumBucketLength(value) => {
                write!(f, "Minimum bucket length must be finite and non-negative, got {value}")
            }
            BucketingError::InvalidDecayRate(value) => {
                write!(f, "Decay rate must be finite, got {value}")
            }
        }
    }
}

#[cfg(feature = "python-bindings")]
impl From<BucketingError> for PyErr {
    fn from(err: BucketingError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}
