//! clustering::errors — configuration errors for online clusterers.

#[cfg(feature = "python-bindings")]
use pyo3::{PyErr, exceptions::PyValueError};

pub type ClusterResult<T> = Result<T, ClusterError>;

/// ClusterError — rejected clusterer configuration.
///
/// Variants
/// --------
/// - `InvalidOption { name, value, reason }`
///   A numeric option is out of range.
/// - `SketchTooSmall(size)`
///   The centroid sketch cannot represent a two-way split.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterError {
    InvalidOption { name: &'static str, value: f64, reason: &'static str },
    SketchTooSmall(usize),
}

impl std::error::Error for ClusterError {}

impl std::fmt::Display for ClusterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterError::InvalidOption { name, value, reason } => {
                write!(f, "Invalid clusterer option {name} = {value}: {reason}")
            }
            ClusterError::SketchTooSmall(size) => {
                write!(f, "Centroid sketch needs at least 4 points, got {size}")
            }
        }
    }
}

#[cfg(feature = "python-bindings")]
impl From<ClusterError> for PyErr {
    fn from(err: ClusterError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}
