//! persistence — lossless JSON snapshots of model state.
//!
//! Purpose
//! -------
//! Wrap `serde_json` for every persisted component. Plain structs
//! (regressions, bucketing, conjugate priors) serialize directly; boxed
//! priors and clusterers go through their tagged state enums so a
//! snapshot can be restored without knowing the concrete family.
//!
//! Invariants & assumptions
//! ------------------------
//! - `serde_json` is built with `float_roundtrip`, so a snapshot restores
//!   bit-identical floats and the restored component's checksum equals the
//!   original's.
//! - Persisted floats are finite; components use `f64::MIN`/`f64::MAX`
//!   sentinels rather than infinities in their state.
use crate::clustering::traits::{Clusterer1d, ClustererState};
use crate::priors::errors::PriorError;
use crate::priors::state::PriorState;
use crate::priors::traits::Prior;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[cfg(feature = "python-bindings")]
use pyo3::{PyErr, exceptions::PyValueError};

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// PersistenceError — a snapshot could not be written or read back.
///
/// Variants
/// --------
/// - `Json(msg)`
///   `serde_json` rejected the value or the document.
/// - `Restore(err)`
///   The document parsed but describes an inconsistent prior.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistenceError {
    Json(String),
    Restore(PriorError),
}

impl std::error::Error for PersistenceError {}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::Json(msg) => write!(f, "JSON persistence failed: {msg}"),
            PersistenceError::Restore(err) => write!(f, "{err}"),
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Json(err.to_string())
    }
}

impl From<PriorError> for PersistenceError {
    fn from(err: PriorError) -> Self {
        PersistenceError::Restore(err)
    }
}

#[cfg(feature = "python-bindings")]
impl From<PersistenceError> for PyErr {
    fn from(err: PersistenceError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

pub fn to_json<T: Serialize>(value: &T) -> PersistenceResult<String> {
    Ok(serde_json::to_string(value)?)
}

pub fn from_json<T: DeserializeOwned>(json: &str) -> PersistenceResult<T> {
    Ok(serde_json::from_str(json)?)
}

/// Snapshot a boxed prior of any family.
pub fn prior_to_json(prior: &dyn Prior) -> PersistenceResult<String> {
    to_json(&prior.to_state())
}

/// Restore a boxed prior, re-checking composite invariants.
pub fn prior_from_json(json: &str) -> PersistenceResult<Box<dyn Prior>> {
    let state: PriorState = from_json(json)?;
    Ok(state.restore()?)
}

pub fn clusterer_to_json(clusterer: &dyn Clusterer1d) -> PersistenceResult<String> {
    to_json(&clusterer.to_state())
}

pub fn clusterer_from_json(json: &str) -> PersistenceResult<Box<dyn Clusterer1d>> {
    let state: ClustererState = from_json(json)?;
    Ok(state.restore())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priors::log_normal::LogNormalMeanPrecConjugate;
    use crate::priors::traits::{unit_weights, DataType};
    use crate::regression::LeastSquaresOnline;
    use crate::statistics::checksum::Checksum;

    #[test]
    // Purpose
    // -------
    // A boxed prior and a plain regression survive a JSON round trip with
    // identical checksums.
    fn round_trips_preserve_checksums() {
        // Arrange
        let mut prior = LogNormalMeanPrecConjugate::non_informative(DataType::Continuous, 0.0, 0.05);
        prior.add_samples(&[1.5, 2.25, 0.7, 3.1], &unit_weights(4));
        let mut regression = LeastSquaresOnline::<2>::new();
        for i in 0..20 {
            let x = i as f64 * 0.1;
            regression.add(x, 1.0 + x - 0.5 * x * x, 1.0);
        }

        // Act
        let restored = prior_from_json(&prior_to_json(&prior).unwrap()).unwrap();
        let back: LeastSquaresOnline<2> = from_json(&to_json(&regression).unwrap()).unwrap();

        // Assert
        assert_eq!(restored.checksum(3), prior.checksum(3));
        assert_eq!(back.checksum(3), regression.checksum(3));
    }

    #[test]
    // Purpose
    // -------
    // Malformed documents surface as `Json` errors.
    fn malformed_json_is_reported() {
        // Act
        let err = prior_from_json(r#"{"kind":"Gamma","state":{}}"#).unwrap_err();

        // Assert
        assert!(matches!(err, PersistenceError::Json(_)));
        assert!(err.to_string().starts_with("JSON persistence failed"));
    }
}
