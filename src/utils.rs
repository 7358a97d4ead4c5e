//! utils — PyO3 argument conversion for the Python wrappers.
//!
//! Everything here runs at the FFI boundary only: it turns loosely typed
//! Python arguments into validated Rust values and maps failures to
//! `ValueError`/`TypeError`.
#[cfg(feature = "python-bindings")]
use pyo3::{
    exceptions::{PyTypeError, PyValueError},
    prelude::*,
    types::PyAny,
};

#[cfg(feature = "python-bindings")]
use numpy::{IntoPyArray, PyArrayMethods, PyReadonlyArray1};

#[cfg(feature = "python-bindings")]
use crate::seasonal::knots::BoundaryCondition;

/// Read a 1-D float64 array from a numpy array, a pandas Series or any
/// sequence of floats, copying only when the input is not contiguous.
#[cfg(feature = "python-bindings")]
pub fn extract_values<'py>(
    py: Python<'py>, raw: &Bound<'py, PyAny>,
) -> PyResult<PyReadonlyArray1<'py, f64>> {
    if let Ok(array) = raw.extract::<PyReadonlyArray1<f64>>() {
        if array.as_slice().is_ok() {
            return Ok(array);
        }
    }
    if let Ok(series) = raw.call_method("to_numpy", (false,), None) {
        if let Ok(array) = series.extract::<PyReadonlyArray1<f64>>() {
            if array.as_slice().is_ok() {
                return Ok(array);
            }
        }
    }
    let values: Vec<f64> = raw.extract().map_err(|_| {
        PyTypeError::new_err("expected a 1-D numpy.ndarray, pandas.Series, or sequence of float64")
    })?;
    Ok(values.into_pyarray(py).readonly())
}

/// Sample weights for `n` values: all ones when `raw` is `None`, otherwise
/// an array of the same length.
#[cfg(feature = "python-bindings")]
pub fn extract_weights<'py>(
    py: Python<'py>, raw: Option<&Bound<'py, PyAny>>, n: usize,
) -> PyResult<Vec<f64>> {
    let Some(raw) = raw else {
        return Ok(vec![1.0; n]);
    };
    let array = extract_values(py, raw)?;
    let weights = array.as_slice().map_err(|e| PyValueError::new_err(e.to_string()))?;
    if weights.len() != n {
        return Err(PyValueError::new_err(format!(
            "expected {n} weights, got {}",
            weights.len()
        )));
    }
    Ok(weights.to_vec())
}

/// Parse `"natural"`, `"parabolic_runout"` or `"periodic"`.
#[cfg(feature = "python-bindings")]
pub fn parse_boundary(name: Option<&str>) -> PyResult<BoundaryCondition> {
    match name.map(|s| s.to_ascii_lowercase()) {
        None => Ok(BoundaryCondition::Periodic),
        Some(s) if s == "natural" => Ok(BoundaryCondition::Natural),
        Some(s) if s == "parabolic_runout" => Ok(BoundaryCondition::ParabolicRunout),
        Some(s) if s == "periodic" => Ok(BoundaryCondition::Periodic),
        Some(other) => Err(PyValueError::new_err(format!(
            "boundary must be 'natural', 'parabolic_runout' or 'periodic', got '{other}'"
        ))),
    }
}
