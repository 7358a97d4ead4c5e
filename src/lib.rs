//! anomaly_core — online statistical core for streaming anomaly detection.
//!
//! Purpose
//! -------
//! Serve as the crate root for Rust callers and, behind the
//! `python-bindings` feature, as the PyO3 bridge exposing the online
//! regression and seasonal bucketing components to Python through the
//! `_anomaly_core` extension module.
//!
//! Key behaviors
//! -------------
//! - Re-export the core modules: `priors` (distribution families, the
//!   multimodal prior and model selection), `clustering` (the online 1-D
//!   clusterer behind the multimodal prior), `regression` (online weighted
//!   least squares), `seasonal` (adaptive seasonal bucketing),
//!   `statistics` (shared numerics) and `persistence` (JSON snapshots).
//! - Define `#[pyclass]` wrappers and the `#[pymodule]` initializer.
//!
//! Invariants & assumptions
//! ------------------------
//! - All numerical work lives in the inner modules; this file performs FFI
//!   glue, input validation and error mapping only.
//! - Every component is single-owner and `Send`; nothing here shares state
//!   between threads.
//!
//! Conventions
//! -----------
//! - Streaming updates (`add`, `add_samples`, `propagate_forwards_by_time`)
//!   log rejected input through `tracing` and never fail; constructors,
//!   fits and restores return the subsystem's error type, converted to
//!   `PyErr` at the Python boundary.
//! - No `tracing` subscriber is installed by the library.
//!
//! Testing notes
//! -------------
//! - Unit tests live beside each module; cross-module scenarios are under
//!   `tests/`.

pub mod clustering;
pub mod persistence;
pub mod priors;
pub mod regression;
pub mod seasonal;
pub mod statistics;
pub mod utils;

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, prelude::*, types::PyAny};

#[cfg(feature = "python-bindings")]
use crate::{
    persistence::{from_json, to_json},
    regression::{LeastSquaresOnline, DEFAULT_MAX_CONDITION},
    seasonal::{AdaptiveBucketing, SeasonalTime},
    statistics::checksum::Checksum,
    utils::{extract_values, extract_weights, parse_boundary},
};

/// OnlineRegression — Python-facing quadratic online least squares.
///
/// Purpose
/// -------
/// Expose [`LeastSquaresOnline<2>`] to Python: weighted updates, ageing,
/// coefficient extraction with the degree ladder, and JSON snapshots.
///
/// Parameters
/// ----------
/// Constructed from Python via `OnlineRegression()`.
///
/// Notes
/// -----
/// - `parameters(max_condition=None)` returns `[c0, c1, c2]`; when the
///   Gramian is ill-conditioned the leading coefficients are zero.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "anomaly_core.regression")]
pub struct OnlineRegression {
    inner: LeastSquaresOnline<2>,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl OnlineRegression {
    #[new]
    pub fn new() -> Self {
        OnlineRegression { inner: LeastSquaresOnline::new() }
    }

    /// Add points `(x, y)` with optional weights (default 1).
    #[pyo3(signature = (x, y, weights = None))]
    pub fn add<'py>(
        &mut self, py: Python<'py>, x: &Bound<'py, PyAny>, y: &Bound<'py, PyAny>,
        weights: Option<&Bound<'py, PyAny>>,
    ) -> PyResult<()> {
        let x = extract_values(py, x)?;
        let y = extract_values(py, y)?;
        let x = x.as_slice().map_err(|e| PyValueError::new_err(e.to_string()))?;
        let y = y.as_slice().map_err(|e| PyValueError::new_err(e.to_string()))?;
        if x.len() != y.len() {
            return Err(PyValueError::new_err("x and y must have the same length"));
        }
        let weights = extract_weights(py, weights, x.len())?;
        for ((&x, &y), &w) in x.iter().zip(y).zip(&weights) {
            self.inner.add(x, y, w);
        }
        Ok(())
    }

    #[pyo3(signature = (max_condition = None))]
    pub fn parameters(&self, max_condition: Option<f64>) -> PyResult<Vec<f64>> {
        let params = self.inner.parameters(max_condition.unwrap_or(DEFAULT_MAX_CONDITION))?;
        Ok(params.to_vec())
    }

    #[pyo3(signature = (x, max_condition = None))]
    pub fn predict(&self, x: f64, max_condition: Option<f64>) -> PyResult<f64> {
        Ok(self.inner.predict(x, max_condition.unwrap_or(DEFAULT_MAX_CONDITION))?)
    }

    #[pyo3(signature = (factor, mean_revert = false))]
    pub fn age(&mut self, factor: f64, mean_revert: bool) {
        self.inner.age(factor, mean_revert);
    }

    pub fn shift_abscissa(&mut self, dx: f64) {
        self.inner.shift_abscissa(dx);
    }

    #[getter]
    pub fn count(&self) -> f64 {
        self.inner.count()
    }

    #[getter]
    pub fn mean(&self) -> f64 {
        self.inner.mean()
    }

    pub fn checksum(&self, seed: u64) -> u64 {
        self.inner.checksum(seed)
    }

    pub fn to_json(&self) -> PyResult<String> {
        Ok(to_json(&self.inner)?)
    }

    #[staticmethod]
    pub fn from_json(json: &str) -> PyResult<OnlineRegression> {
        Ok(OnlineRegression { inner: from_json(json)? })
    }
}

/// SeasonalBucketing — Python-facing adaptive seasonal bucketing.
///
/// Purpose
/// -------
/// Expose [`AdaptiveBucketing`] to Python: bucket initialization, value
/// updates, ageing, boundary refinement and spline knot extraction.
///
/// Parameters
/// ----------
/// Constructed via `SeasonalBucketing(period, decay_rate=0.01,
/// minimum_bucket_length=0.0, start_of_week=0, window=None)` where
/// `window = (start, end)` restricts the seasonal component to part of the
/// week. Times are integer seconds.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "anomaly_core.seasonal")]
pub struct SeasonalBucketing {
    inner: AdaptiveBucketing,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl SeasonalBucketing {
    #[new]
    #[pyo3(signature = (period, decay_rate = 0.01, minimum_bucket_length = 0.0, start_of_week = 0, window = None))]
    pub fn new(
        period: i64, decay_rate: f64, minimum_bucket_length: f64, start_of_week: i64,
        window: Option<(i64, i64)>,
    ) -> PyResult<Self> {
        if period <= 0 {
            return Err(PyValueError::new_err("period must be positive"));
        }
        let (window_start, window_end) = window.unwrap_or((0, period));
        let time = SeasonalTime::new(start_of_week, window_start, window_end, period);
        let inner = AdaptiveBucketing::new(time, decay_rate, minimum_bucket_length)?;
        Ok(SeasonalBucketing { inner })
    }

    pub fn initialize(&mut self, start: f64, end: f64, n: usize) -> PyResult<()> {
        Ok(self.inner.initialize(start, end, n)?)
    }

    #[pyo3(signature = (time, value, weight = 1.0))]
    pub fn add(&mut self, time: i64, value: f64, weight: f64) {
        self.inner.add(time, value, weight);
    }

    #[pyo3(signature = (time, mean_revert = false))]
    pub fn propagate_forwards_by_time(&mut self, time: f64, mean_revert: bool) {
        self.inner.propagate_forwards_by_time(time, mean_revert);
    }

    pub fn refine(&mut self, time: i64) {
        self.inner.refine(time);
    }

    pub fn values(&self, time: i64) -> Vec<f64> {
        self.inner.values(time)
    }

    /// Knots `(position, value, variance)` for the spline at `time`.
    #[pyo3(signature = (time, boundary = None))]
    pub fn knots(&self, time: i64, boundary: Option<&str>) -> PyResult<Vec<(f64, f64, f64)>> {
        let boundary = parse_boundary(boundary)?;
        Ok(self.inner.knots(time, boundary).map(|k| (k.position, k.value, k.variance)).collect())
    }

    #[getter]
    pub fn endpoints(&self) -> Vec<f64> {
        self.inner.endpoints().to_vec()
    }

    #[getter]
    pub fn count(&self) -> f64 {
        self.inner.count()
    }

    pub fn checksum(&self, seed: u64) -> u64 {
        self.inner.checksum(seed)
    }

    pub fn to_json(&self) -> PyResult<String> {
        Ok(to_json(&self.inner)?)
    }

    #[staticmethod]
    pub fn from_json(json: &str) -> PyResult<SeasonalBucketing> {
        Ok(SeasonalBucketing { inner: from_json(json)? })
    }
}

#[cfg(feature = "python-bindings")]
#[pymodule]
fn _anomaly_core<'py>(_py: Python<'py>, m: &Bound<'py, PyModule>) -> PyResult<()> {
    let regression_mod = PyModule::new(_py, "regression")?;
    let seasonal_mod = PyModule::new(_py, "seasonal")?;
    regression(_py, m, &regression_mod)?;
    seasonal(_py, m, &seasonal_mod)?;

    // Manually add submodules into sys.modules to allow for dot notation.
    let modules = _py.import("sys")?.getattr("modules")?;
    modules.set_item("anomaly_core.regression", regression_mod)?;
    modules.set_item("anomaly_core.seasonal", seasonal_mod)?;
    Ok(())
}

#[cfg(feature = "python-bindings")]
fn regression<'py>(
    _py: Python, anomaly_core: &Bound<'py, PyModule>, m: &Bound<'py, PyModule>,
) -> PyResult<()> {
    m.add_class::<OnlineRegression>()?;
    anomaly_core.add_submodule(m)?;
    Ok(())
}

#[cfg(feature = "python-bindings")]
fn seasonal<'py>(
    _py: Python, anomaly_core: &Bound<'py, PyModule>, m: &Bound<'py, PyModule>,
) -> PyResult<()> {
    m.add_class::<SeasonalBucketing>()?;
    anomaly_core.add_submodule(m)?;
    Ok(())
}
