//! regression — online weighted polynomial least squares.
//!
//! Purpose
//! -------
//! Provide the sufficient-statistics regression used as a building block by
//! the seasonal bucketing and available to callers directly. A fit never
//! stores raw points; it keeps power sums that can be aged, shifted and
//! merged.
//!
//! Key behaviors
//! -------------
//! - [`LeastSquaresOnline`] accumulates `(x, y, weight)` points for a fixed
//!   degree `N` chosen at compile time.
//! - Solving degrades gracefully: an ill-conditioned system falls back to a
//!   lower degree rather than returning unstable coefficients.
//! - Request validation failures are reported as [`RegressionError`].
//!
//! Invariants & assumptions
//! ------------------------
//! - Two regressions can only be combined when they share the same degree;
//!   this is enforced by the type system.
//!
//! Downstream usage
//! ----------------
//! - `seasonal::AdaptiveBucketing` holds one `LeastSquaresOnline<1>` per
//!   bucket and re-centres them with `shift_abscissa` as time advances.

pub mod errors;
pub mod least_squares;

// ---- Re-exports (primary surface) ----

pub use self::errors::{RegressionError, RegressionResult};
pub use self::least_squares::{
    evaluate, LeastSquaresOnline, DEFAULT_MAX_CONDITION, MINIMUM_RANGE_TO_PREDICT,
};

pub mod prelude {
    pub use super::errors::{RegressionError, RegressionResult};
    pub use super::least_squares::{LeastSquaresOnline, DEFAULT_MAX_CONDITION};
}
