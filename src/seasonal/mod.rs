//! seasonal — adaptive bucketing of periodic components.
//!
//! Purpose
//! -------
//! Represent one seasonal period as buckets whose boundaries adapt to the
//! shape of the signal, and hand the result to a spline as knots.
//!
//! Key behaviors
//! -------------
//! - [`SeasonalTime`] maps timestamps to periodic phase and to the
//!   week-scaled regression time.
//! - [`AdaptiveBucketing`] accumulates per-bucket linear regressions and
//!   residual variances, and moves bucket end points toward equal
//!   averaging error on `refine`.
//! - [`Knots`] lazily yields spline control points for a chosen
//!   [`BoundaryCondition`].
//!
//! Invariants & assumptions
//! ------------------------
//! - After any refine, end points are strictly increasing and the first and
//!   last equal the interval passed to `initialize`.
//! - Only configuration mistakes are reported as [`BucketingError`]; bad
//!   samples are logged and dropped.

pub mod bucketing;
pub mod errors;
pub mod knots;
pub mod time;

// ---- Re-exports (primary surface) ----

pub use self::bucketing::{AdaptiveBucketing, MINIMUM_AGE_TO_PREDICT, MINIMUM_DECAY_RATE};
pub use self::errors::{BucketingError, BucketingResult};
pub use self::knots::{BoundaryCondition, Knot, Knots};
pub use self::time::{SeasonalTime, DAY, WEEK};

pub mod prelude {
    pub use super::bucketing::AdaptiveBucketing;
    pub use super::errors::{BucketingError, BucketingResult};
    pub use super::knots::{BoundaryCondition, Knot};
    pub use super::time::SeasonalTime;
}
