//! statistics — shared arithmetic for the online models.
//!
//! Purpose
//! -------
//! Collect the small numerical building blocks used by every subsystem of
//! the crate: weighted moment accumulators, component checksums,
//! deterministic weighted allocation, bracketed scalar solvers and a handful
//! of numerically careful helpers (log-sum-exp, point spreading, binomial
//! coefficients).
//!
//! Key behaviors
//! -------------
//! - Provide ageable, combinable accumulators ([`MeanAccumulator`],
//!   [`MeanVarAccumulator`], [`VectorMeanAccumulator`]) that summarize
//!   weighted samples without storing them.
//! - Provide [`Checksum`], a seeded `xxh3` hash over numeric state, used to
//!   verify lossless persistence round-trips.
//! - Wrap `argmin`'s Brent solvers behind [`find_root`] and [`minimize`] so
//!   callers can pass plain closures.
//!
//! Invariants & assumptions
//! ------------------------
//! - Accumulator counts are never negative; weights that are non-finite or
//!   non-positive are ignored by the `add` methods.
//! - Solvers require a valid bracket; an unbracketed root is reported as
//!   [`NumericError::RootNotBracketed`] rather than searched for.
//!
//! Conventions
//! -----------
//! - All routines operate on `f64`; vector state uses `ndarray::Array1`.
//! - Nothing in this module logs; callers decide how to surface failures.
//!
//! Testing notes
//! -------------
//! - Unit tests live next to each submodule and cover moment updates,
//!   combination and ageing, checksum sensitivity, allocation totals and
//!   solver accuracy on closed-form problems.

pub mod accumulators;
pub mod checksum;
pub mod errors;
pub mod sampling;
pub mod solvers;
pub mod tools;

// ---- Re-exports (primary surface) ----

pub use self::accumulators::{MeanAccumulator, MeanVarAccumulator, VectorMeanAccumulator};
pub use self::checksum::Checksum;
pub use self::errors::{NumericError, NumericResult};
pub use self::sampling::{quantile_points, weighted_allocation};
pub use self::solvers::{find_root, minimize};
pub use self::tools::{binomial, log_sum_exp, spread, truncate};

pub mod prelude {
    pub use super::accumulators::{MeanAccumulator, MeanVarAccumulator, VectorMeanAccumulator};
    pub use super::checksum::Checksum;
    pub use super::errors::{NumericError, NumericResult};
}
