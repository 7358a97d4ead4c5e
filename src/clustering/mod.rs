//! clustering — online one-dimensional clustering.
//!
//! Purpose
//! -------
//! Supply the multimodal prior with a partition of its input stream into
//! behavioural modes.
//!
//! Key behaviors
//! -------------
//! - [`Clusterer1d`] is the contract the multimodal prior depends on.
//!   Lifecycle changes come back from `add` as [`ClusterEvent`]s rather
//!   than through callbacks.
//! - [`XMeansOnline1d`] splits and merges clusters with a BIC test.
//! - [`ClustererState`] persists a boxed clusterer.

pub mod errors;
pub mod traits;
pub mod x_means;

// ---- Re-exports (primary surface) ----

pub use self::errors::{ClusterError, ClusterResult};
pub use self::traits::{ClusterEvent, ClusterUpdate, Clusterer1d, ClustererState};
pub use self::x_means::{XMeansOnline1d, XMeansOptions};

pub mod prelude {
    pub use super::traits::{ClusterEvent, Clusterer1d};
    pub use super::x_means::{XMeansOnline1d, XMeansOptions};
}
