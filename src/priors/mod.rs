//! priors — streaming Bayesian priors over a scalar variable.
//!
//! Purpose
//! -------
//! Provide the [`Prior`] contract and the families implementing it: the
//! conjugate normal and log-normal priors, the multimodal prior that keeps
//! one child per discovered cluster, and the model-selection prior that
//! weighs competing families by their evidence.
//!
//! Key behaviors
//! -------------
//! - Every family is updated with weighted batches, forgets old data at its
//!   decay rate and answers likelihood, c.d.f. and tail queries on its
//!   marginal likelihood.
//! - Composite priors own children as `Box<dyn Prior>`; persistence goes
//!   through the tagged [`PriorState`] mirror.
//!
//! Invariants & assumptions
//! ------------------------
//! - Streaming entry points never panic or return errors on bad input:
//!   they log through `tracing` and leave the state unchanged.
//! - Persisted state restores to a prior with an identical checksum.
//!
//! Testing notes
//! -------------
//! - Each family has unit tests next to its implementation; cross-family
//!   behavior (model selection, multimodal invariants, persistence) is
//!   also covered by the integration tests under `tests/`.

pub mod core;
pub mod errors;
pub mod log_normal;
pub mod mixture;
pub mod model_weight;
pub mod multimodal;
pub mod normal;
pub mod offset;
pub mod one_of_n;
pub mod state;
pub mod traits;

// ---- Re-exports (primary surface) ----

pub use self::errors::{PriorError, PriorResult};
pub use self::log_normal::LogNormalMeanPrecConjugate;
pub use self::model_weight::LogWeight;
pub use self::multimodal::{Mode, MultimodalOptions, MultimodalPrior};
pub use self::normal::{NormalGamma, NormalMeanPrecConjugate};
pub use self::one_of_n::{OneOfNOptions, OneOfNPrior};
pub use self::state::PriorState;
pub use self::traits::{
    unit_weights, Bounds, DataType, FloatingPointStatus, LikelihoodOutcome, Prior,
    ProbabilityCalculation, SampleWeight, Tail, TailProbability,
};

pub mod prelude {
    pub use super::errors::{PriorError, PriorResult};
    pub use super::traits::{
        DataType, LikelihoodOutcome, Prior, ProbabilityCalculation, SampleWeight, Tail,
        TailProbability,
    };
    pub use super::{LogNormalMeanPrecConjugate, MultimodalPrior, NormalMeanPrecConjugate, OneOfNPrior};
}
