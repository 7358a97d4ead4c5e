//! Persisted form of boxed priors.
//!
//! Composite priors own their children as `Box<dyn Prior>`, which serde
//! cannot see through. [`PriorState`] is the tagged, fully owned mirror of
//! that tree: [`Prior::to_state`] builds it and [`PriorState::restore`]
//! turns it back into live trait objects, re-checking the cross-links
//! between a multimodal prior's modes and its clusterer on the way.
use crate::clustering::traits::ClustererState;
use crate::priors::core::PriorCore;
use crate::priors::errors::PriorResult;
use crate::priors::log_normal::LogNormalMeanPrecConjugate;
use crate::priors::model_weight::LogWeight;
use crate::priors::multimodal::{MultimodalOptions, MultimodalPrior};
use crate::priors::normal::NormalMeanPrecConjugate;
use crate::priors::one_of_n::{OneOfNOptions, OneOfNPrior};
use crate::priors::traits::Prior;
use serde::{Deserialize, Serialize};

/// Serializable snapshot of any prior family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "state")]
pub enum PriorState {
    Normal(NormalMeanPrecConjugate),
    LogNormal(LogNormalMeanPrecConjugate),
    Multimodal(MultimodalState),
    OneOfN(OneOfNState),
}

impl PriorState {
    /// Rebuild the live prior.
    ///
    /// Errors
    /// ------
    /// - `PriorError::Restore` if a multimodal prior's modes do not match
    ///   its clusters, or a model-selection prior has no candidates.
    pub fn restore(self) -> PriorResult<Box<dyn Prior>> {
        Ok(match self {
            PriorState::Normal(prior) => Box::new(prior),
            PriorState::LogNormal(prior) => Box::new(prior),
            PriorState::Multimodal(state) => Box::new(MultimodalPrior::from_state(state)?),
            PriorState::OneOfN(state) => Box::new(OneOfNPrior::from_state(state)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeState {
    pub index: usize,
    pub prior: PriorState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultimodalState {
    pub core: PriorCore,
    pub options: MultimodalOptions,
    pub clusterer: ClustererState,
    pub seed: Box<PriorState>,
    pub modes: Vec<ModeState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateState {
    pub weight: LogWeight,
    pub prior: PriorState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneOfNState {
    pub core: PriorCore,
    pub options: OneOfNOptions,
    pub candidates: Vec<CandidateState>,
}
