//! The prior contract and the value types that flow through it.
//!
//! Purpose
//! -------
//! Define [`Prior`], the object-safe interface every distribution family
//! implements, together with the small types its operations exchange:
//! per-sample weights, floating-point status flags, likelihood outcomes,
//! c.d.f. bounds and tail probabilities.
//!
//! Key behaviors
//! -------------
//! - Composite priors (multimodal, model selection) own their children as
//!   `Box<dyn Prior>` and talk to them only through this trait.
//! - Queries never fail loudly. Likelihoods come back as a
//!   [`LikelihoodOutcome`] whose status tells the caller whether the value
//!   is usable; c.d.f. and tail queries return `None` when the input is
//!   rejected.
//!
//! Conventions
//! -----------
//! - A batch is a pair of equal-length slices `(&[f64], &[SampleWeight])`.
//! - The overflow sentinel is `f64::MIN`. It is only meaningful for
//!   comparisons, never for arithmetic.
use crate::priors::state::PriorState;
use serde::{Deserialize, Serialize};

/// Kind of values a prior models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    #[default]
    Continuous,
    Discrete,
    Integer,
}

/// SampleWeight — per-sample weights of a batch.
///
/// Fields
/// ------
/// - `count`: how many observations the sample stands for. Fractional
///   counts are allowed; updating with `(x, 2)` is equivalent to updating
///   with `x` twice.
/// - `seasonal_variance_scale`: ratio of the local (seasonal) variance to
///   the average variance at the sample's time.
/// - `count_variance_scale`: extra variance scaling for aggregated counts.
///
/// All fields default to `1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleWeight {
    pub count: f64,
    pub seasonal_variance_scale: f64,
    pub count_variance_scale: f64,
}

impl Default for SampleWeight {
    fn default() -> Self {
        SampleWeight { count: 1.0, seasonal_variance_scale: 1.0, count_variance_scale: 1.0 }
    }
}

impl SampleWeight {
    /// A weight with the given count and unit variance scales.
    pub fn count(count: f64) -> Self {
        SampleWeight { count, ..Self::default() }
    }

    pub fn with_seasonal_variance_scale(self, scale: f64) -> Self {
        SampleWeight { seasonal_variance_scale: scale, ..self }
    }

    pub fn with_count_variance_scale(self, scale: f64) -> Self {
        SampleWeight { count_variance_scale: scale, ..self }
    }

    /// Combined variance multiplier applied to the sample's noise.
    pub fn variance_scale(&self) -> f64 {
        self.seasonal_variance_scale * self.count_variance_scale
    }

    /// The same variance scales with a unit count.
    pub(crate) fn unit(&self) -> Self {
        SampleWeight { count: 1.0, ..*self }
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.count.is_finite()
            && self.count >= 0.0
            && self.seasonal_variance_scale.is_finite()
            && self.seasonal_variance_scale > 0.0
            && self.count_variance_scale.is_finite()
            && self.count_variance_scale > 0.0
    }
}

/// `n` unit weights.
pub fn unit_weights(n: usize) -> Vec<SampleWeight> {
    vec![SampleWeight::default(); n]
}

/// Outcome of a floating-point computation.
///
/// - `Failed`: the value is unusable (bad input or NaN).
/// - `Overflowed`: the true value underflowed toward zero likelihood; the
///   returned value is the `f64::MIN` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatingPointStatus {
    Success,
    Failed,
    Overflowed,
}

/// A log-likelihood together with its status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LikelihoodOutcome {
    pub status: FloatingPointStatus,
    pub value: f64,
}

impl LikelihoodOutcome {
    pub fn success(value: f64) -> Self {
        LikelihoodOutcome { status: FloatingPointStatus::Success, value }
    }

    pub fn failed() -> Self {
        LikelihoodOutcome { status: FloatingPointStatus::Failed, value: 0.0 }
    }

    pub fn overflowed() -> Self {
        LikelihoodOutcome { status: FloatingPointStatus::Overflowed, value: f64::MIN }
    }

    /// Classify a raw log-likelihood: NaN fails, `-∞` (or anything at the
    /// sentinel) overflows, `+∞` fails.
    pub fn from_value(value: f64) -> Self {
        if value.is_nan() || value == f64::INFINITY {
            Self::failed()
        } else if value <= f64::MIN {
            Self::overflowed()
        } else {
            Self::success(value)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FloatingPointStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        self.status == FloatingPointStatus::Failed
    }

    pub fn is_overflowed(&self) -> bool {
        self.status == FloatingPointStatus::Overflowed
    }
}

/// Which side(s) of the distribution count as "less likely".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbabilityCalculation {
    TwoSided,
    OneSidedBelow,
    OneSidedAbove,
}

/// Tail in which a sample (or batch) lies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tail {
    #[default]
    Undetermined,
    Left,
    Right,
    Mixed,
}

impl Tail {
    /// Combine the tails of two samples of one batch.
    pub fn combine(self, other: Tail) -> Tail {
        match (self, other) {
            (Tail::Undetermined, t) | (t, Tail::Undetermined) => t,
            (a, b) if a == b => a,
            _ => Tail::Mixed,
        }
    }
}

/// Lower and upper bounds on a quantity that cannot always be computed
/// exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub fn exact(value: f64) -> Self {
        Bounds { lower: value, upper: value }
    }
}

/// Bounds on the probability of seeing samples less likely than a batch,
/// and the tail the batch falls in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TailProbability {
    pub lower: f64,
    pub upper: f64,
    pub tail: Tail,
}

/// Prior — online Bayesian distribution model.
///
/// Purpose
/// -------
/// Describe a probability model that is updated from weighted samples,
/// forgets at a configurable exponential rate, and answers likelihood, c.d.f.
/// and tail-probability queries about its marginal likelihood.
///
/// Key behaviors
/// -------------
/// - `add_samples` increments `number_samples` by the sum of the count
///   weights and updates the running minimum and maximum. Priors with
///   non-negative support shift their offset first when a sample lies
///   below `offset + offset_margin`.
/// - `propagate_forwards_by_time(t)` ages by `exp(−decay_rate · t)`.
///   Negative or non-finite `t` is logged and ignored.
/// - `joint_log_marginal_likelihood` reports failures and overflow through
///   [`LikelihoodOutcome::status`].
///
/// Invariants
/// ----------
/// - `number_samples` never decreases except through ageing or
///   `set_to_non_informative`, and is never negative.
/// - A freshly constructed prior is non-informative.
///
/// Notes
/// -----
/// - The trait is object safe; composite priors hold `Box<dyn Prior>` and
///   clone through [`Prior::clone_box`].
/// - `print` is a human-readable dump for diagnostics only.
pub trait Prior: Send + std::fmt::Debug {
    // ---- Configuration ----
    fn data_type(&self) -> DataType;
    fn set_data_type(&mut self, data_type: DataType);
    fn decay_rate(&self) -> f64;
    fn set_decay_rate(&mut self, decay_rate: f64);

    /// Margin kept between the smallest sample and the support's left end.
    fn offset_margin(&self) -> f64 {
        0.0
    }

    // ---- Capabilities ----
    fn is_non_informative(&self) -> bool;
    fn needs_offset(&self) -> bool;
    fn offset(&self) -> f64;
    fn participates_in_model_selection(&self) -> bool {
        true
    }
    /// Parameters fitted by point estimation rather than marginalized.
    fn unmarginalized_parameters(&self) -> f64 {
        0.0
    }
    fn number_samples(&self) -> f64;

    // ---- Updates ----
    fn set_to_non_informative(&mut self, offset: f64, decay_rate: f64);
    fn adjust_offset(&mut self, samples: &[f64], weights: &[SampleWeight]);
    fn add_samples(&mut self, samples: &[f64], weights: &[SampleWeight]);
    fn propagate_forwards_by_time(&mut self, time: f64);

    // ---- Marginal likelihood queries ----
    fn marginal_likelihood_support(&self) -> (f64, f64);
    fn marginal_likelihood_mean(&self) -> f64;
    /// Mean of the component nearest `value`; the plain mean for
    /// unimodal families.
    fn nearest_marginal_likelihood_mean(&self, _value: f64) -> f64 {
        self.marginal_likelihood_mean()
    }
    fn marginal_likelihood_mode(&self, weight: &SampleWeight) -> f64;
    fn marginal_likelihood_variance(&self, weight: &SampleWeight) -> f64;
    /// Central interval holding `percentage` percent of the mass.
    fn marginal_likelihood_confidence_interval(
        &self, percentage: f64, weight: &SampleWeight,
    ) -> (f64, f64);
    fn joint_log_marginal_likelihood(
        &self, samples: &[f64], weights: &[SampleWeight],
    ) -> LikelihoodOutcome;
    /// Deterministic representative samples of the marginal likelihood.
    fn sample_marginal_likelihood(&self, count: usize) -> Vec<f64>;
    /// Bounds on `−ln Π F(xᵢ)^{nᵢ}`.
    fn minus_log_joint_cdf(&self, samples: &[f64], weights: &[SampleWeight]) -> Option<Bounds>;
    /// Bounds on `−ln Π (1 − F(xᵢ))^{nᵢ}`.
    fn minus_log_joint_cdf_complement(
        &self, samples: &[f64], weights: &[SampleWeight],
    ) -> Option<Bounds>;
    fn probability_of_less_likely_samples(
        &self, calculation: ProbabilityCalculation, samples: &[f64], weights: &[SampleWeight],
    ) -> Option<TailProbability>;

    // ---- Introspection & persistence ----
    fn print(&self, indent: &str) -> String;
    fn checksum(&self, seed: u64) -> u64;
    fn clone_box(&self) -> Box<dyn Prior>;
    fn to_state(&self) -> PriorState;
}

impl Clone for Box<dyn Prior> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
