//! State and input handling shared by every prior family.
//!
//! Purpose
//! -------
//! Hold the bookkeeping common to all priors ([`PriorCore`]: data type,
//! decay rate, effective sample count, running extremes) and the input
//! checks every streaming entry point performs before touching model state.
//!
//! Key behaviors
//! -------------
//! - Batches that are empty or whose slices disagree in length are logged
//!   and rejected; non-finite samples and invalid weights are dropped with
//!   a log line.
//! - Invalid decay rates fall back to [`FALLBACK_DECAY_RATE`].
//! - Per-sample tail probabilities of a batch are combined with Fisher's
//!   method.
use crate::priors::traits::{DataType, SampleWeight, Tail, TailProbability};
use crate::statistics::checksum::Checksum;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::error;

/// Decay rate used when a supplied value is negative or not finite.
pub const FALLBACK_DECAY_RATE: f64 = 0.001;

/// Replace an unusable decay rate with [`FALLBACK_DECAY_RATE`].
pub fn sanitize_decay_rate(decay_rate: f64) -> f64 {
    if decay_rate.is_finite() && decay_rate >= 0.0 {
        decay_rate
    } else {
        error!(decay_rate, fallback = FALLBACK_DECAY_RATE, "invalid prior decay rate");
        FALLBACK_DECAY_RATE
    }
}

/// PriorCore — bookkeeping shared by all prior families.
///
/// Fields
/// ------
/// - `data_type`: continuous, discrete or integer data.
/// - `decay_rate`: forgetting rate, `≥ 0`.
/// - `number_samples`: effective (aged) sample count, `≥ 0`.
/// - `minimum`, `maximum`: extremes of every sample added, `None` until
///   the first sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorCore {
    data_type: DataType,
    decay_rate: f64,
    number_samples: f64,
    minimum: Option<f64>,
    maximum: Option<f64>,
}

impl PriorCore {
    pub fn new(data_type: DataType, decay_rate: f64) -> Self {
        PriorCore {
            data_type,
            decay_rate: sanitize_decay_rate(decay_rate),
            number_samples: 0.0,
            minimum: None,
            maximum: None,
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn set_data_type(&mut self, data_type: DataType) {
        self.data_type = data_type;
    }

    pub fn is_integer(&self) -> bool {
        self.data_type == DataType::Integer
    }

    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }

    pub fn set_decay_rate(&mut self, decay_rate: f64) {
        self.decay_rate = sanitize_decay_rate(decay_rate);
    }

    pub fn number_samples(&self) -> f64 {
        self.number_samples
    }

    pub fn set_number_samples(&mut self, number_samples: f64) {
        self.number_samples = number_samples.max(0.0);
    }

    /// Count the samples of a batch and widen the running extremes.
    pub fn add_samples(&mut self, samples: &[f64], weights: &[SampleWeight]) {
        self.number_samples += total_count(weights);
        for &x in samples {
            self.minimum = Some(self.minimum.map_or(x, |m| m.min(x)));
            self.maximum = Some(self.maximum.map_or(x, |m| m.max(x)));
        }
    }

    /// Multiply the sample count by `alpha`.
    pub fn age(&mut self, alpha: f64) {
        self.number_samples *= alpha.clamp(0.0, 1.0);
    }

    pub fn minimum(&self) -> Option<f64> {
        self.minimum
    }

    pub fn maximum(&self) -> Option<f64> {
        self.maximum
    }

    /// Forget all samples and adopt `decay_rate`. Extremes are kept.
    pub fn reset(&mut self, decay_rate: f64) {
        self.set_decay_rate(decay_rate);
        self.number_samples = 0.0;
    }

    /// `exp(−decay_rate · time)`, or `None` after logging a bad time.
    pub fn decay_factor(&self, time: f64) -> Option<f64> {
        if !time.is_finite() || time < 0.0 {
            error!(time, "bad propagation time");
            return None;
        }
        Some((-self.decay_rate * time).exp())
    }
}

impl Checksum for PriorCore {
    fn checksum(&self, seed: u64) -> u64 {
        let seed = (self.data_type as u64).checksum(seed);
        let seed = self.decay_rate.checksum(seed);
        let seed = self.number_samples.checksum(seed);
        let seed = self.minimum.checksum(seed);
        self.maximum.checksum(seed)
    }
}

/// Sum of the count weights of a batch.
pub fn total_count(weights: &[SampleWeight]) -> f64 {
    weights.iter().map(|w| w.count).sum()
}

/// Log and reject an empty batch or one with mismatched slices.
pub(crate) fn check_batch(samples: &[f64], weights: &[SampleWeight]) -> bool {
    if samples.is_empty() {
        error!("can't use an empty sample set");
        return false;
    }
    if samples.len() != weights.len() {
        error!(samples = ?samples, weights = weights.len(), "mismatch in samples and weights");
        return false;
    }
    true
}

/// Drop non-finite samples and invalid weights, logging how many went.
pub(crate) fn clean_batch(
    samples: &[f64], weights: &[SampleWeight],
) -> (Vec<f64>, Vec<SampleWeight>) {
    let (kept_samples, kept_weights): (Vec<f64>, Vec<SampleWeight>) = samples
        .iter()
        .zip(weights)
        .filter(|(x, w)| x.is_finite() && w.is_valid())
        .map(|(&x, &w)| (x, w))
        .unzip();
    if kept_samples.len() < samples.len() {
        error!(
            discarded = samples.len() - kept_samples.len(),
            samples = ?samples,
            "discarding non-finite samples or invalid weights"
        );
    }
    (kept_samples, kept_weights)
}

/// Combine per-sample tail probabilities of a batch.
///
/// Parameters
/// ----------
/// - `parts`: `(count, lower, upper, tail)` per sample.
///
/// Returns
/// -------
/// Fisher's method applied to the lower and upper bounds separately: the
/// statistic `−2 Σ nᵢ ln pᵢ` is referred to χ² with `2 Σ nᵢ` degrees of
/// freedom. A single unit-count sample reproduces its own probability.
pub(crate) fn combine_tail_probabilities(parts: &[(f64, f64, f64, Tail)]) -> TailProbability {
    let freedom: f64 = 2.0 * parts.iter().map(|p| p.0).sum::<f64>();
    let tail = parts.iter().fold(Tail::Undetermined, |acc, p| acc.combine(p.3));
    let fisher = |select: fn(&(f64, f64, f64, Tail)) -> f64| -> f64 {
        let statistic: f64 = parts
            .iter()
            .map(|p| -2.0 * p.0 * select(p).clamp(f64::MIN_POSITIVE, 1.0).ln())
            .sum();
        match ChiSquared::new(freedom) {
            Ok(chi2) if freedom > 0.0 => chi2.sf(statistic).clamp(0.0, 1.0),
            _ => 1.0,
        }
    };
    let lower = fisher(|p| p.1);
    let upper = fisher(|p| p.2);
    TailProbability { lower: lower.min(upper), upper: upper.max(lower), tail }
}
