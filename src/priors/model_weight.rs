//! Log-space model weights for model selection.
//!
//! Weights of competing models span hundreds of orders of magnitude after a
//! few thousand samples, so they are stored and updated as logarithms and
//! only exponentiated after normalization.
use crate::statistics::checksum::Checksum;
use crate::statistics::tools::log_sum_exp;
use serde::{Deserialize, Serialize};

/// LogWeight — a model weight stored as its natural logarithm.
///
/// Persisted values stay finite: a weight of zero is represented by a very
/// negative log weight rather than `−∞`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogWeight {
    log_weight: f64,
}

impl Default for LogWeight {
    fn default() -> Self {
        LogWeight { log_weight: 0.0 }
    }
}

impl LogWeight {
    /// From a linear weight; non-positive weights map to the floor.
    pub fn new(weight: f64) -> Self {
        let log_weight = if weight > 0.0 { weight.ln() } else { LOG_WEIGHT_FLOOR };
        LogWeight { log_weight }
    }

    pub fn from_log(log_weight: f64) -> Self {
        LogWeight { log_weight }
    }

    pub fn log_weight(&self) -> f64 {
        self.log_weight
    }

    pub fn set_log_weight(&mut self, log_weight: f64) {
        self.log_weight = log_weight;
    }

    pub fn weight(&self) -> f64 {
        self.log_weight.exp()
    }

    /// Multiply the weight by `exp(log_factor)`.
    pub fn add_log_factor(&mut self, log_factor: f64) {
        self.log_weight += log_factor;
    }

    /// Raise the weight to the power `alpha`, pulling it toward one.
    pub fn age(&mut self, alpha: f64) {
        self.log_weight *= alpha;
    }
}

impl Checksum for LogWeight {
    fn checksum(&self, seed: u64) -> u64 {
        self.log_weight.checksum(seed)
    }
}

/// Log weight standing in for a zero weight.
pub const LOG_WEIGHT_FLOOR: f64 = f64::MIN / 2.0;

/// Shift the log weights so their linear weights sum to one.
///
/// Returns `false`, leaving the weights untouched, if the normalizer is
/// not finite.
pub fn normalize(weights: &mut [LogWeight]) -> bool {
    let logs: Vec<f64> = weights.iter().map(LogWeight::log_weight).collect();
    let normalizer = log_sum_exp(&logs);
    if !normalizer.is_finite() {
        return false;
    }
    for weight in weights.iter_mut() {
        weight.log_weight = (weight.log_weight - normalizer).max(LOG_WEIGHT_FLOOR);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // Normalization handles weights far outside the range of `exp`.
    //
    // Given
    // -----
    // - log weights −2000 and −2000 + ln 3.
    //
    // Expect
    // ------
    // - linear weights 0.25 and 0.75.
    fn normalizes_extreme_log_weights() {
        // Arrange
        let mut weights = [LogWeight::from_log(-2000.0), LogWeight::from_log(-2000.0 + 3f64.ln())];

        // Act
        let ok = normalize(&mut weights);

        // Assert
        assert!(ok);
        assert!((weights[0].weight() - 0.25).abs() < 1e-12);
        assert!((weights[1].weight() - 0.75).abs() < 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Ageing by zero forgets the weight; a zero weight maps to the floor.
    fn ageing_and_zero_weight() {
        // Arrange
        let mut weight = LogWeight::new(1e-6);

        // Act
        weight.age(0.5);

        // Assert
        assert!((weight.log_weight() - 0.5 * 1e-6f64.ln()).abs() < 1e-12);
        weight.age(0.0);
        assert_eq!(weight.weight(), 1.0);
        assert_eq!(LogWeight::new(0.0).log_weight(), LOG_WEIGHT_FLOOR);
    }

    #[test]
    fn non_finite_normalizer_is_refused() {
        let mut weights = [LogWeight::from_log(f64::NAN), LogWeight::from_log(0.0)];
        assert!(!normalize(&mut weights));
        assert_eq!(weights[1].log_weight(), 0.0);
    }
}
