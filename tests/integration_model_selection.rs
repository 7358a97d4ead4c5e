//! Integration tests for model selection over composite priors.
//!
//! Purpose
//! -------
//! - Run a [`OneOfNPrior`] over normal, log-normal and multimodal
//!   candidates on streamed data, the way an anomaly detector feeds its
//!   residual model one observation at a time.
//!
//! Coverage
//! --------
//! - `priors::one_of_n`: evidence accumulation, the reinstatement of a
//!   candidate that starts participating mid-stream, ageing of weights.
//! - `priors::multimodal`: mode discovery inside an ensemble and the
//!   mode-count invariant after ageing.
//! - `priors::state` and `persistence`: a nested snapshot restores to an
//!   ensemble that keeps evolving identically.
//!
//! Exclusions
//! ----------
//! - Closed-form conjugate updates and c.d.f. bounds of single families,
//!   covered by unit tests.
use anomaly_core::clustering::{XMeansOnline1d, XMeansOptions};
use anomaly_core::persistence::{prior_from_json, prior_to_json};
use anomaly_core::priors::{
    unit_weights, DataType, LogNormalMeanPrecConjugate, MultimodalPrior, NormalMeanPrecConjugate,
    OneOfNPrior, Prior, ProbabilityCalculation, Tail,
};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use statrs::distribution::Normal;

const MULTIMODAL: usize = 2;

fn multimodal(decay_rate: f64) -> MultimodalPrior {
    let clusterer = Box::new(XMeansOnline1d::new(XMeansOptions::default(), decay_rate));
    let seed = Box::new(NormalMeanPrecConjugate::non_informative(DataType::Continuous, decay_rate));
    MultimodalPrior::new(DataType::Continuous, clusterer, seed, decay_rate)
}

/// Normal, log-normal and multimodal candidates with equal weights.
fn ensemble(decay_rate: f64) -> OneOfNPrior {
    let models: Vec<Box<dyn Prior>> = vec![
        Box::new(NormalMeanPrecConjugate::non_informative(DataType::Continuous, decay_rate)),
        Box::new(LogNormalMeanPrecConjugate::non_informative(DataType::Continuous, 0.0, decay_rate)),
        Box::new(multimodal(decay_rate)),
    ];
    OneOfNPrior::new(models, DataType::Continuous, decay_rate).expect("non-empty candidate list")
}

/// `n` values each from N(5, 1) and N(40, 2), interleaved.
fn bimodal(seed: u64, n: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let low = Normal::new(5.0, 1.0).expect("valid normal");
    let high = Normal::new(40.0, 2.0).expect("valid normal");
    (0..n).flat_map(|_| [low.sample(&mut rng), high.sample(&mut rng)]).collect()
}

fn feed(prior: &mut dyn Prior, samples: &[f64]) {
    let weight = unit_weights(1);
    for x in samples {
        prior.add_samples(std::slice::from_ref(x), &weight);
    }
}

#[test]
// Purpose
// -------
// On clearly bimodal data the multimodal candidate starts to participate
// once it finds a second mode and then overtakes the unimodal families.
//
// Given
// -----
// - 400 values each from N(5, 1) and N(40, 2), interleaved, added one at
//   a time.
//
// Expect
// ------
// - the multimodal candidate has two modes and participates.
// - its weight exceeds 0.95 and every log weight is finite.
// - a value between the modes is far in the tails; a value at a mode is
//   not.
fn multimodal_candidate_wins_on_bimodal_data() {
    // Arrange
    let mut prior = ensemble(0.0);
    let samples = bimodal(11, 400);

    // Act
    feed(&mut prior, &samples);

    // Assert
    let models = prior.models();
    assert!(models[MULTIMODAL].participates_in_model_selection());
    let weights = prior.weights();
    assert!(weights[MULTIMODAL] > 0.95, "weights = {weights:?}");
    assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    assert!(prior.log_weights().iter().all(|w| w.is_finite()), "{}", prior.debug_weights());
    assert_eq!(prior.number_samples(), 800.0);

    let w = unit_weights(1);
    let gap = prior
        .probability_of_less_likely_samples(ProbabilityCalculation::TwoSided, &[22.0], &w)
        .expect("finite sample");
    let mode = prior
        .probability_of_less_likely_samples(ProbabilityCalculation::TwoSided, &[5.0], &w)
        .expect("finite sample");
    assert!(gap.upper < 1e-3, "gap = {gap:?}");
    assert!(mode.lower > 0.1, "mode = {mode:?}");
    assert_ne!(mode.tail, Tail::Mixed);
}

#[test]
// Purpose
// -------
// A snapshot of an ensemble with a nested multimodal candidate restores
// exactly and keeps evolving like the original.
//
// Given
// -----
// - 150 values per mode, a snapshot, then 50 more per mode fed to both.
//
// Expect
// ------
// - equal checksums and printouts at restore and after the extra data.
fn nested_snapshot_continues_identically() {
    // Arrange
    let mut original = ensemble(0.01);
    let samples = bimodal(3, 200);
    let (head, tail) = samples.split_at(300);
    feed(&mut original, head);

    // Act
    let json = prior_to_json(&original).expect("ensemble serializes");
    let mut restored = prior_from_json(&json).expect("ensemble restores");
    let at_restore = (original.checksum(17), restored.checksum(17));
    feed(&mut original, tail);
    feed(restored.as_mut(), tail);

    // Assert
    assert_eq!(at_restore.0, at_restore.1);
    assert_eq!(original.checksum(17), restored.checksum(17));
    assert_eq!(original.print(""), restored.print(""));
    assert!(json.contains(r#""kind":"Multimodal""#));
}

#[test]
// Purpose
// -------
// Ageing an ensemble keeps the counts of the nested multimodal candidate
// consistent and relaxes confident weights toward each other.
//
// Given
// -----
// - a trained ensemble with decay rate 0.2, propagated by 5 time units.
//
// Expect
// ------
// - the ensemble and the multimodal candidate age by exp(−1).
// - the multimodal candidate's modes still sum to its total.
// - the winning weight shrinks but stays the largest.
fn ageing_preserves_counts_and_relaxes_weights() {
    // Arrange
    let mut prior = ensemble(0.2);
    let mut mixture = multimodal(0.2);
    let samples = bimodal(5, 300);
    feed(&mut prior, &samples);
    feed(&mut mixture, &samples);
    let n = prior.number_samples();
    let best = prior.weights()[MULTIMODAL];

    // Act
    prior.propagate_forwards_by_time(5.0);
    mixture.propagate_forwards_by_time(5.0);

    // Assert
    let factor = (-1.0f64).exp();
    assert!((prior.number_samples() - factor * n).abs() < 1e-9 * n);
    assert!(mixture.check_invariants());
    assert_eq!(mixture.number_modes(), 2);
    let total: f64 = mixture.modes().iter().map(|m| m.prior().number_samples()).sum();
    assert!((total - mixture.number_samples()).abs() < 1e-6 * total);
    let weights = prior.weights();
    assert!(weights[MULTIMODAL] <= best + 1e-12, "weights = {weights:?}");
    let largest = weights.iter().copied().fold(f64::MIN, f64::max);
    assert_eq!(weights[MULTIMODAL], largest);
}
