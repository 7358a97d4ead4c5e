//! Numerical helpers shared across the crate.
//!
//! # Provided items
//! - [`log_sum_exp`]: `ln Σ exp(xᵢ)` with the maximum factored out.
//! - [`spread`]: enforce a minimum separation between sorted points inside
//!   an interval.
//! - [`truncate`]: clamp that tolerates reversed bounds.
//! - [`binomial`]: binomial coefficient as `f64`.
use statrs::function::factorial;

/// Stable `ln Σ exp(xᵢ)`.
///
/// Returns `-∞` for an empty slice or when every term is `-∞`.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|&v| (v - max).exp()).sum::<f64>().ln()
}

/// Clamp `x` to `[lower, upper]`, returning `lower` if the bounds cross.
pub fn truncate(x: f64, lower: f64, upper: f64) -> f64 {
    if lower > upper {
        return lower;
    }
    x.max(lower).min(upper)
}

/// Binomial coefficient `(n k)`.
pub fn binomial(n: u64, k: u64) -> f64 {
    if k > n {
        return 0.0;
    }
    factorial::binomial(n, k)
}

/// Move sorted `points` the least amount needed so that consecutive points
/// are at least `separation` apart and all lie in `[lower, upper]`.
///
/// Notes
/// -----
/// - A forward sweep pushes points right, a backward sweep pulls them back
///   inside `upper`, and a final forward clamp keeps the first point inside
///   `lower`. When `(n − 1) · separation > upper − lower` the constraint is
///   infeasible and points are spaced uniformly instead.
pub fn spread(lower: f64, upper: f64, separation: f64, points: &mut [f64]) {
    let n = points.len();
    if n == 0 || separation <= 0.0 {
        return;
    }
    if (n - 1) as f64 * separation > upper - lower {
        let step = if n > 1 { (upper - lower) / (n - 1) as f64 } else { 0.0 };
        for (i, p) in points.iter_mut().enumerate() {
            *p = lower + step * i as f64;
        }
        return;
    }
    points[0] = points[0].max(lower);
    for i in 1..n {
        points[i] = points[i].max(points[i - 1] + separation);
    }
    points[n - 1] = points[n - 1].min(upper);
    for i in (0..n - 1).rev() {
        points[i] = points[i].min(points[i + 1] - separation);
    }
    points[0] = points[0].max(lower);
}
