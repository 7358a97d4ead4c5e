//! Deterministic sampling helpers.
//!
//! Purpose
//! -------
//! Sampling in the online models must be reproducible: two instances with
//! identical state have to draw identical representative points, otherwise
//! their checksums would diverge after a split or an offset search. This
//! module therefore exposes deterministic rules only.
//!
//! Key behaviors
//! -------------
//! - [`weighted_allocation`] splits an integer budget across weights with
//!   the largest-remainder rule.
//! - [`quantile_points`] evaluates a quantile function at the mid-points of
//!   `count` equal probability bins.

/// Split `total` draws across `weights` proportionally.
///
/// Each entry receives `⌊total · wᵢ / Σw⌋` draws and the remaining draws go
/// to the entries with the largest fractional parts (ties to the lower
/// index). Non-finite and negative weights count as zero.
///
/// Returns
/// -------
/// - A vector of the same length as `weights` summing to `total`, or all
///   zeros when no weight is positive.
pub fn weighted_allocation(weights: &[f64], total: usize) -> Vec<usize> {
    let clean: Vec<f64> =
        weights.iter().map(|&w| if w.is_finite() && w > 0.0 { w } else { 0.0 }).collect();
    let z: f64 = clean.iter().sum();
    let mut result = vec![0usize; clean.len()];
    if z <= 0.0 || total == 0 {
        return result;
    }

    let mut remainders: Vec<(usize, f64)> = Vec::with_capacity(clean.len());
    let mut allocated = 0usize;
    for (i, &w) in clean.iter().enumerate() {
        let exact = total as f64 * w / z;
        let whole = exact.floor() as usize;
        result[i] = whole;
        allocated += whole;
        remainders.push((i, exact - whole as f64));
    }
    remainders.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    for &(i, _) in remainders.iter().cycle().take(total.saturating_sub(allocated)) {
        result[i] += 1;
    }
    result
}

/// Evaluate `quantile` at `(i + 0.5) / count` for `i = 0..count`.
///
/// Non-finite quantiles are dropped, so the result may be shorter than
/// `count` for distributions with unbounded tails.
pub fn quantile_points<F: Fn(f64) -> f64>(count: usize, quantile: F) -> Vec<f64> {
    (0..count)
        .map(|i| quantile((i as f64 + 0.5) / count as f64))
        .filter(|x| x.is_finite())
        .collect()
}
