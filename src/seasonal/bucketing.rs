//! Adaptive non-uniform bucketing of one seasonal period.
//!
//! Purpose
//! -------
//! Approximate a periodic function by piecewise values over buckets whose
//! end points move so that every bucket carries roughly the same averaging
//! error: volatile stretches of the cycle get narrow buckets, flat stretches
//! get wide ones. Each bucket holds a linear [`LeastSquaresOnline`] fit of
//! value against time, so slowly trending components are tracked within a
//! bucket, and a maximum-likelihood variance of the residuals.
//!
//! Key behaviors
//! -------------
//! - [`AdaptiveBucketing::add`] maps a timestamp to its periodic phase,
//!   finds the bucket and updates its regression and residual variance.
//! - [`AdaptiveBucketing::refine`] moves the interior end points toward an
//!   equal share of averaging error, damped by the ratio of low-pass to
//!   instantaneous boundary force, then redistributes bucket statistics in
//!   proportion to the squared overlap of old and new buckets.
//! - [`AdaptiveBucketing::knots`] exposes the buckets as spline knots.
//!
//! Invariants & assumptions
//! ------------------------
//! - Once initialized there are `n + 1` strictly increasing end points,
//!   `n` regressions and `n` variances. `refine` never moves the first or
//!   last end point.
//! - The decay rate is never below [`MINIMUM_DECAY_RATE`].
//! - Regression time is re-centred at the start of a window every
//!   `DAY / (2 · decay_rate)` seconds so power sums stay small.
//!
//! Conventions
//! -----------
//! - Time arguments are `i64` seconds; elapsed time passed to
//!   `propagate_forwards_by_time` is in the units the decay rate is
//!   expressed in.
//! - Bucket values are only extrapolated along the regression once the
//!   bucketing is at least [`MINIMUM_AGE_TO_PREDICT`] weeks old and the
//!   bucket's data span at least [`MINIMUM_RANGE_TO_PREDICT`] week;
//!   otherwise the bucket mean is used.
use crate::regression::{evaluate, LeastSquaresOnline, DEFAULT_MAX_CONDITION, MINIMUM_RANGE_TO_PREDICT};
use crate::seasonal::errors::{BucketingError, BucketingResult};
use crate::seasonal::knots::{BoundaryCondition, Knots};
use crate::seasonal::time::{SeasonalTime, DAY, WEEK};
use crate::statistics::{spread, truncate, Checksum, MeanAccumulator, MeanVarAccumulator};
use serde::{Deserialize, Serialize};
use tracing::{error, trace, warn};

/// Bucketing age, in weeks, before regressions are used to extrapolate.
pub const MINIMUM_AGE_TO_PREDICT: f64 = 2.5;
/// Lower bound applied to every decay rate.
pub const MINIMUM_DECAY_RATE: f64 = 0.001;

const RANGE_WEIGHTS: [f64; 5] = [1.0, 1.0, 1.0, 0.75, 0.5];
const SMOOTHING: [f64; 3] = [0.25, 0.5, 0.25];
const BOUNDARY_GAIN: f64 = 0.25;

type Regression = LeastSquaresOnline<1>;

/// AdaptiveBucketing — self-adjusting buckets over one seasonal period.
///
/// Fields
/// ------
/// - `time`: calendar mapping of the owning component.
/// - `initial_time`: start of the week the bucketing was seeded in, or
///   `None` if it was never seeded (treated as fully mature).
/// - `decay_rate`: forgetting rate, floored at [`MINIMUM_DECAY_RATE`].
/// - `minimum_bucket_length`: smallest permitted bucket width, `0` for none.
/// - `endpoints`, `regressions`, `variances`: per-bucket state.
/// - `lp_force`, `force`: running means of the signed and absolute boundary
///   displacement used to damp `refine`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveBucketing {
    time: SeasonalTime,
    initial_time: Option<i64>,
    decay_rate: f64,
    minimum_bucket_length: f64,
    endpoints: Vec<f64>,
    regressions: Vec<Regression>,
    variances: Vec<f64>,
    lp_force: MeanAccumulator,
    force: MeanAccumulator,
}

impl AdaptiveBucketing {
    /// Create an uninitialized bucketing.
    ///
    /// Parameters
    /// ----------
    /// - `time`: calendar mapping for the component.
    /// - `decay_rate`: forgetting rate; values below
    ///   [`MINIMUM_DECAY_RATE`] are raised to it.
    /// - `minimum_bucket_length`: smallest bucket width, `0` to disable.
    ///
    /// Errors
    /// ------
    /// - `BucketingError::InvalidDecayRate` if `decay_rate` is not finite.
    /// - `BucketingError::InvalidMinimumBucketLength` if the length is
    ///   negative or not finite.
    pub fn new(time: SeasonalTime, decay_rate: f64, minimum_bucket_length: f64) -> BucketingResult<Self> {
        if !decay_rate.is_finite() {
            return Err(BucketingError::InvalidDecayRate(decay_rate));
        }
        if !minimum_bucket_length.is_finite() || minimum_bucket_length < 0.0 {
            return Err(BucketingError::InvalidMinimumBucketLength(minimum_bucket_length));
        }
        Ok(AdaptiveBucketing {
            time,
            initial_time: None,
            decay_rate: decay_rate.max(MINIMUM_DECAY_RATE),
            minimum_bucket_length,
            endpoints: Vec::new(),
            regressions: Vec::new(),
            variances: Vec::new(),
            lp_force: MeanAccumulator::new(),
            force: MeanAccumulator::new(),
        })
    }

    /// Split `[start, end)` into `n` uniform buckets, discarding any state.
    ///
    /// With a minimum bucket length `L` the count is reduced to
    /// `⌊min(max(0.8 B, 7), B)⌋` where `B = (end − start) / L`, and `L` is
    /// capped at the interval length.
    ///
    /// Errors
    /// ------
    /// - `BucketingError::InvalidInterval` if `end <= start` or either end
    ///   is not finite.
    /// - `BucketingError::NoBuckets` if `n == 0`.
    pub fn initialize(&mut self, start: f64, end: f64, n: usize) -> BucketingResult<()> {
        if !start.is_finite() || !end.is_finite() || end <= start {
            return Err(BucketingError::InvalidInterval { start, end });
        }
        if n == 0 {
            return Err(BucketingError::NoBuckets);
        }
        let mut n = n;
        if self.minimum_bucket_length > 0.0 {
            self.minimum_bucket_length = self.minimum_bucket_length.min(end - start);
            let most = (end - start) / self.minimum_bucket_length;
            n = n.min((0.8 * most).max(7.0).min(most).floor().max(1.0) as usize);
        }
        let h = (end - start) / n as f64;
        self.endpoints = (0..=n).map(|i| start + i as f64 * h).collect();
        self.endpoints[n] = end;
        self.regressions = vec![Regression::new(); n];
        self.variances = vec![0.0; n];
        Ok(())
    }

    /// Seed the buckets from values pre-aggregated over time intervals.
    ///
    /// Each `((t0, t1), moments)` entry is split across the buckets its
    /// phase interval overlaps; a share `w` of the interval contributes the
    /// moments aged by `w²`. The bucketing age is measured from the start
    /// of the week containing `end`.
    pub fn initial_values(&mut self, start: i64, end: i64, values: &[((i64, i64), MeanVarAccumulator)]) {
        if !self.is_initialized() {
            return;
        }
        self.shift_regressions(start);
        let week = self.time.start_of_week(end);
        self.initial_time = Some(week);
        let repeat = end - start;
        if repeat <= 0 {
            if !values.is_empty() {
                error!(start, end, "initial values need a non-empty time interval");
            }
            return;
        }
        let n = self.endpoints.len();
        for &((t0, t1), moments) in values {
            let ai = self.time.periodic(t0);
            let bi = self.time.periodic(t1 - 1) + 1.0;
            if !(ai >= self.endpoints[0] && bi <= self.endpoints[n - 1]) {
                error!(ai, bi, lower = self.endpoints[0], upper = self.endpoints[n - 1], "initial value out of range");
                return;
            }
            let ka = self.endpoints.partition_point(|&e| e <= ai).max(1);
            let kb = self.endpoints.partition_point(|&e| e < bi).min(n - 1);
            let length = bi - ai;
            for k in ka..=kb {
                let (xl, xr) = (self.endpoints[k - 1], self.endpoints[k]);
                let w = (bi.min(xr) - ai.max(xl)) / length;
                if w <= 0.0 {
                    continue;
                }
                let tk = start + (week + xl as i64 - start).rem_euclid(repeat);
                let mut share = moments;
                share.age(w * w);
                if share.count() <= 0.0 {
                    continue;
                }
                let regression = &mut self.regressions[k - 1];
                let variance =
                    MeanVarAccumulator::from_moments(regression.count(), regression.mean(), self.variances[k - 1])
                        + share;
                regression.add(self.time.regression(tk), share.mean(), share.count());
                self.variances[k - 1] = variance.variance();
            }
        }
    }

    /// Add `value` observed at `time` with weight `weight`.
    ///
    /// Does nothing before `initialize`. Times whose phase falls outside
    /// the bucketed interval are logged and dropped.
    pub fn add(&mut self, time: i64, value: f64, weight: f64) {
        if !self.is_initialized() {
            return;
        }
        if !value.is_finite() || !weight.is_finite() || weight <= 0.0 {
            error!(time, value, weight, "discarding invalid seasonal sample");
            return;
        }
        let Some(i) = self.bucket(time) else {
            return;
        };
        self.shift_regressions(time);
        let t = self.time.regression(time);
        let age = self.age_at(time);
        let regression = &mut self.regressions[i];
        let mut variance =
            MeanVarAccumulator::from_moments(regression.count(), predict(regression, t, age), self.variances[i]);
        regression.add(t, value, weight);
        variance.add(value, weight);
        self.variances[i] = variance.variance();
    }

    /// Age all bucket statistics by `exp(−decay_rate · time)`.
    ///
    /// The boundary force statistics age by the square of that factor.
    pub fn propagate_forwards_by_time(&mut self, time: f64, mean_revert: bool) {
        if !time.is_finite() || time < 0.0 {
            error!(time, "can't propagate bucketing backwards in time");
            return;
        }
        if !self.is_initialized() {
            return;
        }
        let alpha = (-self.decay_rate * time).exp();
        for regression in &mut self.regressions {
            regression.age(alpha, mean_revert);
        }
        self.lp_force.age(alpha * alpha);
        self.force.age(alpha * alpha);
    }

    /// Move the interior end points toward equal averaging error.
    ///
    /// Requires every bucket to have at least one sample; otherwise this
    /// is a no-op. `time` is the time at which bucket values are predicted.
    pub fn refine(&mut self, time: i64) {
        let n = self.regressions.len();
        if n < 2 || self.regressions.iter().any(|r| r.count() <= 0.0) {
            return;
        }
        let (a, b) = (self.endpoints[0], self.endpoints[n]);
        let values: Vec<f64> = (0..n).map(|i| self.bucket_value(i, time).0).collect();
        trace!(?values, "refining bucket end points");

        let ranges: Vec<f64> = (0..n)
            .map(|i| {
                let window: Vec<f64> = (0..5).map(|j| values[(n + i + j - 2) % n]).collect();
                let (imin, vmin) = extreme(&window, |x, y| x < y);
                let (imax, vmax) = extreme(&window, |x, y| x >= y);
                RANGE_WEIGHTS[imax.abs_diff(imin)] * (vmax - vmin).powf(0.75)
            })
            .collect();

        let errors: Vec<f64> = (0..n)
            .map(|i| {
                let smoothed: f64 =
                    SMOOTHING.iter().enumerate().map(|(j, s)| s * ranges[(n + i + j - 1) % n]).sum();
                smoothed * (self.endpoints[i + 1] - self.endpoints[i]) / (b - a)
            })
            .collect();
        let total: f64 = errors.iter().sum();
        let step = (1.0 - n as f64 * f64::EPSILON) * total / n as f64;

        let old = self.endpoints.clone();
        if step == 0.0 || !step.is_finite() {
            for (i, e) in self.endpoints.iter_mut().enumerate() {
                *e = a + (b - a) * i as f64 / n as f64;
            }
        } else {
            let lp = self.lp_force.mean();
            let magnitude = self.force.mean();
            let damping = if magnitude == 0.0 { 1.0 } else { lp.abs() / magnitude };
            let alpha = scale(BOUNDARY_GAIN, self.time.period()) * damping;
            let mut force = 0.0;
            let mut error = 0.0;
            let mut j = 1;
            for i in 0..n {
                if j > n {
                    break;
                }
                let (ai, h, e) = (old[i], old[i + 1] - old[i], errors[i]);
                error += e;
                let mut share = step - (error - e);
                while error >= step && j <= n {
                    let x = h * share / e;
                    self.endpoints[j] = old[j] + alpha * (ai + x - old[j]);
                    force += ai + x - old[j];
                    share += step;
                    error -= step;
                    j += 1;
                }
            }
            if self.minimum_bucket_length > 0.0 {
                spread(a, b, self.minimum_bucket_length, &mut self.endpoints);
            }
            self.endpoints[0] = a;
            self.endpoints[n] = b;
            self.lp_force.add(force, 1.0);
            self.force.add(force.abs(), 1.0);
        }

        if !self.endpoints.windows(2).all(|w| w[0] < w[1]) || self.endpoints.iter().any(|e| !e.is_finite()) {
            warn!(endpoints = ?self.endpoints, "refined end points are degenerate; keeping previous buckets");
            self.endpoints = old;
            return;
        }
        trace!(endpoints = ?self.endpoints, "refined end points");
        self.refresh(&old);
    }

    /// Lazy spline knots for the bucket values at `time`.
    pub fn knots(&self, time: i64, boundary: BoundaryCondition) -> Knots<'_> {
        Knots::new(self, time, boundary)
    }

    /// Add `dy` to every bucket value.
    pub fn shift_value(&mut self, dy: f64) {
        for regression in &mut self.regressions {
            regression.shift_ordinate(dy);
        }
    }

    /// Add a linear trend of `gradient` per week to every bucket.
    pub fn shift_slope(&mut self, gradient: f64) {
        for regression in &mut self.regressions {
            regression.shift_gradient(gradient);
        }
    }

    /// Drop the buckets; the bucketing must be initialized again.
    pub fn clear(&mut self) {
        self.endpoints = Vec::new();
        self.regressions = Vec::new();
        self.variances = Vec::new();
    }

    pub fn reset_variances(&mut self, variance: f64) {
        self.variances.iter_mut().for_each(|v| *v = variance);
    }

    pub fn is_initialized(&self) -> bool {
        !self.endpoints.is_empty()
    }

    /// Number of buckets.
    pub fn size(&self) -> usize {
        self.regressions.len()
    }

    /// Total effective sample count.
    pub fn count(&self) -> f64 {
        self.regressions.iter().map(|r| r.count()).sum()
    }

    /// Effective sample count of the bucket containing `time`.
    pub fn count_at(&self, time: i64) -> f64 {
        self.regression(time).map_or(0.0, |r| r.count())
    }

    pub fn empty_bucket_count(&self) -> usize {
        self.regressions.iter().filter(|r| r.count() == 0.0).count()
    }

    /// The regression of the bucket containing `time`, clamped to the
    /// first or last bucket when the phase is out of range.
    pub fn regression(&self, time: i64) -> Option<&LeastSquaresOnline<1>> {
        if !self.is_initialized() {
            return None;
        }
        let i = self.bucket(time).unwrap_or(0);
        self.regressions.get(i.min(self.regressions.len() - 1))
    }

    /// Bucket values predicted at `time`.
    pub fn values(&self, time: i64) -> Vec<f64> {
        (0..self.size()).map(|i| self.bucket_value(i, time).0).collect()
    }

    pub fn variances(&self) -> &[f64] {
        &self.variances
    }

    pub fn endpoints(&self) -> &[f64] {
        &self.endpoints
    }

    pub fn time(&self) -> &SeasonalTime {
        &self.time
    }

    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }

    pub fn set_decay_rate(&mut self, value: f64) {
        if !value.is_finite() {
            error!(value, "ignoring non-finite decay rate");
            return;
        }
        self.decay_rate = value.max(MINIMUM_DECAY_RATE);
    }

    pub fn minimum_bucket_length(&self) -> f64 {
        self.minimum_bucket_length
    }

    pub fn initial_time(&self) -> Option<i64> {
        self.initial_time
    }

    pub(crate) fn bucket_count(&self, i: usize) -> f64 {
        self.regressions[i].count()
    }

    /// Predicted value and residual variance of bucket `i` at `time`.
    pub(crate) fn bucket_value(&self, i: usize, time: i64) -> (f64, f64) {
        let (a, b) = (self.endpoints[i], self.endpoints[i + 1]);
        let t = self.time.regression(time + (0.5 * (a + b)) as i64);
        (predict(&self.regressions[i], t, self.age_at(time)), self.variances[i])
    }

    #[cfg(test)]
    pub(crate) fn set_endpoints_for_test(&mut self, endpoints: Vec<f64>) {
        assert_eq!(endpoints.len(), self.endpoints.len());
        self.endpoints = endpoints;
    }

    fn bucket(&self, time: i64) -> Option<usize> {
        let t = self.time.periodic(time);
        let n = self.endpoints.len();
        let i = self.endpoints.partition_point(|&e| e <= t);
        if !(t >= self.endpoints[0]) || i == n {
            error!(t, lower = self.endpoints[0], upper = self.endpoints[n - 1], "time out of bucketing range");
            return None;
        }
        Some(i - 1)
    }

    fn age_at(&self, time: i64) -> f64 {
        self.initial_time.map_or(f64::INFINITY, |t0| (time - t0) as f64 / WEEK as f64)
    }

    fn shift_regressions(&mut self, time: i64) {
        let max_regression_time = (0.5 * DAY as f64 / self.decay_rate) as i64;
        let due = match self.time.regression_shift() {
            None => true,
            Some(shift) => time >= shift.saturating_add(max_regression_time),
        };
        if due {
            let shift = self.time.start_of_window(time);
            let dx = -self.time.regression(shift);
            for regression in &mut self.regressions {
                regression.shift_abscissa(dx);
            }
            self.time.set_regression_shift(shift);
        }
    }

    /// Redistribute bucket statistics from the `old` end points onto the
    /// current ones by overlap, then give every bucket a count proportional
    /// to its width.
    fn refresh(&mut self, old: &[f64]) {
        let m = self.regressions.len();
        if m + 1 != old.len() {
            error!(endpoints = old.len(), regressions = m, "inconsistent end points and regressions");
            return;
        }
        let n = old.len();
        let mut regressions = Vec::with_capacity(m);
        let mut variances = Vec::with_capacity(m);

        for i in 1..n {
            let (lo, hi) = (self.endpoints[i - 1], self.endpoints[i]);
            let r = old.partition_point(|&e| e < hi).clamp(1, n - 1);
            let mut l = old.partition_point(|&e| e <= lo).clamp(1, r);

            let (xl, xr) = (old[l - 1], old[l]);
            if l == r {
                let w = truncate((hi - lo) / (xr - xl), 0.0, 1.0);
                regressions.push(self.regressions[l - 1].scaled(w * w));
                variances.push(self.variances[l - 1]);
                continue;
            }

            let w = truncate((xr - lo) / (xr - xl), 0.0, 1.0);
            let part = &self.regressions[l - 1];
            let mut regression = part.scaled(w);
            let mut variance = MeanVarAccumulator::from_moments(w * part.count(), part.mean(), self.variances[l - 1]);
            let mut count = w * w * part.count();
            l += 1;
            while l < r {
                let whole = &self.regressions[l - 1];
                regression += whole;
                variance += MeanVarAccumulator::from_moments(whole.count(), whole.mean(), self.variances[l - 1]);
                count += whole.count();
                l += 1;
            }
            let (xl, xr) = (old[l - 1], old[l]);
            let w = truncate((hi - xl) / (xr - xl), 0.0, 1.0);
            let part = &self.regressions[l - 1];
            regression += part.scaled(w);
            variance += MeanVarAccumulator::from_moments(w * part.count(), part.mean(), self.variances[l - 1]);
            count += w * w * part.count();

            if regression.count() > 0.0 {
                let factor = count / regression.count();
                regression.scale(factor);
            }
            regressions.push(regression);
            variances.push(variance.variance());
        }

        let per_length = regressions.iter().map(|r: &Regression| r.count()).sum::<f64>() / (old[m] - old[0]);
        for (i, regression) in regressions.iter_mut().enumerate() {
            let c = regression.count();
            if c > 0.0 {
                regression.scale(per_length * (self.endpoints[i + 1] - self.endpoints[i]) / c);
            }
        }
        self.regressions = regressions;
        self.variances = variances;
    }
}

/// Bucket value at regression time `t`: the fitted line once the bucketing
/// is old enough and the bucket's data span enough time, else the mean.
fn predict(regression: &Regression, t: f64, age: f64) -> f64 {
    if age < MINIMUM_AGE_TO_PREDICT || regression.range() < MINIMUM_RANGE_TO_PREDICT {
        return regression.mean();
    }
    match regression.parameters(DEFAULT_MAX_CONDITION) {
        Ok(params) => evaluate(&params, t),
        Err(_) => regression.mean(),
    }
}

/// Scale `x` down for periods longer than a day.
fn scale(x: f64, period: i64) -> f64 {
    x * (DAY as f64 / period as f64).min(1.0)
}

/// Position and value of the first extreme element under `better`.
fn extreme(values: &[f64], better: impl Fn(f64, f64) -> bool) -> (usize, f64) {
    values.iter().copied().enumerate().fold((0, values[0]), |best, (i, v)| if better(v, best.1) { (i, v) } else { best })
}

impl Checksum for AdaptiveBucketing {
    fn checksum(&self, seed: u64) -> u64 {
        let seed = self.time.checksum(seed);
        let seed = self.initial_time.checksum(seed);
        let seed = self.decay_rate.checksum(seed);
        let seed = self.minimum_bucket_length.checksum(seed);
        let seed = self.endpoints.checksum(seed);
        let seed = self.regressions.checksum(seed);
        let seed = self.variances.checksum(seed);
        let seed = self.lp_force.checksum(seed);
        self.force.checksum(seed)
    }
}
