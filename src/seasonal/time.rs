//! Calendar mapping for seasonal components.
//!
//! Purpose
//! -------
//! Map absolute timestamps (seconds) onto the coordinates used by a seasonal
//! component: the phase within its repeating window, the week-scaled time
//! used as the regression abscissa, and window membership.
//!
//! Conventions
//! -----------
//! - Timestamps are `i64` seconds. A window `[window_start, window_end)` is
//!   measured from the start of the week; `period` divides the window into
//!   repeats (a daily period inside a weekday window, for example).
//! - The regression abscissa is `(t − shift) / WEEK`, where `shift` is
//!   advanced by the bucketing as time moves forward so that the regression
//!   power sums stay well conditioned.
use crate::statistics::Checksum;
use serde::{Deserialize, Serialize};

/// Seconds in a day.
pub const DAY: i64 = 86_400;
/// Seconds in a week.
pub const WEEK: i64 = 7 * DAY;

/// SeasonalTime — phase and regression-time mapping for one component.
///
/// Fields
/// ------
/// - `start_of_week`: timestamp of any week boundary.
/// - `window_start`, `window_end`: window offsets from the start of week.
/// - `period`: repeat length inside the window.
/// - `regression_shift`: origin of the regression abscissa; `None` until
///   the owning bucketing first re-centres its regressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonalTime {
    start_of_week: i64,
    window_start: i64,
    window_end: i64,
    period: i64,
    regression_shift: Option<i64>,
}

impl SeasonalTime {
    /// Build a mapping for `period` repeating inside `[window_start, window_end)`.
    ///
    /// Non-positive periods and empty windows are accepted here and make
    /// every bucketing lookup fail; the bucketing reports that on `add`.
    pub fn new(start_of_week: i64, window_start: i64, window_end: i64, period: i64) -> Self {
        SeasonalTime { start_of_week, window_start, window_end, period, regression_shift: None }
    }

    /// Phase of `time` within the repeat, in `[0, min(window, period))`.
    pub fn periodic(&self, time: i64) -> f64 {
        let repeat = self.window().min(self.period);
        if repeat <= 0 {
            return f64::NAN;
        }
        ((time - self.start_of_window(time)).rem_euclid(repeat)) as f64
    }

    /// Regression abscissa of `time` in weeks.
    pub fn regression(&self, time: i64) -> f64 {
        (time - self.regression_shift.unwrap_or(0)) as f64 / WEEK as f64
    }

    /// Start of the week containing `time`.
    pub fn start_of_week(&self, time: i64) -> i64 {
        self.start_of_week + floor_to(time - self.start_of_week, WEEK)
    }

    /// Start of the window instance at or before `time`.
    pub fn start_of_window(&self, time: i64) -> i64 {
        let offset = self.start_of_week + self.window_start;
        offset + floor_to(time - offset, WEEK)
    }

    /// Whether `time` falls inside the window of its week.
    pub fn in_window(&self, time: i64) -> bool {
        let t = time - self.start_of_week(time);
        t >= self.window_start && t < self.window_end
    }

    pub fn window(&self) -> i64 {
        self.window_end - self.window_start
    }

    pub fn window_start(&self) -> i64 {
        self.window_start
    }

    pub fn window_end(&self) -> i64 {
        self.window_end
    }

    pub fn period(&self) -> i64 {
        self.period
    }

    pub fn regression_shift(&self) -> Option<i64> {
        self.regression_shift
    }

    pub fn set_regression_shift(&mut self, shift: i64) {
        self.regression_shift = Some(shift);
    }

    /// Decay rate equivalent to `decay_rate` when moving from one period to
    /// another, so both forget the same number of repeats per unit time.
    pub fn scale_decay_rate(decay_rate: f64, from_period: i64, to_period: i64) -> f64 {
        from_period as f64 / to_period as f64 * decay_rate
    }
}

/// Largest multiple of `step` not exceeding `x`.
fn floor_to(x: i64, step: i64) -> i64 {
    x.div_euclid(step) * step
}

impl Checksum for SeasonalTime {
    fn checksum(&self, seed: u64) -> u64 {
        let seed = self.start_of_week.checksum(seed);
        let seed = self.window_start.checksum(seed);
        let seed = self.window_end.checksum(seed);
        let seed = self.period.checksum(seed);
        self.regression_shift.checksum(seed)
    }
}
