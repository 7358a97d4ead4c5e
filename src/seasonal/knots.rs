//! Spline control points produced from a bucketing.
//!
//! Purpose
//! -------
//! Turn bucket values into the knot sequence consumed by an external spline
//! routine without allocating: [`Knots`] walks the buckets lazily and can be
//! restarted by cloning it before iteration.
//!
//! Conventions
//! -----------
//! - The first knot sits on the first endpoint and the last knot on the
//!   last endpoint. Between them every non-empty bucket contributes its
//!   midpoint, or two knots at its quarter points when it is wider than
//!   three times the average bucket width.
//! - The boundary condition decides the end values: natural and parabolic
//!   runout repeat the nearest bucket value, periodic ties both ends to the
//!   average of the first and last bucket values.
use crate::seasonal::bucketing::AdaptiveBucketing;
use serde::{Deserialize, Serialize};

/// Boundary condition of the downstream spline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryCondition {
    Natural,
    ParabolicRunout,
    Periodic,
}

/// One spline control point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Knot {
    pub position: f64,
    pub value: f64,
    pub variance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Cursor {
    Start,
    Bucket { index: usize, upper_quarter: bool },
    End,
    Done,
}

/// Knots — lazy knot sequence over an [`AdaptiveBucketing`].
#[derive(Debug, Clone)]
pub struct Knots<'a> {
    bucketing: &'a AdaptiveBucketing,
    time: i64,
    boundary: BoundaryCondition,
    wide: f64,
    first: Option<(f64, f64)>,
    last: Option<(f64, f64)>,
    cursor: Cursor,
}

impl<'a> Knots<'a> {
    pub(crate) fn new(bucketing: &'a AdaptiveBucketing, time: i64, boundary: BoundaryCondition) -> Self {
        let endpoints = bucketing.endpoints();
        let n = bucketing.size();
        let wide = if n > 0 { 3.0 * (endpoints[n] - endpoints[0]) / n as f64 } else { 0.0 };
        let first = (0..n).find(|&i| bucketing.bucket_count(i) > 0.0).map(|i| bucketing.bucket_value(i, time));
        let last = (0..n).rev().find(|&i| bucketing.bucket_count(i) > 0.0).map(|i| bucketing.bucket_value(i, time));
        Knots { bucketing, time, boundary, wide, first, last, cursor: Cursor::Start }
    }

    fn end_value(&self) -> Option<(f64, f64)> {
        match self.boundary {
            BoundaryCondition::Natural | BoundaryCondition::ParabolicRunout => self.last,
            BoundaryCondition::Periodic => {
                let (v0, s0) = self.first?;
                let (v1, s1) = self.last?;
                Some(((v0 + v1) / 2.0, (s0 + s1) / 2.0))
            }
        }
    }
}

impl Iterator for Knots<'_> {
    type Item = Knot;

    fn next(&mut self) -> Option<Knot> {
        let endpoints = self.bucketing.endpoints();
        let n = self.bucketing.size();
        loop {
            match self.cursor {
                Cursor::Start => {
                    let Some((value, variance)) = self.first else {
                        self.cursor = Cursor::Done;
                        return None;
                    };
                    let (value, variance) = match self.boundary {
                        BoundaryCondition::Periodic => self.end_value().unwrap_or((value, variance)),
                        _ => (value, variance),
                    };
                    self.cursor = Cursor::Bucket { index: 0, upper_quarter: false };
                    return Some(Knot { position: endpoints[0], value, variance });
                }
                Cursor::Bucket { index, upper_quarter } => {
                    let Some(i) = (index..n).find(|&i| self.bucketing.bucket_count(i) > 0.0) else {
                        self.cursor = Cursor::End;
                        continue;
                    };
                    let (a, b) = (endpoints[i], endpoints[i + 1]);
                    let (value, variance) = self.bucketing.bucket_value(i, self.time);
                    let position = if b - a > self.wide {
                        if upper_quarter {
                            self.cursor = Cursor::Bucket { index: i + 1, upper_quarter: false };
                            (a + 3.0 * b) / 4.0
                        } else {
                            self.cursor = Cursor::Bucket { index: i, upper_quarter: true };
                            (3.0 * a + b) / 4.0
                        }
                    } else {
                        self.cursor = Cursor::Bucket { index: i + 1, upper_quarter: false };
                        (a + b) / 2.0
                    };
                    return Some(Knot { position, value, variance });
                }
                Cursor::End => {
                    self.cursor = Cursor::Done;
                    let (value, variance) = self.end_value()?;
                    return Some(Knot { position: endpoints[n], value, variance });
                }
                Cursor::Done => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seasonal::time::SeasonalTime;

    fn bucketing_with_points(boundary_points: &[(i64, f64)]) -> AdaptiveBucketing {
        let mut bucketing = AdaptiveBucketing::new(SeasonalTime::new(0, 0, 100, 100), 0.0, 0.0).unwrap();
        bucketing.initialize(0.0, 100.0, 4).unwrap();
        for &(t, y) in boundary_points {
            bucketing.add(t, y, 1.0);
        }
        bucketing
    }

    #[test]
    // Purpose
    // -------
    // Natural boundaries repeat the outermost bucket values and empty
    // buckets contribute no knot.
    //
    // Given
    // -----
    // - 4 buckets on [0, 100), values 1, (empty), 3, 4.
    //
    // Expect
    // ------
    // - knots at 0, 12.5, 62.5, 87.5, 100 with end values 1 and 4.
    fn natural_knots_skip_empty_buckets() {
        // Arrange
        let bucketing = bucketing_with_points(&[(10, 1.0), (60, 3.0), (80, 4.0)]);

        // Act
        let knots: Vec<Knot> = bucketing.knots(0, BoundaryCondition::Natural).collect();

        // Assert
        let positions: Vec<f64> = knots.iter().map(|k| k.position).collect();
        let values: Vec<f64> = knots.iter().map(|k| k.value).collect();
        assert_eq!(positions, vec![0.0, 12.5, 62.5, 87.5, 100.0]);
        assert_eq!(values, vec![1.0, 1.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    // Purpose
    // -------
    // A bucket wider than three average widths yields two quarter-point
    // knots, and a cloned iterator restarts from the beginning.
    fn wide_bucket_yields_two_knots() {
        // Arrange
        let mut bucketing = AdaptiveBucketing::new(SeasonalTime::new(0, 0, 100, 100), 0.0, 0.0).unwrap();
        bucketing.initialize(0.0, 100.0, 4).unwrap();
        bucketing.set_endpoints_for_test(vec![0.0, 1.0, 2.0, 3.0, 100.0]);
        for t in [0, 1, 2, 50] {
            bucketing.add(t, 2.0, 1.0);
        }

        // Act
        let knots = bucketing.knots(0, BoundaryCondition::Periodic);
        let restart = knots.clone();
        let positions: Vec<f64> = knots.map(|k| k.position).collect();

        // Assert
        assert_eq!(positions, vec![0.0, 0.5, 1.5, 2.5, 27.25, 75.75, 100.0]);
        assert_eq!(restart.count(), positions.len());
    }

    #[test]
    fn uninitialized_bucketing_has_no_knots() {
        let bucketing = AdaptiveBucketing::new(SeasonalTime::new(0, 0, 100, 100), 0.0, 0.0).unwrap();
        assert_eq!(bucketing.knots(0, BoundaryCondition::Periodic).count(), 0);
    }
}
