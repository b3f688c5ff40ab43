//! Direction, crossover and breakout series derived from other indicators.

use super::window::{and, at_least, less_than, not, shift};
use super::{DOWN, FLAT, UP};

/// Compares each value with its predecessor: UP, DOWN, FLAT, or NaN when
/// either side is missing.
pub fn direction(values: &[f64]) -> Vec<f64> {
    let prev = shift(values, -1);
    prev.iter()
        .zip(values)
        .map(|(&p, &c)| {
            if p.is_nan() || c.is_nan() {
                f64::NAN
            } else if p < c {
                UP
            } else if p > c {
                DOWN
            } else {
                FLAT
            }
        })
        .collect()
}

/// 1.0 where `a` was below `b` on the previous bar and is at or above it now.
pub fn cross_up(a: &[f64], b: &[f64]) -> Vec<f64> {
    let was_below = less_than(&shift(a, -1), &shift(b, -1));
    let now_above = at_least(a, b);
    and(&was_below, &now_above)
}

/// 1.0 where the close exceeds the previous bar's recent high.
pub fn close_above(recent_high: &[f64], close: &[f64]) -> Vec<f64> {
    less_than(&shift(recent_high, -1), close)
}

/// 1.0 where the close falls under the previous bar's recent low.
pub fn close_below(recent_low: &[f64], close: &[f64]) -> Vec<f64> {
    less_than(close, &shift(recent_low, -1))
}

/// 1.0 on the first bar of each run of true values.
pub fn first_true(values: &[f64]) -> Vec<f64> {
    and(values, &not(&shift(values, -1)))
}
