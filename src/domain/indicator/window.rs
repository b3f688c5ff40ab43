//! Windowed and lagged array primitives shared by every indicator.
//!
//! Missing values are `f64::NAN`. Boolean series are stored as 1.0 / 0.0.

use crate::domain::error::RuletraderError;

/// Longest window any indicator may request.
pub const MAX_SPAN: usize = 365;

pub fn check_span(span: usize) -> Result<(), RuletraderError> {
    if span == 0 {
        return Err(RuletraderError::Span {
            reason: "span must be at least 1".into(),
        });
    }
    if span > MAX_SPAN {
        return Err(RuletraderError::Span {
            reason: format!("span {span} exceeds the maximum of {MAX_SPAN}"),
        });
    }
    Ok(())
}

/// Row `i` holds the trailing `span` values ending at `i`.
///
/// The first `span - 1` rows are all NaN; when the series is shorter than
/// `span` every row is NaN.
pub fn windowed(values: &[f64], span: usize) -> Result<Vec<Vec<f64>>, RuletraderError> {
    check_span(span)?;
    let rows = values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            if i + 1 < span {
                vec![f64::NAN; span]
            } else {
                values[i + 1 - span..=i].to_vec()
            }
        })
        .collect();
    Ok(rows)
}

/// Shifts by `offset` positions; negative looks back. Exposed slots are NaN.
///
/// An offset of 0 is accepted and returns an unshifted copy.
pub fn shift(values: &[f64], offset: isize) -> Vec<f64> {
    let len = values.len() as isize;
    (0..len)
        .map(|i| {
            let src = i + offset;
            if (0..len).contains(&src) {
                values[src as usize]
            } else {
                f64::NAN
            }
        })
        .collect()
}

pub fn row_mean(row: &[f64]) -> f64 {
    if row.is_empty() {
        return f64::NAN;
    }
    row.iter().sum::<f64>() / row.len() as f64
}

/// Maximum of a row; NaN if any element is NaN.
pub fn row_max(row: &[f64]) -> f64 {
    reduce_nan(row, f64::max)
}

/// Minimum of a row; NaN if any element is NaN.
pub fn row_min(row: &[f64]) -> f64 {
    reduce_nan(row, f64::min)
}

fn reduce_nan(row: &[f64], pick: fn(f64, f64) -> f64) -> f64 {
    match row.split_first() {
        Some((first, rest)) if !row.iter().any(|v| v.is_nan()) => {
            rest.iter().copied().fold(*first, pick)
        }
        _ => f64::NAN,
    }
}

/// Truthiness of a stored value. NaN counts as true, matching array semantics.
pub fn truthy(v: f64) -> bool {
    v != 0.0
}

pub fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// Element-wise `a < b` as a boolean series; NaN compares false.
pub fn less_than(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| flag(x < y)).collect()
}

/// Element-wise `a >= b` as a boolean series; NaN compares false.
pub fn at_least(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| flag(x >= y)).collect()
}

pub fn and(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter()
        .zip(b)
        .map(|(x, y)| flag(truthy(*x) && truthy(*y)))
        .collect()
}

pub fn not(a: &[f64]) -> Vec<f64> {
    a.iter().map(|x| flag(!truthy(*x))).collect()
}
