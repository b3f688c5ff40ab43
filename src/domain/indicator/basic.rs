//! Moving average and recent high / low.

use super::window::{row_max, row_mean, row_min, windowed};
use crate::domain::error::RuletraderError;

pub fn moving_average(values: &[f64], span: usize) -> Result<Vec<f64>, RuletraderError> {
    Ok(windowed(values, span)?.iter().map(|r| row_mean(r)).collect())
}

pub fn recent_high(values: &[f64], span: usize) -> Result<Vec<f64>, RuletraderError> {
    Ok(windowed(values, span)?.iter().map(|r| row_max(r)).collect())
}

pub fn recent_low(values: &[f64], span: usize) -> Result<Vec<f64>, RuletraderError> {
    Ok(windowed(values, span)?.iter().map(|r| row_min(r)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn moving_average_span_three() {
        let ma = moving_average(&[10.0, 20.0, 30.0, 40.0, 50.0], 3).unwrap();
        assert!(ma[0].is_nan());
        assert!(ma[1].is_nan());
        assert_relative_eq!(ma[2], 20.0);
        assert_relative_eq!(ma[3], 30.0);
        assert_relative_eq!(ma[4], 40.0);
    }

    #[test]
    fn moving_average_span_one_is_identity() {
        let values = [3.0, 1.0, 4.0];
        assert_eq!(moving_average(&values, 1).unwrap(), values.to_vec());
    }

    #[test]
    fn recent_high_and_low() {
        let values = [5.0, 9.0, 2.0, 7.0, 1.0];
        let high = recent_high(&values, 2).unwrap();
        let low = recent_low(&values, 2).unwrap();
        assert!(high[0].is_nan() && low[0].is_nan());
        assert_eq!(&high[1..], &[9.0, 9.0, 7.0, 7.0]);
        assert_eq!(&low[1..], &[5.0, 2.0, 2.0, 1.0]);
    }

    #[test]
    fn insufficient_history_is_all_nan() {
        let ma = moving_average(&[1.0, 2.0], 3).unwrap();
        assert_eq!(ma.len(), 2);
        assert!(ma.iter().all(|v| v.is_nan()));
    }
}
