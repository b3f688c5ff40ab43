//! Annual financial statements and operating cash flow growth checks.

use crate::domain::error::RuletraderError;
use crate::domain::params::ParamReader;
use chrono::NaiveDate;

/// One fiscal year's statement for a security. Missing figures are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct FinancialRecord {
    pub year: i32,
    /// First day the statement was public.
    pub filing_date: NaiveDate,
    pub revenue: Option<f64>,
    pub net_income: Option<f64>,
    pub operating_cf: Option<f64>,
    pub investing_cf: Option<f64>,
    pub financing_cf: Option<f64>,
}

/// Year-over-year growth required of operating cash flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CashFlowGrowth {
    /// `1 + percentage / 100`.
    pub rate: f64,
    pub years: usize,
}

impl CashFlowGrowth {
    pub fn new(percentage: f64, years: usize) -> Result<Self, RuletraderError> {
        if !percentage.is_finite() {
            return Err(RuletraderError::argument("percentage", "a finite number"));
        }
        if years == 0 {
            return Err(RuletraderError::argument("years", "at least 1"));
        }
        Ok(Self {
            rate: 1.0 + percentage * 0.01,
            years,
        })
    }

    pub fn from_reader(r: &ParamReader<'_>) -> Result<Self, RuletraderError> {
        Self::new(r.f64("percentage")?, r.usize("years")?)
    }

    fn grew(&self, current: f64, previous: f64) -> bool {
        current >= previous * self.rate
    }

    /// Each of the last `years` statements filed by `date` shows positive
    /// operating cash flow that grew on the statement before it.
    ///
    /// Fewer than `years + 1` filed statements never qualifies. A statement
    /// without an operating cash flow figure breaks the run.
    pub fn held_as_of(&self, records: &[FinancialRecord], date: NaiveDate) -> bool {
        let mut filed: Vec<&FinancialRecord> =
            records.iter().filter(|r| r.filing_date <= date).collect();
        filed.sort_by(|a, b| b.filing_date.cmp(&a.filing_date));

        let mut count = 0;
        for pair in filed.windows(2).take(self.years) {
            if let (Some(current), Some(previous)) = (pair[0].operating_cf, pair[1].operating_cf) {
                if current > 0.0 && self.grew(current, previous) {
                    count += 1;
                }
            }
        }
        count == self.years
    }

    /// Operating cash flow grew for `years` consecutive years somewhere in
    /// the history. Years without a figure are skipped.
    pub fn streak_in(&self, records: &[FinancialRecord]) -> bool {
        let mut sorted: Vec<&FinancialRecord> = records.iter().collect();
        sorted.sort_by_key(|r| r.year);
        let values: Vec<f64> = sorted.iter().filter_map(|r| r.operating_cf).collect();
        if values.len() < self.years {
            return false;
        }

        let mut streak = 0;
        for pair in values.windows(2) {
            if self.grew(pair[1], pair[0]) {
                streak += 1;
                if streak >= self.years {
                    return true;
                }
            } else {
                streak = 0;
            }
        }
        false
    }
}
