//! Tradable instruments and their lazily loaded price history.

use crate::domain::error::{NoDataError, RuletraderError};
use crate::domain::financial::FinancialRecord;
use crate::domain::price_bar::{DateRange, PriceBar, PriceField};
use crate::ports::data_port::DataPort;
use std::cell::OnceCell;

#[derive(Debug, Clone)]
pub struct Security {
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub market: String,
    pub activated: bool,
    range: DateRange,
    bars: OnceCell<Vec<PriceBar>>,
    financials: OnceCell<Vec<FinancialRecord>>,
}

impl Security {
    pub fn new(symbol: &str, name: &str, sector: &str, market: &str, activated: bool) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            sector: sector.to_string(),
            market: market.to_string(),
            activated,
            range: DateRange::unbounded(),
            bars: OnceCell::new(),
            financials: OnceCell::new(),
        }
    }

    /// A security whose history is already known.
    pub fn with_bars(symbol: &str, bars: Vec<PriceBar>) -> Result<Self, RuletraderError> {
        check_order(symbol, &bars)?;
        let security = Self::new(symbol, symbol, "", "", true);
        let _ = security.bars.set(bars);
        Ok(security)
    }

    pub fn date_range(&self) -> DateRange {
        self.range
    }

    /// Bounds the history to load. Must happen before the bars are loaded.
    pub fn set_date_range(&mut self, range: DateRange) -> Result<(), RuletraderError> {
        if self.is_loaded() {
            return Err(RuletraderError::Data {
                reason: format!("{}: date range changed after bars were loaded", self.symbol),
            });
        }
        self.range = range;
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.bars.get().is_some()
    }

    /// Fetches the bars once; later calls return the cached history.
    pub fn load_bars(&self, port: &dyn DataPort) -> Result<&[PriceBar], RuletraderError> {
        if let Some(bars) = self.bars.get() {
            return Ok(bars);
        }
        let bars = port.fetch_bars(&self.symbol, &self.range)?;
        check_order(&self.symbol, &bars)?;
        Ok(self.bars.get_or_init(|| bars))
    }

    /// Fetches the annual statements once, ordered by filing date.
    pub fn load_financials(
        &self,
        port: &dyn DataPort,
    ) -> Result<&[FinancialRecord], RuletraderError> {
        if let Some(records) = self.financials.get() {
            return Ok(records);
        }
        let mut records = port.fetch_financials(&self.symbol)?;
        records.sort_by_key(|r| r.filing_date);
        Ok(self.financials.get_or_init(|| records))
    }

    /// Loaded statements, or an empty slice before loading.
    pub fn financials(&self) -> &[FinancialRecord] {
        self.financials.get().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Loaded bars, or an empty slice before loading.
    pub fn bars(&self) -> &[PriceBar] {
        self.bars.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.bars().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars().is_empty()
    }

    pub fn bar(&self, idx: usize) -> Result<&PriceBar, NoDataError> {
        self.bars().get(idx).ok_or(NoDataError)
    }

    pub fn price(&self, idx: usize, field: PriceField) -> Result<f64, NoDataError> {
        self.bar(idx).map(|b| b.price(field))
    }

    pub fn series(&self, field: PriceField) -> Vec<f64> {
        self.bars().iter().map(|b| b.price(field)).collect()
    }
}

fn check_order(symbol: &str, bars: &[PriceBar]) -> Result<(), RuletraderError> {
    if let Some(pair) = bars.windows(2).find(|w| w[0].date >= w[1].date) {
        return Err(RuletraderError::Data {
            reason: format!(
                "{symbol}: bars out of order at {} -> {}",
                pair[0].date, pair[1].date
            ),
        });
    }
    Ok(())
}

/// `idx - n`, or `NoDataError` when that would precede the first bar.
pub fn lag(idx: usize, n: usize) -> Result<usize, NoDataError> {
    idx.checked_sub(n).ok_or(NoDataError)
}
