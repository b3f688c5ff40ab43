#![allow(dead_code)]

use chrono::NaiveDate;
use ruletrader::domain::error::RuletraderError;
use ruletrader::domain::financial::FinancialRecord;
use ruletrader::domain::price_bar::{DateRange, PriceBar};
use ruletrader::domain::security::Security;
use ruletrader::ports::data_port::DataPort;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub struct MockDataPort {
    pub securities: Vec<Security>,
    pub bars: HashMap<String, Vec<PriceBar>>,
    pub errors: HashMap<String, String>,
    pub financials: HashMap<String, Vec<FinancialRecord>>,
    /// Last set passed to `set_activated`.
    pub activated: RefCell<Option<Vec<String>>>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            securities: Vec::new(),
            bars: HashMap::new(),
            errors: HashMap::new(),
            financials: HashMap::new(),
            activated: RefCell::new(None),
        }
    }

    pub fn with_security(mut self, symbol: &str, activated: bool) -> Self {
        self.securities
            .push(Security::new(symbol, symbol, "", "TEST", activated));
        self
    }

    /// Registers `bars` for `symbol`, adding it as an activated security
    /// when it is not known yet.
    pub fn with_bars(mut self, symbol: &str, bars: Vec<PriceBar>) -> Self {
        if !self.securities.iter().any(|s| s.symbol == symbol) {
            self = self.with_security(symbol, true);
        }
        self.bars.insert(symbol.to_string(), bars);
        self
    }

    /// Annual operating cash flows as `(year, filing_date, operating_cf)`.
    pub fn with_cash_flows(mut self, symbol: &str, flows: &[(i32, NaiveDate, f64)]) -> Self {
        let records = flows
            .iter()
            .map(|&(year, filing_date, cf)| FinancialRecord {
                year,
                filing_date,
                revenue: None,
                net_income: None,
                operating_cf: Some(cf),
                investing_cf: None,
                financing_cf: None,
            })
            .collect();
        self.financials.insert(symbol.to_string(), records);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        if !self.securities.iter().any(|s| s.symbol == symbol) {
            self = self.with_security(symbol, true);
        }
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn list_securities(&self) -> Result<Vec<Security>, RuletraderError> {
        Ok(self.securities.clone())
    }

    fn fetch_bars(&self, symbol: &str, range: &DateRange) -> Result<Vec<PriceBar>, RuletraderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(RuletraderError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .bars
            .get(symbol)
            .map(|bars| bars.iter().filter(|b| range.contains(b.date)).cloned().collect())
            .unwrap_or_default())
    }

    fn fetch_financials(&self, symbol: &str) -> Result<Vec<FinancialRecord>, RuletraderError> {
        Ok(self.financials.get(symbol).cloned().unwrap_or_default())
    }

    fn set_activated(&self, symbols: &[String]) -> Result<(), RuletraderError> {
        *self.activated.borrow_mut() = Some(symbols.to_vec());
        Ok(())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: i64) -> PriceBar {
    PriceBar {
        date,
        open,
        high,
        low,
        close,
        volume,
        raw_close: None,
    }
}

/// Consecutive daily bars from 2024-01-01, one per `(open, high, low, close, volume)`.
pub fn make_bars(rows: &[(f64, f64, f64, f64, i64)]) -> Vec<PriceBar> {
    let start = date(2024, 1, 1);
    rows.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close, volume))| {
            make_bar(
                start + chrono::Duration::days(i as i64),
                open,
                high,
                low,
                close,
                volume,
            )
        })
        .collect()
}

pub fn security_with_bars(symbol: &str, rows: &[(f64, f64, f64, f64, i64)]) -> Rc<Security> {
    Rc::new(Security::with_bars(symbol, make_bars(rows)).unwrap())
}
