//! CSV file data adapter.
//!
//! Layout under the root directory:
//!
//! - `securities.csv`: `symbol,name,sector,market,activated`
//! - `prices/<SYMBOL>.csv`: `date,open,high,low,close,volume[,raw_close]`
//! - `financials/<SYMBOL>.csv` (optional):
//!   `year,filing_date,revenue,net_income,operating_cf,investing_cf,financing_cf`

use crate::domain::error::RuletraderError;
use crate::domain::financial::FinancialRecord;
use crate::domain::price_bar::{DateRange, PriceBar};
use crate::domain::security::Security;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;

const SECURITIES_FILE: &str = "securities.csv";
const PRICES_DIR: &str = "prices";
const FINANCIALS_DIR: &str = "financials";

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn securities_path(&self) -> PathBuf {
        self.base_path.join(SECURITIES_FILE)
    }

    fn prices_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(PRICES_DIR).join(format!("{symbol}.csv"))
    }

    fn financials_path(&self, symbol: &str) -> PathBuf {
        self.base_path
            .join(FINANCIALS_DIR)
            .join(format!("{symbol}.csv"))
    }

    fn write_securities(&self, securities: &[Security]) -> Result<(), RuletraderError> {
        let mut wtr = csv::Writer::from_path(self.securities_path())?;
        wtr.write_record(["symbol", "name", "sector", "market", "activated"])?;
        for s in securities {
            let activated = if s.activated { "true" } else { "false" };
            wtr.write_record([
                s.symbol.as_str(),
                s.name.as_str(),
                s.sector.as_str(),
                s.market.as_str(),
                activated,
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn field<'r>(record: &'r csv::StringRecord, idx: usize, name: &str) -> Result<&'r str, RuletraderError> {
    record.get(idx).map(str::trim).ok_or_else(|| RuletraderError::Data {
        reason: format!("missing {name} column"),
    })
}

fn number<T: std::str::FromStr>(
    record: &csv::StringRecord,
    idx: usize,
    name: &str,
) -> Result<T, RuletraderError>
where
    T::Err: std::fmt::Display,
{
    field(record, idx, name)?
        .parse()
        .map_err(|e| RuletraderError::Data {
            reason: format!("invalid {name} value: {e}"),
        })
}

/// Blank or absent cells are `None`.
fn optional_number(
    record: &csv::StringRecord,
    idx: usize,
    name: &str,
) -> Result<Option<f64>, RuletraderError> {
    match record.get(idx).map(str::trim) {
        Some(v) if !v.is_empty() => number(record, idx, name).map(Some),
        _ => Ok(None),
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, RuletraderError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| RuletraderError::Data {
        reason: format!("invalid date format: {e}"),
    })
}

fn parse_flag(value: &str) -> Result<bool, RuletraderError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" | "" => Ok(false),
        other => Err(RuletraderError::Data {
            reason: format!("invalid activated value: {other}"),
        }),
    }
}

impl DataPort for CsvAdapter {
    fn list_securities(&self) -> Result<Vec<Security>, RuletraderError> {
        let path = self.securities_path();
        let content = fs::read_to_string(&path).map_err(|e| RuletraderError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut securities = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let symbol = field(&record, 0, "symbol")?;
            if symbol.is_empty() {
                continue;
            }
            securities.push(Security::new(
                symbol,
                record.get(1).unwrap_or_default().trim(),
                record.get(2).unwrap_or_default().trim(),
                record.get(3).unwrap_or_default().trim(),
                parse_flag(record.get(4).unwrap_or_default().trim())?,
            ));
        }
        Ok(securities)
    }

    fn fetch_bars(&self, symbol: &str, range: &DateRange) -> Result<Vec<PriceBar>, RuletraderError> {
        let path = self.prices_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| RuletraderError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result?;

            let date = parse_date(field(&record, 0, "date")?)?;
            if !range.contains(date) {
                continue;
            }

            let raw_close = optional_number(&record, 6, "raw_close")?;

            bars.push(PriceBar {
                date,
                open: number(&record, 1, "open")?,
                high: number(&record, 2, "high")?,
                low: number(&record, 3, "low")?,
                close: number(&record, 4, "close")?,
                volume: number(&record, 5, "volume")?,
                raw_close,
            });
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    fn fetch_financials(&self, symbol: &str) -> Result<Vec<FinancialRecord>, RuletraderError> {
        let path = self.financials_path(symbol);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).map_err(|e| RuletraderError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut records = Vec::new();
        for result in rdr.records() {
            let record = result?;
            records.push(FinancialRecord {
                year: number(&record, 0, "year")?,
                filing_date: parse_date(field(&record, 1, "filing_date")?)?,
                revenue: optional_number(&record, 2, "revenue")?,
                net_income: optional_number(&record, 3, "net_income")?,
                operating_cf: optional_number(&record, 4, "operating_cf")?,
                investing_cf: optional_number(&record, 5, "investing_cf")?,
                financing_cf: optional_number(&record, 6, "financing_cf")?,
            });
        }

        records.sort_by_key(|r| r.year);
        Ok(records)
    }

    fn set_activated(&self, symbols: &[String]) -> Result<(), RuletraderError> {
        let mut securities = self.list_securities()?;
        for s in &mut securities {
            s.activated = symbols.contains(&s.symbol);
        }
        self.write_securities(&securities)
    }
}
