//! Storage collaborator port.

use crate::domain::error::RuletraderError;
use crate::domain::financial::FinancialRecord;
use crate::domain::price_bar::{DateRange, PriceBar};
use crate::domain::security::Security;

pub trait DataPort {
    /// Every known security, bars not yet loaded.
    fn list_securities(&self) -> Result<Vec<Security>, RuletraderError>;

    /// Bars for `symbol` within `range`, ordered by date.
    fn fetch_bars(&self, symbol: &str, range: &DateRange)
    -> Result<Vec<PriceBar>, RuletraderError>;

    /// Annual statements for `symbol`. Stores without statement data have none.
    fn fetch_financials(&self, _symbol: &str) -> Result<Vec<FinancialRecord>, RuletraderError> {
        Ok(Vec::new())
    }

    /// Marks exactly `symbols` as activated; every other security is deactivated.
    fn set_activated(&self, symbols: &[String]) -> Result<(), RuletraderError>;
}
