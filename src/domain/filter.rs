//! Security filters: narrow the universe before backtesting.

use crate::domain::error::RuletraderError;
use crate::domain::financial::CashFlowGrowth;
use crate::domain::params::{ParamReader, Params};
use crate::domain::price_bar::DateRange;
use crate::domain::security::Security;
use crate::ports::data_port::DataPort;
use log::debug;

pub trait Filter {
    fn key(&self) -> &'static str;

    fn apply(
        &self,
        securities: Vec<Security>,
        port: &dyn DataPort,
    ) -> Result<Vec<Security>, RuletraderError>;
}

/// Keeps every security.
#[derive(Debug, Default)]
pub struct AllPass;

impl AllPass {
    pub fn from_params(_params: &Params) -> Result<Box<dyn Filter>, RuletraderError> {
        Ok(Box::new(AllPass))
    }
}

impl Filter for AllPass {
    fn key(&self) -> &'static str {
        "all_pass"
    }

    fn apply(
        &self,
        securities: Vec<Security>,
        _port: &dyn DataPort,
    ) -> Result<Vec<Security>, RuletraderError> {
        Ok(securities)
    }
}

/// Keeps securities whose mean daily volume over their whole history reaches
/// `volume`.
#[derive(Debug)]
pub struct AverageVolume {
    volume: f64,
}

impl AverageVolume {
    pub fn new(volume: f64) -> Self {
        Self { volume }
    }

    pub fn from_params(params: &Params) -> Result<Box<dyn Filter>, RuletraderError> {
        let volume = ParamReader::new(params).usize("volume")?;
        Ok(Box::new(Self::new(volume as f64)))
    }
}

impl Filter for AverageVolume {
    fn key(&self) -> &'static str {
        "average_volume"
    }

    fn apply(
        &self,
        securities: Vec<Security>,
        port: &dyn DataPort,
    ) -> Result<Vec<Security>, RuletraderError> {
        let mut kept = Vec::new();
        for security in securities {
            let bars = port.fetch_bars(&security.symbol, &DateRange::unbounded())?;
            if bars.is_empty() {
                debug!("{}: no history, dropped", security.symbol);
                continue;
            }
            let avg = bars.iter().map(|b| b.volume as f64).sum::<f64>() / bars.len() as f64;
            debug!("{}: average volume {avg:.1}", security.symbol);
            if avg >= self.volume {
                kept.push(security);
            }
        }
        Ok(kept)
    }
}

/// Keeps securities whose annual operating cash flow grew by the required
/// rate for `years` consecutive years.
#[derive(Debug)]
pub struct OperatingCashFlowIncreasing {
    growth: CashFlowGrowth,
}

impl OperatingCashFlowIncreasing {
    pub fn new(growth: CashFlowGrowth) -> Self {
        Self { growth }
    }

    pub fn from_params(params: &Params) -> Result<Box<dyn Filter>, RuletraderError> {
        let growth = CashFlowGrowth::from_reader(&ParamReader::new(params))?;
        Ok(Box::new(Self::new(growth)))
    }
}

impl Filter for OperatingCashFlowIncreasing {
    fn key(&self) -> &'static str {
        "operating_cf_increasing"
    }

    fn apply(
        &self,
        securities: Vec<Security>,
        port: &dyn DataPort,
    ) -> Result<Vec<Security>, RuletraderError> {
        let mut kept = Vec::new();
        for security in securities {
            let records = port.fetch_financials(&security.symbol)?;
            if self.growth.streak_in(&records) {
                kept.push(security);
            } else {
                debug!("{}: operating cash flow not increasing", security.symbol);
            }
        }
        Ok(kept)
    }
}

/// Filters applied in order, each to the previous one's output.
#[derive(Default)]
pub struct FilterChain {
    pub name: String,
    filters: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    pub fn new(name: &str, filters: Vec<Box<dyn Filter>>) -> Self {
        Self {
            name: name.to_string(),
            filters,
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.key()).collect()
    }

    pub fn apply(
        &self,
        securities: Vec<Security>,
        port: &dyn DataPort,
    ) -> Result<Vec<Security>, RuletraderError> {
        self.filters.iter().try_fold(securities, |current, filter| {
            let before = current.len();
            let next = filter.apply(current, port)?;
            debug!("filter {}: {before} -> {}", filter.key(), next.len());
            Ok(next)
        })
    }
}
