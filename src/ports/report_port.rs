//! Report generation port trait.

use crate::domain::error::RuletraderError;
use crate::domain::result::BacktestResult;
use std::path::Path;

/// Port for writing backtest reports into an output directory.
pub trait ReportPort {
    fn write(&self, result: &BacktestResult, output_dir: &Path) -> Result<(), RuletraderError>;
}
