//! Single-security position lifecycle.

use crate::domain::error::{NoDataError, PositionError};
use crate::domain::order::{OrderType, RuleTiming};
use crate::domain::security::Security;
use chrono::{Datelike, NaiveDate};

#[derive(Debug, Clone, PartialEq)]
pub struct ExitFill {
    pub date: NaiveDate,
    pub price: f64,
    pub timing: RuleTiming,
    /// 1-based id of the exit group that closed the position.
    pub group: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub order_type: OrderType,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub entry_timing: RuleTiming,
    /// 1-based id of the entry group that opened the position.
    pub entry_group: usize,
    pub volume: i64,
    /// Running high and low since entry; `None` until the first `advance`.
    pub high: Option<f64>,
    pub low: Option<f64>,
    /// Days advanced since entry.
    pub period: u32,
    pub exit: Option<ExitFill>,
}

impl Position {
    pub fn open(
        symbol: &str,
        order_type: OrderType,
        entry_date: NaiveDate,
        entry_price: f64,
        entry_timing: RuleTiming,
        entry_group: usize,
        volume: i64,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            order_type,
            entry_date,
            entry_price,
            entry_timing,
            entry_group,
            volume,
            high: None,
            low: None,
            period: 0,
            exit: None,
        }
    }

    /// Folds bar `idx` into the running high / low and counts one more day held.
    pub fn advance(&mut self, security: &Security, idx: usize) -> Result<(), NoDataError> {
        let bar = security.bar(idx)?;
        self.high = Some(self.high.map_or(bar.high, |h| h.max(bar.high)));
        self.low = Some(self.low.map_or(bar.low, |l| l.min(bar.low)));
        self.period += 1;
        Ok(())
    }

    pub fn close(
        &mut self,
        date: NaiveDate,
        price: f64,
        timing: RuleTiming,
        group: usize,
    ) -> Result<(), PositionError> {
        if self.exit.is_some() {
            return Err(PositionError::AlreadyClosed);
        }
        self.exit = Some(ExitFill {
            date,
            price,
            timing,
            group,
        });
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.exit.is_some()
    }

    fn exit_price(&self) -> Result<f64, PositionError> {
        self.exit
            .as_ref()
            .map(|e| e.price)
            .ok_or(PositionError::NotClosed)
    }

    /// Price move in the position's favour, per share.
    fn gain_per_share(&self) -> Result<f64, PositionError> {
        let exit = self.exit_price()?;
        Ok(match self.order_type {
            OrderType::Long => exit - self.entry_price,
            OrderType::Short => self.entry_price - exit,
        })
    }

    pub fn profit(&self) -> Result<f64, PositionError> {
        Ok(self.gain_per_share()? * self.volume as f64)
    }

    pub fn return_rate(&self) -> Result<f64, PositionError> {
        Ok(self.gain_per_share()? / self.entry_price)
    }

    pub fn exit_year(&self) -> Option<i32> {
        self.exit.as_ref().map(|e| e.date.year())
    }
}
