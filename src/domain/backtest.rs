//! Backtest orchestrator.
//!
//! Walks each security's bars once, opening at most one position at a time
//! from the rule set's entry groups and closing it through its exit groups.

use crate::domain::error::{NoDataError, RuletraderError};
use crate::domain::indicator::IndicatorEngine;
use crate::domain::order::{OrderType, RuleTiming};
use crate::domain::position::Position;
use crate::domain::price_bar::DateRange;
use crate::domain::result::BacktestResult;
use crate::domain::rule_file::RuleSet;
use crate::domain::security::Security;
use crate::ports::data_port::DataPort;
use log::{debug, info, warn};
use std::rc::Rc;

pub const DEFAULT_AMOUNT_PER_TRADE: f64 = 5000.0;

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    /// Directions entry groups may open.
    pub order_types: Vec<OrderType>,
    /// Cash committed to each trade; the size is the whole number of shares
    /// it buys at the entry price.
    pub amount_per_trade: f64,
    pub date_range: DateRange,
    /// Restricts the run to these symbols (case-insensitive).
    pub symbols: Option<Vec<String>>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            order_types: OrderType::ALL.to_vec(),
            amount_per_trade: DEFAULT_AMOUNT_PER_TRADE,
            date_range: DateRange::unbounded(),
            symbols: None,
        }
    }
}

impl BacktestConfig {
    fn wants(&self, security: &Security) -> bool {
        match &self.symbols {
            Some(symbols) => symbols.iter().any(|s| s.eq_ignore_ascii_case(&security.symbol)),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct EntryPoint {
    /// Index into the rule set's entry groups.
    group: usize,
    timing: RuleTiming,
    price: f64,
}

#[derive(Debug, Clone, Copy)]
struct ExitPoint {
    group_id: usize,
    timing: RuleTiming,
    price: f64,
}

pub struct Backtester {
    rules: RuleSet,
    config: BacktestConfig,
    engine: IndicatorEngine,
    security: Option<Rc<Security>>,
    result: BacktestResult,
}

impl Backtester {
    pub fn new(rules: RuleSet, config: BacktestConfig, engine: IndicatorEngine) -> Self {
        let result = BacktestResult::new(&rules.name);
        Self {
            rules,
            config,
            engine,
            security: None,
            result,
        }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn engine(&self) -> &IndicatorEngine {
        &self.engine
    }

    pub fn result(&self) -> &BacktestResult {
        &self.result
    }

    /// Binds every rule and condition to `security`. Indicator parameter
    /// errors surface here, before any bar is processed.
    pub fn set_security(&mut self, security: Rc<Security>) -> Result<(), RuletraderError> {
        self.rules.bind_security(&security, &mut self.engine)?;
        self.security = Some(security);
        Ok(())
    }

    /// Runs the bound security through the rule set and returns the number
    /// of closed trades. A position still open after the last bar is dropped.
    pub fn run_security(&mut self) -> Result<usize, RuletraderError> {
        let security = self.security.clone().ok_or_else(|| RuletraderError::Data {
            reason: "no security bound to the backtester".into(),
        })?;
        let no_data = |index: usize| RuletraderError::NoData {
            symbol: security.symbol.clone(),
            index,
        };

        let mut position: Option<Position> = None;
        let mut trades = 0;

        for (idx, bar) in security.bars().iter().enumerate() {
            if let Some(pos) = position.as_mut() {
                let prev = idx.saturating_sub(1);
                pos.advance(&security, prev).map_err(|_| no_data(prev))?;
            }

            // Nothing trades on a day without volume.
            if bar.volume == 0 {
                continue;
            }

            if position.is_none() {
                if let Some(entry) = self.find_entry(idx) {
                    let volume = (self.config.amount_per_trade / entry.price).floor() as i64;
                    if volume == 0 || bar.volume < volume {
                        continue;
                    }
                    let group = &self.rules.entry_groups[entry.group];
                    debug!(
                        "{} {}: open {} {volume} @ {:.2} ({}, group {})",
                        security.symbol, bar.date, group.order_type, entry.price, entry.timing, group.id
                    );
                    position = Some(Position::open(
                        &security.symbol,
                        group.order_type,
                        bar.date,
                        entry.price,
                        entry.timing,
                        group.id,
                        volume,
                    ));
                }
            }

            let Some(open) = position.as_ref() else {
                continue;
            };
            let Some(exit) = self.find_exit(open, idx).map_err(|_| no_data(idx))? else {
                continue;
            };
            if let Some(mut closed) = position.take() {
                closed.close(bar.date, exit.price, exit.timing, exit.group_id)?;
                debug!(
                    "{} {}: close {} @ {:.2} ({}, group {})",
                    security.symbol, bar.date, closed.order_type, exit.price, exit.timing, exit.group_id
                );
                self.result.add(closed);
                trades += 1;
            }
        }

        if let Some(open) = position {
            debug!(
                "{}: position opened {} still open at end of history",
                security.symbol, open.entry_date
            );
        }
        Ok(trades)
    }

    /// Backtests every activated security from `port`, narrowed by the
    /// configured symbols. Securities whose history fails to load are skipped.
    pub fn run(&mut self, port: &dyn DataPort) -> Result<(), RuletraderError> {
        let selected: Vec<Security> = port
            .list_securities()?
            .into_iter()
            .filter(|s| s.activated && self.config.wants(s))
            .collect();
        if selected.is_empty() {
            return Err(RuletraderError::Data {
                reason: "no activated securities to backtest; run the filter command first".into(),
            });
        }

        let total = selected.len();
        info!("backtesting {total} securities with rule '{}'", self.rules.name);
        for (i, mut security) in selected.into_iter().enumerate() {
            security.set_date_range(self.config.date_range)?;
            if let Err(e) = security
                .load_bars(port)
                .and_then(|_| security.load_financials(port))
            {
                warn!("skipping {}: {e}", security.symbol);
                continue;
            }
            let security = Rc::new(security);
            self.set_security(Rc::clone(&security))?;
            let trades = self.run_security()?;
            info!(
                "[{}/{total}] {}: {} bars, {trades} trades",
                i + 1,
                security.symbol,
                security.len()
            );
        }
        info!(
            "finished: {} trades, indicator cache {} hits / {} misses",
            self.result.len(),
            self.engine.cache().hits(),
            self.engine.cache().misses()
        );
        Ok(())
    }

    pub fn into_result(self) -> BacktestResult {
        self.result
    }

    /// First entry that fires: groups in file order, then OPEN, SESSION, CLOSE.
    fn find_entry(&self, idx: usize) -> Option<EntryPoint> {
        for (i, group) in self.rules.entry_groups.iter().enumerate() {
            if !self.config.order_types.contains(&group.order_type) {
                continue;
            }
            if !group
                .conditions
                .iter()
                .all(|c| c.can_enter(group.order_type, idx))
            {
                continue;
            }
            for timing in RuleTiming::SLOTS {
                if !group.rule.timing_matches(timing) {
                    continue;
                }
                if let Some(price) = group.rule.price_for_entry(group.order_type, idx, timing, true) {
                    return Some(EntryPoint {
                        group: i,
                        timing,
                        price,
                    });
                }
            }
        }
        None
    }

    /// First exit that fires for `position`. Every condition of a matching
    /// group is evaluated, so missing history in any of them is reported.
    fn find_exit(&self, position: &Position, idx: usize) -> Result<Option<ExitPoint>, NoDataError> {
        for group in &self.rules.exit_groups {
            if group.order_type != position.order_type {
                continue;
            }
            let mut allowed = true;
            for cond in &group.conditions {
                allowed &= cond.can_exit(position.order_type, idx)?;
            }
            if !allowed {
                continue;
            }
            for timing in exit_slots(position) {
                if !group.rule.timing_matches(timing) {
                    continue;
                }
                if let Some(price) = group.rule.price_for_exit(position, idx, timing, true) {
                    return Ok(Some(ExitPoint {
                        group_id: group.id,
                        timing,
                        price,
                    }));
                }
            }
        }
        Ok(None)
    }
}

/// Slots an exit may use. On the entry day only slots after the entry's.
fn exit_slots(position: &Position) -> impl Iterator<Item = RuleTiming> + '_ {
    RuleTiming::SLOTS
        .into_iter()
        .filter(move |slot| position.period > 0 || *slot > position.entry_timing)
}
