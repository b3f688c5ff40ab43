//! Entry rules: price a new position once its group's conditions pass.

use super::{bound, derived, slot_price};
use crate::domain::error::{NoDataError, RuletraderError};
use crate::domain::indicator::window::check_span;
use crate::domain::indicator::{Indicator, IndicatorEngine, IndicatorKind};
use crate::domain::order::{OrderType, RuleTiming};
use crate::domain::params::{ParamReader, Params};
use crate::domain::security::{Security, lag};
use std::rc::Rc;

pub trait EntryRule {
    fn key(&self) -> &'static str;

    fn timing(&self) -> RuleTiming;

    fn security(&self) -> Option<&Rc<Security>>;

    fn bind_security(
        &mut self,
        security: &Rc<Security>,
        engine: &mut IndicatorEngine,
    ) -> Result<(), RuletraderError>;

    fn price_long(&self, idx: usize, timing: RuleTiming) -> Result<Option<f64>, NoDataError>;

    fn price_short(&self, idx: usize, timing: RuleTiming) -> Result<Option<f64>, NoDataError>;

    fn timing_matches(&self, timing: RuleTiming) -> bool {
        self.timing().matches(timing)
    }

    /// Entry price for `order_type`, or `None` when the rule does not fire.
    ///
    /// With `check_range`, a price outside the bar's [low, high] is dropped.
    fn price_for_entry(
        &self,
        order_type: OrderType,
        idx: usize,
        timing: RuleTiming,
        check_range: bool,
    ) -> Option<f64> {
        let price = match order_type {
            OrderType::Long => self.price_long(idx, timing),
            OrderType::Short => self.price_short(idx, timing),
        }
        .ok()
        .flatten()?;

        if check_range {
            let bar = self.security()?.bar(idx).ok()?;
            if !bar.in_range(price) {
                return None;
            }
        }
        Some(price)
    }
}

/// Enters at the open or the close of the bar, with no further condition.
#[derive(Debug)]
pub struct SimpleEntry {
    timing: RuleTiming,
    security: Option<Rc<Security>>,
}

impl SimpleEntry {
    pub fn new(timing: RuleTiming) -> Self {
        Self {
            timing,
            security: None,
        }
    }

    pub fn from_params(
        _params: &Params,
        timing: RuleTiming,
    ) -> Result<Box<dyn EntryRule>, RuletraderError> {
        Ok(Box::new(Self::new(timing)))
    }
}

impl EntryRule for SimpleEntry {
    fn key(&self) -> &'static str {
        "simple"
    }

    fn timing(&self) -> RuleTiming {
        self.timing
    }

    fn security(&self) -> Option<&Rc<Security>> {
        self.security.as_ref()
    }

    fn bind_security(
        &mut self,
        security: &Rc<Security>,
        _engine: &mut IndicatorEngine,
    ) -> Result<(), RuletraderError> {
        self.security = Some(Rc::clone(security));
        Ok(())
    }

    fn price_long(&self, idx: usize, timing: RuleTiming) -> Result<Option<f64>, NoDataError> {
        slot_price(bound(&self.security)?, idx, timing)
    }

    fn price_short(&self, idx: usize, timing: RuleTiming) -> Result<Option<f64>, NoDataError> {
        slot_price(bound(&self.security)?, idx, timing)
    }
}

/// Enters during the session when the open gaps through yesterday's recent
/// high (long) or low (short).
///
/// The price is the recent extreme moved by `percentage` percent in the
/// trade's direction.
#[derive(Debug)]
pub struct BreakoutEntry {
    timing: RuleTiming,
    span: usize,
    percentage: f64,
    security: Option<Rc<Security>>,
    recent_high: Option<Indicator>,
    recent_low: Option<Indicator>,
}

impl BreakoutEntry {
    pub fn new(span: usize, percentage: f64, timing: RuleTiming) -> Result<Self, RuletraderError> {
        check_span(span)?;
        Ok(Self {
            timing,
            span,
            percentage,
            security: None,
            recent_high: None,
            recent_low: None,
        })
    }

    pub fn from_params(
        params: &Params,
        timing: RuleTiming,
    ) -> Result<Box<dyn EntryRule>, RuletraderError> {
        let r = ParamReader::new(params);
        Ok(Box::new(Self::new(r.span()?, r.f64_or("percentage", 0.0)?, timing)?))
    }
}

impl EntryRule for BreakoutEntry {
    fn key(&self) -> &'static str {
        "breakout"
    }

    fn timing(&self) -> RuleTiming {
        self.timing
    }

    fn security(&self) -> Option<&Rc<Security>> {
        self.security.as_ref()
    }

    fn bind_security(
        &mut self,
        security: &Rc<Security>,
        engine: &mut IndicatorEngine,
    ) -> Result<(), RuletraderError> {
        self.security = Some(Rc::clone(security));
        self.recent_high = Some(engine.build(security, IndicatorKind::recent_high(self.span))?);
        self.recent_low = Some(engine.build(security, IndicatorKind::recent_low(self.span))?);
        Ok(())
    }

    fn price_long(&self, idx: usize, timing: RuleTiming) -> Result<Option<f64>, NoDataError> {
        let security = bound(&self.security)?;
        let prev = lag(idx, 1)?;
        let recent_high = derived(&self.recent_high)?.value_at(prev)?;
        if timing != RuleTiming::Session {
            return Ok(None);
        }
        if security.bar(prev)?.high < recent_high && security.bar(idx)?.open > recent_high {
            return Ok(Some(recent_high * (1.0 + self.percentage * 0.01)));
        }
        Ok(None)
    }

    fn price_short(&self, idx: usize, timing: RuleTiming) -> Result<Option<f64>, NoDataError> {
        let security = bound(&self.security)?;
        let prev = lag(idx, 1)?;
        let recent_low = derived(&self.recent_low)?.value_at(prev)?;
        if timing != RuleTiming::Session {
            return Ok(None);
        }
        if security.bar(prev)?.low > recent_low && security.bar(idx)?.open < recent_low {
            return Ok(Some(recent_low * (1.0 - self.percentage * 0.01)));
        }
        Ok(None)
    }
}
