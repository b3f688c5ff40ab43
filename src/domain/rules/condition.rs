//! Conditions: boolean gates evaluated per bar before an entry or exit
//! group may price a trade.

use super::{bound, derived};
use crate::domain::error::{NoDataError, RuletraderError};
use crate::domain::financial::CashFlowGrowth;
use crate::domain::indicator::window::check_span;
use crate::domain::indicator::{DOWN, Indicator, IndicatorEngine, IndicatorKind, UP};
use crate::domain::order::OrderType;
use crate::domain::params::{ParamReader, Params};
use crate::domain::price_bar::PriceField;
use crate::domain::security::{Security, lag};
use std::rc::Rc;

pub trait Condition {
    fn key(&self) -> &'static str;

    fn bind_security(
        &mut self,
        security: &Rc<Security>,
        engine: &mut IndicatorEngine,
    ) -> Result<(), RuletraderError>;

    fn enter_long(&self, idx: usize) -> Result<bool, NoDataError>;

    fn enter_short(&self, idx: usize) -> Result<bool, NoDataError>;

    /// Defaults to the short entry signal.
    fn exit_long(&self, idx: usize) -> Result<bool, NoDataError> {
        self.enter_short(idx)
    }

    /// Defaults to the long entry signal.
    fn exit_short(&self, idx: usize) -> Result<bool, NoDataError> {
        self.enter_long(idx)
    }

    /// Missing history blocks entry rather than failing.
    fn can_enter(&self, order_type: OrderType, idx: usize) -> bool {
        let allowed = match order_type {
            OrderType::Long => self.enter_long(idx),
            OrderType::Short => self.enter_short(idx),
        };
        allowed.unwrap_or(false)
    }

    /// Unlike `can_enter`, missing history is reported to the caller.
    fn can_exit(&self, order_type: OrderType, idx: usize) -> Result<bool, NoDataError> {
        match order_type {
            OrderType::Long => self.exit_long(idx),
            OrderType::Short => self.exit_short(idx),
        }
    }
}

/// Short moving average crossing the long one, compared two bars back and
/// one bar back.
#[derive(Debug)]
pub struct MovingAverageCrossover {
    span_short: usize,
    span_long: usize,
    short: Option<Indicator>,
    long: Option<Indicator>,
}

impl MovingAverageCrossover {
    pub fn new(span_short: usize, span_long: usize) -> Result<Self, RuletraderError> {
        check_span(span_short)?;
        check_span(span_long)?;
        Ok(Self {
            span_short,
            span_long,
            short: None,
            long: None,
        })
    }

    pub fn from_params(params: &Params) -> Result<Box<dyn Condition>, RuletraderError> {
        let r = ParamReader::new(params);
        Ok(Box::new(Self::new(r.usize("span_short")?, r.usize("span_long")?)?))
    }

    /// (short, long) averages at `idx - 2` and `idx - 1`.
    fn pairs(&self, idx: usize) -> Result<((f64, f64), (f64, f64)), NoDataError> {
        let short = derived(&self.short)?;
        let long = derived(&self.long)?;
        let (i1, i2) = (lag(idx, 2)?, lag(idx, 1)?);
        Ok((
            (short.value_at(i1)?, long.value_at(i1)?),
            (short.value_at(i2)?, long.value_at(i2)?),
        ))
    }
}

impl Condition for MovingAverageCrossover {
    fn key(&self) -> &'static str {
        "ma_crossover"
    }

    fn bind_security(
        &mut self,
        security: &Rc<Security>,
        engine: &mut IndicatorEngine,
    ) -> Result<(), RuletraderError> {
        self.short = Some(engine.build(security, IndicatorKind::moving_average(self.span_short))?);
        self.long = Some(engine.build(security, IndicatorKind::moving_average(self.span_long))?);
        Ok(())
    }

    fn enter_long(&self, idx: usize) -> Result<bool, NoDataError> {
        let ((short1, long1), (short2, long2)) = self.pairs(idx)?;
        Ok(short1 <= long1 && short2 > long2)
    }

    fn enter_short(&self, idx: usize) -> Result<bool, NoDataError> {
        let ((short1, long1), (short2, long2)) = self.pairs(idx)?;
        Ok(long1 <= short1 && long2 > short2)
    }
}

/// Same signal as `MovingAverageCrossover`, read from crossover indicators.
#[derive(Debug)]
pub struct MovingAverageCrossoverSignal {
    span_short: usize,
    span_long: usize,
    cross_up: Option<Indicator>,
    cross_down: Option<Indicator>,
}

impl MovingAverageCrossoverSignal {
    pub fn new(span_short: usize, span_long: usize) -> Result<Self, RuletraderError> {
        check_span(span_short)?;
        check_span(span_long)?;
        Ok(Self {
            span_short,
            span_long,
            cross_up: None,
            cross_down: None,
        })
    }

    pub fn from_params(params: &Params) -> Result<Box<dyn Condition>, RuletraderError> {
        let r = ParamReader::new(params);
        Ok(Box::new(Self::new(r.usize("span_short")?, r.usize("span_long")?)?))
    }

    fn crossover(&self, reverse: bool) -> IndicatorKind {
        IndicatorKind::CrossOver {
            span_short: self.span_short,
            span_long: self.span_long,
            reverse,
        }
    }
}

impl Condition for MovingAverageCrossoverSignal {
    fn key(&self) -> &'static str {
        "ma_crossover_signal"
    }

    fn bind_security(
        &mut self,
        security: &Rc<Security>,
        engine: &mut IndicatorEngine,
    ) -> Result<(), RuletraderError> {
        self.cross_up = Some(engine.build(security, self.crossover(false))?);
        self.cross_down = Some(engine.build(security, self.crossover(true))?);
        Ok(())
    }

    fn enter_long(&self, idx: usize) -> Result<bool, NoDataError> {
        derived(&self.cross_up)?.is_true_at(lag(idx, 1)?)
    }

    fn enter_short(&self, idx: usize) -> Result<bool, NoDataError> {
        derived(&self.cross_down)?.is_true_at(lag(idx, 1)?)
    }
}

/// Moving average rising (long) or falling (short) as of the previous bar.
#[derive(Debug)]
pub struct MovingAverageDirection {
    span: usize,
    direction: Option<Indicator>,
}

impl MovingAverageDirection {
    pub fn new(span: usize) -> Result<Self, RuletraderError> {
        check_span(span)?;
        Ok(Self {
            span,
            direction: None,
        })
    }

    pub fn from_params(params: &Params) -> Result<Box<dyn Condition>, RuletraderError> {
        Ok(Box::new(Self::new(ParamReader::new(params).span()?)?))
    }
}

impl Condition for MovingAverageDirection {
    fn key(&self) -> &'static str {
        "ma_direction"
    }

    fn bind_security(
        &mut self,
        security: &Rc<Security>,
        engine: &mut IndicatorEngine,
    ) -> Result<(), RuletraderError> {
        let kind = IndicatorKind::MaDirection {
            span: self.span,
            field: PriceField::Close,
        };
        self.direction = Some(engine.build(security, kind)?);
        Ok(())
    }

    fn enter_long(&self, idx: usize) -> Result<bool, NoDataError> {
        Ok(derived(&self.direction)?.value_at(lag(idx, 1)?)? == UP)
    }

    fn enter_short(&self, idx: usize) -> Result<bool, NoDataError> {
        Ok(derived(&self.direction)?.value_at(lag(idx, 1)?)? == DOWN)
    }
}

/// Close broke the recent high (long) or low (short) on the previous bar.
/// Never blocks an exit.
#[derive(Debug)]
pub struct Breakout {
    span: usize,
    upper: Option<Indicator>,
    lower: Option<Indicator>,
}

impl Breakout {
    pub fn new(span: usize) -> Result<Self, RuletraderError> {
        check_span(span)?;
        Ok(Self {
            span,
            upper: None,
            lower: None,
        })
    }

    pub fn from_params(params: &Params) -> Result<Box<dyn Condition>, RuletraderError> {
        Ok(Box::new(Self::new(ParamReader::new(params).span()?)?))
    }
}

impl Condition for Breakout {
    fn key(&self) -> &'static str {
        "breakout"
    }

    fn bind_security(
        &mut self,
        security: &Rc<Security>,
        engine: &mut IndicatorEngine,
    ) -> Result<(), RuletraderError> {
        self.upper = Some(engine.build(security, IndicatorKind::UpperBreakout { span: self.span })?);
        self.lower = Some(engine.build(security, IndicatorKind::LowerBreakout { span: self.span })?);
        Ok(())
    }

    fn enter_long(&self, idx: usize) -> Result<bool, NoDataError> {
        derived(&self.upper)?.is_true_at(lag(idx, 1)?)
    }

    fn enter_short(&self, idx: usize) -> Result<bool, NoDataError> {
        derived(&self.lower)?.is_true_at(lag(idx, 1)?)
    }

    fn exit_long(&self, _idx: usize) -> Result<bool, NoDataError> {
        Ok(true)
    }

    fn exit_short(&self, _idx: usize) -> Result<bool, NoDataError> {
        Ok(true)
    }
}

/// Long-only: annual operating cash flow was positive and grew by the
/// required rate in each of the last `years` statements filed by the bar's
/// date. Never blocks a long exit.
#[derive(Debug)]
pub struct OperatingCashFlowIncreasing {
    growth: CashFlowGrowth,
    security: Option<Rc<Security>>,
}

impl OperatingCashFlowIncreasing {
    pub fn new(growth: CashFlowGrowth) -> Self {
        Self {
            growth,
            security: None,
        }
    }

    pub fn from_params(params: &Params) -> Result<Box<dyn Condition>, RuletraderError> {
        let growth = CashFlowGrowth::from_reader(&ParamReader::new(params))?;
        Ok(Box::new(Self::new(growth)))
    }
}

impl Condition for OperatingCashFlowIncreasing {
    fn key(&self) -> &'static str {
        "operating_cf_increasing"
    }

    fn bind_security(
        &mut self,
        security: &Rc<Security>,
        _engine: &mut IndicatorEngine,
    ) -> Result<(), RuletraderError> {
        self.security = Some(Rc::clone(security));
        Ok(())
    }

    fn enter_long(&self, idx: usize) -> Result<bool, NoDataError> {
        let security = bound(&self.security)?;
        let date = security.bar(idx)?.date;
        Ok(self.growth.held_as_of(security.financials(), date))
    }

    fn enter_short(&self, _idx: usize) -> Result<bool, NoDataError> {
        Ok(false)
    }

    fn exit_long(&self, _idx: usize) -> Result<bool, NoDataError> {
        Ok(true)
    }

    fn exit_short(&self, _idx: usize) -> Result<bool, NoDataError> {
        Ok(false)
    }
}
