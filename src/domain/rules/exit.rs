//! Exit rules: price the close of an open position.

use super::{bound, derived, slot_price};
use crate::domain::error::{NoDataError, RuletraderError};
use crate::domain::indicator::window::check_span;
use crate::domain::indicator::{Indicator, IndicatorEngine, IndicatorKind};
use crate::domain::order::{OrderType, RuleTiming};
use crate::domain::params::{ParamReader, Params};
use crate::domain::position::Position;
use crate::domain::price_bar::PriceField;
use crate::domain::security::{Security, lag};
use std::rc::Rc;

pub trait ExitRule {
    fn key(&self) -> &'static str;

    fn timing(&self) -> RuleTiming;

    fn security(&self) -> Option<&Rc<Security>>;

    fn bind_security(
        &mut self,
        security: &Rc<Security>,
        engine: &mut IndicatorEngine,
    ) -> Result<(), RuletraderError>;

    fn price_long(
        &self,
        position: &Position,
        idx: usize,
        timing: RuleTiming,
    ) -> Result<Option<f64>, NoDataError>;

    fn price_short(
        &self,
        position: &Position,
        idx: usize,
        timing: RuleTiming,
    ) -> Result<Option<f64>, NoDataError>;

    fn timing_matches(&self, timing: RuleTiming) -> bool {
        self.timing().matches(timing)
    }

    /// Exit price for `position`, or `None` when the rule does not fire.
    ///
    /// With `check_range`, a price outside the bar's [low, high] is moved to
    /// the high for longs and the low for shorts.
    fn price_for_exit(
        &self,
        position: &Position,
        idx: usize,
        timing: RuleTiming,
        check_range: bool,
    ) -> Option<f64> {
        let price = match position.order_type {
            OrderType::Long => self.price_long(position, idx, timing),
            OrderType::Short => self.price_short(position, idx, timing),
        }
        .ok()
        .flatten()?;

        if check_range {
            let bar = self.security()?.bar(idx).ok()?;
            if !bar.in_range(price) {
                return Some(match position.order_type {
                    OrderType::Long => bar.high,
                    OrderType::Short => bar.low,
                });
            }
        }
        Some(price)
    }
}

/// Exits at the open or the close of the bar, with no further condition.
#[derive(Debug)]
pub struct SimpleExit {
    timing: RuleTiming,
    security: Option<Rc<Security>>,
}

impl SimpleExit {
    pub fn new(timing: RuleTiming) -> Self {
        Self {
            timing,
            security: None,
        }
    }

    pub fn from_params(
        _params: &Params,
        timing: RuleTiming,
    ) -> Result<Box<dyn ExitRule>, RuletraderError> {
        Ok(Box::new(Self::new(timing)))
    }
}

impl ExitRule for SimpleExit {
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

    fn price_long(
        &self,
        _position: &Position,
        idx: usize,
        timing: RuleTiming,
    ) -> Result<Option<f64>, NoDataError> {
        slot_price(bound(&self.security)?, idx, timing)
    }

    fn price_short(
        &self,
        _position: &Position,
        idx: usize,
        timing: RuleTiming,
    ) -> Result<Option<f64>, NoDataError> {
        slot_price(bound(&self.security)?, idx, timing)
    }
}

/// Exits during the session once price gives back `percentage` percent from
/// the best level seen while holding.
#[derive(Debug)]
pub struct TrailingStop {
    timing: RuleTiming,
    percentage: f64,
    security: Option<Rc<Security>>,
}

impl TrailingStop {
    pub fn new(percentage: f64, timing: RuleTiming) -> Self {
        Self {
            timing,
            percentage,
            security: None,
        }
    }

    pub fn from_params(
        params: &Params,
        timing: RuleTiming,
    ) -> Result<Box<dyn ExitRule>, RuletraderError> {
        let percentage = ParamReader::new(params).f64("percentage")?;
        Ok(Box::new(Self::new(percentage, timing)))
    }
}

impl ExitRule for TrailingStop {
    fn key(&self) -> &'static str {
        "trailing_stop"
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

    fn price_long(
        &self,
        position: &Position,
        idx: usize,
        timing: RuleTiming,
    ) -> Result<Option<f64>, NoDataError> {
        let Some(high) = position.high else {
            return Ok(None);
        };
        if timing != RuleTiming::Session {
            return Ok(None);
        }
        let stop = high * (1.0 - self.percentage * 0.01);
        if stop >= bound(&self.security)?.bar(idx)?.low {
            return Ok(Some(stop));
        }
        Ok(None)
    }

    fn price_short(
        &self,
        position: &Position,
        idx: usize,
        timing: RuleTiming,
    ) -> Result<Option<f64>, NoDataError> {
        let Some(low) = position.low else {
            return Ok(None);
        };
        if timing != RuleTiming::Session {
            return Ok(None);
        }
        let stop = low * (1.0 + self.percentage * 0.01);
        if stop <= bound(&self.security)?.bar(idx)?.high {
            return Ok(Some(stop));
        }
        Ok(None)
    }
}

/// Exits at the open after the previous bar's price crossed the moving
/// average against the position. Trades only at OPEN.
#[derive(Debug)]
pub struct PriceMaCross {
    span: usize,
    field_long: PriceField,
    field_short: PriceField,
    security: Option<Rc<Security>>,
    moving_average: Option<Indicator>,
}

impl PriceMaCross {
    pub fn new(
        span: usize,
        field_long: PriceField,
        field_short: PriceField,
    ) -> Result<Self, RuletraderError> {
        check_span(span)?;
        Ok(Self {
            span,
            field_long,
            field_short,
            security: None,
            moving_average: None,
        })
    }

    pub fn from_params(
        params: &Params,
        _timing: RuleTiming,
    ) -> Result<Box<dyn ExitRule>, RuletraderError> {
        let r = ParamReader::new(params);
        Ok(Box::new(Self::new(
            r.span()?,
            r.price_field_or("price_field_long", PriceField::Close)?,
            r.price_field_or("price_field_short", PriceField::Close)?,
        )?))
    }

    /// (moving average, price) on the bar before `idx`.
    fn previous(&self, idx: usize, field: PriceField) -> Result<(f64, f64), NoDataError> {
        let prev = lag(idx, 1)?;
        let ma = derived(&self.moving_average)?.value_at(prev)?;
        let price = bound(&self.security)?.price(prev, field)?;
        Ok((ma, price))
    }
}

impl ExitRule for PriceMaCross {
    fn key(&self) -> &'static str {
        "price_ma_cross"
    }

    fn timing(&self) -> RuleTiming {
        RuleTiming::Open
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
        self.moving_average = Some(engine.build(security, IndicatorKind::moving_average(self.span))?);
        Ok(())
    }

    fn price_long(
        &self,
        _position: &Position,
        idx: usize,
        _timing: RuleTiming,
    ) -> Result<Option<f64>, NoDataError> {
        let (ma, price) = self.previous(idx, self.field_long)?;
        if ma > price {
            return Ok(Some(bound(&self.security)?.bar(idx)?.open));
        }
        Ok(None)
    }

    fn price_short(
        &self,
        _position: &Position,
        idx: usize,
        _timing: RuleTiming,
    ) -> Result<Option<f64>, NoDataError> {
        let (ma, price) = self.previous(idx, self.field_short)?;
        if ma < price {
            return Ok(Some(bound(&self.security)?.bar(idx)?.open));
        }
        Ok(None)
    }
}

/// Exits at the open once the position has been held `period` days.
#[derive(Debug)]
pub struct HoldingPeriod {
    timing: RuleTiming,
    period: u32,
    security: Option<Rc<Security>>,
}

impl HoldingPeriod {
    pub fn new(period: u32, timing: RuleTiming) -> Self {
        Self {
            timing,
            period,
            security: None,
        }
    }

    pub fn from_params(
        params: &Params,
        timing: RuleTiming,
    ) -> Result<Box<dyn ExitRule>, RuletraderError> {
        let period = ParamReader::new(params).usize("period")?;
        let period = u32::try_from(period)
            .map_err(|_| RuletraderError::argument("period", "a day count"))?;
        Ok(Box::new(Self::new(period, timing)))
    }

    fn price(&self, position: &Position, idx: usize, timing: RuleTiming) -> Result<Option<f64>, NoDataError> {
        if timing == RuleTiming::Open && position.period >= self.period {
            return Ok(Some(bound(&self.security)?.bar(idx)?.open));
        }
        Ok(None)
    }
}

impl ExitRule for HoldingPeriod {
    fn key(&self) -> &'static str {
        "holding_period"
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

    fn price_long(
        &self,
        position: &Position,
        idx: usize,
        timing: RuleTiming,
    ) -> Result<Option<f64>, NoDataError> {
        self.price(position, idx, timing)
    }

    fn price_short(
        &self,
        position: &Position,
        idx: usize,
        timing: RuleTiming,
    ) -> Result<Option<f64>, NoDataError> {
        self.price(position, idx, timing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price_bar::PriceBar;
    use chrono::NaiveDate;

    fn make_security(bars: &[(f64, f64, f64, f64)]) -> Rc<Security> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = bars
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| PriceBar {
                date: start + chrono::Duration::days(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000,
                raw_close: None,
            })
            .collect();
        Rc::new(Security::with_bars("TEST", bars).unwrap())
    }

    fn position(order_type: OrderType) -> Position {
        Position::open(
            "TEST",
            order_type,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            95.0,
            RuleTiming::Open,
            1,
            10,
        )
    }

    struct FixedPrice {
        price: f64,
        security: Option<Rc<Security>>,
    }

    impl ExitRule for FixedPrice {
        fn key(&self) -> &'static str {
            "fixed"
        }

        fn timing(&self) -> RuleTiming {
            RuleTiming::Anytime
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

        fn price_long(
            &self,
            _position: &Position,
            _idx: usize,
            _timing: RuleTiming,
        ) -> Result<Option<f64>, NoDataError> {
            Ok(Some(self.price))
        }

        fn price_short(
            &self,
            _position: &Position,
            _idx: usize,
            _timing: RuleTiming,
        ) -> Result<Option<f64>, NoDataError> {
            Ok(Some(self.price))
        }
    }

    fn bound_fixed(price: f64, sec: &Rc<Security>) -> FixedPrice {
        let mut rule = FixedPrice {
            price,
            security: None,
        };
        rule.bind_security(sec, &mut IndicatorEngine::default()).unwrap();
        rule
    }

    #[test]
    fn out_of_range_long_exit_clamps_to_high() {
        let sec = make_security(&[(95.0, 100.0, 90.0, 95.0)]);
        let rule = bound_fixed(105.0, &sec);
        let pos = position(OrderType::Long);
        assert_eq!(rule.price_for_exit(&pos, 0, RuleTiming::Session, true), Some(100.0));
        assert_eq!(rule.price_for_exit(&pos, 0, RuleTiming::Session, false), Some(105.0));
    }

    #[test]
    fn out_of_range_short_exit_clamps_to_low() {
        let sec = make_security(&[(95.0, 100.0, 90.0, 95.0)]);
        let rule = bound_fixed(105.0, &sec);
        let pos = position(OrderType::Short);
        assert_eq!(rule.price_for_exit(&pos, 0, RuleTiming::Session, true), Some(90.0));
    }

    #[test]
    fn in_range_exit_is_unchanged() {
        let sec = make_security(&[(95.0, 100.0, 90.0, 95.0)]);
        let rule = bound_fixed(97.5, &sec);
        let pos = position(OrderType::Long);
        assert_eq!(rule.price_for_exit(&pos, 0, RuleTiming::Close, true), Some(97.5));
    }

    #[test]
    fn simple_exit_prices_by_slot() {
        let sec = make_security(&[(95.0, 100.0, 90.0, 98.0)]);
        let mut rule = SimpleExit::new(RuleTiming::Anytime);
        rule.bind_security(&sec, &mut IndicatorEngine::default()).unwrap();
        let pos = position(OrderType::Long);
        assert_eq!(rule.price_for_exit(&pos, 0, RuleTiming::Open, true), Some(95.0));
        assert_eq!(rule.price_for_exit(&pos, 0, RuleTiming::Session, true), None);
        assert_eq!(rule.price_for_exit(&pos, 0, RuleTiming::Close, true), Some(98.0));
    }

    #[test]
    fn trailing_stop_long() {
        let sec = make_security(&[(100.0, 110.0, 100.0, 105.0), (104.0, 106.0, 98.0, 99.0)]);
        let mut rule = TrailingStop::new(10.0, RuleTiming::Anytime);
        rule.bind_security(&sec, &mut IndicatorEngine::default()).unwrap();
        let mut pos = position(OrderType::Long);
        assert_eq!(rule.price_for_exit(&pos, 1, RuleTiming::Session, true), None);
        pos.advance(&sec, 0).unwrap();
        // stop = 110 * 0.9 = 99, bar 1 low 98 <= 99
        let price = rule.price_for_exit(&pos, 1, RuleTiming::Session, true).unwrap();
        assert!((price - 99.0).abs() < 1e-9);
        assert_eq!(rule.price_for_exit(&pos, 1, RuleTiming::Open, true), None);
    }

    #[test]
    fn trailing_stop_short_not_triggered() {
        let sec = make_security(&[(100.0, 101.0, 100.0, 100.0), (100.0, 104.0, 99.0, 103.0)]);
        let mut rule = TrailingStop::new(5.0, RuleTiming::Session);
        rule.bind_security(&sec, &mut IndicatorEngine::default()).unwrap();
        let mut pos = position(OrderType::Short);
        pos.advance(&sec, 0).unwrap();
        // stop = 100 * 1.05 = 105, above bar 1 high 104
        assert_eq!(rule.price_for_exit(&pos, 1, RuleTiming::Session, true), None);
    }

    #[test]
    fn price_ma_cross_exits_long_at_open() {
        let sec = make_security(&[
            (10.0, 10.0, 10.0, 10.0),
            (10.0, 10.0, 10.0, 10.0),
            (9.0, 9.0, 8.0, 8.0),
            (7.5, 8.0, 7.0, 7.5),
        ]);
        let mut rule = PriceMaCross::new(2, PriceField::Close, PriceField::Close).unwrap();
        rule.bind_security(&sec, &mut IndicatorEngine::default()).unwrap();
        assert_eq!(rule.timing(), RuleTiming::Open);
        assert!(!rule.timing_matches(RuleTiming::Close));
        let pos = position(OrderType::Long);
        // bar 2: ma 9.0 > close 8.0
        assert_eq!(rule.price_for_exit(&pos, 3, RuleTiming::Open, true), Some(7.5));
        assert_eq!(rule.price_for_exit(&pos, 2, RuleTiming::Open, true), None);
        let short = position(OrderType::Short);
        assert_eq!(rule.price_for_exit(&short, 3, RuleTiming::Open, true), None);
    }

    #[test]
    fn holding_period_exits_after_enough_days() {
        let sec = make_security(&[(10.0, 11.0, 9.0, 10.0); 4]);
        let mut rule = HoldingPeriod::new(2, RuleTiming::Anytime);
        rule.bind_security(&sec, &mut IndicatorEngine::default()).unwrap();
        let mut pos = position(OrderType::Short);
        pos.advance(&sec, 0).unwrap();
        assert_eq!(rule.price_for_exit(&pos, 1, RuleTiming::Open, true), None);
        pos.advance(&sec, 1).unwrap();
        assert_eq!(rule.price_for_exit(&pos, 2, RuleTiming::Open, true), Some(10.0));
        assert_eq!(rule.price_for_exit(&pos, 2, RuleTiming::Close, true), None);
    }

    #[test]
    fn trailing_stop_requires_percentage() {
        assert!(matches!(
            TrailingStop::from_params(&Params::new(), RuleTiming::Anytime),
            Err(RuletraderError::Argument { .. })
        ));
    }
}
