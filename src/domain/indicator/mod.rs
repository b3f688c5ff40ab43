//! Indicator engine.
//!
//! - `IndicatorKind`: indicator identity and typed parameters
//! - `Indicator`: a computed series bound to one security
//! - `IndicatorEngine`: builds indicators, serving repeats from the cache

pub mod basic;
pub mod cache;
pub mod signal;
pub mod window;

use crate::domain::error::{NoDataError, RuletraderError};
use crate::domain::params::{ParamReader, Params};
use crate::domain::price_bar::PriceField;
use crate::domain::security::Security;
use cache::IndicatorCache;
use log::debug;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

pub use window::MAX_SPAN;

/// Direction values emitted by `IndicatorKind::MaDirection`.
pub const UP: f64 = 1.0;
pub const DOWN: f64 = -1.0;
pub const FLAT: f64 = 0.0;

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorKind {
    Price {
        field: PriceField,
    },
    MovingAverage {
        span: usize,
        field: PriceField,
    },
    RecentHigh {
        span: usize,
        field: PriceField,
    },
    RecentLow {
        span: usize,
        field: PriceField,
    },
    MaDirection {
        span: usize,
        field: PriceField,
    },
    /// 1.0 on the bar where the short average reaches the long one from below.
    CrossOver {
        span_short: usize,
        span_long: usize,
        reverse: bool,
    },
    CloseAboveRecentHigh {
        span: usize,
    },
    CloseBelowRecentLow {
        span: usize,
    },
    UpperBreakout {
        span: usize,
    },
    LowerBreakout {
        span: usize,
    },
}

impl IndicatorKind {
    pub fn moving_average(span: usize) -> Self {
        IndicatorKind::MovingAverage {
            span,
            field: PriceField::Close,
        }
    }

    pub fn recent_high(span: usize) -> Self {
        IndicatorKind::RecentHigh {
            span,
            field: PriceField::High,
        }
    }

    pub fn recent_low(span: usize) -> Self {
        IndicatorKind::RecentLow {
            span,
            field: PriceField::Low,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IndicatorKind::Price { .. } => "Price",
            IndicatorKind::MovingAverage { .. } => "MovingAverage",
            IndicatorKind::RecentHigh { .. } => "RecentHigh",
            IndicatorKind::RecentLow { .. } => "RecentLow",
            IndicatorKind::MaDirection { .. } => "MaDirection",
            IndicatorKind::CrossOver { .. } => "CrossOver",
            IndicatorKind::CloseAboveRecentHigh { .. } => "CloseAboveRecentHigh",
            IndicatorKind::CloseBelowRecentLow { .. } => "CloseBelowRecentLow",
            IndicatorKind::UpperBreakout { .. } => "UpperBreakout",
            IndicatorKind::LowerBreakout { .. } => "LowerBreakout",
        }
    }

    /// Window length, for kinds that have one.
    pub fn span(&self) -> Option<usize> {
        match self {
            IndicatorKind::Price { .. } | IndicatorKind::CrossOver { .. } => None,
            IndicatorKind::MovingAverage { span, .. }
            | IndicatorKind::RecentHigh { span, .. }
            | IndicatorKind::RecentLow { span, .. }
            | IndicatorKind::MaDirection { span, .. }
            | IndicatorKind::CloseAboveRecentHigh { span }
            | IndicatorKind::CloseBelowRecentLow { span }
            | IndicatorKind::UpperBreakout { span }
            | IndicatorKind::LowerBreakout { span } => Some(*span),
        }
    }

    /// Typed parameters that make up the indicator's identity.
    pub fn params(&self) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        match self {
            IndicatorKind::Price { field } => {
                out.insert("field".into(), json!(field.as_str()));
            }
            IndicatorKind::MovingAverage { span, field }
            | IndicatorKind::RecentHigh { span, field }
            | IndicatorKind::RecentLow { span, field }
            | IndicatorKind::MaDirection { span, field } => {
                out.insert("span".into(), json!(span));
                out.insert("field".into(), json!(field.as_str()));
            }
            IndicatorKind::CrossOver {
                span_short,
                span_long,
                reverse,
            } => {
                out.insert("span_short".into(), json!(span_short));
                out.insert("span_long".into(), json!(span_long));
                out.insert("reverse".into(), json!(reverse));
            }
            IndicatorKind::CloseAboveRecentHigh { span }
            | IndicatorKind::CloseBelowRecentLow { span }
            | IndicatorKind::UpperBreakout { span }
            | IndicatorKind::LowerBreakout { span } => {
                out.insert("span".into(), json!(span));
            }
        }
        out
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self
            .params()
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{k}={s}"),
                other => format!("{k}={other}"),
            })
            .collect();
        write!(f, "{}({})", self.name(), args.join(","))
    }
}

/// Registry constructors for each indicator key.
pub mod factory {
    use super::*;

    pub fn price(params: &Params) -> Result<IndicatorKind, RuletraderError> {
        let r = ParamReader::new(params);
        Ok(IndicatorKind::Price {
            field: r.price_field_or("field", PriceField::Close)?,
        })
    }

    pub fn moving_average(params: &Params) -> Result<IndicatorKind, RuletraderError> {
        let r = ParamReader::new(params);
        Ok(IndicatorKind::MovingAverage {
            span: r.span()?,
            field: r.price_field_or("field", PriceField::Close)?,
        })
    }

    pub fn recent_high(params: &Params) -> Result<IndicatorKind, RuletraderError> {
        let r = ParamReader::new(params);
        Ok(IndicatorKind::RecentHigh {
            span: r.span()?,
            field: r.price_field_or("field", PriceField::High)?,
        })
    }

    pub fn recent_low(params: &Params) -> Result<IndicatorKind, RuletraderError> {
        let r = ParamReader::new(params);
        Ok(IndicatorKind::RecentLow {
            span: r.span()?,
            field: r.price_field_or("field", PriceField::Low)?,
        })
    }

    pub fn ma_direction(params: &Params) -> Result<IndicatorKind, RuletraderError> {
        let r = ParamReader::new(params);
        Ok(IndicatorKind::MaDirection {
            span: r.span()?,
            field: r.price_field_or("field", PriceField::Close)?,
        })
    }

    pub fn crossover(params: &Params) -> Result<IndicatorKind, RuletraderError> {
        let r = ParamReader::new(params);
        Ok(IndicatorKind::CrossOver {
            span_short: r.usize("span_short")?,
            span_long: r.usize("span_long")?,
            reverse: r.bool_or("reverse", false)?,
        })
    }

    pub fn close_above_recent_high(params: &Params) -> Result<IndicatorKind, RuletraderError> {
        Ok(IndicatorKind::CloseAboveRecentHigh {
            span: ParamReader::new(params).span()?,
        })
    }

    pub fn close_below_recent_low(params: &Params) -> Result<IndicatorKind, RuletraderError> {
        Ok(IndicatorKind::CloseBelowRecentLow {
            span: ParamReader::new(params).span()?,
        })
    }

    pub fn upper_breakout(params: &Params) -> Result<IndicatorKind, RuletraderError> {
        Ok(IndicatorKind::UpperBreakout {
            span: ParamReader::new(params).span()?,
        })
    }

    pub fn lower_breakout(params: &Params) -> Result<IndicatorKind, RuletraderError> {
        Ok(IndicatorKind::LowerBreakout {
            span: ParamReader::new(params).span()?,
        })
    }
}

/// A computed series aligned 1:1 with its security's bars.
#[derive(Debug, Clone)]
pub struct Indicator {
    kind: IndicatorKind,
    security: Rc<Security>,
    data: Rc<[f64]>,
}

impl Indicator {
    pub fn kind(&self) -> &IndicatorKind {
        &self.kind
    }

    pub fn security(&self) -> &Rc<Security> {
        &self.security
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn full_series(&self) -> &[f64] {
        &self.data
    }

    /// Value at `idx`; out of range and NaN both report no data.
    pub fn value_at(&self, idx: usize) -> Result<f64, NoDataError> {
        match self.data.get(idx) {
            Some(v) if !v.is_nan() => Ok(*v),
            _ => Err(NoDataError),
        }
    }

    /// Truth of a boolean indicator at `idx`.
    pub fn is_true_at(&self, idx: usize) -> Result<bool, NoDataError> {
        self.value_at(idx).map(window::truthy)
    }

    pub fn shifted(&self, offset: isize) -> Vec<f64> {
        window::shift(&self.data, offset)
    }

    /// Trailing windows of a price field, sized by this indicator's span.
    pub fn windowed(&self, field: PriceField) -> Result<Vec<Vec<f64>>, RuletraderError> {
        let span = self.kind.span().ok_or_else(|| RuletraderError::Span {
            reason: format!("{} has no span", self.kind.name()),
        })?;
        window::windowed(&self.security.series(field), span)
    }
}

/// Builds indicators and owns the cache shared by every rule in a run.
#[derive(Debug, Default)]
pub struct IndicatorEngine {
    cache: IndicatorCache,
}

impl IndicatorEngine {
    pub fn new(max_cache_entries: usize) -> Self {
        Self {
            cache: IndicatorCache::new(max_cache_entries),
        }
    }

    pub fn cache(&self) -> &IndicatorCache {
        &self.cache
    }

    pub fn build(
        &mut self,
        security: &Rc<Security>,
        kind: IndicatorKind,
    ) -> Result<Indicator, RuletraderError> {
        self.build_with_params(security, kind, &Params::new())
    }

    /// Like `build`, with extra configuration parameters folded into the
    /// identity. Typed parameters take precedence over same-named extras.
    pub fn build_with_params(
        &mut self,
        security: &Rc<Security>,
        kind: IndicatorKind,
        extra: &Params,
    ) -> Result<Indicator, RuletraderError> {
        let mut identity: BTreeMap<String, Value> =
            extra.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        identity.extend(kind.params());
        let key = IndicatorCache::key(kind.name(), &security.symbol, &identity);

        if let Some(k) = &key {
            if let Some(data) = self.cache.get(k) {
                return Ok(Indicator {
                    kind,
                    security: Rc::clone(security),
                    data,
                });
            }
        } else {
            debug!("{kind} on {} is not cacheable", security.symbol);
        }

        let data: Rc<[f64]> = Rc::from(self.compute(security, &kind)?);
        if let Some(k) = key {
            self.cache.insert(k, Rc::clone(&data));
        }
        Ok(Indicator {
            kind,
            security: Rc::clone(security),
            data,
        })
    }

    fn compute(
        &mut self,
        security: &Rc<Security>,
        kind: &IndicatorKind,
    ) -> Result<Vec<f64>, RuletraderError> {
        match *kind {
            IndicatorKind::Price { field } => Ok(security.series(field)),
            IndicatorKind::MovingAverage { span, field } => {
                basic::moving_average(&security.series(field), span)
            }
            IndicatorKind::RecentHigh { span, field } => {
                basic::recent_high(&security.series(field), span)
            }
            IndicatorKind::RecentLow { span, field } => {
                basic::recent_low(&security.series(field), span)
            }
            IndicatorKind::MaDirection { span, field } => {
                let ma = self.build(security, IndicatorKind::MovingAverage { span, field })?;
                Ok(signal::direction(ma.full_series()))
            }
            IndicatorKind::CrossOver {
                span_short,
                span_long,
                reverse,
            } => {
                let short = self.build(security, IndicatorKind::moving_average(span_short))?;
                let long = self.build(security, IndicatorKind::moving_average(span_long))?;
                if reverse {
                    Ok(signal::cross_up(long.full_series(), short.full_series()))
                } else {
                    Ok(signal::cross_up(short.full_series(), long.full_series()))
                }
            }
            IndicatorKind::CloseAboveRecentHigh { span } => {
                let high = self.build(security, IndicatorKind::recent_high(span))?;
                Ok(signal::close_above(
                    high.full_series(),
                    &security.series(PriceField::Close),
                ))
            }
            IndicatorKind::CloseBelowRecentLow { span } => {
                let low = self.build(security, IndicatorKind::recent_low(span))?;
                Ok(signal::close_below(
                    low.full_series(),
                    &security.series(PriceField::Close),
                ))
            }
            IndicatorKind::UpperBreakout { span } => {
                let above = self.build(security, IndicatorKind::CloseAboveRecentHigh { span })?;
                Ok(signal::first_true(above.full_series()))
            }
            IndicatorKind::LowerBreakout { span } => {
                let below = self.build(security, IndicatorKind::CloseBelowRecentLow { span })?;
                Ok(signal::first_true(below.full_series()))
            }
        }
    }
}
