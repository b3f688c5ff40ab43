//! Plugin registry: resolves component keys from rule and filter files to
//! their constructors.

use crate::domain::error::{PluginFamily, RuletraderError};
use crate::domain::filter::{self, Filter};
use crate::domain::indicator::{IndicatorKind, factory};
use crate::domain::order::RuleTiming;
use crate::domain::params::Params;
use crate::domain::rules::condition::{
    Breakout, MovingAverageCrossover, MovingAverageCrossoverSignal, MovingAverageDirection,
    OperatingCashFlowIncreasing,
};
use crate::domain::rules::entry::{BreakoutEntry, SimpleEntry};
use crate::domain::rules::exit::{HoldingPeriod, PriceMaCross, SimpleExit, TrailingStop};
use crate::domain::rules::{Condition, EntryRule, ExitRule};
use log::debug;
use std::cell::OnceCell;
use std::collections::HashMap;

pub type IndicatorFactory = fn(&Params) -> Result<IndicatorKind, RuletraderError>;
pub type ConditionFactory = fn(&Params) -> Result<Box<dyn Condition>, RuletraderError>;
pub type EntryRuleFactory =
    fn(&Params, RuleTiming) -> Result<Box<dyn EntryRule>, RuletraderError>;
pub type ExitRuleFactory = fn(&Params, RuleTiming) -> Result<Box<dyn ExitRule>, RuletraderError>;
pub type FilterFactory = fn(&Params) -> Result<Box<dyn Filter>, RuletraderError>;

/// Every constructor the registry can hand out, one table per family.
#[derive(Clone)]
pub struct PluginTables {
    pub indicators: Vec<(&'static str, IndicatorFactory)>,
    pub conditions: Vec<(&'static str, ConditionFactory)>,
    pub entry_rules: Vec<(&'static str, EntryRuleFactory)>,
    pub exit_rules: Vec<(&'static str, ExitRuleFactory)>,
    pub filters: Vec<(&'static str, FilterFactory)>,
}

impl PluginTables {
    pub fn builtin() -> Self {
        Self {
            indicators: vec![
                ("price", factory::price as IndicatorFactory),
                ("moving_average", factory::moving_average as IndicatorFactory),
                ("recent_high", factory::recent_high as IndicatorFactory),
                ("recent_low", factory::recent_low as IndicatorFactory),
                ("ma_direction", factory::ma_direction as IndicatorFactory),
                ("crossover", factory::crossover as IndicatorFactory),
                ("close_above_recent_high", factory::close_above_recent_high as IndicatorFactory),
                ("close_below_recent_low", factory::close_below_recent_low as IndicatorFactory),
                ("upper_breakout", factory::upper_breakout as IndicatorFactory),
                ("lower_breakout", factory::lower_breakout as IndicatorFactory),
            ],
            conditions: vec![
                ("ma_crossover", MovingAverageCrossover::from_params as ConditionFactory),
                ("ma_crossover_signal", MovingAverageCrossoverSignal::from_params as ConditionFactory),
                ("ma_direction", MovingAverageDirection::from_params as ConditionFactory),
                ("breakout", Breakout::from_params as ConditionFactory),
                (
                    "operating_cf_increasing",
                    OperatingCashFlowIncreasing::from_params as ConditionFactory,
                ),
            ],
            entry_rules: vec![
                ("simple", SimpleEntry::from_params as EntryRuleFactory),
                ("breakout", BreakoutEntry::from_params as EntryRuleFactory),
            ],
            exit_rules: vec![
                ("simple", SimpleExit::from_params as ExitRuleFactory),
                ("trailing_stop", TrailingStop::from_params as ExitRuleFactory),
                ("price_ma_cross", PriceMaCross::from_params as ExitRuleFactory),
                ("holding_period", HoldingPeriod::from_params as ExitRuleFactory),
            ],
            filters: vec![
                ("all_pass", filter::AllPass::from_params as FilterFactory),
                ("average_volume", filter::AverageVolume::from_params as FilterFactory),
                (
                    "operating_cf_increasing",
                    filter::OperatingCashFlowIncreasing::from_params as FilterFactory,
                ),
            ],
        }
    }
}

/// One family's table plus its lazily built key index.
struct Family<F: Copy> {
    family: PluginFamily,
    table: Vec<(&'static str, F)>,
    index: OnceCell<HashMap<&'static str, F>>,
}

impl<F: Copy> Family<F> {
    fn new(family: PluginFamily, table: Vec<(&'static str, F)>) -> Self {
        Self {
            family,
            table,
            index: OnceCell::new(),
        }
    }

    fn index(&self) -> Result<&HashMap<&'static str, F>, RuletraderError> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }
        let mut index = HashMap::with_capacity(self.table.len());
        for (key, ctor) in &self.table {
            if index.insert(*key, *ctor).is_some() {
                return Err(RuletraderError::DuplicateKey {
                    family: self.family,
                    key: key.to_string(),
                });
            }
        }
        debug!("indexed {} {}", index.len(), self.family);
        Ok(self.index.get_or_init(|| index))
    }

    fn resolve(&self, key: &str) -> Result<Option<F>, RuletraderError> {
        Ok(self.index()?.get(key).copied())
    }

    fn require(&self, key: &str) -> Result<F, RuletraderError> {
        self.resolve(key)?.ok_or_else(|| RuletraderError::UnknownKey {
            family: self.family,
            key: key.to_string(),
        })
    }

    fn wrap<T>(&self, key: &str, built: Result<T, RuletraderError>) -> Result<T, RuletraderError> {
        built.map_err(|cause| RuletraderError::NewInstance {
            family: self.family,
            key: key.to_string(),
            cause: Box::new(cause),
        })
    }

    fn keys(&self) -> Vec<&'static str> {
        self.table.iter().map(|(k, _)| *k).collect()
    }
}

pub struct Registry {
    indicators: Family<IndicatorFactory>,
    conditions: Family<ConditionFactory>,
    entry_rules: Family<EntryRuleFactory>,
    exit_rules: Family<ExitRuleFactory>,
    filters: Family<FilterFactory>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(PluginTables::builtin())
    }
}

impl Registry {
    pub fn new(tables: PluginTables) -> Self {
        Self {
            indicators: Family::new(PluginFamily::Indicators, tables.indicators),
            conditions: Family::new(PluginFamily::Conditions, tables.conditions),
            entry_rules: Family::new(PluginFamily::EntryRules, tables.entry_rules),
            exit_rules: Family::new(PluginFamily::ExitRules, tables.exit_rules),
            filters: Family::new(PluginFamily::Filters, tables.filters),
        }
    }

    pub fn resolve_indicator(&self, key: &str) -> Result<Option<IndicatorFactory>, RuletraderError> {
        self.indicators.resolve(key)
    }

    pub fn resolve_condition(&self, key: &str) -> Result<Option<ConditionFactory>, RuletraderError> {
        self.conditions.resolve(key)
    }

    pub fn resolve_entry_rule(&self, key: &str) -> Result<Option<EntryRuleFactory>, RuletraderError> {
        self.entry_rules.resolve(key)
    }

    pub fn resolve_exit_rule(&self, key: &str) -> Result<Option<ExitRuleFactory>, RuletraderError> {
        self.exit_rules.resolve(key)
    }

    pub fn resolve_filter(&self, key: &str) -> Result<Option<FilterFactory>, RuletraderError> {
        self.filters.resolve(key)
    }

    pub fn new_indicator(&self, key: &str, params: &Params) -> Result<IndicatorKind, RuletraderError> {
        let ctor = self.indicators.require(key)?;
        self.indicators.wrap(key, ctor(params))
    }

    pub fn new_condition(
        &self,
        key: &str,
        params: &Params,
    ) -> Result<Box<dyn Condition>, RuletraderError> {
        let ctor = self.conditions.require(key)?;
        self.conditions.wrap(key, ctor(params))
    }

    pub fn new_entry_rule(
        &self,
        key: &str,
        params: &Params,
        timing: RuleTiming,
    ) -> Result<Box<dyn EntryRule>, RuletraderError> {
        let ctor = self.entry_rules.require(key)?;
        self.entry_rules.wrap(key, ctor(params, timing))
    }

    pub fn new_exit_rule(
        &self,
        key: &str,
        params: &Params,
        timing: RuleTiming,
    ) -> Result<Box<dyn ExitRule>, RuletraderError> {
        let ctor = self.exit_rules.require(key)?;
        self.exit_rules.wrap(key, ctor(params, timing))
    }

    pub fn new_filter(&self, key: &str, params: &Params) -> Result<Box<dyn Filter>, RuletraderError> {
        let ctor = self.filters.require(key)?;
        self.filters.wrap(key, ctor(params))
    }

    /// Registered keys in table order.
    pub fn keys(&self, family: PluginFamily) -> Vec<&'static str> {
        match family {
            PluginFamily::Indicators => self.indicators.keys(),
            PluginFamily::Conditions => self.conditions.keys(),
            PluginFamily::EntryRules => self.entry_rules.keys(),
            PluginFamily::ExitRules => self.exit_rules.keys(),
            PluginFamily::Filters => self.filters.keys(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: serde_json::Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn builtin_keys_resolve() {
        let registry = Registry::default();
        for family in PluginFamily::ALL {
            for key in registry.keys(family) {
                let found = match family {
                    PluginFamily::Indicators => registry.resolve_indicator(key).unwrap().is_some(),
                    PluginFamily::Conditions => registry.resolve_condition(key).unwrap().is_some(),
                    PluginFamily::EntryRules => registry.resolve_entry_rule(key).unwrap().is_some(),
                    PluginFamily::ExitRules => registry.resolve_exit_rule(key).unwrap().is_some(),
                    PluginFamily::Filters => registry.resolve_filter(key).unwrap().is_some(),
                };
                assert!(found, "{family}/{key}");
            }
        }
    }

    #[test]
    fn unknown_key_resolves_to_none() {
        let registry = Registry::default();
        assert!(registry.resolve_condition("nope").unwrap().is_none());
        assert!(matches!(
            registry.new_condition("nope", &Params::new()),
            Err(RuletraderError::UnknownKey {
                family: PluginFamily::Conditions,
                ..
            })
        ));
    }

    #[test]
    fn constructor_failure_is_wrapped() {
        let registry = Registry::default();
        let err = registry
            .new_condition("ma_direction", &Params::new())
            .err()
            .unwrap();
        match err {
            RuletraderError::NewInstance { family, key, cause } => {
                assert_eq!(family, PluginFamily::Conditions);
                assert_eq!(key, "ma_direction");
                assert!(matches!(*cause, RuletraderError::Span { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn typed_params_accept_numeric_strings() {
        let registry = Registry::default();
        let kind = registry
            .new_indicator("moving_average", &params(json!({"span": "25"})))
            .unwrap();
        assert_eq!(kind, IndicatorKind::moving_average(25));

        let err = registry
            .new_indicator("moving_average", &params(json!({"span": "2.5"})))
            .unwrap_err();
        assert!(matches!(err, RuletraderError::NewInstance { .. }));
    }

    #[test]
    fn rules_take_timing() {
        let registry = Registry::default();
        let rule = registry
            .new_entry_rule("simple", &Params::new(), RuleTiming::Close)
            .unwrap();
        assert_eq!(rule.key(), "simple");
        assert_eq!(rule.timing(), RuleTiming::Close);

        let exit = registry
            .new_exit_rule("price_ma_cross", &params(json!({"span": 5})), RuleTiming::Close)
            .unwrap();
        assert_eq!(exit.timing(), RuleTiming::Open);
    }

    #[test]
    fn duplicate_key_is_reported_on_lookup() {
        let mut tables = PluginTables::builtin();
        tables
            .filters
            .push(("all_pass", filter::AllPass::from_params as FilterFactory));
        let registry = Registry::new(tables);

        assert!(registry.resolve_condition("breakout").unwrap().is_some());
        let err = registry.resolve_filter("average_volume").unwrap_err();
        assert!(err.is_invariant_violation());
        assert!(matches!(
            err,
            RuletraderError::DuplicateKey {
                family: PluginFamily::Filters,
                ..
            }
        ));
    }

    #[test]
    fn cash_flow_plugins_are_registered() {
        let registry = Registry::default();
        let growth = params(json!({"percentage": 5, "years": "3"}));
        let cond = registry
            .new_condition("operating_cf_increasing", &growth)
            .unwrap();
        assert_eq!(cond.key(), "operating_cf_increasing");
        let filter = registry.new_filter("operating_cf_increasing", &growth).unwrap();
        assert_eq!(filter.key(), "operating_cf_increasing");
    }

    #[test]
    fn keys_keep_table_order() {
        let registry = Registry::default();
        assert_eq!(
            registry.keys(PluginFamily::ExitRules),
            vec!["simple", "trailing_stop", "price_ma_cross", "holding_period"]
        );
    }
}
