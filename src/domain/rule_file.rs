//! Rule and filter files.
//!
//! A rule file is a JSON document listing entry and exit groups. Each group
//! carries a direction, zero or more conditions and exactly one rule; every
//! component names its registry key plus its own parameters:
//!
//! ```json
//! {"entry_groups": [{"order_type": "LONG",
//!                    "conditions": [{"key": "ma_direction", "span": 25}],
//!                    "rule": {"key": "simple", "timing": "OPEN"}}],
//!  "exit_groups":  [{"order_type": "LONG",
//!                    "rule": {"key": "trailing_stop", "percentage": 5}}]}
//! ```

use crate::domain::error::RuletraderError;
use crate::domain::filter::FilterChain;
use crate::domain::indicator::IndicatorEngine;
use crate::domain::order::{OrderType, RuleTiming};
use crate::domain::params::Params;
use crate::domain::registry::Registry;
use crate::domain::rules::{Condition, EntryRule, ExitRule};
use crate::domain::security::Security;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::rc::Rc;

#[derive(Debug, Deserialize)]
struct RuleDoc {
    #[serde(default)]
    entry_groups: Vec<GroupDoc>,
    #[serde(default)]
    exit_groups: Vec<GroupDoc>,
}

#[derive(Debug, Deserialize)]
struct GroupDoc {
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    order_type: String,
    #[serde(default)]
    conditions: Vec<ComponentDoc>,
    rule: Option<ComponentDoc>,
}

#[derive(Debug, Deserialize)]
struct ComponentDoc {
    #[serde(alias = "findkey")]
    key: String,
    #[serde(flatten)]
    params: Params,
}

#[derive(Debug, Deserialize)]
struct FilterDoc {
    #[serde(default)]
    filters: Vec<ComponentDoc>,
}

fn enabled_by_default() -> bool {
    true
}

pub struct EntryGroup {
    /// 1-based position of the group in its file.
    pub id: usize,
    pub order_type: OrderType,
    pub conditions: Vec<Box<dyn Condition>>,
    pub rule: Box<dyn EntryRule>,
}

pub struct ExitGroup {
    /// 1-based position of the group in its file.
    pub id: usize,
    pub order_type: OrderType,
    pub conditions: Vec<Box<dyn Condition>>,
    pub rule: Box<dyn ExitRule>,
}

/// The entry and exit groups of one rule file, built from the registry.
pub struct RuleSet {
    pub name: String,
    pub entry_groups: Vec<EntryGroup>,
    pub exit_groups: Vec<ExitGroup>,
}

impl RuleSet {
    pub fn load(path: &Path, registry: &Registry) -> Result<Self, RuletraderError> {
        let text = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_json(&name, &text, registry).map_err(|e| match e {
            RuletraderError::RuleFile { reason, .. } => RuletraderError::RuleFile {
                file: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_json(name: &str, text: &str, registry: &Registry) -> Result<Self, RuletraderError> {
        let doc: RuleDoc = serde_json::from_str(text).map_err(|e| rule_file(name, e))?;

        let mut entry_groups = Vec::new();
        for (i, group) in doc.entry_groups.into_iter().enumerate() {
            if !group.enabled {
                continue;
            }
            let (order_type, conditions, mut rule) = split_group(name, group, registry)?;
            let timing = take_timing(name, &mut rule.params)?;
            entry_groups.push(EntryGroup {
                id: i + 1,
                order_type,
                conditions,
                rule: registry.new_entry_rule(&rule.key, &rule.params, timing)?,
            });
        }

        let mut exit_groups = Vec::new();
        for (i, group) in doc.exit_groups.into_iter().enumerate() {
            if !group.enabled {
                continue;
            }
            let (order_type, conditions, mut rule) = split_group(name, group, registry)?;
            let timing = take_timing(name, &mut rule.params)?;
            exit_groups.push(ExitGroup {
                id: i + 1,
                order_type,
                conditions,
                rule: registry.new_exit_rule(&rule.key, &rule.params, timing)?,
            });
        }

        if entry_groups.is_empty() {
            return Err(RuletraderError::RuleFile {
                file: name.to_string(),
                reason: "no enabled entry group".into(),
            });
        }
        if exit_groups.is_empty() {
            return Err(RuletraderError::RuleFile {
                file: name.to_string(),
                reason: "no enabled exit group".into(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            entry_groups,
            exit_groups,
        })
    }

    /// Points every condition and rule at `security`, computing their
    /// indicators through `engine`.
    pub fn bind_security(
        &mut self,
        security: &Rc<Security>,
        engine: &mut IndicatorEngine,
    ) -> Result<(), RuletraderError> {
        for group in &mut self.entry_groups {
            group.rule.bind_security(security, engine)?;
            for cond in &mut group.conditions {
                cond.bind_security(security, engine)?;
            }
        }
        for group in &mut self.exit_groups {
            group.rule.bind_security(security, engine)?;
            for cond in &mut group.conditions {
                cond.bind_security(security, engine)?;
            }
        }
        Ok(())
    }
}

type SplitGroup = (OrderType, Vec<Box<dyn Condition>>, ComponentDoc);

fn split_group(name: &str, group: GroupDoc, registry: &Registry) -> Result<SplitGroup, RuletraderError> {
    let order_type =
        OrderType::from_token(&group.order_type).ok_or_else(|| RuletraderError::RuleFile {
            file: name.to_string(),
            reason: format!("unknown order type '{}'", group.order_type),
        })?;
    let rule = group.rule.ok_or_else(|| RuletraderError::RuleFile {
        file: name.to_string(),
        reason: "group has no rule".into(),
    })?;
    let conditions = group
        .conditions
        .iter()
        .map(|c| registry.new_condition(&c.key, &c.params))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((order_type, conditions, rule))
}

/// Reads the `timing` token from a rule's parameters; ANYTIME when absent.
fn take_timing(name: &str, params: &mut Params) -> Result<RuleTiming, RuletraderError> {
    match params.remove("timing") {
        None | Some(Value::Null) => Ok(RuleTiming::Anytime),
        Some(Value::String(token)) => {
            RuleTiming::from_token(&token).ok_or_else(|| RuletraderError::RuleFile {
                file: name.to_string(),
                reason: format!("unknown timing '{token}'"),
            })
        }
        Some(other) => Err(RuletraderError::RuleFile {
            file: name.to_string(),
            reason: format!("timing must be a string, got {other}"),
        }),
    }
}

fn rule_file(name: &str, err: serde_json::Error) -> RuletraderError {
    RuletraderError::RuleFile {
        file: name.to_string(),
        reason: err.to_string(),
    }
}

pub fn filter_chain_from_json(
    name: &str,
    text: &str,
    registry: &Registry,
) -> Result<FilterChain, RuletraderError> {
    let doc: FilterDoc = serde_json::from_str(text).map_err(|e| rule_file(name, e))?;
    let filters = doc
        .filters
        .iter()
        .map(|f| registry.new_filter(&f.key, &f.params))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FilterChain::new(name, filters))
}

pub fn load_filter_chain(path: &Path, registry: &Registry) -> Result<FilterChain, RuletraderError> {
    let text = std::fs::read_to_string(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    filter_chain_from_json(&name, &text, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::PluginFamily;

    const BASIC: &str = r#"{
        "entry_groups": [
            {"order_type": "LONG",
             "conditions": [{"key": "ma_direction", "span": 5}],
             "rule": {"key": "simple", "timing": "OPEN"}},
            {"enabled": false, "order_type": "SHORT",
             "rule": {"key": "simple"}},
            {"order_type": "short",
             "rule": {"findkey": "breakout", "span": "10", "timing": "session"}}
        ],
        "exit_groups": [
            {"order_type": "LONG", "rule": {"key": "trailing_stop", "percentage": 5}},
            {"order_type": "SHORT", "rule": {"key": "holding_period", "period": 3, "timing": "OPEN"}}
        ]
    }"#;

    #[test]
    fn parses_groups_and_skips_disabled() {
        let rules = RuleSet::from_json("basic", BASIC, &Registry::default()).unwrap();
        assert_eq!(rules.name, "basic");
        assert_eq!(rules.entry_groups.len(), 2);
        assert_eq!(rules.exit_groups.len(), 2);

        let first = &rules.entry_groups[0];
        assert_eq!(first.id, 1);
        assert_eq!(first.order_type, OrderType::Long);
        assert_eq!(first.conditions.len(), 1);
        assert_eq!(first.rule.timing(), RuleTiming::Open);

        let third = &rules.entry_groups[1];
        assert_eq!(third.id, 3);
        assert_eq!(third.order_type, OrderType::Short);
        assert_eq!(third.rule.key(), "breakout");
        assert_eq!(third.rule.timing(), RuleTiming::Session);

        assert_eq!(rules.exit_groups[0].rule.timing(), RuleTiming::Anytime);
    }

    #[test]
    fn no_enabled_entry_group_is_rejected() {
        let text = r#"{"entry_groups": [{"enabled": false, "order_type": "LONG", "rule": {"key": "simple"}}],
                       "exit_groups": [{"order_type": "LONG", "rule": {"key": "simple"}}]}"#;
        let err = RuleSet::from_json("x", text, &Registry::default()).err().unwrap();
        assert!(matches!(err, RuletraderError::RuleFile { .. }));
    }

    #[test]
    fn missing_exit_groups_are_rejected() {
        let text = r#"{"entry_groups": [{"order_type": "LONG", "rule": {"key": "simple"}}]}"#;
        let err = RuleSet::from_json("x", text, &Registry::default()).err().unwrap();
        assert!(err.to_string().contains("no enabled exit group"));
    }

    #[test]
    fn unknown_tokens_are_rule_file_errors() {
        let bad_timing = r#"{"entry_groups": [{"order_type": "LONG", "rule": {"key": "simple", "timing": "NOON"}}],
                             "exit_groups": [{"order_type": "LONG", "rule": {"key": "simple"}}]}"#;
        assert!(matches!(
            RuleSet::from_json("x", bad_timing, &Registry::default()).err().unwrap(),
            RuletraderError::RuleFile { .. }
        ));

        let bad_order = r#"{"entry_groups": [{"order_type": "SIDEWAYS", "rule": {"key": "simple"}}],
                            "exit_groups": [{"order_type": "LONG", "rule": {"key": "simple"}}]}"#;
        assert!(matches!(
            RuleSet::from_json("x", bad_order, &Registry::default()).err().unwrap(),
            RuletraderError::RuleFile { .. }
        ));
    }

    #[test]
    fn unknown_component_key_surfaces_registry_error() {
        let text = r#"{"entry_groups": [{"order_type": "LONG", "rule": {"key": "teleport"}}],
                       "exit_groups": [{"order_type": "LONG", "rule": {"key": "simple"}}]}"#;
        let err = RuleSet::from_json("x", text, &Registry::default()).err().unwrap();
        assert!(matches!(
            err,
            RuletraderError::UnknownKey {
                family: PluginFamily::EntryRules,
                ..
            }
        ));
    }

    #[test]
    fn group_without_rule_is_rejected() {
        let text = r#"{"entry_groups": [{"order_type": "LONG"}],
                       "exit_groups": [{"order_type": "LONG", "rule": {"key": "simple"}}]}"#;
        let err = RuleSet::from_json("x", text, &Registry::default()).err().unwrap();
        assert!(err.to_string().contains("group has no rule"));
    }

    #[test]
    fn filter_file_builds_chain() {
        let text = r#"{"filters": [{"key": "all_pass"}, {"key": "average_volume", "volume": 1000}]}"#;
        let chain = filter_chain_from_json("default", text, &Registry::default()).unwrap();
        assert_eq!(chain.keys(), vec!["all_pass", "average_volume"]);
    }
}
