//! Configuration validation.
//!
//! Checks every config value before a command runs, and parses the values
//! the commands need.

use crate::domain::backtest::DEFAULT_AMOUNT_PER_TRADE;
use crate::domain::error::RuletraderError;
use crate::domain::indicator::cache::DEFAULT_MAX_ENTRIES;
use crate::domain::order::OrderType;
use crate::domain::price_bar::DateRange;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), RuletraderError> {
    amount_per_trade(config)?;
    date_range(config)?;
    order_types(config)?;
    max_indicator_cache(config)?;
    Ok(())
}

/// `[data] dir`, required by every command that reads prices.
pub fn data_dir(config: &dyn ConfigPort) -> Result<String, RuletraderError> {
    match config.get_string("data", "dir") {
        Some(dir) if !dir.trim().is_empty() => Ok(dir),
        _ => Err(RuletraderError::ConfigMissing {
            section: "data".to_string(),
            key: "dir".to_string(),
        }),
    }
}

pub fn amount_per_trade(config: &dyn ConfigPort) -> Result<f64, RuletraderError> {
    let Some(raw) = config.get_string("backtest", "amount_per_trade") else {
        return Ok(DEFAULT_AMOUNT_PER_TRADE);
    };
    match raw.trim().parse::<f64>() {
        Ok(v) if v > 0.0 && v.is_finite() => Ok(v),
        _ => Err(invalid(
            "backtest",
            "amount_per_trade",
            "amount_per_trade must be a positive number",
        )),
    }
}

pub fn date_range(config: &dyn ConfigPort) -> Result<DateRange, RuletraderError> {
    let start = parse_date(config, "start_date")?;
    let end = parse_date(config, "end_date")?;
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(invalid(
                "backtest",
                "start_date",
                "start_date must not be after end_date",
            ));
        }
    }
    Ok(DateRange::new(start, end))
}

fn parse_date(config: &dyn ConfigPort, key: &str) -> Result<Option<NaiveDate>, RuletraderError> {
    let Some(raw) = config.get_string("backtest", key) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map(Some)
        .map_err(|_| invalid("backtest", key, &format!("{key} must be YYYY-MM-DD")))
}

/// `[backtest] order_types` as a comma list of LONG / SHORT; both when unset.
pub fn order_types(config: &dyn ConfigPort) -> Result<Vec<OrderType>, RuletraderError> {
    let Some(raw) = config.get_string("backtest", "order_types") else {
        return Ok(OrderType::ALL.to_vec());
    };
    let mut out = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let order_type = OrderType::from_token(token).ok_or_else(|| {
            invalid(
                "backtest",
                "order_types",
                &format!("unknown order type '{token}', expected LONG or SHORT"),
            )
        })?;
        if !out.contains(&order_type) {
            out.push(order_type);
        }
    }
    if out.is_empty() {
        return Err(invalid(
            "backtest",
            "order_types",
            "at least one order type is required",
        ));
    }
    Ok(out)
}

pub fn max_indicator_cache(config: &dyn ConfigPort) -> Result<usize, RuletraderError> {
    let Some(raw) = config.get_string("engine", "max_indicator_cache") else {
        return Ok(DEFAULT_MAX_ENTRIES);
    };
    raw.trim().parse::<usize>().map_err(|_| {
        invalid(
            "engine",
            "max_indicator_cache",
            "max_indicator_cache must be a non-negative integer",
        )
    })
}

fn invalid(section: &str, key: &str, reason: &str) -> RuletraderError {
    RuletraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn assert_invalid(content: &str, expected_key: &str) {
        let config = make_config(content);
        match validate_config(&config) {
            Err(RuletraderError::ConfigInvalid { key, .. }) => assert_eq!(key, expected_key),
            other => panic!("expected ConfigInvalid for {expected_key}, got {other:?}"),
        }
    }

    #[test]
    fn valid_config_passes() {
        let config = make_config(
            r#"
[data]
dir = data

[backtest]
amount_per_trade = 10000
start_date = 2015-01-01
end_date = 2020-12-31
order_types = LONG, short

[engine]
max_indicator_cache = 0
"#,
        );
        assert!(validate_config(&config).is_ok());
        assert_eq!(data_dir(&config).unwrap(), "data");
        assert!((amount_per_trade(&config).unwrap() - 10000.0).abs() < f64::EPSILON);
        assert_eq!(
            order_types(&config).unwrap(),
            vec![OrderType::Long, OrderType::Short]
        );
        assert_eq!(max_indicator_cache(&config).unwrap(), 0);
        let range = date_range(&config).unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2015, 1, 1));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = make_config("[backtest]\n");
        assert!(validate_config(&config).is_ok());
        assert!((amount_per_trade(&config).unwrap() - 5000.0).abs() < f64::EPSILON);
        assert_eq!(order_types(&config).unwrap(), OrderType::ALL.to_vec());
        assert_eq!(max_indicator_cache(&config).unwrap(), 1000);
        assert_eq!(date_range(&config).unwrap(), DateRange::unbounded());
    }

    #[test]
    fn missing_data_dir_fails() {
        let config = make_config("[backtest]\n");
        assert!(matches!(
            data_dir(&config),
            Err(RuletraderError::ConfigMissing { .. })
        ));
    }

    #[test]
    fn amount_per_trade_must_be_positive() {
        assert_invalid("[backtest]\namount_per_trade = 0\n", "amount_per_trade");
        assert_invalid("[backtest]\namount_per_trade = -5\n", "amount_per_trade");
        assert_invalid("[backtest]\namount_per_trade = lots\n", "amount_per_trade");
    }

    #[test]
    fn invalid_start_date_format_fails() {
        assert_invalid("[backtest]\nstart_date = 01/02/2020\n", "start_date");
    }

    #[test]
    fn start_date_after_end_date_fails() {
        assert_invalid(
            "[backtest]\nstart_date = 2021-01-01\nend_date = 2020-01-01\n",
            "start_date",
        );
    }

    #[test]
    fn unknown_order_type_fails() {
        assert_invalid("[backtest]\norder_types = LONG, FLAT\n", "order_types");
    }

    #[test]
    fn negative_cache_size_fails() {
        assert_invalid("[engine]\nmax_indicator_cache = -1\n", "max_indicator_cache");
    }
}
