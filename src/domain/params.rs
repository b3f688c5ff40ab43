//! Typed access to plugin parameters read from rule and filter files.
//!
//! Values may arrive as JSON numbers or as numeric strings (`"25"`, `"1.5"`),
//! the latter coming from `key=value` pairs on the command line.

use crate::domain::error::RuletraderError;
use crate::domain::price_bar::PriceField;
use serde_json::Value;

pub type Params = serde_json::Map<String, Value>;

pub struct ParamReader<'a> {
    params: &'a Params,
}

impl<'a> ParamReader<'a> {
    pub fn new(params: &'a Params) -> Self {
        Self { params }
    }

    fn get(&self, name: &str) -> Option<&'a Value> {
        self.params.get(name).filter(|v| !v.is_null())
    }

    pub fn usize(&self, name: &str) -> Result<usize, RuletraderError> {
        match self.get(name) {
            Some(v) => as_usize(v).ok_or_else(|| non_negative(name)),
            None => Err(non_negative(name)),
        }
    }

    pub fn usize_or(&self, name: &str, default: usize) -> Result<usize, RuletraderError> {
        match self.get(name) {
            Some(v) => as_usize(v).ok_or_else(|| non_negative(name)),
            None => Ok(default),
        }
    }

    /// The window length; a missing span is reported as a span error.
    pub fn span(&self) -> Result<usize, RuletraderError> {
        match self.get("span") {
            Some(_) => self.usize("span"),
            None => Err(RuletraderError::Span {
                reason: "span is required".into(),
            }),
        }
    }

    pub fn f64(&self, name: &str) -> Result<f64, RuletraderError> {
        self.get(name)
            .and_then(as_f64)
            .ok_or_else(|| RuletraderError::argument(name, "a number"))
    }

    pub fn f64_or(&self, name: &str, default: f64) -> Result<f64, RuletraderError> {
        match self.get(name) {
            Some(v) => as_f64(v).ok_or_else(|| RuletraderError::argument(name, "a number")),
            None => Ok(default),
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool, RuletraderError> {
        match self.get(name) {
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(RuletraderError::argument(name, "true or false")),
            },
            Some(_) => Err(RuletraderError::argument(name, "true or false")),
            None => Ok(default),
        }
    }

    pub fn price_field_or(
        &self,
        name: &str,
        default: PriceField,
    ) -> Result<PriceField, RuletraderError> {
        match self.get(name) {
            Some(Value::String(s)) => s
                .parse()
                .map_err(|_| RuletraderError::argument(name, "one of open, high, low, close")),
            Some(_) => Err(RuletraderError::argument(
                name,
                "one of open, high, low, close",
            )),
            None => Ok(default),
        }
    }
}

fn non_negative(name: &str) -> RuletraderError {
    RuletraderError::argument(name, "a non-negative integer")
}

fn as_usize(v: &Value) -> Option<usize> {
    match v {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) if is_integer(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if is_integer(s) || is_decimal(s) => s.parse().ok(),
        _ => None,
    }
}

fn is_integer(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_decimal(s: &str) -> bool {
    let unsigned = s.strip_prefix('-').unwrap_or(s);
    match unsigned.split_once('.') {
        Some((whole, frac)) => is_integer(whole) && is_integer(frac),
        None => false,
    }
}

/// Parses `k=v,k=v` pairs from the command line into parameters.
pub fn parse_pairs(text: &str) -> Result<Params, RuletraderError> {
    let mut params = Params::new();
    for pair in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (k, v) = pair
            .split_once('=')
            .ok_or_else(|| RuletraderError::argument(pair, "written as key=value"))?;
        params.insert(k.trim().to_string(), Value::String(v.trim().to_string()));
    }
    Ok(params)
}
