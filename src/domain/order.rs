//! Order direction and intraday timing slots.

use crate::domain::error::RuletraderError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderType {
    Long,
    Short,
}

impl OrderType {
    pub const ALL: [OrderType; 2] = [OrderType::Long, OrderType::Short];

    /// Numeric codes used on the command line: 1 = long, 2 = short.
    pub fn from_code(code: i64) -> Result<Self, RuletraderError> {
        match code {
            1 => Ok(OrderType::Long),
            2 => Ok(OrderType::Short),
            other => Err(RuletraderError::OrderType {
                value: other.to_string(),
            }),
        }
    }

    /// Parses the LONG / SHORT tokens used in rule files.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "LONG" => Some(OrderType::Long),
            "SHORT" => Some(OrderType::Short),
            _ => None,
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Long => f.write_str("LONG"),
            OrderType::Short => f.write_str("SHORT"),
        }
    }
}

/// When during the day a rule trades. Ordering follows the trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleTiming {
    Open,
    Session,
    Close,
    Anytime,
}

impl RuleTiming {
    /// Concrete slots the backtester walks through each day.
    pub const SLOTS: [RuleTiming; 3] = [RuleTiming::Open, RuleTiming::Session, RuleTiming::Close];

    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "OPEN" => Some(RuleTiming::Open),
            "SESSION" => Some(RuleTiming::Session),
            "CLOSE" => Some(RuleTiming::Close),
            "ANYTIME" => Some(RuleTiming::Anytime),
            _ => None,
        }
    }

    /// Whether a rule with this affinity may trade in `slot`.
    pub fn matches(&self, slot: RuleTiming) -> bool {
        *self == RuleTiming::Anytime || *self == slot
    }
}

impl fmt::Display for RuleTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleTiming::Open => "OPEN",
            RuleTiming::Session => "SESSION",
            RuleTiming::Close => "CLOSE",
            RuleTiming::Anytime => "ANYTIME",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_type_from_code() {
        assert_eq!(OrderType::from_code(1).unwrap(), OrderType::Long);
        assert_eq!(OrderType::from_code(2).unwrap(), OrderType::Short);
        let err = OrderType::from_code(3).unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn order_type_tokens() {
        assert_eq!(OrderType::from_token("long"), Some(OrderType::Long));
        assert_eq!(OrderType::from_token("SHORT"), Some(OrderType::Short));
        assert_eq!(OrderType::from_token("hedge"), None);
    }

    #[test]
    fn timing_tokens() {
        assert_eq!(RuleTiming::from_token("open"), Some(RuleTiming::Open));
        assert_eq!(RuleTiming::from_token("SESSION"), Some(RuleTiming::Session));
        assert_eq!(RuleTiming::from_token("Close"), Some(RuleTiming::Close));
        assert_eq!(RuleTiming::from_token("ANYTIME"), Some(RuleTiming::Anytime));
        assert_eq!(RuleTiming::from_token("NOON"), None);
    }

    #[test]
    fn anytime_matches_every_slot() {
        for slot in RuleTiming::SLOTS {
            assert!(RuleTiming::Anytime.matches(slot));
        }
        assert!(RuleTiming::Open.matches(RuleTiming::Open));
        assert!(!RuleTiming::Open.matches(RuleTiming::Close));
    }

    #[test]
    fn slots_are_ordered_through_the_day() {
        assert!(RuleTiming::Open < RuleTiming::Session);
        assert!(RuleTiming::Session < RuleTiming::Close);
    }
}
