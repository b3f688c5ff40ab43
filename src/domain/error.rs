//! Domain error types.

use std::fmt;

/// Raised when an indicator or price lookup falls outside the available
/// history or lands on a not-a-number value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no data available")]
pub struct NoDataError;

/// Misuse of a position's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("position is still open")]
    NotClosed,
    #[error("position is already closed")]
    AlreadyClosed,
}

/// Plugin families known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginFamily {
    Indicators,
    Conditions,
    EntryRules,
    ExitRules,
    Filters,
}

impl PluginFamily {
    pub const ALL: [PluginFamily; 5] = [
        PluginFamily::Indicators,
        PluginFamily::Conditions,
        PluginFamily::EntryRules,
        PluginFamily::ExitRules,
        PluginFamily::Filters,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginFamily::Indicators => "indicators",
            PluginFamily::Conditions => "conditions",
            PluginFamily::EntryRules => "entry_rules",
            PluginFamily::ExitRules => "exit_rules",
            PluginFamily::Filters => "filters",
        }
    }
}

impl fmt::Display for PluginFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for ruletrader.
#[derive(Debug, thiserror::Error)]
pub enum RuletraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid rule file {file}: {reason}")]
    RuleFile { file: String, reason: String },

    #[error("argument [{name}] must be {expected}")]
    Argument { name: String, expected: String },

    #[error("invalid span: {reason}")]
    Span { reason: String },

    #[error("no {family} registered under key '{key}'")]
    UnknownKey { family: PluginFamily, key: String },

    #[error("failed to create {family} '{key}': {cause}")]
    NewInstance {
        family: PluginFamily,
        key: String,
        cause: Box<RuletraderError>,
    },

    #[error("duplicate key '{key}' in {family}")]
    DuplicateKey { family: PluginFamily, key: String },

    #[error("unknown order type: {value}")]
    OrderType { value: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no data for {symbol} at bar {index}")]
    NoData { symbol: String, index: usize },

    #[error(transparent)]
    Position(#[from] PositionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl RuletraderError {
    /// Errors that indicate a defect in the program rather than in its input.
    pub fn is_invariant_violation(&self) -> bool {
        match self {
            RuletraderError::DuplicateKey { .. }
            | RuletraderError::OrderType { .. }
            | RuletraderError::Position(_) => true,
            RuletraderError::NewInstance { cause, .. } => cause.is_invariant_violation(),
            _ => false,
        }
    }

    pub fn argument(name: &str, expected: &str) -> Self {
        RuletraderError::Argument {
            name: name.to_string(),
            expected: expected.to_string(),
        }
    }
}

impl From<&RuletraderError> for std::process::ExitCode {
    fn from(err: &RuletraderError) -> Self {
        if err.is_invariant_violation() {
            return std::process::ExitCode::from(70);
        }
        let code: u8 = match err {
            RuletraderError::Io(_) => 1,
            RuletraderError::ConfigParse { .. }
            | RuletraderError::ConfigMissing { .. }
            | RuletraderError::ConfigInvalid { .. } => 2,
            RuletraderError::Data { .. } | RuletraderError::Csv(_) => 3,
            RuletraderError::RuleFile { .. }
            | RuletraderError::Json(_)
            | RuletraderError::Argument { .. }
            | RuletraderError::Span { .. }
            | RuletraderError::UnknownKey { .. }
            | RuletraderError::NewInstance { .. } => 4,
            RuletraderError::NoData { .. } => 5,
            RuletraderError::DuplicateKey { .. }
            | RuletraderError::OrderType { .. }
            | RuletraderError::Position(_) => 70,
        };
        std::process::ExitCode::from(code)
    }
}
