//! Core domain types and logic.

pub mod backtest;
pub mod config_validation;
pub mod error;
pub mod filter;
pub mod financial;
pub mod indicator;
pub mod order;
pub mod params;
pub mod position;
pub mod price_bar;
pub mod registry;
pub mod result;
pub mod rule_file;
pub mod rules;
pub mod security;
