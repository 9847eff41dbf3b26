//! Core domain types and logic.

pub mod error;
pub mod time_series;
pub mod alignment;
pub mod statistics;
pub mod indicator;
pub mod forecast_config;
pub mod base_value;
pub mod rule;
pub mod diversification;
pub mod subsystem;
pub mod metrics;
pub mod config_validation;
pub mod rule_builder;
