//! Run configuration validation.
//!
//! Reads the `[data]`, `[forecast]` and `[subsystem]` sections into typed
//! settings, failing with `ConfigMissing`/`ConfigInvalid` before any series
//! is loaded. Rule sections are checked by [`crate::domain::rule_builder`].

use crate::domain::error::ForecastError;
use crate::domain::forecast_config::ForecastConfig;
use crate::domain::rule_builder;
use crate::ports::config_port::ConfigPort;
use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use std::path::PathBuf;

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Where and how to read the base value.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSettings {
    pub name: String,
    pub prices: PathBuf,
    pub short_index: Option<PathBuf>,
    pub delimiter: u8,
    pub decimal_comma: bool,
    pub date_format: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubsystemSettings {
    pub capital: f64,
    pub base_scale: f64,
    pub reference_start: NaiveDate,
    pub reference_end: NaiveDate,
    pub rules: Vec<String>,
    pub test_start: Option<NaiveDate>,
    pub test_end: Option<NaiveDate>,
}

/// Validate every section a backtest run needs, rule graph included.
pub fn validate_run_config(config: &dyn ConfigPort) -> Result<(), ForecastError> {
    data_settings(config)?;
    forecast_settings(config)?;
    let subsystem = subsystem_settings(config)?;
    rule_builder::resolve_specs(config, &subsystem.rules, subsystem.base_scale)?;
    Ok(())
}

pub fn data_settings(config: &dyn ConfigPort) -> Result<DataSettings, ForecastError> {
    let name = require_string(config, "data", "name")?;
    let prices = PathBuf::from(require_string(config, "data", "prices")?);
    let short_index = optional_string(config, "data", "short_index").map(PathBuf::from);

    let delimiter = match optional_string(config, "data", "delimiter") {
        None => b',',
        Some(d) => parse_delimiter(&d)?,
    };

    let decimal_comma = match optional_string(config, "data", "decimal_separator").as_deref() {
        None | Some(".") => false,
        Some(",") => true,
        Some(other) => {
            return Err(invalid(
                "data",
                "decimal_separator",
                format!("expected '.' or ',', got '{}'", other),
            ));
        }
    };
    if decimal_comma && delimiter == b',' {
        return Err(invalid(
            "data",
            "delimiter",
            "delimiter cannot be ',' when ',' is the decimal separator",
        ));
    }

    let date_format =
        optional_string(config, "data", "date_format").unwrap_or(DEFAULT_DATE_FORMAT.to_string());
    validate_date_format(&date_format)?;

    Ok(DataSettings {
        name,
        prices,
        short_index,
        delimiter,
        decimal_comma,
        date_format,
    })
}

/// `[forecast]` overrides on top of `ForecastConfig::default()`.
pub fn forecast_settings(config: &dyn ConfigPort) -> Result<ForecastConfig, ForecastError> {
    let defaults = ForecastConfig::default();

    let short_index_start = optional_double(config, "forecast", "short_index_start")?
        .unwrap_or(defaults.short_index_start);
    if short_index_start <= 0.0 || !short_index_start.is_finite() {
        return Err(invalid(
            "forecast",
            "short_index_start",
            "short_index_start must be positive",
        ));
    }

    let volatility_horizon = match optional_int(config, "forecast", "volatility_horizon")? {
        None => defaults.volatility_horizon,
        Some(h) if h >= 2 => h as usize,
        Some(_) => {
            return Err(invalid(
                "forecast",
                "volatility_horizon",
                "volatility_horizon must be at least 2",
            ));
        }
    };

    let max_short_return = optional_double(config, "forecast", "max_short_return")?
        .unwrap_or(defaults.max_short_return);
    if max_short_return.is_nan() || max_short_return <= 0.0 {
        return Err(invalid(
            "forecast",
            "max_short_return",
            "max_short_return must be positive",
        ));
    }

    let forecast_cap =
        optional_double(config, "forecast", "forecast_cap")?.unwrap_or(defaults.forecast_cap);
    if forecast_cap <= 0.0 || !forecast_cap.is_finite() {
        return Err(invalid(
            "forecast",
            "forecast_cap",
            "forecast_cap must be positive",
        ));
    }

    Ok(ForecastConfig {
        short_index_start,
        volatility_horizon,
        max_short_return,
        forecast_cap,
    })
}

pub fn subsystem_settings(config: &dyn ConfigPort) -> Result<SubsystemSettings, ForecastError> {
    let capital = require_double(config, "subsystem", "capital")?;
    if capital <= 0.0 || !capital.is_finite() {
        return Err(invalid("subsystem", "capital", "capital must be positive"));
    }
    let base_scale = require_double(config, "subsystem", "base_scale")?;
    if base_scale <= 0.0 || !base_scale.is_finite() {
        return Err(invalid(
            "subsystem",
            "base_scale",
            "base_scale must be positive",
        ));
    }

    let reference_start = require_date(config, "subsystem", "reference_start")?;
    let reference_end = require_date(config, "subsystem", "reference_end")?;
    if reference_start >= reference_end {
        return Err(invalid(
            "subsystem",
            "reference_start",
            "reference_start must be before reference_end",
        ));
    }

    let rules = split_list(&require_string(config, "subsystem", "rules")?);
    if rules.is_empty() {
        return Err(ForecastError::ConfigMissing {
            section: "subsystem".to_string(),
            key: "rules".to_string(),
        });
    }
    if let Some(dup) = rules
        .iter()
        .enumerate()
        .find_map(|(i, r)| rules[..i].contains(r).then_some(r))
    {
        return Err(invalid(
            "subsystem",
            "rules",
            format!("rule '{}' listed twice", dup),
        ));
    }

    let test_start = optional_date(config, "subsystem", "test_start")?;
    let test_end = optional_date(config, "subsystem", "test_end")?;
    if let (Some(start), Some(end)) = (test_start, test_end) {
        if start > end {
            return Err(invalid(
                "subsystem",
                "test_start",
                "test_start must not be after test_end",
            ));
        }
    }

    Ok(SubsystemSettings {
        capital,
        base_scale,
        reference_start,
        reference_end,
        rules,
        test_start,
        test_end,
    })
}

/// Comma-separated names, trimmed and lowercased, blanks dropped.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn parse_date_value(
    value: &str,
    section: &str,
    key: &str,
) -> Result<NaiveDate, ForecastError> {
    NaiveDate::parse_from_str(value.trim(), DEFAULT_DATE_FORMAT).map_err(|_| {
        invalid(
            section,
            key,
            format!("invalid {} format, expected YYYY-MM-DD", key),
        )
    })
}

pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> ForecastError {
    ForecastError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

pub(crate) fn optional_string(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) fn require_string(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, ForecastError> {
    optional_string(config, section, key).ok_or_else(|| ForecastError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    })
}

pub(crate) fn optional_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, ForecastError> {
    optional_string(config, section, key)
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| invalid(section, key, format!("'{}' is not a number", s)))
        })
        .transpose()
}

pub(crate) fn require_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<f64, ForecastError> {
    optional_double(config, section, key)?.ok_or_else(|| ForecastError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    })
}

pub(crate) fn optional_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<i64>, ForecastError> {
    optional_string(config, section, key)
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| invalid(section, key, format!("'{}' is not an integer", s)))
        })
        .transpose()
}

fn require_date(config: &dyn ConfigPort, section: &str, key: &str) -> Result<NaiveDate, ForecastError> {
    let value = require_string(config, section, key)?;
    parse_date_value(&value, section, key)
}

fn optional_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, ForecastError> {
    optional_string(config, section, key)
        .map(|s| parse_date_value(&s, section, key))
        .transpose()
}

fn parse_delimiter(value: &str) -> Result<u8, ForecastError> {
    let resolved = match value {
        "tab" | "\\t" => "\t",
        "semicolon" => ";",
        other => other,
    };
    match resolved.as_bytes() {
        [b] if b.is_ascii() && !b.is_ascii_alphanumeric() => Ok(*b),
        _ => Err(invalid(
            "data",
            "delimiter",
            format!("'{}' is not a single punctuation character", value),
        )),
    }
}

fn validate_date_format(format: &str) -> Result<(), ForecastError> {
    let has_error = StrftimeItems::new(format).any(|item| matches!(item, Item::Error));
    if has_error || !format.contains('%') {
        return Err(invalid(
            "data",
            "date_format",
            format!("'{}' is not a valid date format", format),
        ));
    }
    Ok(())
}
