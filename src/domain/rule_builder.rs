//! Rule trees from `[rule.<name>]` configuration sections.
//!
//! ```ini
//! [rule.trend]
//! type = ewmac
//! variations = fast, slow
//!
//! [rule.fast]
//! type = ewmac
//! long_horizon = 16
//! short_horizon = 4
//! ```
//!
//! Sections may list at most three `variations`; a chain that comes back to
//! a section it started from is rejected.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::base_value::BaseValue;
use crate::domain::config_validation::{
    invalid, optional_double, optional_int, optional_string, require_string, split_list,
    subsystem_settings,
};
use crate::domain::error::{Context, ForecastError};
use crate::domain::forecast_config::ForecastConfig;
use crate::domain::rule::{ReferenceWindow, Rule, MAX_VARIATIONS};
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    Ewmac {
        long_horizon: usize,
        short_horizon: usize,
    },
    VolatilityDifference {
        lookback_window: usize,
    },
}

/// One parsed rule section.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSpec {
    pub name: String,
    pub kind: RuleKind,
    pub base_scale: f64,
    pub variations: Vec<String>,
}

pub fn rule_section(name: &str) -> String {
    format!("rule.{}", name)
}

/// Parse `[rule.<name>]`, defaulting its base scale to `default_base_scale`.
pub fn read_rule_spec(
    config: &dyn ConfigPort,
    name: &str,
    default_base_scale: f64,
) -> Result<RuleSpec, ForecastError> {
    let section = rule_section(name);
    let kind_name = require_string(config, &section, "type")?.to_lowercase();

    let variations = optional_string(config, &section, "variations")
        .map(|v| split_list(&v))
        .unwrap_or_default();
    if variations.len() > MAX_VARIATIONS {
        return Err(invalid(
            &section,
            "variations",
            format!(
                "at most {} variations allowed, got {}",
                MAX_VARIATIONS,
                variations.len()
            ),
        ));
    }

    let base_scale = optional_double(config, &section, "base_scale")?.unwrap_or(default_base_scale);
    if base_scale <= 0.0 || !base_scale.is_finite() {
        return Err(invalid(&section, "base_scale", "base_scale must be positive"));
    }

    let kind = match kind_name.as_str() {
        "ewmac" => {
            // parents blend variations and ignore their own horizons
            let leaf = variations.is_empty();
            let long_horizon = horizon(config, &section, "long_horizon", leaf)?;
            let short_horizon = horizon(config, &section, "short_horizon", leaf)?;
            if leaf && long_horizon <= short_horizon {
                return Err(invalid(
                    &section,
                    "long_horizon",
                    "long_horizon must exceed short_horizon",
                ));
            }
            RuleKind::Ewmac {
                long_horizon,
                short_horizon,
            }
        }
        "volatility_difference" | "voldiff" => RuleKind::VolatilityDifference {
            lookback_window: horizon(config, &section, "lookback_window", true)?,
        },
        other => {
            return Err(invalid(
                &section,
                "type",
                format!("unknown rule type '{}'", other),
            ));
        }
    };

    Ok(RuleSpec {
        name: name.to_string(),
        kind,
        base_scale,
        variations,
    })
}

fn horizon(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    required: bool,
) -> Result<usize, ForecastError> {
    match optional_int(config, section, key)? {
        Some(v) if v >= 2 => Ok(v as usize),
        Some(_) if required => Err(invalid(section, key, format!("{} must be at least 2", key))),
        Some(v) => Ok(v.max(0) as usize),
        None if required => Err(ForecastError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
        None => Ok(0),
    }
}

/// Parse every section reachable from `roots`, rejecting cycles.
pub fn resolve_specs(
    config: &dyn ConfigPort,
    roots: &[String],
    default_base_scale: f64,
) -> Result<BTreeMap<String, RuleSpec>, ForecastError> {
    let mut specs = BTreeMap::new();
    let mut path = Vec::new();
    for root in roots {
        visit(config, root, default_base_scale, &mut path, &mut specs)?;
    }
    Ok(specs)
}

fn visit(
    config: &dyn ConfigPort,
    name: &str,
    default_base_scale: f64,
    path: &mut Vec<String>,
    specs: &mut BTreeMap<String, RuleSpec>,
) -> Result<(), ForecastError> {
    if let Some(pos) = path.iter().position(|p| p == name) {
        let mut cycle: Vec<&str> = path[pos..].iter().map(String::as_str).collect();
        cycle.push(name);
        let parent = path.last().map(String::as_str).unwrap_or(name);
        return Err(invalid(
            &rule_section(parent),
            "variations",
            format!("variation cycle {}", cycle.join(" -> ")),
        ));
    }
    if specs.contains_key(name) {
        return Ok(());
    }

    let spec = read_rule_spec(config, name, default_base_scale)?;
    path.push(name.to_string());
    for variation in &spec.variations {
        visit(config, variation, default_base_scale, path, specs)?;
    }
    path.pop();
    specs.insert(name.to_string(), spec);
    Ok(())
}

/// Build the `[subsystem] rules` trees over `base_value`.
pub fn build_rules(
    config: &dyn ConfigPort,
    base_value: &Arc<BaseValue>,
    window: ReferenceWindow,
    forecast_config: &ForecastConfig,
) -> Result<Vec<Rule>, ForecastError> {
    let settings = subsystem_settings(config)?;
    let specs = resolve_specs(config, &settings.rules, settings.base_scale)?;
    settings
        .rules
        .iter()
        .map(|name| build_rule(name, &specs, base_value, window, forecast_config))
        .collect()
}

/// Build the tree rooted at `name` from already resolved specs.
pub fn build_rule(
    name: &str,
    specs: &BTreeMap<String, RuleSpec>,
    base_value: &Arc<BaseValue>,
    window: ReferenceWindow,
    forecast_config: &ForecastConfig,
) -> Result<Rule, ForecastError> {
    let spec = specs.get(name).ok_or_else(|| ForecastError::ConfigMissing {
        section: rule_section(name),
        key: "type".to_string(),
    })?;

    let variations = spec
        .variations
        .iter()
        .map(|v| build_rule(v, specs, base_value, window, forecast_config))
        .collect::<Result<Vec<_>, _>>()?;

    let rule = match spec.kind {
        RuleKind::Ewmac {
            long_horizon,
            short_horizon,
        } => Rule::ewmac(
            base_value,
            variations,
            window,
            long_horizon,
            short_horizon,
            spec.base_scale,
            forecast_config,
        ),
        RuleKind::VolatilityDifference { lookback_window } => Rule::volatility_difference(
            base_value,
            variations,
            window,
            lookback_window,
            spec.base_scale,
            None,
            forecast_config,
        ),
    };
    rule.context(format!("cannot build rule '{}'", name))
}
