//! Exponentially weighted moving average crossover.
//!
//! raw forecast = EWMA(short)[t] - EWMA(long)[t] over the base value's prices.

use std::sync::Arc;

use crate::domain::base_value::BaseValue;
use crate::domain::error::{Context, ForecastError};
use crate::domain::forecast_config::ForecastConfig;
use crate::domain::indicator::ewma::Ewma;
use crate::domain::rule::{RawForecast, ReferenceWindow, Rule, Signal};
use crate::domain::time_series::TimeSeries;

#[derive(Debug, Clone)]
pub struct Ewmac {
    long_horizon: usize,
    short_horizon: usize,
    /// (short, long); only leaves build them.
    averages: Option<(Ewma, Ewma)>,
}

impl Ewmac {
    /// Horizons are checked and averages built only for a leaf rule.
    pub fn new(
        prices: &TimeSeries,
        long_horizon: usize,
        short_horizon: usize,
        leaf: bool,
    ) -> Result<Self, ForecastError> {
        let averages = if leaf {
            if short_horizon < 2 {
                return Err(ForecastError::invalid(format!(
                    "short horizon must be at least 2, got {}",
                    short_horizon
                )));
            }
            if long_horizon <= short_horizon {
                return Err(ForecastError::invalid(format!(
                    "long horizon {} must exceed short horizon {}",
                    long_horizon, short_horizon
                )));
            }
            Some((
                Ewma::new(prices, short_horizon)?,
                Ewma::new(prices, long_horizon)?,
            ))
        } else {
            None
        };
        Ok(Ewmac {
            long_horizon,
            short_horizon,
            averages,
        })
    }

    pub fn long_horizon(&self) -> usize {
        self.long_horizon
    }

    pub fn short_horizon(&self) -> usize {
        self.short_horizon
    }

    pub fn short_ewma(&self) -> Option<&Ewma> {
        self.averages.as_ref().map(|(s, _)| s)
    }

    pub fn long_ewma(&self) -> Option<&Ewma> {
        self.averages.as_ref().map(|(_, l)| l)
    }
}

impl PartialEq for Ewmac {
    fn eq(&self, other: &Self) -> bool {
        self.long_horizon == other.long_horizon && self.short_horizon == other.short_horizon
    }
}

impl RawForecast for Ewmac {
    fn raw_forecast(&self, index: usize) -> f64 {
        match &self.averages {
            Some((short, long)) => short.value(index) - long.value(index),
            None => f64::NAN,
        }
    }
}

impl Rule {
    /// EWMAC rule over `base_value`, blending `variations` when any are given.
    pub fn ewmac(
        base_value: &Arc<BaseValue>,
        variations: Vec<Rule>,
        window: ReferenceWindow,
        long_horizon: usize,
        short_horizon: usize,
        base_scale: f64,
        config: &ForecastConfig,
    ) -> Result<Rule, ForecastError> {
        Rule::assemble(
            base_value,
            variations,
            window,
            base_scale,
            config,
            |leaf, _| {
                Ewmac::new(base_value.values(), long_horizon, short_horizon, leaf)
                    .map(Signal::Ewmac)
            },
        )
        .context(format!("invalid EWMAC({},{}) rule", long_horizon, short_horizon))
    }
}
