//! Volatility differential signal.
//!
//! raw forecast = average volatility over the reference window minus the
//! volatility index at t. The index is the rolling standard deviation of the
//! trailing `lookback_window` prices unless one is supplied.

use std::sync::Arc;

use crate::domain::base_value::BaseValue;
use crate::domain::error::{Context, ForecastError};
use crate::domain::forecast_config::ForecastConfig;
use crate::domain::indicator::stddev::rolling_stddev;
use crate::domain::rule::{RawForecast, ReferenceWindow, Rule, Signal};
use crate::domain::statistics::{mean, SampleStatistics, Statistics};
use crate::domain::time_series::TimeSeries;

#[derive(Debug, Clone)]
pub struct VolatilityDifference {
    lookback_window: usize,
    volatility_indices: TimeSeries,
    average_volatility: f64,
}

impl VolatilityDifference {
    /// `window_bounds` are the reference window's price indices.
    pub fn new(
        prices: &TimeSeries,
        window_bounds: (usize, usize),
        lookback_window: usize,
        volatility_indices: Option<TimeSeries>,
    ) -> Result<Self, ForecastError> {
        if lookback_window < 2 {
            return Err(ForecastError::invalid(format!(
                "lookback window must be at least 2, got {}",
                lookback_window
            )));
        }
        let (start, end) = window_bounds;
        if start < lookback_window - 1 {
            return Err(ForecastError::invalid(format!(
                "window starts at index {} before the first full lookback at {}",
                start,
                lookback_window - 1
            )));
        }

        let volatility_indices = match volatility_indices {
            Some(supplied) => {
                if supplied.dates() != prices.dates() {
                    return Err(ForecastError::invalid(
                        "volatility indices are not aligned with the base value",
                    ));
                }
                if supplied.values()[start..=end].iter().any(|v| v.is_nan()) {
                    return Err(ForecastError::invalid(
                        "volatility indices contain NaN inside the reference window",
                    ));
                }
                supplied
            }
            None => Self::compute_indices(prices, lookback_window, &SampleStatistics)?,
        };

        let average_volatility = mean(&volatility_indices.values()[start..=end]);
        Ok(VolatilityDifference {
            lookback_window,
            volatility_indices,
            average_volatility,
        })
    }

    /// Rolling standard deviation of the trailing `lookback_window` prices.
    pub fn compute_indices(
        prices: &TimeSeries,
        lookback_window: usize,
        stats: &dyn Statistics,
    ) -> Result<TimeSeries, ForecastError> {
        let values = rolling_stddev(prices.values(), lookback_window, stats);
        TimeSeries::new(prices.dates().to_vec(), values)
    }

    pub fn lookback_window(&self) -> usize {
        self.lookback_window
    }

    pub fn volatility_indices(&self) -> &TimeSeries {
        &self.volatility_indices
    }

    pub fn average_volatility(&self) -> f64 {
        self.average_volatility
    }
}

impl PartialEq for VolatilityDifference {
    fn eq(&self, other: &Self) -> bool {
        self.lookback_window == other.lookback_window
            && self.volatility_indices.identical(&other.volatility_indices)
    }
}

impl RawForecast for VolatilityDifference {
    fn raw_forecast(&self, index: usize) -> f64 {
        self.average_volatility - self.volatility_indices.values()[index]
    }
}

impl Rule {
    /// Volatility difference rule, optionally over pre-aligned `volatility_indices`.
    pub fn volatility_difference(
        base_value: &Arc<BaseValue>,
        variations: Vec<Rule>,
        window: ReferenceWindow,
        lookback_window: usize,
        base_scale: f64,
        volatility_indices: Option<TimeSeries>,
        config: &ForecastConfig,
    ) -> Result<Rule, ForecastError> {
        Rule::assemble(
            base_value,
            variations,
            window,
            base_scale,
            config,
            |_, bounds| {
                VolatilityDifference::new(
                    base_value.values(),
                    bounds,
                    lookback_window,
                    volatility_indices,
                )
                .map(Signal::VolatilityDifference)
            },
        )
        .context(format!("invalid VOLDIFF({}) rule", lookback_window))
    }
}
