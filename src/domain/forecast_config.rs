//! Calibration constants passed to base values, rules and subsystems.

use crate::domain::error::ForecastError;

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastConfig {
    /// First value of a derived short index.
    pub short_index_start: f64,
    /// Horizon of the EWMA over squared returns behind the volatility series.
    pub volatility_horizon: usize,
    /// Cap on the one-step return fed into the short index.
    pub max_short_return: f64,
    /// Forecasts are clipped to `±forecast_cap * base_scale`.
    pub forecast_cap: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        ForecastConfig {
            short_index_start: 1000.0,
            volatility_horizon: 25,
            max_short_return: 0.5,
            forecast_cap: 2.0,
        }
    }
}

impl ForecastConfig {
    pub fn validate(&self) -> Result<(), ForecastError> {
        if self.short_index_start <= 0.0 || !self.short_index_start.is_finite() {
            return Err(ForecastError::invalid(
                "short index start must be positive and finite",
            ));
        }
        if self.volatility_horizon < 2 {
            return Err(ForecastError::invalid("volatility horizon must be at least 2"));
        }
        if self.max_short_return.is_nan() || self.max_short_return <= 0.0 {
            return Err(ForecastError::invalid("max short return must be positive"));
        }
        if self.forecast_cap <= 0.0 || !self.forecast_cap.is_finite() {
            return Err(ForecastError::invalid(
                "forecast cap must be positive and finite",
            ));
        }
        Ok(())
    }

    /// Largest absolute forecast for `base_scale`.
    pub fn forecast_limit(&self, base_scale: f64) -> f64 {
        self.forecast_cap * base_scale
    }
}
