//! Volatility indicators.
//!
//! `rolling_stddev`: standard deviation of the trailing `window` values
//! ending at each point. Warmup: first (window-1) points are NaN.
//!
//! `return_volatility`: EWMA of squared one-step returns, square-rooted and
//! scaled back to price units. One point shorter than the price series.

use crate::domain::error::ForecastError;
use crate::domain::indicator::ewma::{calculate_ewma, decay_for};
use crate::domain::statistics::Statistics;
use crate::domain::time_series::TimeSeries;

pub fn rolling_stddev(values: &[f64], window: usize, stats: &dyn Statistics) -> Vec<f64> {
    let warmup = window.saturating_sub(1);
    (0..values.len())
        .map(|i| {
            if window == 0 || i < warmup {
                f64::NAN
            } else {
                stats.standard_deviation(&values[i + 1 - window..=i])
            }
        })
        .collect()
}

/// Squared one-step returns `(V[t+1]/V[t] - 1)^2`; NaN where `V[t]` is zero.
pub fn squared_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| {
            if w[0] == 0.0 {
                f64::NAN
            } else {
                let r = w[1] / w[0] - 1.0;
                r * r
            }
        })
        .collect()
}

/// Volatility in price units on `prices.dates()[1..]`.
pub fn return_volatility(prices: &TimeSeries, horizon: usize) -> Result<TimeSeries, ForecastError> {
    let decay = decay_for(horizon)?;
    if prices.len() < 2 {
        return Ok(TimeSeries::empty());
    }
    let smoothed = calculate_ewma(&squared_returns(prices.values()), decay);
    let values = smoothed
        .iter()
        .zip(prices.values()[1..].iter())
        .map(|(var, price)| var.sqrt() * price)
        .collect();
    TimeSeries::new(prices.dates()[1..].to_vec(), values)
}
