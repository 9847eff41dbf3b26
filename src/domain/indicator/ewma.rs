//! Exponentially weighted moving average.
//!
//! decay = 2/(horizon+1), EWMA[t] = decay*x[t] + EWMA[t-1]*(1-decay),
//! starting from a running state of 0. A NaN input yields NaN and resets
//! the running state to 0, so smoothing restarts from zero after a gap.

use crate::domain::error::ForecastError;
use crate::domain::time_series::TimeSeries;

#[derive(Debug, Clone)]
pub struct Ewma {
    horizon: usize,
    decay: f64,
    values: TimeSeries,
}

impl Ewma {
    pub fn new(source: &TimeSeries, horizon: usize) -> Result<Self, ForecastError> {
        let decay = decay_for(horizon)?;
        let values = calculate_ewma(source.values(), decay);
        Ok(Ewma {
            horizon,
            decay,
            values: TimeSeries::new(source.dates().to_vec(), values)?,
        })
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn decay(&self) -> f64 {
        self.decay
    }

    pub fn values(&self) -> &TimeSeries {
        &self.values
    }

    pub fn value(&self, index: usize) -> f64 {
        self.values.values()[index]
    }
}

/// Shallow: EWMAs with the same horizon compare equal.
impl PartialEq for Ewma {
    fn eq(&self, other: &Self) -> bool {
        self.horizon == other.horizon
    }
}

pub fn decay_for(horizon: usize) -> Result<f64, ForecastError> {
    if horizon < 2 {
        return Err(ForecastError::invalid(format!(
            "EWMA horizon must be at least 2, got {}",
            horizon
        )));
    }
    Ok(2.0 / (horizon as f64 + 1.0))
}

pub fn calculate_ewma(values: &[f64], decay: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut state = 0.0;
    for &x in values {
        if x.is_nan() {
            state = 0.0;
            out.push(f64::NAN);
        } else {
            state = decay * x + state * (1.0 - decay);
            out.push(state);
        }
    }
    out
}
