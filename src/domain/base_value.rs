//! The traded instrument: price series plus derived short index and volatility.
//!
//! A base value is built once and never changes; rules share it through an
//! `Arc`.

use tracing::debug;

use crate::domain::alignment::align;
use crate::domain::error::{Context, ForecastError};
use crate::domain::forecast_config::ForecastConfig;
use crate::domain::indicator::stddev::return_volatility;
use crate::domain::time_series::TimeSeries;

#[derive(Debug, Clone)]
pub struct BaseValue {
    name: String,
    values: TimeSeries,
    short_index_values: TimeSeries,
    standard_deviation_values: TimeSeries,
}

impl BaseValue {
    /// Base value with a short index derived from `values`.
    pub fn new(
        name: &str,
        values: TimeSeries,
        config: &ForecastConfig,
    ) -> Result<Self, ForecastError> {
        Self::validate_inputs(name, &values, config)?;
        let short_index_values = derive_short_index(&values, config)?;
        Self::assemble(name, values, short_index_values, config)
    }

    /// Base value with a supplied short index.
    ///
    /// The short index is aligned against the price dates: gaps are filled as
    /// in [`align`] and points on dates without a price are dropped.
    pub fn with_short_index(
        name: &str,
        values: TimeSeries,
        short_index: TimeSeries,
        config: &ForecastConfig,
    ) -> Result<Self, ForecastError> {
        Self::validate_inputs(name, &values, config)?;
        short_index
            .validate_complete()
            .context("invalid short index series")?;

        let aligned = align(&[values.clone(), short_index]).context("cannot align short index")?;
        let on_price_dates: Vec<f64> = values
            .dates()
            .iter()
            .filter_map(|d| aligned[1].value_at(*d))
            .collect();
        let short_index_values = TimeSeries::new(values.dates().to_vec(), on_price_dates)?;
        Self::assemble(name, values, short_index_values, config)
    }

    fn validate_inputs(
        name: &str,
        values: &TimeSeries,
        config: &ForecastConfig,
    ) -> Result<(), ForecastError> {
        if name.trim().is_empty() {
            return Err(ForecastError::wrap(
                "invalid base value",
                ForecastError::invalid("name is empty"),
            ));
        }
        values.validate_complete().context("invalid price series")?;
        config.validate().context("invalid forecast config")
    }

    fn assemble(
        name: &str,
        values: TimeSeries,
        short_index_values: TimeSeries,
        config: &ForecastConfig,
    ) -> Result<Self, ForecastError> {
        let standard_deviation_values = return_volatility(&values, config.volatility_horizon)
            .context("cannot derive volatility series")?;
        debug!(
            base_value = name,
            points = values.len(),
            first = ?values.first_date(),
            last = ?values.last_date(),
            "built base value"
        );
        Ok(BaseValue {
            name: name.to_string(),
            values,
            short_index_values,
            standard_deviation_values,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &TimeSeries {
        &self.values
    }

    pub fn short_index_values(&self) -> &TimeSeries {
        &self.short_index_values
    }

    /// Volatility in price units, aligned to `values().dates()[1..]`.
    pub fn standard_deviation_values(&self) -> &TimeSeries {
        &self.standard_deviation_values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Volatility on the `index`-th price date; NaN on the first date.
    pub fn volatility_at(&self, index: usize) -> f64 {
        if index == 0 {
            f64::NAN
        } else {
            self.standard_deviation_values.values()[index - 1]
        }
    }
}

impl PartialEq for BaseValue {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.values.identical(&other.values)
            && self.short_index_values.identical(&other.short_index_values)
    }
}

/// Synthetic inverse index: each step moves against the price by the
/// one-step return, with gains capped at `max_short_return`.
pub fn derive_short_index(
    values: &TimeSeries,
    config: &ForecastConfig,
) -> Result<TimeSeries, ForecastError> {
    let prices = values.values();
    let mut short = Vec::with_capacity(prices.len());
    let mut level = config.short_index_start;
    for (i, price) in prices.iter().enumerate() {
        if i > 0 {
            let r = (price / prices[i - 1] - 1.0).min(config.max_short_return);
            level *= 1.0 - r;
        }
        short.push(level);
    }
    TimeSeries::new(values.dates().to_vec(), short)
}
