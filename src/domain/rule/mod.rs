//! Forecasting rules.
//!
//! A [`Rule`] is a node in a tree of at most three variations per parent. Leaf
//! rules turn a [`Signal`] into a forecast; parents blend their variations'
//! forecasts with correlation-derived weights. Building the tree only
//! validates it. [`Rule::calibrate`] then runs the shared pipeline bottom-up
//! and returns an immutable [`CalibratedRule`]:
//!
//! 1. leaf: raw signal divided by the base value's volatility
//!    (`sd_adjusted_forecast`), parent: weighted sum of variation forecasts
//! 2. forecast scalar = `base_scale / mean(|signal|)` over the reference window
//! 3. leaf forecast = `clamp(sd_adjusted * scalar, ±cap * base_scale)`,
//!    parent forecast = weighted sum of variation forecasts
//!
//! Forecasts are defined on every price date except the first, which has no
//! volatility estimate.

pub mod ewmac;
pub mod volatility_difference;
pub mod weights;

use chrono::NaiveDate;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

use crate::domain::base_value::BaseValue;
use crate::domain::error::{Context, ForecastError};
use crate::domain::forecast_config::ForecastConfig;
use crate::domain::statistics::{mean_abs, SampleStatistics, Statistics};
use crate::domain::time_series::TimeSeries;

pub use ewmac::Ewmac;
pub use volatility_difference::VolatilityDifference;

pub const MAX_VARIATIONS: usize = 3;

/// Historical interval used to calibrate scalars and weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferenceWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl ReferenceWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ForecastError> {
        if end <= start {
            return Err(ForecastError::invalid(format!(
                "reference window end {} is not after start {}",
                end, start
            )));
        }
        Ok(ReferenceWindow { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Price indices of the window's endpoints in `base_value`.
    ///
    /// Both dates must be price dates and the window may not open on the
    /// very first one.
    pub fn locate(&self, base_value: &BaseValue) -> Result<(usize, usize), ForecastError> {
        let prices = base_value.values();
        let start = prices
            .index_of(self.start)
            .ok_or_else(|| {
                ForecastError::invalid(format!("window start {} not in base value", self.start))
            })?;
        let end = prices.index_of(self.end).ok_or_else(|| {
            ForecastError::invalid(format!("window end {} not in base value", self.end))
        })?;
        if start == 0 {
            return Err(ForecastError::invalid(format!(
                "window start {} is the first base value date",
                self.start
            )));
        }
        Ok((start, end))
    }
}

impl fmt::Display for ReferenceWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Capability every concrete signal provides.
pub trait RawForecast {
    /// Unscaled signal on the base value's `index`-th date.
    fn raw_forecast(&self, index: usize) -> f64;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Ewmac(Ewmac),
    VolatilityDifference(VolatilityDifference),
}

impl RawForecast for Signal {
    fn raw_forecast(&self, index: usize) -> f64 {
        match self {
            Signal::Ewmac(s) => s.raw_forecast(index),
            Signal::VolatilityDifference(s) => s.raw_forecast(index),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Ewmac(s) => write!(
                f,
                "EWMAC({},{})",
                s.long_horizon(),
                s.short_horizon()
            ),
            Signal::VolatilityDifference(s) => write!(f, "VOLDIFF({})", s.lookback_window()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    base_value: Arc<BaseValue>,
    window: ReferenceWindow,
    window_bounds: (usize, usize),
    base_scale: f64,
    forecast_limit: f64,
    signal: Signal,
    variations: Vec<Rule>,
    calibrated: OnceLock<CalibratedRule>,
}

/// Shallow equality: same signal parameters, base scale, window and base
/// value, with recursively equal variations. Derived series are not compared.
impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.signal == other.signal
            && self.base_scale == other.base_scale
            && self.window == other.window
            && same_base_value(&self.base_value, &other.base_value)
            && self.variations == other.variations
    }
}

pub fn same_base_value(a: &Arc<BaseValue>, b: &Arc<BaseValue>) -> bool {
    Arc::ptr_eq(a, b) || **a == **b
}

impl Rule {
    /// Validate the parts every rule shares and attach a signal built for
    /// the located window. `build_signal` learns whether the rule is a leaf.
    pub(crate) fn assemble<F>(
        base_value: &Arc<BaseValue>,
        variations: Vec<Rule>,
        window: ReferenceWindow,
        base_scale: f64,
        config: &ForecastConfig,
        build_signal: F,
    ) -> Result<Rule, ForecastError>
    where
        F: FnOnce(bool, (usize, usize)) -> Result<Signal, ForecastError>,
    {
        let window_bounds = window.locate(base_value)?;
        if base_scale <= 0.0 || !base_scale.is_finite() {
            return Err(ForecastError::invalid(format!(
                "base scale must be positive, got {}",
                base_scale
            )));
        }
        config.validate()?;
        if variations.len() > MAX_VARIATIONS {
            return Err(ForecastError::invalid(format!(
                "at most {} variations allowed, got {}",
                MAX_VARIATIONS,
                variations.len()
            )));
        }
        for (i, variation) in variations.iter().enumerate() {
            if variation.window != window {
                return Err(ForecastError::invalid(format!(
                    "variation {} uses window {}, expected {}",
                    i, variation.window, window
                )));
            }
            if !same_base_value(&variation.base_value, base_value) {
                return Err(ForecastError::invalid(format!(
                    "variation {} uses base value {}, expected {}",
                    i,
                    variation.base_value.name(),
                    base_value.name()
                )));
            }
        }

        let signal = build_signal(variations.is_empty(), window_bounds)?;
        Ok(Rule {
            base_value: Arc::clone(base_value),
            window,
            window_bounds,
            base_scale,
            forecast_limit: config.forecast_limit(base_scale),
            signal,
            variations,
            calibrated: OnceLock::new(),
        })
    }

    pub fn base_value(&self) -> &Arc<BaseValue> {
        &self.base_value
    }

    pub fn window(&self) -> ReferenceWindow {
        self.window
    }

    pub fn base_scale(&self) -> f64 {
        self.base_scale
    }

    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    pub fn variations(&self) -> &[Rule] {
        &self.variations
    }

    pub fn is_leaf(&self) -> bool {
        self.variations.is_empty()
    }

    pub fn describe(&self) -> String {
        if self.is_leaf() {
            self.signal.to_string()
        } else {
            let inner: Vec<String> = self.variations.iter().map(|v| v.describe()).collect();
            format!("{}[{}]", self.signal, inner.join(", "))
        }
    }

    /// Unscaled signal on the `index`-th price date.
    pub fn raw_forecast(&self, index: usize) -> f64 {
        self.signal.raw_forecast(index)
    }

    /// Raw signal over volatility on the `index`-th price date.
    ///
    /// NaN for rules with variations, on the first price date, and where the
    /// volatility is zero.
    pub fn sd_adjusted_forecast(&self, index: usize) -> f64 {
        if !self.is_leaf() {
            return f64::NAN;
        }
        let volatility = self.base_value.volatility_at(index);
        if volatility == 0.0 || volatility.is_nan() {
            return f64::NAN;
        }
        self.raw_forecast(index) / volatility
    }

    /// Forecast scalar from the memoized calibration. A leaf whose mean
    /// absolute signal is zero or non-finite gets 0 instead of an error.
    pub fn forecast_scalar(&self) -> Result<f64, ForecastError> {
        match self.calibrated() {
            Ok(c) => Ok(c.forecast_scalar),
            Err(e) if is_illegal_values(&e) => Ok(0.0),
            Err(e) => Err(e),
        }
    }

    /// Calibrated forecasts, computed on first access and reused after.
    pub fn forecasts(&self) -> Result<&TimeSeries, ForecastError> {
        Ok(&self.calibrated()?.forecasts)
    }

    /// Calibration with the default statistics, computed at most once per
    /// rule and per variation. Concurrent first calls may both compute; one
    /// result is kept.
    pub fn calibrated(&self) -> Result<&CalibratedRule, ForecastError> {
        if let Some(c) = self.calibrated.get() {
            return Ok(c);
        }
        let fresh = self.run_calibration(&SampleStatistics, true)?;
        let _ = self.calibrated.set(fresh);
        self.calibrated
            .get()
            .ok_or_else(|| ForecastError::invalid("calibration cache is empty"))
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated.get().is_some()
    }

    /// Owned copy of the memoized calibration.
    pub fn calibrate(&self) -> Result<CalibratedRule, ForecastError> {
        self.calibrated().cloned()
    }

    /// Run the calibration pipeline bottom-up with `stats`. Nothing is
    /// memoized.
    pub fn calibrate_with(&self, stats: &dyn Statistics) -> Result<CalibratedRule, ForecastError> {
        self.run_calibration(stats, false)
    }

    fn run_calibration(
        &self,
        stats: &dyn Statistics,
        memoize: bool,
    ) -> Result<CalibratedRule, ForecastError> {
        let (signal, variations, weights) = self
            .pre_scaled_signal(stats, memoize)
            .context(format!("cannot calibrate {}", self.describe()))?;
        let mean = self.window_mean_abs(&signal);

        let (forecast_scalar, forecasts) = if self.is_leaf() {
            if mean == 0.0 || !mean.is_finite() {
                return Err(ForecastError::wrap(
                    format!("cannot calibrate {}", self.describe()),
                    ForecastError::invalid(format!(
                        "{}: mean absolute signal over {} is {}",
                        ILLEGAL_VALUES,
                        self.window,
                        mean
                    )),
                ));
            }
            let scalar = self.base_scale / mean;
            let limit = self.forecast_limit;
            (scalar, signal.map_values(|v| (v * scalar).clamp(-limit, limit)))
        } else {
            (scalar_for(self.base_scale, mean), signal)
        };

        debug!(
            rule = %self.describe(),
            forecast_scalar,
            weights = ?weights,
            "calibrated rule"
        );

        Ok(CalibratedRule {
            description: self.describe(),
            window: self.window,
            window_range: self.window_range(),
            base_scale: self.base_scale,
            forecast_scalar,
            variation_weights: weights,
            variations,
            forecasts,
        })
    }

    /// Pre-scaled signal on the forecast dates, with the calibrated
    /// variations and weights it was built from.
    fn pre_scaled_signal(
        &self,
        stats: &dyn Statistics,
        memoize: bool,
    ) -> Result<(TimeSeries, Vec<CalibratedRule>, Vec<f64>), ForecastError> {
        let dates = forecast_dates(&self.base_value);
        if self.is_leaf() {
            let values = (1..self.base_value.len())
                .map(|i| self.sd_adjusted_forecast(i))
                .collect();
            return Ok((TimeSeries::new(dates, values)?, Vec::new(), Vec::new()));
        }

        let variations = self
            .variations
            .iter()
            .map(|v| {
                if memoize {
                    v.calibrated().cloned()
                } else {
                    v.calibrate_with(stats)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        let in_window: Vec<&[f64]> = variations.iter().map(|v| v.window_forecasts()).collect();
        let weights = weights::variation_weights(&in_window, stats)
            .context("cannot weight variations")?;

        let mut values = vec![0.0; dates.len()];
        for (variation, weight) in variations.iter().zip(weights.iter()) {
            for (acc, f) in values.iter_mut().zip(variation.forecasts.values()) {
                *acc += weight * f;
            }
        }
        Ok((TimeSeries::new(dates, values)?, variations, weights))
    }

    /// Positions of the reference window within the forecast series.
    fn window_range(&self) -> (usize, usize) {
        (self.window_bounds.0 - 1, self.window_bounds.1 - 1)
    }

    fn window_mean_abs(&self, signal: &TimeSeries) -> f64 {
        let (first, last) = self.window_range();
        mean_abs(&signal.values()[first..=last])
    }
}

const ILLEGAL_VALUES: &str = "illegal values";

/// True when calibration failed on this rule's own zero or non-finite mean,
/// not on one of its variations.
fn is_illegal_values(err: &ForecastError) -> bool {
    err.cause()
        .is_some_and(|c| c.cause().is_none() && c.message().starts_with(ILLEGAL_VALUES))
}

fn scalar_for(base_scale: f64, mean: f64) -> f64 {
    if mean == 0.0 || !mean.is_finite() {
        0.0
    } else {
        base_scale / mean
    }
}

/// Price dates that carry a forecast: all but the first.
pub fn forecast_dates(base_value: &BaseValue) -> Vec<NaiveDate> {
    base_value.values().dates().iter().skip(1).copied().collect()
}

/// Immutable result of calibrating a rule tree.
#[derive(Debug, Clone)]
pub struct CalibratedRule {
    description: String,
    window: ReferenceWindow,
    window_range: (usize, usize),
    base_scale: f64,
    forecast_scalar: f64,
    variation_weights: Vec<f64>,
    variations: Vec<CalibratedRule>,
    forecasts: TimeSeries,
}

impl CalibratedRule {
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn window(&self) -> ReferenceWindow {
        self.window
    }

    pub fn base_scale(&self) -> f64 {
        self.base_scale
    }

    pub fn forecast_scalar(&self) -> f64 {
        self.forecast_scalar
    }

    pub fn variation_weights(&self) -> &[f64] {
        &self.variation_weights
    }

    pub fn variations(&self) -> &[CalibratedRule] {
        &self.variations
    }

    pub fn forecasts(&self) -> &TimeSeries {
        &self.forecasts
    }

    pub fn forecast_at(&self, date: NaiveDate) -> Option<f64> {
        self.forecasts.value_at(date)
    }

    /// Forecast values inside the reference window.
    pub fn window_forecasts(&self) -> &[f64] {
        &self.forecasts.values()[self.window_range.0..=self.window_range.1]
    }
}
