#![allow(dead_code)]

use chrono::NaiveDate;
use forecaster::domain::base_value::BaseValue;
use forecaster::domain::error::ForecastError;
use forecaster::domain::forecast_config::ForecastConfig;
use forecaster::domain::rule::{ReferenceWindow, Rule};
use forecaster::domain::time_series::TimeSeries;
use forecaster::ports::data_port::PriceSource;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct MockPriceSource {
    pub series: HashMap<PathBuf, TimeSeries>,
    pub errors: HashMap<PathBuf, String>,
}

impl MockPriceSource {
    pub fn new() -> Self {
        Self {
            series: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_series(mut self, path: &str, series: TimeSeries) -> Self {
        self.series.insert(PathBuf::from(path), series);
        self
    }

    pub fn with_error(mut self, path: &str, reason: &str) -> Self {
        self.errors.insert(PathBuf::from(path), reason.to_string());
        self
    }
}

impl PriceSource for MockPriceSource {
    fn load_series(&self, path: &Path) -> Result<TimeSeries, ForecastError> {
        if let Some(reason) = self.errors.get(path) {
            return Err(ForecastError::Data {
                source_name: path.display().to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self
            .series
            .get(path)
            .cloned()
            .unwrap_or_else(TimeSeries::empty))
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `start + offset` days.
pub fn day(start: NaiveDate, offset: usize) -> NaiveDate {
    start + chrono::Duration::days(offset as i64)
}

pub fn make_series(start: &str, values: &[f64]) -> TimeSeries {
    let start = NaiveDate::parse_from_str(start, "%Y-%m-%d").unwrap();
    let dates = (0..values.len()).map(|i| day(start, i)).collect();
    TimeSeries::new(dates, values.to_vec()).unwrap()
}

/// Deterministic trending, oscillating price path on consecutive days.
pub fn generate_prices(start: &str, count: usize, start_price: f64) -> TimeSeries {
    let values: Vec<f64> = (0..count)
        .map(|i| {
            let t = i as f64;
            start_price
                + 0.08 * t
                + 0.1 * start_price * (t / 13.0).sin()
                + 0.03 * start_price * (t / 3.3).cos()
        })
        .collect();
    make_series(start, &values)
}

pub fn make_base_value(name: &str, prices: TimeSeries) -> Arc<BaseValue> {
    Arc::new(BaseValue::new(name, prices, &ForecastConfig::default()).unwrap())
}

pub fn window(start: NaiveDate, end: NaiveDate) -> ReferenceWindow {
    ReferenceWindow::new(start, end).unwrap()
}

pub fn ewmac_leaf(
    base_value: &Arc<BaseValue>,
    window: ReferenceWindow,
    long: usize,
    short: usize,
) -> Rule {
    Rule::ewmac(
        base_value,
        Vec::new(),
        window,
        long,
        short,
        10.0,
        &ForecastConfig::default(),
    )
    .unwrap()
}

pub fn ewmac_parent(
    base_value: &Arc<BaseValue>,
    window: ReferenceWindow,
    variations: Vec<Rule>,
) -> Rule {
    Rule::ewmac(
        base_value,
        variations,
        window,
        0,
        0,
        10.0,
        &ForecastConfig::default(),
    )
    .unwrap()
}

pub fn voldiff_leaf(base_value: &Arc<BaseValue>, window: ReferenceWindow, lookback: usize) -> Rule {
    Rule::volatility_difference(
        base_value,
        Vec::new(),
        window,
        lookback,
        10.0,
        None,
        &ForecastConfig::default(),
    )
    .unwrap()
}

/// CSV text with a `date,close` header for `series`.
pub fn to_csv(series: &TimeSeries) -> String {
    let mut out = String::from("date,close\n");
    for point in series.points() {
        out.push_str(&format!("{},{}\n", point.date, point.value));
    }
    out
}
