//! Price series source port.

use crate::domain::error::ForecastError;
use crate::domain::time_series::TimeSeries;
use chrono::NaiveDate;
use std::path::Path;

pub trait PriceSource {
    /// Load a dated series, sorted by date with unique dates. Missing values
    /// come back as NaN.
    fn load_series(&self, path: &Path) -> Result<TimeSeries, ForecastError>;

    /// First date, last date and point count, or `None` for an empty series.
    fn data_range(&self, path: &Path) -> Result<Option<(NaiveDate, NaiveDate, usize)>, ForecastError> {
        let series = self.load_series(path)?;
        Ok(match (series.first_date(), series.last_date()) {
            (Some(first), Some(last)) => Some((first, last, series.len())),
            _ => None,
        })
    }
}
