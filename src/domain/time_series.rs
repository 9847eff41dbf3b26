//! Dated value series.
//!
//! A `TimeSeries` is an ordered run of `(date, value)` points with strictly
//! ascending, unique dates. Values may be NaN: alignment inserts NaN
//! placeholders and several derived series are undefined on their leading
//! points.

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::domain::error::ForecastError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
    date_index: HashMap<NaiveDate, usize>,
}

impl TimeSeries {
    /// Build a series from parallel date and value vectors.
    ///
    /// Fails if the vectors differ in length or the dates are not strictly
    /// ascending. An empty series is allowed here; callers that need data
    /// check [`TimeSeries::validate_non_empty`].
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self, ForecastError> {
        if dates.len() != values.len() {
            return Err(ForecastError::invalid(format!(
                "{} dates but {} values",
                dates.len(),
                values.len()
            )));
        }
        for (i, w) in dates.windows(2).enumerate() {
            if w[1] == w[0] {
                return Err(ForecastError::invalid(format!(
                    "duplicate date {} at index {}",
                    w[1],
                    i + 1
                )));
            }
            if w[1] < w[0] {
                return Err(ForecastError::invalid(format!(
                    "dates not ascending at index {} ({} after {})",
                    i + 1,
                    w[1],
                    w[0]
                )));
            }
        }
        let date_index = dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        Ok(TimeSeries {
            dates,
            values,
            date_index,
        })
    }

    pub fn from_points(points: &[DataPoint]) -> Result<Self, ForecastError> {
        let dates = points.iter().map(|p| p.date).collect();
        let values = points.iter().map(|p| p.value).collect();
        TimeSeries::new(dates, values)
    }

    pub fn empty() -> Self {
        TimeSeries {
            dates: Vec::new(),
            values: Vec::new(),
            date_index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn points(&self) -> impl Iterator<Item = DataPoint> + '_ {
        self.dates
            .iter()
            .zip(self.values.iter())
            .map(|(&date, &value)| DataPoint { date, value })
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn last_value(&self) -> Option<f64> {
        self.values.last().copied()
    }

    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.date_index.contains_key(&date)
    }

    pub fn value_at(&self, date: NaiveDate) -> Option<f64> {
        self.index_of(date).map(|i| self.values[i])
    }

    /// Index of `date`, or an error naming the missing date.
    pub fn require_index(&self, date: NaiveDate) -> Result<usize, ForecastError> {
        self.index_of(date)
            .ok_or_else(|| ForecastError::invalid(format!("date {} not in series", date)))
    }

    /// Index range `[first, last]` of the points falling within `start..=end`.
    pub fn index_range(&self, start: NaiveDate, end: NaiveDate) -> Option<(usize, usize)> {
        if start > end {
            return None;
        }
        let first = self.dates.partition_point(|d| *d < start);
        let past = self.dates.partition_point(|d| *d <= end);
        if first >= past {
            None
        } else {
            Some((first, past - 1))
        }
    }

    /// Points with dates in `start..=end`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> TimeSeries {
        match self.index_range(start, end) {
            Some((first, last)) => self.slice(first, last + 1),
            None => TimeSeries::empty(),
        }
    }

    /// Points at indices `from..to`.
    pub fn slice(&self, from: usize, to: usize) -> TimeSeries {
        let dates = self.dates[from..to].to_vec();
        let values = self.values[from..to].to_vec();
        let date_index = dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        TimeSeries {
            dates,
            values,
            date_index,
        }
    }

    /// Same dates, values transformed point by point.
    pub fn map_values<F: FnMut(f64) -> f64>(&self, f: F) -> TimeSeries {
        TimeSeries {
            dates: self.dates.clone(),
            values: self.values.iter().copied().map(f).collect(),
            date_index: self.date_index.clone(),
        }
    }

    pub fn has_nan(&self) -> bool {
        self.values.iter().any(|v| v.is_nan())
    }

    /// Bit-level equality, treating NaN as equal to NaN.
    pub fn identical(&self, other: &TimeSeries) -> bool {
        self.dates == other.dates
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }

    pub fn validate_non_empty(&self) -> Result<(), ForecastError> {
        if self.is_empty() {
            return Err(ForecastError::invalid("series is empty"));
        }
        Ok(())
    }

    /// Non-empty and every value finite.
    pub fn validate_complete(&self) -> Result<(), ForecastError> {
        self.validate_non_empty()?;
        if let Some(i) = self.values.iter().position(|v| v.is_nan()) {
            return Err(ForecastError::invalid(format!(
                "NaN value on {}",
                self.dates[i]
            )));
        }
        if let Some(i) = self.values.iter().position(|v| v.is_infinite()) {
            return Err(ForecastError::invalid(format!(
                "infinite value on {}",
                self.dates[i]
            )));
        }
        Ok(())
    }

    /// Non-empty with at least one known value.
    pub fn validate_alignable(&self) -> Result<(), ForecastError> {
        self.validate_non_empty()?;
        if self.values.iter().all(|v| v.is_nan()) {
            return Err(ForecastError::invalid("series has no non-NaN values"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample() -> TimeSeries {
        TimeSeries::new(
            vec![date(2024, 1, 1), date(2024, 1, 2), date(2024, 1, 4)],
            vec![1.0, 2.0, 4.0],
        )
        .unwrap()
    }

    #[test]
    fn new_rejects_length_mismatch() {
        let result = TimeSeries::new(vec![date(2024, 1, 1)], vec![1.0, 2.0]);
        assert!(result.is_err());
    }

    #[test]
    fn new_rejects_duplicates() {
        let err = TimeSeries::new(vec![date(2024, 1, 1), date(2024, 1, 1)], vec![1.0, 2.0])
            .unwrap_err();
        assert!(err.message().contains("duplicate"));
    }

    #[test]
    fn new_rejects_descending() {
        let err = TimeSeries::new(vec![date(2024, 1, 2), date(2024, 1, 1)], vec![1.0, 2.0])
            .unwrap_err();
        assert!(err.message().contains("not ascending"));
    }

    #[test]
    fn lookup_by_date() {
        let s = sample();
        assert_eq!(s.index_of(date(2024, 1, 2)), Some(1));
        assert_eq!(s.index_of(date(2024, 1, 3)), None);
        assert_eq!(s.value_at(date(2024, 1, 4)), Some(4.0));
        assert!(s.require_index(date(2024, 1, 3)).is_err());
    }

    #[test]
    fn between_is_inclusive() {
        let s = sample();
        let w = s.between(date(2024, 1, 2), date(2024, 1, 4));
        assert_eq!(w.values(), &[2.0, 4.0]);
        assert_eq!(w.index_of(date(2024, 1, 4)), Some(1));

        let gap = s.between(date(2024, 1, 3), date(2024, 1, 3));
        assert!(gap.is_empty());
    }

    #[test]
    fn index_range_between_dates() {
        let s = sample();
        assert_eq!(s.index_range(date(2023, 12, 1), date(2024, 1, 3)), Some((0, 1)));
        assert_eq!(s.index_range(date(2024, 2, 1), date(2024, 3, 1)), None);
        assert_eq!(s.index_range(date(2024, 1, 4), date(2024, 1, 1)), None);
    }

    #[test]
    fn validations() {
        let s = TimeSeries::new(vec![date(2024, 1, 1)], vec![f64::NAN]).unwrap();
        assert!(s.validate_non_empty().is_ok());
        assert!(s.validate_complete().is_err());
        assert!(s.validate_alignable().is_err());
        assert!(TimeSeries::empty().validate_non_empty().is_err());
    }

    #[test]
    fn infinite_values_are_incomplete() {
        let s = TimeSeries::new(
            vec![date(2024, 1, 1), date(2024, 1, 2)],
            vec![100.0, f64::INFINITY],
        )
        .unwrap();
        let err = s.validate_complete().unwrap_err();
        assert_eq!(err.message(), "infinite value on 2024-01-02");
        assert!(s.validate_alignable().is_ok());
    }

    #[test]
    fn identical_treats_nan_as_equal() {
        let a = TimeSeries::new(vec![date(2024, 1, 1)], vec![f64::NAN]).unwrap();
        let b = a.clone();
        assert!(a.identical(&b));
        assert_ne!(a, b);
    }
}
