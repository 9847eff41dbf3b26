//! Union-and-gap-fill alignment of several series onto one date grid.
//!
//! The grid is the sorted union of every input date. Missing points are
//! inserted as NaN and then filled: a leading gap takes the first known
//! value, a trailing gap the last known value, and an interior gap the mean
//! of the known values on either side of it.

use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::domain::error::ForecastError;
use crate::domain::time_series::TimeSeries;

/// Sorted union of all dates across `series`.
pub fn unified_timeline(series: &[TimeSeries]) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = series
        .iter()
        .flat_map(|s| s.dates().iter().copied())
        .collect();
    unique_dates.into_iter().collect()
}

/// Align every series onto the union of their dates, filling gaps.
///
/// Each input must be non-empty and hold at least one non-NaN value. The
/// outputs share one date vector, contain no NaN, and keep every known
/// original point unchanged.
pub fn align(series: &[TimeSeries]) -> Result<Vec<TimeSeries>, ForecastError> {
    if series.is_empty() {
        return Err(ForecastError::invalid("no series to align"));
    }
    for (i, s) in series.iter().enumerate() {
        s.validate_alignable()
            .map_err(|e| ForecastError::wrap(format!("series {} cannot be aligned", i), e))?;
    }

    let timeline = unified_timeline(series);
    series
        .iter()
        .map(|s| {
            let mut values = spread_onto(s, &timeline);
            fill_gaps(&mut values)?;
            TimeSeries::new(timeline.clone(), values)
        })
        .collect()
}

/// Values of `series` placed on `timeline`, NaN where the series has no point.
fn spread_onto(series: &TimeSeries, timeline: &[NaiveDate]) -> Vec<f64> {
    let mut values = Vec::with_capacity(timeline.len());
    let mut cursor = 0;
    let dates = series.dates();
    for date in timeline {
        if cursor < dates.len() && dates[cursor] == *date {
            values.push(series.values()[cursor]);
            cursor += 1;
        } else {
            values.push(f64::NAN);
        }
    }
    values
}

/// Fill every NaN run in place.
pub fn fill_gaps(values: &mut [f64]) -> Result<(), ForecastError> {
    let first_known = values
        .iter()
        .position(|v| !v.is_nan())
        .ok_or_else(|| ForecastError::invalid("all values are NaN"))?;
    // first_known exists, so last_known does too
    let last_known = values.iter().rposition(|v| !v.is_nan()).unwrap_or(first_known);

    let head = values[first_known];
    for v in &mut values[..first_known] {
        *v = head;
    }
    let tail = values[last_known];
    for v in &mut values[last_known + 1..] {
        *v = tail;
    }

    let mut i = first_known;
    while i < last_known {
        if values[i].is_nan() {
            let run_start = i;
            while values[i].is_nan() {
                i += 1;
            }
            let fill = (values[run_start - 1] + values[i]) / 2.0;
            for v in &mut values[run_start..i] {
                *v = fill;
            }
        } else {
            i += 1;
        }
    }
    Ok(())
}
