//! Statistical primitives used by calibration.
//!
//! Calibration only needs a Pearson correlation and a standard deviation.
//! They sit behind the [`Statistics`] trait so callers can plug in another
//! estimator; [`SampleStatistics`] is the default.

use crate::domain::error::ForecastError;

/// Rounding slack allowed when a correlation lands just outside [-1, 1].
const CORRELATION_SLACK: f64 = 1e-12;

pub trait Statistics {
    /// Pearson correlation of two equally long samples.
    fn pearson(&self, x: &[f64], y: &[f64]) -> Result<f64, ForecastError>;

    /// Standard deviation of a sample. NaN when it is undefined.
    fn standard_deviation(&self, values: &[f64]) -> f64;
}

/// Bias-corrected (n - 1) estimators.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleStatistics;

impl Statistics for SampleStatistics {
    fn pearson(&self, x: &[f64], y: &[f64]) -> Result<f64, ForecastError> {
        if x.len() != y.len() {
            return Err(ForecastError::invalid(format!(
                "correlation samples differ in length ({} vs {})",
                x.len(),
                y.len()
            )));
        }
        if x.len() < 2 {
            return Err(ForecastError::invalid(
                "correlation needs at least two observations",
            ));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(ForecastError::invalid(
                "correlation sample contains non-finite values",
            ));
        }

        let mean_x = mean(x);
        let mean_y = mean(y);

        let mut cov = 0.0;
        let mut var_x = 0.0;
        let mut var_y = 0.0;
        for (a, b) in x.iter().zip(y.iter()) {
            let dx = a - mean_x;
            let dy = b - mean_y;
            cov += dx * dy;
            var_x += dx * dx;
            var_y += dy * dy;
        }

        if var_x == 0.0 || var_y == 0.0 {
            return Err(ForecastError::invalid(
                "correlation undefined for a sample with zero variance",
            ));
        }

        let r = cov / (var_x * var_y).sqrt();
        check_correlation(r)
    }

    fn standard_deviation(&self, values: &[f64]) -> f64 {
        if values.len() < 2 {
            return f64::NAN;
        }
        let m = mean(values);
        let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
        (ss / (values.len() - 1) as f64).sqrt()
    }
}

/// Accept `r` if it is a correlation, absorbing rounding just past ±1.
pub fn check_correlation(r: f64) -> Result<f64, ForecastError> {
    if r.is_nan() {
        return Err(ForecastError::invalid("correlation is NaN"));
    }
    if r.abs() > 1.0 + CORRELATION_SLACK {
        return Err(ForecastError::invalid(format!(
            "correlation {} outside [-1, 1]",
            r
        )));
    }
    Ok(r.clamp(-1.0, 1.0))
}

/// Arithmetic mean. NaN for an empty slice or when any value is NaN.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Mean of absolute values.
pub fn mean_abs(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().map(|v| v.abs()).sum::<f64>() / values.len() as f64
}
