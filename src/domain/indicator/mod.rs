//! Smoothing and volatility indicators over [`TimeSeries`](crate::domain::time_series::TimeSeries) values.

pub mod ewma;
pub mod stddev;
