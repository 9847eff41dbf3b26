//! Diversification multiplier.
//!
//! value = 1 / sqrt(Σ_i Σ_j corr(i,j) * w_i * w_j)
//!
//! Blending imperfectly correlated components lowers the volatility of the
//! blend; multiplying by this value restores it.

use tracing::debug;

use crate::domain::error::{Context, ForecastError};
use crate::domain::statistics::Statistics;

/// Tolerance for the weight sum and matrix symmetry.
const TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct DiversificationMultiplier {
    weights: Vec<f64>,
    correlations: Vec<Vec<f64>>,
    value: f64,
}

impl DiversificationMultiplier {
    pub fn new(weights: Vec<f64>, correlations: Vec<Vec<f64>>) -> Result<Self, ForecastError> {
        validate_weights(&weights).context("invalid diversification weights")?;
        validate_correlations(&correlations, weights.len())
            .context("invalid correlation matrix")?;

        let mut combined = 0.0;
        for (i, row) in correlations.iter().enumerate() {
            for (j, corr) in row.iter().enumerate() {
                combined += corr * weights[i] * weights[j];
            }
        }
        if combined <= 0.0 || !combined.is_finite() {
            return Err(ForecastError::wrap(
                "invalid correlation matrix",
                ForecastError::invalid(format!(
                    "weighted correlation sum {} is not positive",
                    combined
                )),
            ));
        }
        let value = 1.0 / combined.sqrt();
        debug!(components = weights.len(), value, "diversification multiplier");

        Ok(DiversificationMultiplier {
            weights,
            correlations,
            value,
        })
    }

    /// Equally weighted components correlated over the given samples.
    pub fn equally_weighted(
        samples: &[&[f64]],
        stats: &dyn Statistics,
    ) -> Result<Self, ForecastError> {
        if samples.is_empty() {
            return Err(ForecastError::invalid(
                "diversification needs at least one component",
            ));
        }
        let n = samples.len();
        let mut correlations = vec![vec![0.0; n]; n];
        for i in 0..n {
            correlations[i][i] = 1.0;
            for j in (i + 1)..n {
                let r = stats
                    .pearson(samples[i], samples[j])
                    .context(format!("correlation of components {} and {}", i, j))?;
                correlations[i][j] = r;
                correlations[j][i] = r;
            }
        }
        DiversificationMultiplier::new(vec![1.0 / n as f64; n], correlations)
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn correlations(&self) -> &[Vec<f64>] {
        &self.correlations
    }
}

fn validate_weights(weights: &[f64]) -> Result<(), ForecastError> {
    if weights.is_empty() {
        return Err(ForecastError::invalid("no weights"));
    }
    if let Some(w) = weights.iter().find(|w| !(w.is_finite() && **w >= 0.0)) {
        return Err(ForecastError::invalid(format!(
            "weight {} is negative or not finite",
            w
        )));
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > TOLERANCE {
        return Err(ForecastError::invalid(format!(
            "weights sum to {}, expected 1",
            sum
        )));
    }
    Ok(())
}

fn validate_correlations(matrix: &[Vec<f64>], size: usize) -> Result<(), ForecastError> {
    if matrix.len() != size {
        return Err(ForecastError::invalid(format!(
            "{} rows for {} weights",
            matrix.len(),
            size
        )));
    }
    for (i, row) in matrix.iter().enumerate() {
        if row.len() != size {
            return Err(ForecastError::invalid(format!(
                "row {} has {} entries, expected {}",
                i,
                row.len(),
                size
            )));
        }
        for (j, v) in row.iter().enumerate() {
            if v.is_nan() || v.abs() > 1.0 {
                return Err(ForecastError::invalid(format!(
                    "entry ({}, {}) = {} outside [-1, 1]",
                    i, j, v
                )));
            }
            if i == j && *v != 1.0 {
                return Err(ForecastError::invalid(format!(
                    "diagonal entry {} is {}, expected 1",
                    i, v
                )));
            }
            if (v - matrix[j][i]).abs() > TOLERANCE {
                return Err(ForecastError::invalid(format!(
                    "entries ({}, {}) and ({}, {}) differ",
                    i, j, j, i
                )));
            }
        }
    }
    Ok(())
}
