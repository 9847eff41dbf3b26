//! Variation weights.
//!
//! One variation gets the full weight and two split it evenly. Three are
//! weighted from their pairwise forecast correlations over the reference
//! window: negative correlations count as 0, each variation's weight is
//! proportional to one minus its mean correlation with the other two, and
//! identical correlations give equal thirds.

use crate::domain::error::{Context, ForecastError};
use crate::domain::rule::MAX_VARIATIONS;
use crate::domain::statistics::{check_correlation, Statistics};

/// Weights for variations whose in-window forecasts are `window_forecasts`.
pub fn variation_weights(
    window_forecasts: &[&[f64]],
    stats: &dyn Statistics,
) -> Result<Vec<f64>, ForecastError> {
    match window_forecasts.len() {
        0 => Ok(Vec::new()),
        1 => Ok(vec![1.0]),
        2 => Ok(vec![0.5, 0.5]),
        3 => {
            let [a, b, c] = [window_forecasts[0], window_forecasts[1], window_forecasts[2]];
            let ab = stats.pearson(a, b).context("correlation of variations 0 and 1")?;
            let ac = stats.pearson(a, c).context("correlation of variations 0 and 2")?;
            let bc = stats.pearson(b, c).context("correlation of variations 1 and 2")?;
            weights_from_correlations(ab, ac, bc)
        }
        n => Err(ForecastError::invalid(format!(
            "at most {} variations can be weighted, got {}",
            MAX_VARIATIONS, n
        ))),
    }
}

/// Weights for three variations with pairwise correlations `ab`, `ac`, `bc`.
pub fn weights_from_correlations(ab: f64, ac: f64, bc: f64) -> Result<Vec<f64>, ForecastError> {
    let ab = check_correlation(ab)?;
    let ac = check_correlation(ac)?;
    let bc = check_correlation(bc)?;

    if ab == ac && ac == bc {
        return Ok(vec![1.0 / 3.0; 3]);
    }

    let (ab, ac, bc) = (ab.max(0.0), ac.max(0.0), bc.max(0.0));
    let inverted = [
        1.0 - (ab + ac) / 2.0,
        1.0 - (ab + bc) / 2.0,
        1.0 - (ac + bc) / 2.0,
    ];
    let total: f64 = inverted.iter().sum();
    Ok(inverted.iter().map(|w| w / total).collect())
}
