//! Trading subsystem: one base value, a set of calibrated rules, and the
//! backtest that turns their combined forecast into a capital curve.

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;

use crate::domain::base_value::BaseValue;
use crate::domain::diversification::DiversificationMultiplier;
use crate::domain::error::{Context, ForecastError};
use crate::domain::forecast_config::ForecastConfig;
use crate::domain::rule::{forecast_dates, same_base_value, CalibratedRule, Rule};
use crate::domain::statistics::{mean, SampleStatistics, Statistics};
use crate::domain::time_series::TimeSeries;

#[derive(Debug, Clone)]
pub struct SubSystem {
    base_value: Arc<BaseValue>,
    rules: Vec<Rule>,
    calibrated: Vec<CalibratedRule>,
    capital: f64,
    base_scale: f64,
    forecast_limit: f64,
    diversification: DiversificationMultiplier,
    combined_forecasts: TimeSeries,
}

impl SubSystem {
    pub fn new(
        base_value: &Arc<BaseValue>,
        rules: Vec<Rule>,
        capital: f64,
        base_scale: f64,
        config: &ForecastConfig,
    ) -> Result<Self, ForecastError> {
        Self::assemble(base_value, rules, capital, base_scale, config, &SampleStatistics, true)
    }

    /// Like [`SubSystem::new`] with other statistics. Rule calibrations are
    /// recomputed with `stats` and not memoized on the rules.
    pub fn with_statistics(
        base_value: &Arc<BaseValue>,
        rules: Vec<Rule>,
        capital: f64,
        base_scale: f64,
        config: &ForecastConfig,
        stats: &dyn Statistics,
    ) -> Result<Self, ForecastError> {
        Self::assemble(base_value, rules, capital, base_scale, config, stats, false)
    }

    /// Validate the rule set, calibrate every rule and combine their forecasts.
    fn assemble(
        base_value: &Arc<BaseValue>,
        rules: Vec<Rule>,
        capital: f64,
        base_scale: f64,
        config: &ForecastConfig,
        stats: &dyn Statistics,
        memoized: bool,
    ) -> Result<Self, ForecastError> {
        validate(base_value, &rules, capital, base_scale, config)
            .context("invalid subsystem")?;

        let calibrated = rules
            .iter()
            .map(|r| {
                if memoized {
                    r.calibrated().cloned()
                } else {
                    r.calibrate_with(stats)
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .context("cannot calibrate subsystem rules")?;

        let in_window: Vec<&[f64]> = calibrated.iter().map(|c| c.window_forecasts()).collect();
        let diversification = DiversificationMultiplier::equally_weighted(&in_window, stats)
            .context("cannot build diversification multiplier")?;

        let forecast_limit = config.forecast_limit(base_scale);
        let combined_forecasts = combine(base_value, &calibrated, diversification.value(), forecast_limit)?;

        debug!(
            base_value = base_value.name(),
            rules = rules.len(),
            diversification = diversification.value(),
            "subsystem ready"
        );

        Ok(SubSystem {
            base_value: Arc::clone(base_value),
            rules,
            calibrated,
            capital,
            base_scale,
            forecast_limit,
            diversification,
            combined_forecasts,
        })
    }

    pub fn base_value(&self) -> &Arc<BaseValue> {
        &self.base_value
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn calibrated_rules(&self) -> &[CalibratedRule] {
        &self.calibrated
    }

    pub fn capital(&self) -> f64 {
        self.capital
    }

    pub fn base_scale(&self) -> f64 {
        self.base_scale
    }

    pub fn diversification_multiplier(&self) -> &DiversificationMultiplier {
        &self.diversification
    }

    pub fn combined_forecasts(&self) -> &TimeSeries {
        &self.combined_forecasts
    }

    /// Final capital of a backtest over `start..=end`.
    pub fn backtest(&self, start: NaiveDate, end: NaiveDate) -> Result<f64, ForecastError> {
        let performance = self.performance_values(start, end)?;
        performance
            .last_value()
            .ok_or_else(|| ForecastError::invalid("empty performance series"))
    }

    /// Final capital of a backtest over every forecast date.
    pub fn backtest_full(&self) -> Result<f64, ForecastError> {
        let (start, end) = self.forecast_range()?;
        self.backtest(start, end)
    }

    /// First and last dates carrying a combined forecast.
    pub fn forecast_range(&self) -> Result<(NaiveDate, NaiveDate), ForecastError> {
        match (
            self.combined_forecasts.first_date(),
            self.combined_forecasts.last_date(),
        ) {
            (Some(first), Some(last)) => Ok((first, last)),
            _ => Err(ForecastError::invalid("subsystem has no forecast dates")),
        }
    }

    /// Cash after liquidation on every forecast date in `start..=end`.
    pub fn performance_values(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TimeSeries, ForecastError> {
        let (first, last) = self
            .combined_forecasts
            .index_range(start, end)
            .ok_or_else(|| {
                ForecastError::wrap(
                    "invalid backtest window",
                    ForecastError::invalid(format!(
                        "no forecast dates between {} and {}",
                        start, end
                    )),
                )
            })?;

        // forecast position i is price position i + 1
        let prices = &self.base_value.values().values()[first + 1..=last + 1];
        let short_prices = &self.base_value.short_index_values().values()[first + 1..=last + 1];
        let forecasts = &self.combined_forecasts.values()[first..=last];
        let dates = self.combined_forecasts.dates()[first..=last].to_vec();

        let values = calculate_performance_values(
            prices,
            short_prices,
            forecasts,
            self.capital,
            self.forecast_limit,
        )
        .context("invalid backtest window")?;

        debug!(
            start = %dates[0],
            end = %dates[dates.len() - 1],
            steps = values.len(),
            "backtest complete"
        );
        TimeSeries::new(dates, values)
    }
}

fn validate(
    base_value: &Arc<BaseValue>,
    rules: &[Rule],
    capital: f64,
    base_scale: f64,
    config: &ForecastConfig,
) -> Result<(), ForecastError> {
    if rules.is_empty() {
        return Err(ForecastError::invalid("no rules"));
    }
    if capital <= 0.0 || !capital.is_finite() {
        return Err(ForecastError::invalid(format!(
            "capital must be positive, got {}",
            capital
        )));
    }
    if base_scale <= 0.0 || !base_scale.is_finite() {
        return Err(ForecastError::invalid(format!(
            "base scale must be positive, got {}",
            base_scale
        )));
    }
    config.validate()?;

    let window = rules[0].window();
    for (i, rule) in rules.iter().enumerate() {
        if !same_base_value(rule.base_value(), base_value) {
            return Err(ForecastError::invalid(format!(
                "rule {} uses base value {}, expected {}",
                i,
                rule.base_value().name(),
                base_value.name()
            )));
        }
        if rule.window() != window {
            return Err(ForecastError::invalid(format!(
                "rule {} uses window {}, expected {}",
                i,
                rule.window(),
                window
            )));
        }
        if let Some(j) = rules[..i].iter().position(|other| other == rule) {
            return Err(ForecastError::invalid(format!(
                "rules {} and {} are equal ({})",
                j,
                i,
                rule.describe()
            )));
        }
    }
    Ok(())
}

/// clamp(mean(rule forecasts) * dm, ±limit) on every forecast date.
fn combine(
    base_value: &BaseValue,
    calibrated: &[CalibratedRule],
    multiplier: f64,
    limit: f64,
) -> Result<TimeSeries, ForecastError> {
    let dates = forecast_dates(base_value);
    let count = calibrated.len() as f64;
    let mut values = vec![0.0; dates.len()];
    for rule in calibrated {
        for (acc, f) in values.iter_mut().zip(rule.forecasts().values()) {
            *acc += f;
        }
    }
    for v in values.iter_mut() {
        *v = (*v / count * multiplier).clamp(-limit, limit);
    }
    TimeSeries::new(dates, values)
}

/// Simulate the long/short product over aligned price, short price and
/// forecast slices.
///
/// Prices are rescaled so the long price averages 1 over the slice, and the
/// short price gets the same factor. Each step liquidates everything held,
/// records the cash, then buys
/// `floor((capital / price) / limit * |forecast|)` units of the long product
/// for a positive forecast or of the short product for a negative one.
/// A zero or NaN forecast holds nothing.
pub fn calculate_performance_values(
    prices: &[f64],
    short_prices: &[f64],
    forecasts: &[f64],
    capital: f64,
    limit: f64,
) -> Result<Vec<f64>, ForecastError> {
    if prices.is_empty() {
        return Err(ForecastError::invalid("no prices to trade"));
    }
    if prices.len() != short_prices.len() || prices.len() != forecasts.len() {
        return Err(ForecastError::invalid(format!(
            "{} prices, {} short prices and {} forecasts",
            prices.len(),
            short_prices.len(),
            forecasts.len()
        )));
    }
    let average = mean(prices);
    if average <= 0.0 || !average.is_finite() {
        return Err(ForecastError::invalid(format!(
            "average price {} is not positive",
            average
        )));
    }
    let factor = 1.0 / average;

    let mut cash = capital;
    let mut long_units = 0.0;
    let mut short_units = 0.0;
    let mut performance = Vec::with_capacity(prices.len());

    for ((price, short_price), forecast) in prices.iter().zip(short_prices).zip(forecasts) {
        let price = price * factor;
        let short_price = short_price * factor;

        cash += long_units * price + short_units * short_price;
        long_units = 0.0;
        short_units = 0.0;
        performance.push(cash);

        if *forecast > 0.0 {
            long_units = position_size(capital, price, limit, *forecast);
            cash -= long_units * price;
        } else if *forecast < 0.0 {
            short_units = position_size(capital, short_price, limit, *forecast);
            cash -= short_units * short_price;
        }
    }
    Ok(performance)
}

fn position_size(capital: f64, price: f64, limit: f64, forecast: f64) -> f64 {
    if price <= 0.0 || !price.is_finite() {
        return 0.0;
    }
    ((capital / price) / limit * forecast.abs()).floor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rule::ReferenceWindow;
    use approx::assert_relative_eq;

    fn date(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 6, 3).unwrap() + chrono::Duration::days(i as i64)
    }

    fn base_value() -> Arc<BaseValue> {
        let values = (0..250)
            .map(|i| {
                let t = i as f64;
                80.0 + 8.0 * (t / 11.0).sin() + 3.0 * (t / 4.3).cos() + 0.04 * t
            })
            .collect();
        let prices = TimeSeries::new((0..250).map(date).collect(), values).unwrap();
        Arc::new(BaseValue::new("SUB", prices, &ForecastConfig::default()).unwrap())
    }

    fn window() -> ReferenceWindow {
        ReferenceWindow::new(date(50), date(180)).unwrap()
    }

    fn ewmac(bv: &Arc<BaseValue>, long: usize, short: usize) -> Rule {
        Rule::ewmac(bv, Vec::new(), window(), long, short, 10.0, &ForecastConfig::default())
            .unwrap()
    }

    fn subsystem(rules: Vec<Rule>) -> Result<SubSystem, ForecastError> {
        let bv = rules[0].base_value().clone();
        SubSystem::new(&bv, rules, 10_000.0, 10.0, &ForecastConfig::default())
    }

    #[test]
    fn single_rule_has_unit_multiplier() {
        let bv = base_value();
        let rule = ewmac(&bv, 16, 4);
        let sub = subsystem(vec![rule.clone()]).unwrap();
        assert!((sub.diversification_multiplier().value() - 1.0).abs() < f64::EPSILON);
        assert!(sub
            .combined_forecasts()
            .identical(rule.calibrate().unwrap().forecasts()));
    }

    #[test]
    fn rules_keep_their_calibration() {
        let bv = base_value();
        let parent = Rule::ewmac(
            &bv,
            vec![ewmac(&bv, 16, 4), ewmac(&bv, 64, 16)],
            window(),
            0,
            0,
            10.0,
            &ForecastConfig::default(),
        )
        .unwrap();
        let sub = subsystem(vec![parent, ewmac(&bv, 32, 8)]).unwrap();

        for (rule, calibrated) in sub.rules().iter().zip(sub.calibrated_rules()) {
            assert!(rule.is_calibrated());
            assert!(rule.variations().iter().all(|v| v.is_calibrated()));
            assert!(calibrated
                .forecasts()
                .identical(rule.forecasts().unwrap()));
        }
    }

    #[test]
    fn custom_statistics_do_not_memoize() {
        let bv = base_value();
        let sub = SubSystem::with_statistics(
            &bv,
            vec![ewmac(&bv, 16, 4), ewmac(&bv, 64, 16)],
            10_000.0,
            10.0,
            &ForecastConfig::default(),
            &SampleStatistics,
        )
        .unwrap();
        assert!(sub.rules().iter().all(|r| !r.is_calibrated()));
        let memoized = subsystem(sub.rules().to_vec()).unwrap();
        assert!(memoized
            .combined_forecasts()
            .identical(sub.combined_forecasts()));
    }

    #[test]
    fn combined_forecast_averages_and_scales() {
        let bv = base_value();
        let a = ewmac(&bv, 16, 4);
        let b = ewmac(&bv, 64, 16);
        let sub = subsystem(vec![a.clone(), b.clone()]).unwrap();
        let dm = sub.diversification_multiplier().value();
        assert!(dm >= 1.0);

        let d = date(120);
        let fa = a.calibrate().unwrap().forecast_at(d).unwrap();
        let fb = b.calibrate().unwrap().forecast_at(d).unwrap();
        let expected = ((fa + fb) / 2.0 * dm).clamp(-20.0, 20.0);
        assert_relative_eq!(
            sub.combined_forecasts().value_at(d).unwrap(),
            expected,
            epsilon = 1e-12
        );
        assert!(sub
            .combined_forecasts()
            .values()
            .iter()
            .all(|f| f.abs() <= 20.0));
    }

    #[test]
    fn rejects_invalid_sets() {
        let bv = base_value();
        let config = ForecastConfig::default();
        assert!(SubSystem::new(&bv, Vec::new(), 1000.0, 10.0, &config).is_err());
        assert!(SubSystem::new(&bv, vec![ewmac(&bv, 16, 4)], 0.0, 10.0, &config).is_err());
        assert!(SubSystem::new(&bv, vec![ewmac(&bv, 16, 4)], 1000.0, -1.0, &config).is_err());

        let err = subsystem(vec![ewmac(&bv, 16, 4), ewmac(&bv, 16, 4)]).unwrap_err();
        assert_eq!(err.message(), "invalid subsystem");
        assert!(err.cause().unwrap().message().contains("are equal"));
    }

    #[test]
    fn rejects_mixed_windows() {
        let bv = base_value();
        let other = Rule::ewmac(
            &bv,
            Vec::new(),
            ReferenceWindow::new(date(60), date(180)).unwrap(),
            32,
            8,
            10.0,
            &ForecastConfig::default(),
        )
        .unwrap();
        assert!(subsystem(vec![ewmac(&bv, 16, 4), other]).is_err());
    }

    #[test]
    fn rejects_foreign_base_value() {
        let bv = base_value();
        let other = Arc::new(
            BaseValue::new(
                "OTHER",
                bv.values().map_values(|v| v + 1.0),
                &ForecastConfig::default(),
            )
            .unwrap(),
        );
        let result = SubSystem::new(
            &bv,
            vec![ewmac(&other, 16, 4)],
            1000.0,
            10.0,
            &ForecastConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn performance_covers_window_and_starts_at_capital() {
        let bv = base_value();
        let sub = subsystem(vec![ewmac(&bv, 16, 4), ewmac(&bv, 64, 16)]).unwrap();
        let perf = sub.performance_values(date(181), date(240)).unwrap();
        assert_eq!(perf.len(), 60);
        assert_eq!(perf.first_date(), Some(date(181)));
        assert_eq!(perf.values()[0], 10_000.0);
        assert_eq!(
            sub.backtest(date(181), date(240)).unwrap(),
            perf.last_value().unwrap()
        );
    }

    #[test]
    fn full_backtest_starts_after_first_price() {
        let bv = base_value();
        let sub = subsystem(vec![ewmac(&bv, 16, 4)]).unwrap();
        assert_eq!(sub.forecast_range().unwrap(), (date(1), date(249)));
        let full = sub.performance_values(date(1), date(249)).unwrap();
        assert_eq!(full.len(), 249);
        assert_eq!(sub.backtest_full().unwrap(), full.last_value().unwrap());
    }

    #[test]
    fn empty_backtest_window_fails() {
        let bv = base_value();
        let sub = subsystem(vec![ewmac(&bv, 16, 4)]).unwrap();
        let err = sub.performance_values(date(300), date(320)).unwrap_err();
        assert_eq!(err.message(), "invalid backtest window");
    }

    #[test]
    fn long_position_tracks_price() {
        let prices = [1.0, 2.0, 2.0];
        let shorts = [1000.0, 1000.0, 1000.0];
        let forecasts = [20.0, 0.0, 0.0];
        let perf = calculate_performance_values(&prices, &shorts, &forecasts, 100.0, 20.0).unwrap();

        // factor 1 / (5/3) = 0.6; day 0 buys floor(100 / 0.6) = 166 units
        let factor = 0.6;
        let units = (100.0f64 / factor).floor();
        let cash_after_buy = 100.0 - units * factor;
        assert_eq!(perf[0], 100.0);
        assert_relative_eq!(perf[1], cash_after_buy + units * 2.0 * factor, epsilon = 1e-9);
        assert_relative_eq!(perf[2], perf[1], epsilon = 1e-12);
    }

    #[test]
    fn short_position_uses_short_index() {
        let prices = [10.0, 10.0];
        let shorts = [1000.0, 500.0];
        let forecasts = [-10.0, 0.0];
        let perf = calculate_performance_values(&prices, &shorts, &forecasts, 1000.0, 20.0).unwrap();

        // factor 0.1: short price 100 then 50; floor((1000 / 100) / 20 * 10) = 5 units
        assert_eq!(perf[0], 1000.0);
        assert_relative_eq!(perf[1], 1000.0 - 5.0 * 100.0 + 5.0 * 50.0, epsilon = 1e-9);
    }

    #[test]
    fn nan_and_zero_forecasts_hold_nothing() {
        let prices = [1.0, 3.0, 5.0];
        let shorts = [1000.0, 900.0, 800.0];
        let forecasts = [f64::NAN, 0.0, 5.0];
        let perf = calculate_performance_values(&prices, &shorts, &forecasts, 50.0, 20.0).unwrap();
        assert_eq!(perf, vec![50.0, 50.0, 50.0]);
    }

    #[test]
    fn mismatched_slices_fail() {
        assert!(calculate_performance_values(&[1.0], &[1.0, 2.0], &[0.0], 1.0, 1.0).is_err());
        assert!(calculate_performance_values(&[], &[], &[], 1.0, 1.0).is_err());
        assert!(calculate_performance_values(&[-1.0], &[1.0], &[0.0], 1.0, 1.0).is_err());
    }
}
