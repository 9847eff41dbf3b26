//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::alignment::align;
use crate::domain::base_value::BaseValue;
use crate::domain::config_validation::{
    data_settings, forecast_settings, subsystem_settings, validate_run_config, SubsystemSettings,
};
use crate::domain::error::{Context, ForecastError};
use crate::domain::metrics::Metrics;
use crate::domain::rule::ReferenceWindow;
use crate::domain::rule_builder::{self, build_rules, rule_section};
use crate::domain::subsystem::SubSystem;
use crate::domain::time_series::TimeSeries;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::PriceSource;

#[derive(Parser, Debug)]
#[command(name = "forecaster", about = "Calibrate and backtest trading forecasts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Calibrate the configured rules and run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// First backtest date (defaults to [subsystem] test_start)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last backtest date (defaults to [subsystem] test_end)
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Print every point of the performance curve
        #[arg(long)]
        curve: bool,
    },
    /// Validate a run configuration without loading data
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the date range of a price file
    Info {
        #[arg(short, long)]
        prices: PathBuf,
        #[arg(long, default_value_t = ',')]
        delimiter: char,
        #[arg(long)]
        decimal_comma: bool,
        #[arg(long, default_value = "%Y-%m-%d")]
        date_format: String,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            start,
            end,
            curve,
        } => run_backtest(&config, start, end, curve),
        Command::Validate { config } => run_validate(&config),
        Command::Info {
            prices,
            delimiter,
            decimal_comma,
            date_format,
        } => run_info(&prices, delimiter, decimal_comma, &date_format),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| report(&e))
}

/// Print `err` with its cause chain and map it to an exit code.
fn report(err: &ForecastError) -> ExitCode {
    eprintln!("error: {err}");
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
    ExitCode::from(err)
}

fn run_backtest(
    config_path: &Path,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    curve: bool,
) -> ExitCode {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_run_config(&adapter) {
        return report(&e);
    }

    // Stages 2-4: Load data, build rules, calibrate
    let (subsystem, settings) = match build_subsystem(&adapter, config_path) {
        Ok(s) => s,
        Err(e) => return report(&e),
    };

    // Stage 5: Resolve the test window
    let (first, last) = match subsystem.forecast_range() {
        Ok(r) => r,
        Err(e) => return report(&e),
    };
    let start = start.or(settings.test_start).unwrap_or(first);
    let end = end.or(settings.test_end).unwrap_or(last);
    eprintln!("Backtesting {} to {}...", start, end);

    // Stage 6: Run and summarise
    let performance = match subsystem.performance_values(start, end) {
        Ok(p) => p,
        Err(e) => return report(&e),
    };
    let metrics = Metrics::compute(&performance, subsystem.capital());
    print_summary(&subsystem, &performance, &metrics);
    if curve {
        println!();
        println!("date,value");
        for point in performance.points() {
            println!("{},{:.2}", point.date, point.value);
        }
    }
    ExitCode::SUCCESS
}

/// Load the configured data and build the calibrated subsystem.
///
/// Relative data paths are resolved against the config file's directory.
pub fn build_subsystem(
    config: &dyn ConfigPort,
    config_path: &Path,
) -> Result<(SubSystem, SubsystemSettings), ForecastError> {
    let data = data_settings(config)?;
    let forecast_config = forecast_settings(config)?;
    let settings = subsystem_settings(config)?;

    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let source = CsvAdapter::from_settings(base_dir, &data);

    eprintln!("Loading prices from {}", data.prices.display());
    let prices = fill_missing(source.load_series(&data.prices)?)
        .context(format!("invalid price data for {}", data.name))?;
    let base_value = match &data.short_index {
        Some(path) => {
            eprintln!("Loading short index from {}", path.display());
            let short_index = fill_missing(source.load_series(path)?)
                .context(format!("invalid short index data for {}", data.name))?;
            BaseValue::with_short_index(&data.name, prices, short_index, &forecast_config)?
        }
        None => BaseValue::new(&data.name, prices, &forecast_config)?,
    };
    let base_value = Arc::new(base_value);

    let window = ReferenceWindow::new(settings.reference_start, settings.reference_end)?;
    eprintln!(
        "Building {} rules over reference window {}",
        settings.rules.len(),
        window
    );
    let rules = build_rules(config, &base_value, window, &forecast_config)?;

    eprintln!("Calibrating...");
    let subsystem = SubSystem::new(
        &base_value,
        rules,
        settings.capital,
        settings.base_scale,
        &forecast_config,
    )?;
    Ok((subsystem, settings))
}

/// Fill empty cells the way alignment fills gaps.
fn fill_missing(series: TimeSeries) -> Result<TimeSeries, ForecastError> {
    if !series.has_nan() {
        return Ok(series);
    }
    series.validate_non_empty()?;
    let mut filled = align(&[series])?;
    filled
        .pop()
        .ok_or_else(|| ForecastError::invalid("alignment returned no series"))
}

fn print_summary(subsystem: &SubSystem, performance: &TimeSeries, metrics: &Metrics) {
    println!("Base value:               {}", subsystem.base_value().name());
    for rule in subsystem.calibrated_rules() {
        println!(
            "Rule {:<22} scalar {:.4}",
            rule.description(),
            rule.forecast_scalar()
        );
    }
    println!(
        "Diversification multiplier: {:.4}",
        subsystem.diversification_multiplier().value()
    );
    if let (Some(first), Some(last)) = (performance.first_date(), performance.last_date()) {
        println!("Period:                   {} to {}", first, last);
    }
    println!("Initial capital:          {:.2}", metrics.initial_capital);
    println!("Final capital:            {:.2}", metrics.final_value);
    println!("Total return:             {:.2}%", metrics.total_return * 100.0);
    println!("Annualized return:        {:.2}%", metrics.annualized_return * 100.0);
    println!("Sharpe ratio:             {:.3}", metrics.sharpe_ratio);
    println!("Sortino ratio:            {:.3}", metrics.sortino_ratio);
    println!("Max drawdown:             {:.2}%", metrics.max_drawdown * 100.0);
    println!("Max drawdown duration:    {} steps", metrics.max_drawdown_duration);
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_run_config(&adapter) {
        return report(&e);
    }

    let settings = match subsystem_settings(&adapter) {
        Ok(s) => s,
        Err(e) => return report(&e),
    };
    let specs = match rule_builder::resolve_specs(&adapter, &settings.rules, settings.base_scale)
    {
        Ok(s) => s,
        Err(e) => return report(&e),
    };

    eprintln!("\nRules:");
    for name in &settings.rules {
        print_rule_tree(name, &specs, 1);
    }

    let mut unused: Vec<String> = adapter
        .sections()
        .into_iter()
        .filter(|s| s.starts_with("rule."))
        .filter(|s| !specs.keys().any(|name| rule_section(name) == *s))
        .collect();
    unused.sort();
    for section in unused {
        eprintln!("warning: [{}] is not used by any rule", section);
    }

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn print_rule_tree(
    name: &str,
    specs: &std::collections::BTreeMap<String, rule_builder::RuleSpec>,
    depth: usize,
) {
    let Some(spec) = specs.get(name) else {
        return;
    };
    let kind = match &spec.kind {
        rule_builder::RuleKind::Ewmac {
            long_horizon,
            short_horizon,
        } if spec.variations.is_empty() => format!("EWMAC({},{})", long_horizon, short_horizon),
        rule_builder::RuleKind::Ewmac { .. } => "EWMAC".to_string(),
        rule_builder::RuleKind::VolatilityDifference { lookback_window } => {
            format!("VOLDIFF({})", lookback_window)
        }
    };
    eprintln!(
        "{}{}: {} base_scale {}",
        "  ".repeat(depth),
        name,
        kind,
        spec.base_scale
    );
    for variation in &spec.variations {
        print_rule_tree(variation, specs, depth + 1);
    }
}

fn run_info(prices: &Path, delimiter: char, decimal_comma: bool, date_format: &str) -> ExitCode {
    let delimiter = match u8::try_from(delimiter) {
        Ok(d) if d.is_ascii() => d,
        _ => {
            let err = ForecastError::ConfigInvalid {
                section: "info".to_string(),
                key: "delimiter".to_string(),
                reason: format!("'{}' is not an ASCII character", delimiter),
            };
            return report(&err);
        }
    };
    let adapter = CsvAdapter::new(PathBuf::new())
        .with_delimiter(delimiter)
        .with_decimal_comma(decimal_comma)
        .with_date_format(date_format);

    match adapter.load_series(prices) {
        Ok(series) => {
            match (series.first_date(), series.last_date()) {
                (Some(first), Some(last)) => println!(
                    "{}: {} points, {} to {}",
                    prices.display(),
                    series.len(),
                    first,
                    last
                ),
                _ => println!("{}: no data found", prices.display()),
            }
            let missing = series.values().iter().filter(|v| v.is_nan()).count();
            if missing > 0 {
                println!("{}: {} missing values", prices.display(), missing);
            }
            ExitCode::SUCCESS
        }
        Err(e) => report(&e),
    }
}
