//! CSV price file adapter.
//!
//! Files hold a header row followed by `date<delim>value` records; further
//! columns are ignored. Numbers may use `,` as the decimal separator, in
//! which case `.` is read as a thousands separator.

use crate::domain::config_validation::{DataSettings, DEFAULT_DATE_FORMAT};
use crate::domain::error::ForecastError;
use crate::domain::time_series::TimeSeries;
use crate::ports::data_port::PriceSource;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

pub struct CsvAdapter {
    base_path: PathBuf,
    delimiter: u8,
    decimal_comma: bool,
    date_format: String,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            delimiter: b',',
            decimal_comma: false,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }

    /// Adapter reading files the way `[data]` describes, relative to `base_path`.
    pub fn from_settings(base_path: PathBuf, settings: &DataSettings) -> Self {
        Self {
            base_path,
            delimiter: settings.delimiter,
            decimal_comma: settings.decimal_comma,
            date_format: settings.date_format.clone(),
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_decimal_comma(mut self, decimal_comma: bool) -> Self {
        self.decimal_comma = decimal_comma;
        self
    }

    pub fn with_date_format(mut self, date_format: &str) -> Self {
        self.date_format = date_format.to_string();
        self
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    fn parse_value(&self, raw: &str) -> Option<f64> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Some(f64::NAN);
        }
        let normalised = if self.decimal_comma {
            raw.replace('.', "").replace(',', ".")
        } else {
            raw.replace(',', "")
        };
        normalised.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

impl PriceSource for CsvAdapter {
    fn load_series(&self, path: &Path) -> Result<TimeSeries, ForecastError> {
        let path = self.resolve(path);
        let source_name = path.display().to_string();
        let data_error = |reason: String| ForecastError::Data {
            source_name: source_name.clone(),
            reason,
        };

        let content = fs::read_to_string(&path)
            .map_err(|e| data_error(format!("failed to read: {}", e)))?;

        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let mut rows: Vec<(NaiveDate, f64)> = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| data_error(format!("CSV parse error: {}", e)))?;
            // header is line 1
            let line = line + 2;

            let date_str = record
                .get(0)
                .ok_or_else(|| data_error(format!("line {}: missing date column", line)))?;
            if date_str.is_empty() && record.iter().all(str::is_empty) {
                continue;
            }
            let date = NaiveDate::parse_from_str(date_str, &self.date_format).map_err(|e| {
                data_error(format!("line {}: invalid date '{}': {}", line, date_str, e))
            })?;

            let raw = record.get(1).unwrap_or("");
            let value = self.parse_value(raw).ok_or_else(|| {
                data_error(format!("line {}: invalid value '{}'", line, raw))
            })?;
            rows.push((date, value));
        }

        rows.sort_by_key(|(date, _)| *date);
        if let Some(pair) = rows.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(data_error(format!("duplicate date {}", pair[0].0)));
        }

        let (dates, values): (Vec<NaiveDate>, Vec<f64>) = rows.into_iter().unzip();
        TimeSeries::new(dates, values).map_err(|e| data_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        fs::write(
            path.join("gold.csv"),
            "date,close\n2024-01-17,115.5\n2024-01-15,105.0\n2024-01-16,110.25\n",
        )
        .unwrap();
        fs::write(
            path.join("dax.csv"),
            "Datum;Schluss\n15.01.2024;16.431,69\n16.01.2024;16.571,68\n17.01.2024;\n18.01.2024;16.567,35\n",
        )
        .unwrap();
        fs::write(path.join("empty.csv"), "date,close\n").unwrap();
        fs::write(
            path.join("dup.csv"),
            "date,close\n2024-01-15,1\n2024-01-16,2\n2024-01-15,3\n",
        )
        .unwrap();
        fs::write(path.join("bad.csv"), "date,close\n2024-01-15,abc\n").unwrap();
        fs::write(
            path.join("inf.csv"),
            "date,close\n2024-01-15,100\n2024-01-16,inf\n2024-01-17,NaN\n",
        )
        .unwrap();

        (dir, path)
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn load_series_sorts_by_date() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let series = adapter.load_series(Path::new("gold.csv")).unwrap();

        assert_eq!(series.dates(), &[d(15), d(16), d(17)]);
        assert_eq!(series.values(), &[105.0, 110.25, 115.5]);
    }

    #[test]
    fn decimal_comma_and_custom_format() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path)
            .with_delimiter(b';')
            .with_decimal_comma(true)
            .with_date_format("%d.%m.%Y");
        let series = adapter.load_series(Path::new("dax.csv")).unwrap();

        assert_eq!(series.len(), 4);
        assert!((series.values()[0] - 16431.69).abs() < 1e-9);
        assert!((series.values()[1] - 16571.68).abs() < 1e-9);
        assert!(series.values()[2].is_nan());
        assert_eq!(series.first_date(), Some(d(15)));
    }

    #[test]
    fn absolute_paths_ignore_base() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(PathBuf::from("/nonexistent"));
        let series = adapter.load_series(&path.join("gold.csv")).unwrap();
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn duplicate_dates_fail() {
        let (_dir, path) = setup_test_data();
        let err = CsvAdapter::new(path)
            .load_series(Path::new("dup.csv"))
            .unwrap_err();
        assert!(matches!(err, ForecastError::Data { reason, .. } if reason.contains("duplicate")));
    }

    #[test]
    fn bad_value_fails() {
        let (_dir, path) = setup_test_data();
        let err = CsvAdapter::new(path)
            .load_series(Path::new("bad.csv"))
            .unwrap_err();
        assert!(matches!(err, ForecastError::Data { reason, .. } if reason.contains("line 2")));
    }

    #[test]
    fn non_finite_text_fails() {
        let (_dir, path) = setup_test_data();
        let err = CsvAdapter::new(path)
            .load_series(Path::new("inf.csv"))
            .unwrap_err();
        assert!(matches!(err, ForecastError::Data { reason, .. } if reason.contains("line 3: invalid value 'inf'")));
    }

    #[test]
    fn missing_file_fails() {
        let (_dir, path) = setup_test_data();
        let result = CsvAdapter::new(path).load_series(Path::new("missing.csv"));
        assert!(matches!(result, Err(ForecastError::Data { .. })));
    }

    #[test]
    fn data_range_reports_bounds() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert_eq!(
            adapter.data_range(Path::new("gold.csv")).unwrap(),
            Some((d(15), d(17), 3))
        );
        assert_eq!(adapter.data_range(Path::new("empty.csv")).unwrap(), None);
    }
}
