//! INI file configuration adapter.

use crate::domain::error::ForecastError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ForecastError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| ForecastError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, ForecastError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| ForecastError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn sections(&self) -> Vec<String> {
        self.config.sections()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[data]
name = Gold
prices = data/gold.csv

[subsystem]
capital = 100000.0
rules = fast, slow

[rule.fast]
type = ewmac
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("data", "prices"),
            Some("data/gold.csv".to_string())
        );
        assert_eq!(
            adapter.get_string("subsystem", "rules"),
            Some("fast, slow".to_string())
        );
        assert_eq!(
            adapter.get_string("rule.fast", "type"),
            Some("ewmac".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[subsystem]\ncapital = 100\n").unwrap();
        assert_eq!(adapter.get_string("subsystem", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn keys_and_sections_are_case_insensitive() {
        let adapter = FileConfigAdapter::from_string("[Rule.Fast]\nLong_Horizon = 16\n").unwrap();
        assert_eq!(
            adapter.get_string("rule.fast", "long_horizon"),
            Some("16".to_string())
        );
    }

    #[test]
    fn sections_lists_rule_sections() {
        let adapter = FileConfigAdapter::from_string(
            "[subsystem]\nrules = a\n[rule.a]\ntype = ewmac\n[rule.b]\ntype = ewmac\n",
        )
        .unwrap();
        let mut sections = adapter.sections();
        sections.sort();
        assert_eq!(sections, vec!["rule.a", "rule.b", "subsystem"]);
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[data]\nprices = /tmp/prices.csv\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("data", "prices"),
            Some("/tmp/prices.csv".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let err = FileConfigAdapter::from_file("/nonexistent/path/config.ini").unwrap_err();
        assert!(matches!(err, ForecastError::ConfigParse { file, .. } if file.contains("config.ini")));
    }
}
